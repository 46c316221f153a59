//! Comparison tolerances, resolved per operator and dtype.
//!
//! Built-in defaults depend only on the dtype. `configs/conformance.json` (or
//! the file named by `OPBRIDGE_CONFORMANCE_CONFIG`) may override them:
//!
//! ```json
//! {
//!   "default": { "atol": 1e-3 },
//!   "rules": [
//!     { "operator": "ops.aten.layer_norm", "dtype": "float16", "atol": 1e-2, "rtol": 1e-2 },
//!     { "dtype": "bfloat16", "rtol": 2e-2 }
//!   ]
//! }
//! ```
//!
//! Both rule keys accept `*` wildcards. Overrides apply in the order
//! `default`, dtype-only rules, operator-only rules, then rules naming both;
//! within one tier the last matching rule wins.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use opbridge::DType;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ATOL: f64 = 5e-4;
pub const RTOL: f64 = 1e-4;

const HALF_ATOL: f64 = 1e-3;
const HALF_RTOL: f64 = 1e-3;
const BF16_ATOL: f64 = 1.6e-2;
const BF16_RTOL: f64 = 1e-2;

static CONFORMANCE_CONFIG: OnceLock<Result<ToleranceConfig, String>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerance {
    pub const EXACT: Tolerance = Tolerance {
        atol: 0.0,
        rtol: 0.0,
    };

    /// Built-in tolerance for `dtype`; integer and bool results compare exactly.
    pub fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F16 => Tolerance {
                atol: HALF_ATOL,
                rtol: HALF_RTOL,
            },
            DType::Bf16 => Tolerance {
                atol: BF16_ATOL,
                rtol: BF16_RTOL,
            },
            dtype if dtype.is_float() || dtype.is_complex() => Tolerance {
                atol: ATOL,
                rtol: RTOL,
            },
            _ => Tolerance::EXACT,
        }
    }

    /// `|e - a| <= atol + rtol * max(|e|, |a|)`; NaN only matches NaN and
    /// infinities must match exactly.
    pub fn allows(&self, expected: f64, actual: f64) -> bool {
        if expected.is_nan() || actual.is_nan() {
            return expected.is_nan() && actual.is_nan();
        }
        if expected.is_infinite() || actual.is_infinite() {
            return expected == actual;
        }
        let diff = (expected - actual).abs();
        diff <= self.atol + self.rtol * expected.abs().max(actual.abs())
    }

    fn apply(&mut self, overrides: &ToleranceOverride) {
        if let Some(atol) = overrides.atol {
            self.atol = atol;
        }
        if let Some(rtol) = overrides.rtol {
            self.rtol = rtol;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ToleranceOverride {
    #[serde(default)]
    pub atol: Option<f64>,
    #[serde(default)]
    pub rtol: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToleranceRule {
    /// Pattern over the descriptor's full name, e.g. `ops.aten.*`.
    #[serde(default)]
    pub operator: Option<String>,
    /// Pattern over the dtype's runner name, e.g. `float16`.
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub atol: Option<f64>,
    #[serde(default)]
    pub rtol: Option<f64>,
}

impl ToleranceRule {
    fn overrides(&self) -> ToleranceOverride {
        ToleranceOverride {
            atol: self.atol,
            rtol: self.rtol,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToleranceConfig {
    #[serde(default)]
    pub default: Option<ToleranceOverride>,
    #[serde(default)]
    pub rules: Vec<ToleranceRule>,
}

impl ToleranceConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid tolerance config")
    }

    /// Reads `path`; a missing file yields the built-in defaults only when `optional` is set.
    pub fn from_path(path: &Path, optional: bool) -> Result<Self> {
        if optional && !path.exists() {
            debug!(path = %path.display(), "no tolerance config, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read tolerance config {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("in {}", path.display()))
    }

    /// Loads the config named by `OPBRIDGE_CONFORMANCE_CONFIG`, else the
    /// workspace `configs/conformance.json` if it exists.
    pub fn load() -> Result<Self> {
        match env::var("OPBRIDGE_CONFORMANCE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_path(Path::new(path.trim()), false),
            _ => Self::from_path(&default_config_path(), true),
        }
    }

    pub fn resolve(&self, operator: &str, dtype: DType) -> Tolerance {
        let mut resolved = Tolerance::for_dtype(dtype);
        if let Some(defaults) = &self.default {
            resolved.apply(defaults);
        }
        let dtype_name = dtype.name();
        let mut dtype_rule = None;
        let mut operator_rule = None;
        let mut both_rule = None;
        for rule in &self.rules {
            let operator_match = rule
                .operator
                .as_deref()
                .map(|pattern| matches_pattern(operator, pattern));
            let dtype_match = rule
                .dtype
                .as_deref()
                .map(|pattern| matches_pattern(dtype_name, pattern));
            match (operator_match, dtype_match) {
                (Some(true), Some(true)) => both_rule = Some(rule.overrides()),
                (Some(true), None) => operator_rule = Some(rule.overrides()),
                (None, Some(true)) => dtype_rule = Some(rule.overrides()),
                _ => {}
            }
        }
        for rule in [dtype_rule, operator_rule, both_rule].iter().flatten() {
            resolved.apply(rule);
        }
        resolved
    }
}

fn default_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/conformance.json")
}

/// Process-wide config, loaded on first use. A load failure is reported on every call.
pub fn conformance_config() -> Result<&'static ToleranceConfig> {
    CONFORMANCE_CONFIG
        .get_or_init(|| ToleranceConfig::load().map_err(|err| format!("{err:#}")))
        .as_ref()
        .map_err(|message| anyhow!("{message}"))
}

/// Glob match where `*` stands for any run of characters.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return value == pattern;
    }
    let parts = pattern.split('*').collect::<Vec<_>>();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = value.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return remaining.is_empty(),
    };
    for part in middle.iter().filter(|part| !part.is_empty()) {
        match remaining.find(part) {
            Some(found) => remaining = &remaining[found + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
