//! Walks descriptors, lowers every sample, interprets the lowered function and
//! compares the outputs against the reference semantics.
//!
//! A sample is settled in this order: the identity must be lowered (otherwise
//! `Skipped`), the reference must be able to evaluate it (otherwise
//! `Skipped`), then the lowering and the interpreter run. When the reference
//! rejects a sample as invalid, the lowering has to reject it as an invalid
//! argument too; any other lowering error fails the sample.

use std::fmt;

use anyhow::Result;
use opbridge::ir::DType;
use opbridge::samples::{HostTensor, SampleInput};
use opbridge::lowering::LowerError;
use opbridge::{Catalog, CatalogError, OperatorDescriptor, OperatorIdentity};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::interpreter::{self, InterpretError};
use crate::reference::{self, ReferenceError};
use crate::tolerance::{conformance_config, ToleranceConfig};

/// First disagreement between the reference and the interpreted lowering.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("output {output}{}: expected {expected}, got {actual} (atol {atol}, rtol {rtol})", location(.index))]
pub struct SemanticMismatch {
    pub output: usize,
    /// Flat element index; `None` when the outputs already disagree on count, dtype or shape.
    pub index: Option<usize>,
    pub expected: String,
    pub actual: String,
    pub atol: f64,
    pub rtol: f64,
}

fn location(index: &Option<usize>) -> String {
    index.map(|i| format!(" at flat index {i}")).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SampleOutcome {
    Passed,
    Mismatch(SemanticMismatch),
    Skipped(String),
    Failed(String),
}

impl SampleOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, SampleOutcome::Passed)
    }
}

impl fmt::Display for SampleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleOutcome::Passed => f.write_str("passed"),
            SampleOutcome::Mismatch(mismatch) => write!(f, "mismatch: {mismatch}"),
            SampleOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            SampleOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub dtype: String,
    /// Position of the sample in its generator's sequence for this dtype.
    pub index: usize,
    pub summary: String,
    pub outcome: SampleOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub passed: usize,
    pub mismatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &SampleOutcome) {
        match outcome {
            SampleOutcome::Passed => self.passed += 1,
            SampleOutcome::Mismatch(_) => self.mismatched += 1,
            SampleOutcome::Skipped(_) => self.skipped += 1,
            SampleOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: OutcomeCounts) {
        self.passed += other.passed;
        self.mismatched += other.mismatched;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.passed + self.mismatched + self.skipped + self.failed
    }

    /// No mismatches and no failures.
    pub fn is_clean(&self) -> bool {
        self.mismatched == 0 && self.failed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorReport {
    pub name: String,
    pub identity: OperatorIdentity,
    pub deterministic: bool,
    pub samples: Vec<SampleReport>,
}

impl OperatorReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for sample in &self.samples {
            counts.record(&sample.outcome);
        }
        counts
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.samples.iter().map(|sample| &sample.outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConformanceReport {
    pub operators: Vec<OperatorReport>,
    pub totals: OutcomeCounts,
}

impl ConformanceReport {
    pub fn operator(&self, name: &str) -> Option<&OperatorReport> {
        self.operators.iter().find(|report| report.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restricts the run to these dtypes; `None` runs every dtype of each descriptor.
    pub dtypes: Option<Vec<DType>>,
    pub tolerances: ToleranceConfig,
    /// Seeds both sample generation and `rng_uniform` draws.
    pub seed: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dtypes: None,
            tolerances: ToleranceConfig::default(),
            seed: opbridge::sample_seed(),
        }
    }
}

impl RunOptions {
    /// Defaults plus the tolerance overrides from the conformance config file.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tolerances: conformance_config()?.clone(),
            ..Self::default()
        })
    }

    pub fn with_dtypes(mut self, dtypes: &[DType]) -> Self {
        self.dtypes = Some(dtypes.to_vec());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn selects(&self, dtype: DType) -> bool {
        self.dtypes
            .as_ref()
            .map_or(true, |dtypes| dtypes.contains(&dtype))
    }
}

/// Runs every sample of `descriptor` for each selected dtype. One failing sample never stops the run.
pub fn run_descriptor(
    catalog: &Catalog,
    descriptor: &OperatorDescriptor,
    options: &RunOptions,
) -> OperatorReport {
    let name = descriptor.full_name();
    let gate = match catalog.registry.resolve(&descriptor.identity) {
        Ok(_) => None,
        Err(err) if err.is_not_lowered() => Some(SampleOutcome::Skipped(err.to_string())),
        Err(err) => Some(SampleOutcome::Failed(err.to_string())),
    };

    let mut samples = Vec::new();
    for dtype in descriptor.dtypes.iter().filter(|&dtype| options.selects(dtype)) {
        let ctx = descriptor.context(dtype).with_seed(options.seed);
        for (index, sample) in (descriptor.generator)(&ctx).enumerate() {
            let outcome = match &gate {
                Some(outcome) => outcome.clone(),
                None => check_sample(catalog, descriptor, &sample, options),
            };
            match &outcome {
                SampleOutcome::Mismatch(_) | SampleOutcome::Failed(_) => warn!(
                    operator = %name,
                    dtype = %dtype,
                    sample = index,
                    args = %sample.summary(),
                    "{outcome}"
                ),
                _ => debug!(operator = %name, dtype = %dtype, sample = index, "{outcome}"),
            }
            samples.push(SampleReport {
                dtype: dtype.name().to_string(),
                index,
                summary: sample.summary(),
                outcome,
            });
        }
    }
    OperatorReport {
        name,
        identity: descriptor.identity.clone(),
        deterministic: descriptor.deterministic,
        samples,
    }
}

/// Runs the descriptor registered under `name`.
pub fn run_operator(
    catalog: &Catalog,
    name: &str,
    options: &RunOptions,
) -> Result<OperatorReport, CatalogError> {
    let descriptor = catalog.descriptors.lookup(name)?;
    Ok(run_descriptor(catalog, descriptor, options))
}

/// Runs every catalogued descriptor.
pub fn run_catalog(catalog: &Catalog, options: &RunOptions) -> ConformanceReport {
    let operators = catalog
        .descriptors
        .iter()
        .map(|descriptor| run_descriptor(catalog, descriptor, options))
        .collect::<Vec<_>>();
    let mut totals = OutcomeCounts::default();
    for report in &operators {
        totals.merge(report.counts());
    }
    info!(
        operators = operators.len(),
        passed = totals.passed,
        mismatched = totals.mismatched,
        skipped = totals.skipped,
        failed = totals.failed,
        "conformance run finished"
    );
    ConformanceReport { operators, totals }
}

fn check_sample(
    catalog: &Catalog,
    descriptor: &OperatorDescriptor,
    sample: &SampleInput,
    options: &RunOptions,
) -> SampleOutcome {
    let expected = match reference::evaluate(&descriptor.identity, sample) {
        Ok(outputs) => outputs,
        Err(ReferenceError::Unsupported(reason)) => return SampleOutcome::Skipped(reason),
        Err(ReferenceError::Invalid(reason)) => {
            return match catalog.registry.lower_sample(&descriptor.identity, sample) {
                Err(LowerError::InvalidArgument { .. }) => SampleOutcome::Passed,
                Err(err) => SampleOutcome::Failed(format!(
                    "reference rejects the sample ({reason}) but lowering failed otherwise: {err}"
                )),
                Ok(_) => SampleOutcome::Failed(format!(
                    "lowering accepted a sample the reference rejects: {reason}"
                )),
            };
        }
    };

    let function = match catalog.registry.lower_sample(&descriptor.identity, sample) {
        Ok(function) => function,
        Err(err) => return SampleOutcome::Failed(err.to_string()),
    };
    let inputs = sample.tensors().into_iter().cloned().collect::<Vec<_>>();
    match interpreter::evaluate(&function, &inputs, options.seed) {
        Ok(actual) => compare_outputs(
            &expected,
            &actual,
            descriptor,
            &options.tolerances,
        ),
        Err(err @ InterpretError::UnsupportedDType { .. }) => SampleOutcome::Skipped(err.to_string()),
        Err(err) => SampleOutcome::Failed(err.to_string()),
    }
}

fn compare_outputs(
    expected: &[HostTensor],
    actual: &[HostTensor],
    descriptor: &OperatorDescriptor,
    tolerances: &ToleranceConfig,
) -> SampleOutcome {
    if expected.len() != actual.len() {
        return SampleOutcome::Mismatch(SemanticMismatch {
            output: expected.len().min(actual.len()),
            index: None,
            expected: format!("{} outputs", expected.len()),
            actual: format!("{} outputs", actual.len()),
            atol: 0.0,
            rtol: 0.0,
        });
    }
    let name = descriptor.full_name();
    for (output, (e, a)) in expected.iter().zip(actual).enumerate() {
        let tolerance = tolerances.resolve(&name, e.dtype());
        if e.spec() != a.spec() {
            return SampleOutcome::Mismatch(SemanticMismatch {
                output,
                index: None,
                expected: e.spec().to_string(),
                actual: a.spec().to_string(),
                atol: tolerance.atol,
                rtol: tolerance.rtol,
            });
        }
        if !descriptor.deterministic {
            continue;
        }
        let offending = e
            .to_f64_vec()
            .into_iter()
            .zip(a.to_f64_vec())
            .enumerate()
            .find(|(_, (ev, av))| !tolerance.allows(*ev, *av));
        if let Some((index, (ev, av))) = offending {
            return SampleOutcome::Mismatch(SemanticMismatch {
                output,
                index: Some(index),
                expected: format!("{ev:?}"),
                actual: format!("{av:?}"),
                atol: tolerance.atol,
                rtol: tolerance.rtol,
            });
        }
    }
    SampleOutcome::Passed
}
