use std::env;
use std::sync::OnceLock;

use tracing::warn;

static OPBRIDGE_SEED: OnceLock<u64> = OnceLock::new();
static OPBRIDGE_DUMP_GRAPHS: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_seed(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Base seed for sample generation, from `OPBRIDGE_SEED` (decimal or `0x` hex, default 0).
pub fn sample_seed() -> u64 {
    *OPBRIDGE_SEED.get_or_init(|| match env::var("OPBRIDGE_SEED") {
        Ok(value) if !value.trim().is_empty() => parse_seed(&value).unwrap_or_else(|| {
            warn!(%value, "ignoring unparsable OPBRIDGE_SEED");
            0
        }),
        _ => 0,
    })
}

/// Whether lowered functions are logged in text form (`OPBRIDGE_DUMP_GRAPHS`).
pub(crate) fn dump_graphs_enabled() -> bool {
    *OPBRIDGE_DUMP_GRAPHS.get_or_init(|| match env::var("OPBRIDGE_DUMP_GRAPHS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_seed};

    #[test]
    fn seeds_accept_decimal_and_hex() {
        assert_eq!(parse_seed("42"), Some(42));
        assert_eq!(parse_seed(" 0x2A "), Some(42));
        assert_eq!(parse_seed("forty-two"), None);
    }

    #[test]
    fn bool_flags_are_case_insensitive() {
        assert!(parse_bool("ON"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
    }
}
