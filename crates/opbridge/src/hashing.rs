const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

pub fn fnv1a_init() -> u64 {
    FNV1A_OFFSET
}

pub fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

/// Stable per-operator rng seed: `base` mixed with the operator name and dtype name.
pub fn sample_seed(base: u64, op_name: &str, dtype_name: &str) -> u64 {
    let mut hash = fnv1a_bytes(fnv1a_init(), &base.to_le_bytes());
    hash = fnv1a_bytes(hash, op_name.as_bytes());
    hash = fnv1a_bytes(hash, b"/");
    fnv1a_bytes(hash, dtype_name.as_bytes())
}
