/// Static registry of post-quantum algorithm parameter sets.
///
/// Maps each (family, security level) pair to the fixed FIPS 203/204/205
/// sizes for keys, ciphertexts and signatures. The registry is pure data:
/// nothing here is mutated after compile time, so lookups are safe from
/// any number of threads without synchronization.
use serde::{Deserialize, Serialize};

use crate::error::{KeystoreError, Result};

/// NIST security categories 1, 3 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    L1,
    L3,
    L5,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 3] = [SecurityLevel::L1, SecurityLevel::L3, SecurityLevel::L5];

    /// Single-byte wire tag for bundle headers.
    pub fn as_u8(self) -> u8 {
        match self {
            SecurityLevel::L1 => 1,
            SecurityLevel::L3 => 3,
            SecurityLevel::L5 => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SecurityLevel::L1),
            3 => Some(SecurityLevel::L3),
            5 => Some(SecurityLevel::L5),
            _ => None,
        }
    }
}

/// Algorithm families offered by the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmFamily {
    /// ML-KEM key encapsulation (FIPS 203).
    MlKem,
    /// ML-DSA lattice signatures (FIPS 204).
    MlDsa,
    /// SLH-DSA hash-based signatures (FIPS 205).
    SlhDsa,
    /// X25519 + ML-KEM hybrid encryption.
    HybridKem,
}

/// Fixed sizes for one (family, level) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmParameters {
    pub family: AlgorithmFamily,
    pub level: SecurityLevel,
    /// Canonical parameter-set name, e.g. "ML-KEM-768". This string is the
    /// algorithm tag carried by serialized envelopes.
    pub parameter_set: &'static str,
    pub public_key_len: usize,
    pub private_key_len: usize,
    /// Ciphertext length for KEM families, signature length for signature
    /// families.
    pub output_len: usize,
    /// 32 for KEM families, 0 for signature families.
    pub shared_secret_len: usize,
}

/// Shared secrets are a stable 32 bytes at every level.
pub const SHARED_SECRET_LEN: usize = 32;

/// X25519 public keys and scalars are 32 bytes.
pub const X25519_KEY_LEN: usize = 32;

const ML_KEM_512: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlKem,
    level: SecurityLevel::L1,
    parameter_set: "ML-KEM-512",
    public_key_len: 800,
    private_key_len: 1632,
    output_len: 768,
    shared_secret_len: SHARED_SECRET_LEN,
};

const ML_KEM_768: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlKem,
    level: SecurityLevel::L3,
    parameter_set: "ML-KEM-768",
    public_key_len: 1184,
    private_key_len: 2400,
    output_len: 1088,
    shared_secret_len: SHARED_SECRET_LEN,
};

const ML_KEM_1024: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlKem,
    level: SecurityLevel::L5,
    parameter_set: "ML-KEM-1024",
    public_key_len: 1568,
    private_key_len: 3168,
    output_len: 1568,
    shared_secret_len: SHARED_SECRET_LEN,
};

const ML_DSA_44: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlDsa,
    level: SecurityLevel::L1,
    parameter_set: "ML-DSA-44",
    public_key_len: 1312,
    private_key_len: 2560,
    output_len: 2420,
    shared_secret_len: 0,
};

const ML_DSA_65: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlDsa,
    level: SecurityLevel::L3,
    parameter_set: "ML-DSA-65",
    public_key_len: 1952,
    private_key_len: 4032,
    output_len: 3309,
    shared_secret_len: 0,
};

const ML_DSA_87: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::MlDsa,
    level: SecurityLevel::L5,
    parameter_set: "ML-DSA-87",
    public_key_len: 2592,
    private_key_len: 4896,
    output_len: 4627,
    shared_secret_len: 0,
};

const SLH_DSA_128F: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::SlhDsa,
    level: SecurityLevel::L1,
    parameter_set: "SLH-DSA-SHA2-128f",
    public_key_len: 32,
    private_key_len: 64,
    output_len: 17088,
    shared_secret_len: 0,
};

const SLH_DSA_192F: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::SlhDsa,
    level: SecurityLevel::L3,
    parameter_set: "SLH-DSA-SHA2-192f",
    public_key_len: 48,
    private_key_len: 96,
    output_len: 35664,
    shared_secret_len: 0,
};

const SLH_DSA_256F: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::SlhDsa,
    level: SecurityLevel::L5,
    parameter_set: "SLH-DSA-SHA2-256f",
    public_key_len: 64,
    private_key_len: 128,
    output_len: 49856,
    shared_secret_len: 0,
};

const HYBRID_L1: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::HybridKem,
    level: SecurityLevel::L1,
    parameter_set: "X25519-ML-KEM-512",
    public_key_len: X25519_KEY_LEN + 800,
    private_key_len: X25519_KEY_LEN + 1632,
    output_len: X25519_KEY_LEN + 768,
    shared_secret_len: SHARED_SECRET_LEN,
};

const HYBRID_L3: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::HybridKem,
    level: SecurityLevel::L3,
    parameter_set: "X25519-ML-KEM-768",
    public_key_len: X25519_KEY_LEN + 1184,
    private_key_len: X25519_KEY_LEN + 2400,
    output_len: X25519_KEY_LEN + 1088,
    shared_secret_len: SHARED_SECRET_LEN,
};

const HYBRID_L5: AlgorithmParameters = AlgorithmParameters {
    family: AlgorithmFamily::HybridKem,
    level: SecurityLevel::L5,
    parameter_set: "X25519-ML-KEM-1024",
    public_key_len: X25519_KEY_LEN + 1568,
    private_key_len: X25519_KEY_LEN + 3168,
    output_len: X25519_KEY_LEN + 1568,
    shared_secret_len: SHARED_SECRET_LEN,
};

const REGISTRY: [&AlgorithmParameters; 12] = [
    &ML_KEM_512,
    &ML_KEM_768,
    &ML_KEM_1024,
    &ML_DSA_44,
    &ML_DSA_65,
    &ML_DSA_87,
    &SLH_DSA_128F,
    &SLH_DSA_192F,
    &SLH_DSA_256F,
    &HYBRID_L1,
    &HYBRID_L3,
    &HYBRID_L5,
];

/// Look up the parameter set for a (family, level) pair.
///
/// Total over the declared enums: every pair resolves.
pub fn parameters_for(family: AlgorithmFamily, level: SecurityLevel) -> &'static AlgorithmParameters {
    match (family, level) {
        (AlgorithmFamily::MlKem, SecurityLevel::L1) => &ML_KEM_512,
        (AlgorithmFamily::MlKem, SecurityLevel::L3) => &ML_KEM_768,
        (AlgorithmFamily::MlKem, SecurityLevel::L5) => &ML_KEM_1024,
        (AlgorithmFamily::MlDsa, SecurityLevel::L1) => &ML_DSA_44,
        (AlgorithmFamily::MlDsa, SecurityLevel::L3) => &ML_DSA_65,
        (AlgorithmFamily::MlDsa, SecurityLevel::L5) => &ML_DSA_87,
        (AlgorithmFamily::SlhDsa, SecurityLevel::L1) => &SLH_DSA_128F,
        (AlgorithmFamily::SlhDsa, SecurityLevel::L3) => &SLH_DSA_192F,
        (AlgorithmFamily::SlhDsa, SecurityLevel::L5) => &SLH_DSA_256F,
        (AlgorithmFamily::HybridKem, SecurityLevel::L1) => &HYBRID_L1,
        (AlgorithmFamily::HybridKem, SecurityLevel::L3) => &HYBRID_L3,
        (AlgorithmFamily::HybridKem, SecurityLevel::L5) => &HYBRID_L5,
    }
}

/// Resolve a parameter-set name carried by a serialized envelope back to
/// its registry entry. Unknown names are an error, not a default.
pub fn parameters_by_name(name: &str) -> Result<&'static AlgorithmParameters> {
    REGISTRY
        .iter()
        .find(|p| p.parameter_set == name)
        .copied()
        .ok_or_else(|| KeystoreError::UnsupportedAlgorithm(name.to_string()))
}
