use thiserror::Error;
use uuid::Uuid;

use crate::keystore::record::KeyPurpose;
use crate::params::AlgorithmFamily;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("invalid ciphertext length: expected {expected} bytes, got {actual}")]
    InvalidCiphertext { expected: usize, actual: usize },

    #[error("{key_type:?} keys cannot be created for purpose {purpose:?}")]
    InvalidPurpose {
        key_type: AlgorithmFamily,
        purpose: KeyPurpose,
    },

    #[error("key {id} with purpose {purpose:?} cannot be used for {operation}")]
    PurposeMismatch {
        id: Uuid,
        purpose: KeyPurpose,
        operation: &'static str,
    },

    #[error("key not found: {0}")]
    KeyNotFound(Uuid),

    #[error("invalid key state: {0}")]
    InvalidState(String),

    #[error("key revoked: {0}")]
    KeyRevoked(Uuid),

    #[error("no active key for purpose {0:?}")]
    NoActiveKey(KeyPurpose),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, KeystoreError>;
