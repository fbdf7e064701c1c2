/// Key records and the lifecycle data model.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::hybrid::{HybridPrivateKey, HybridPublicKey};
use crate::crypto::secret::SecretBytes;
use crate::params::{AlgorithmFamily, SecurityLevel};

pub type KeyId = Uuid;

/// The single declared use of a key, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPurpose {
    Encryption,
    KeyExchange,
    Signing,
    Authentication,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 4] = [
        KeyPurpose::Encryption,
        KeyPurpose::KeyExchange,
        KeyPurpose::Signing,
        KeyPurpose::Authentication,
    ];

    /// Index of this purpose's slot in the keystore's fixed slot table.
    pub(crate) fn slot_index(self) -> usize {
        match self {
            KeyPurpose::Encryption => 0,
            KeyPurpose::KeyExchange => 1,
            KeyPurpose::Signing => 2,
            KeyPurpose::Authentication => 3,
        }
    }
}

/// Which (family, purpose) pairings are legal at key creation.
pub fn compatible(key_type: AlgorithmFamily, purpose: KeyPurpose) -> bool {
    match key_type {
        AlgorithmFamily::MlKem => purpose == KeyPurpose::KeyExchange,
        AlgorithmFamily::HybridKem => purpose == KeyPurpose::Encryption,
        AlgorithmFamily::MlDsa | AlgorithmFamily::SlhDsa => {
            matches!(purpose, KeyPurpose::Signing | KeyPurpose::Authentication)
        }
    }
}

/// Lifecycle states.
///
/// Pending → Active → Rotating → Retired, with Revoked reachable from any
/// non-terminal state. Private material exists only in the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    Pending,
    Active,
    Rotating,
    Retired,
    Revoked,
}

impl KeyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, KeyStatus::Retired | KeyStatus::Revoked)
    }
}

/// Public half of a stored key.
#[derive(Debug, Clone)]
pub enum PublicKeyMaterial {
    Raw(Vec<u8>),
    Hybrid(HybridPublicKey),
}

impl PublicKeyMaterial {
    /// Raw bytes for size checks and fingerprinting.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            PublicKeyMaterial::Raw(bytes) => bytes.clone(),
            PublicKeyMaterial::Hybrid(key) => key.to_bytes(),
        }
    }
}

/// Private half of a stored key; never leaves the keystore.
pub(crate) enum PrivateKeyMaterial {
    Raw(SecretBytes),
    Hybrid(HybridPrivateKey),
}

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKeyMaterial([REDACTED])")
    }
}

/// The durable unit of the key lifecycle.
#[derive(Debug)]
pub struct KeyRecord {
    pub id: KeyId,
    pub key_type: AlgorithmFamily,
    pub purpose: KeyPurpose,
    pub level: SecurityLevel,
    pub status: KeyStatus,
    pub public_key: PublicKeyMaterial,
    pub(crate) private_key: Option<PrivateKeyMaterial>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    /// Incremented on each rotation along the succession chain.
    pub version: u32,
    /// Id of the key this one superseded, if any.
    pub predecessor: Option<KeyId>,
    pub revocation_reason: Option<String>,
}

impl KeyRecord {
    /// Drop private material; the zero-on-drop wrappers wipe the buffers.
    pub(crate) fn erase_private_key(&mut self) {
        self.private_key = None;
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Projection handed to callers: everything except private material.
    pub fn info(&self) -> KeyInfo {
        KeyInfo {
            id: self.id,
            key_type: self.key_type,
            purpose: self.purpose,
            level: self.level,
            status: self.status,
            public_key: self.public_key.clone(),
            created_at: self.created_at,
            activated_at: self.activated_at,
            rotated_at: self.rotated_at,
            retired_at: self.retired_at,
            version: self.version,
            predecessor: self.predecessor,
            revocation_reason: self.revocation_reason.clone(),
            has_private_key: self.has_private_key(),
        }
    }
}

/// Caller-visible view of a [`KeyRecord`].
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub id: KeyId,
    pub key_type: AlgorithmFamily,
    pub purpose: KeyPurpose,
    pub level: SecurityLevel,
    pub status: KeyStatus,
    pub public_key: PublicKeyMaterial,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub version: u32,
    pub predecessor: Option<KeyId>,
    pub revocation_reason: Option<String>,
    pub has_private_key: bool,
}
