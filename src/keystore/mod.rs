/// Key Management Service.
///
/// The keystore owns all private key material and the record table, and
/// is the only component other subsystems call directly. Algorithm
/// services are stateless and injected at construction; the keystore adds
/// the lifecycle state machine, purpose scoping and the audit trail.
///
/// Concurrency: the record table sits behind one `RwLock`; each purpose
/// has its own slot mutex, so activation and rotation of one purpose
/// never block operations on another, and a reader of `get_active_key`
/// can never observe a half-rotated slot.
pub mod audit;
pub mod record;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::bundle::EncryptedBundle;
use crate::crypto::hybrid::{HybridMode, HybridPublicKey, HybridService};
use crate::crypto::kem::KemService;
use crate::crypto::mldsa::MlDsaService;
use crate::crypto::secret::Secret32;
use crate::crypto::slhdsa::SlhDsaService;
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel};
use crate::signed::{self, SignedObject, Verification};

use self::audit::{AuditAction, AuditEvent};
use self::record::{
    compatible, KeyId, KeyInfo, KeyPurpose, KeyRecord, KeyStatus, PrivateKeyMaterial,
    PublicKeyMaterial,
};

/// Default grace window for superseded keys.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 24 * 60 * 60;

/// Keystore configuration.
#[derive(Debug, Clone, Copy)]
pub struct KeystoreConfig {
    /// How long a superseded key remains usable for verification and
    /// decapsulation after rotation.
    pub grace_period: Duration,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::seconds(DEFAULT_GRACE_PERIOD_SECS),
        }
    }
}

/// Active-key pointer for one purpose.
#[derive(Debug, Default)]
struct Slot {
    active: Option<KeyId>,
}

/// The key lifecycle orchestrator.
pub struct Keystore {
    config: KeystoreConfig,
    kem: KemService,
    mldsa: MlDsaService,
    slhdsa: SlhDsaService,
    hybrid: HybridService,
    records: RwLock<HashMap<KeyId, KeyRecord>>,
    slots: [Mutex<Slot>; 4],
    audit: Mutex<Vec<AuditEvent>>,
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new(KeystoreConfig::default())
    }
}

impl Keystore {
    pub fn new(config: KeystoreConfig) -> Self {
        Self {
            config,
            kem: KemService,
            mldsa: MlDsaService,
            slhdsa: SlhDsaService,
            hybrid: HybridService::default(),
            records: RwLock::new(HashMap::new()),
            slots: std::array::from_fn(|_| Mutex::new(Slot::default())),
            audit: Mutex::new(Vec::new()),
        }
    }

    // Lock helpers; poisoning surfaces as an error rather than a panic.

    fn slot(&self, purpose: KeyPurpose) -> Result<MutexGuard<'_, Slot>> {
        self.slots[purpose.slot_index()]
            .lock()
            .map_err(|_| KeystoreError::LockPoisoned)
    }

    fn records_read(&self) -> Result<RwLockReadGuard<'_, HashMap<KeyId, KeyRecord>>> {
        self.records.read().map_err(|_| KeystoreError::LockPoisoned)
    }

    fn records_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<KeyId, KeyRecord>>> {
        self.records.write().map_err(|_| KeystoreError::LockPoisoned)
    }

    fn push_audit(&self, key_id: KeyId, action: AuditAction, detail: impl Into<String>) -> Result<()> {
        let mut log = self.audit.lock().map_err(|_| KeystoreError::LockPoisoned)?;
        log.push(AuditEvent::new(key_id, action, detail));
        Ok(())
    }

    fn generate_material(
        &self,
        key_type: AlgorithmFamily,
        level: SecurityLevel,
        hybrid_mode: HybridMode,
    ) -> (PublicKeyMaterial, PrivateKeyMaterial) {
        match key_type {
            AlgorithmFamily::MlKem => {
                let (pk, sk) = self.kem.generate_keypair(level).into_parts();
                (PublicKeyMaterial::Raw(pk), PrivateKeyMaterial::Raw(sk))
            }
            AlgorithmFamily::MlDsa => {
                let (pk, sk) = self.mldsa.generate_keypair(level).into_parts();
                (PublicKeyMaterial::Raw(pk), PrivateKeyMaterial::Raw(sk))
            }
            AlgorithmFamily::SlhDsa => {
                let (pk, sk) = self.slhdsa.generate_keypair(level).into_parts();
                (PublicKeyMaterial::Raw(pk), PrivateKeyMaterial::Raw(sk))
            }
            AlgorithmFamily::HybridKem => {
                let (pk, sk) = self.hybrid.generate_keypair(hybrid_mode, level).into_parts();
                (PublicKeyMaterial::Hybrid(pk), PrivateKeyMaterial::Hybrid(sk))
            }
        }
    }

    /// Generate a key and activate it for its purpose slot.
    ///
    /// The slot must be empty; replacing a live key goes through
    /// [`rotate_key`](Self::rotate_key) so the one-active-key invariant has
    /// a single write path. Hybrid keys are created in full hybrid mode;
    /// see [`generate_hybrid_key`](Self::generate_hybrid_key) for the
    /// single-primitive modes.
    pub fn generate_key(
        &self,
        key_type: AlgorithmFamily,
        purpose: KeyPurpose,
        level: SecurityLevel,
    ) -> Result<KeyId> {
        self.generate_key_with_mode(key_type, purpose, level, HybridMode::Hybrid)
    }

    /// Generate an encryption key with an explicit hybrid mode.
    pub fn generate_hybrid_key(&self, mode: HybridMode, level: SecurityLevel) -> Result<KeyId> {
        self.generate_key_with_mode(
            AlgorithmFamily::HybridKem,
            KeyPurpose::Encryption,
            level,
            mode,
        )
    }

    fn generate_key_with_mode(
        &self,
        key_type: AlgorithmFamily,
        purpose: KeyPurpose,
        level: SecurityLevel,
        hybrid_mode: HybridMode,
    ) -> Result<KeyId> {
        if !compatible(key_type, purpose) {
            return Err(KeystoreError::InvalidPurpose { key_type, purpose });
        }

        let mut slot = self.slot(purpose)?;
        if slot.active.is_some() {
            return Err(KeystoreError::InvalidState(format!(
                "purpose slot {purpose:?} already has an active key; rotate it instead"
            )));
        }

        let (public_key, private_key) = self.generate_material(key_type, level, hybrid_mode);
        let now = Utc::now();
        let id = Uuid::new_v4();
        let record = KeyRecord {
            id,
            key_type,
            purpose,
            level,
            status: KeyStatus::Active,
            public_key,
            private_key: Some(private_key),
            created_at: now,
            activated_at: Some(now),
            rotated_at: None,
            retired_at: None,
            version: 1,
            predecessor: None,
            revocation_reason: None,
        };
        self.records_write()?.insert(id, record);
        slot.active = Some(id);
        drop(slot);

        self.push_audit(id, AuditAction::Created, format!("{key_type:?} {level:?} key generated"))?;
        self.push_audit(id, AuditAction::Activated, format!("activated for {purpose:?}"))?;
        info!(key_id = %id, key_type = ?key_type, purpose = ?purpose, level = ?level, "key generated and activated");
        Ok(id)
    }

    /// Generate a key but leave it pending; activate later with
    /// [`activate_key`](Self::activate_key).
    pub fn generate_key_deferred(
        &self,
        key_type: AlgorithmFamily,
        purpose: KeyPurpose,
        level: SecurityLevel,
    ) -> Result<KeyId> {
        if !compatible(key_type, purpose) {
            return Err(KeystoreError::InvalidPurpose { key_type, purpose });
        }

        let (public_key, private_key) = self.generate_material(key_type, level, HybridMode::Hybrid);
        let id = Uuid::new_v4();
        let record = KeyRecord {
            id,
            key_type,
            purpose,
            level,
            status: KeyStatus::Pending,
            public_key,
            private_key: Some(private_key),
            created_at: Utc::now(),
            activated_at: None,
            rotated_at: None,
            retired_at: None,
            version: 1,
            predecessor: None,
            revocation_reason: None,
        };
        self.records_write()?.insert(id, record);

        self.push_audit(id, AuditAction::Created, format!("{key_type:?} {level:?} key generated (deferred)"))?;
        info!(key_id = %id, key_type = ?key_type, purpose = ?purpose, "key generated, activation deferred");
        Ok(id)
    }

    /// Move a pending key into its purpose slot.
    pub fn activate_key(&self, id: KeyId) -> Result<()> {
        let purpose = {
            let records = self.records_read()?;
            let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            record.purpose
        };

        let mut slot = self.slot(purpose)?;
        if slot.active.is_some() {
            return Err(KeystoreError::InvalidState(format!(
                "purpose slot {purpose:?} already has an active key"
            )));
        }

        {
            let mut records = self.records_write()?;
            let record = records.get_mut(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            match record.status {
                KeyStatus::Pending => {}
                KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
                other => {
                    return Err(KeystoreError::InvalidState(format!(
                        "only pending keys can be activated, key is {other:?}"
                    )))
                }
            }
            record.status = KeyStatus::Active;
            record.activated_at = Some(Utc::now());
        }
        slot.active = Some(id);
        drop(slot);

        self.push_audit(id, AuditAction::Activated, format!("activated for {purpose:?}"))?;
        info!(key_id = %id, purpose = ?purpose, "key activated");
        Ok(())
    }

    /// Rotate the active key for its purpose slot.
    ///
    /// Creates and activates a successor atomically with respect to the
    /// slot; the superseded key moves to `Rotating` and remains usable for
    /// verification and decapsulation until the grace window elapses.
    pub fn rotate_key(&self, id: KeyId) -> Result<KeyId> {
        let (purpose, key_type, level, version, hybrid_mode) = {
            let records = self.records_read()?;
            let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            match record.status {
                KeyStatus::Active => {}
                KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
                other => {
                    return Err(KeystoreError::InvalidState(format!(
                        "only active keys can be rotated, key is {other:?}"
                    )))
                }
            }
            let mode = match &record.public_key {
                PublicKeyMaterial::Hybrid(key) => key.mode,
                PublicKeyMaterial::Raw(_) => HybridMode::Hybrid,
            };
            (record.purpose, record.key_type, record.level, record.version, mode)
        };

        let mut slot = self.slot(purpose)?;
        if slot.active != Some(id) {
            return Err(KeystoreError::InvalidState(
                "key is not the active key for its purpose slot".to_string(),
            ));
        }

        let (public_key, private_key) = self.generate_material(key_type, level, hybrid_mode);
        let now = Utc::now();
        let new_id = Uuid::new_v4();

        {
            let mut records = self.records_write()?;
            match records.get(&id) {
                None => return Err(KeystoreError::KeyNotFound(id)),
                Some(record) if record.status == KeyStatus::Revoked => {
                    return Err(KeystoreError::KeyRevoked(id))
                }
                Some(record) if record.status != KeyStatus::Active => {
                    return Err(KeystoreError::InvalidState(format!(
                        "only active keys can be rotated, key is {:?}",
                        record.status
                    )))
                }
                Some(_) => {}
            }

            {
                let old = records.get_mut(&id).ok_or(KeystoreError::KeyNotFound(id))?;
                old.status = KeyStatus::Rotating;
                old.rotated_at = Some(now);
            }

            records.insert(
                new_id,
                KeyRecord {
                    id: new_id,
                    key_type,
                    purpose,
                    level,
                    status: KeyStatus::Active,
                    public_key,
                    private_key: Some(private_key),
                    created_at: now,
                    activated_at: Some(now),
                    rotated_at: None,
                    retired_at: None,
                    version: version + 1,
                    predecessor: Some(id),
                    revocation_reason: None,
                },
            );
        }
        slot.active = Some(new_id);
        drop(slot);

        self.push_audit(id, AuditAction::Rotated, format!("superseded by {new_id}"))?;
        self.push_audit(new_id, AuditAction::Activated, format!("activated for {purpose:?} as v{}", version + 1))?;
        info!(old_key = %id, new_key = %new_id, purpose = ?purpose, "key rotated");
        Ok(new_id)
    }

    /// Revoke a key in any non-terminal state and erase its private
    /// material immediately.
    pub fn revoke_key(&self, id: KeyId, reason: &str) -> Result<()> {
        let purpose = {
            let records = self.records_read()?;
            let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            record.purpose
        };

        let mut slot = self.slot(purpose)?;
        {
            let mut records = self.records_write()?;
            let record = records.get_mut(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            match record.status {
                KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
                KeyStatus::Retired => {
                    return Err(KeystoreError::InvalidState(
                        "retired keys cannot be revoked".to_string(),
                    ))
                }
                _ => {}
            }
            record.status = KeyStatus::Revoked;
            record.retired_at = Some(Utc::now());
            record.revocation_reason = Some(reason.to_string());
            record.erase_private_key();

            if slot.active == Some(id) {
                slot.active = None;
            }
        }
        drop(slot);

        self.push_audit(id, AuditAction::Revoked, reason)?;
        warn!(key_id = %id, reason, "key revoked, private material erased");
        Ok(())
    }

    /// Retire every rotating key whose grace window has elapsed.
    ///
    /// Pure function of `now` and each record's `rotated_at`; the caller
    /// (an external scheduler) decides when to sweep.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut retired = Vec::new();
        {
            let mut records = self.records_write()?;
            for record in records.values_mut() {
                if record.status == KeyStatus::Rotating
                    && grace_expired(record.rotated_at, self.config.grace_period, now)
                {
                    record.status = KeyStatus::Retired;
                    record.retired_at = Some(now);
                    record.erase_private_key();
                    retired.push(record.id);
                }
            }
        }

        for id in &retired {
            self.push_audit(*id, AuditAction::Retired, "grace window elapsed")?;
            debug!(key_id = %id, "key retired, private material erased");
        }
        Ok(retired.len())
    }

    /// The active key for a purpose slot.
    pub fn get_active_key(&self, purpose: KeyPurpose) -> Result<KeyInfo> {
        let slot = self.slot(purpose)?;
        let id = slot.active.ok_or(KeystoreError::NoActiveKey(purpose))?;
        let records = self.records_read()?;
        records
            .get(&id)
            .map(KeyRecord::info)
            .ok_or(KeystoreError::KeyNotFound(id))
    }

    pub fn get_key(&self, id: KeyId) -> Result<KeyInfo> {
        let records = self.records_read()?;
        records
            .get(&id)
            .map(KeyRecord::info)
            .ok_or(KeystoreError::KeyNotFound(id))
    }

    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let records = self.records_read()?;
        Ok(records.values().map(KeyRecord::info).collect())
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEvent>> {
        let log = self.audit.lock().map_err(|_| KeystoreError::LockPoisoned)?;
        Ok(log.clone())
    }

    /// Sign a message with a signing or authentication key.
    ///
    /// Only `Active` keys may issue new signatures; a superseded key in
    /// its grace window is verification-only.
    pub fn use_for_signing(&self, id: KeyId, message: &[u8]) -> Result<Vec<u8>> {
        let records = self.records_read()?;
        let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
        match record.status {
            KeyStatus::Active => {}
            KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
            other => {
                return Err(KeystoreError::InvalidState(format!(
                    "cannot sign with a {other:?} key"
                )))
            }
        }
        if !matches!(record.purpose, KeyPurpose::Signing | KeyPurpose::Authentication) {
            return Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "signing",
            });
        }
        let private = record
            .private_key
            .as_ref()
            .ok_or_else(|| KeystoreError::InvalidState("private key material is absent".to_string()))?;

        match (record.key_type, private) {
            (AlgorithmFamily::MlDsa, PrivateKeyMaterial::Raw(sk)) => {
                self.mldsa.sign(record.level, message, sk.as_bytes())
            }
            (AlgorithmFamily::SlhDsa, PrivateKeyMaterial::Raw(sk)) => {
                self.slhdsa.sign(record.level, message, sk.as_bytes())
            }
            _ => Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "signing",
            }),
        }
    }

    /// Verify a signature against a stored key's public half.
    ///
    /// Works in every lifecycle state; public keys are retained precisely
    /// so historical signatures stay verifiable.
    pub fn use_for_verification(&self, id: KeyId, message: &[u8], signature: &[u8]) -> Result<bool> {
        let records = self.records_read()?;
        let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
        if !matches!(record.purpose, KeyPurpose::Signing | KeyPurpose::Authentication) {
            return Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "verification",
            });
        }

        match (record.key_type, &record.public_key) {
            (AlgorithmFamily::MlDsa, PublicKeyMaterial::Raw(pk)) => {
                self.mldsa.verify(record.level, message, signature, pk)
            }
            (AlgorithmFamily::SlhDsa, PublicKeyMaterial::Raw(pk)) => {
                self.slhdsa.verify(record.level, message, signature, pk)
            }
            _ => Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "verification",
            }),
        }
    }

    /// Encapsulate a fresh shared secret to a stored key-exchange key.
    pub fn use_for_encapsulation(&self, id: KeyId) -> Result<(Vec<u8>, Secret32)> {
        let records = self.records_read()?;
        let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
        match record.status {
            KeyStatus::Active => {}
            KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
            other => {
                return Err(KeystoreError::InvalidState(format!(
                    "cannot encapsulate to a {other:?} key"
                )))
            }
        }
        if record.purpose != KeyPurpose::KeyExchange {
            return Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "encapsulation",
            });
        }

        match (record.key_type, &record.public_key) {
            (AlgorithmFamily::MlKem, PublicKeyMaterial::Raw(pk)) => {
                self.kem.encapsulate(record.level, pk)
            }
            _ => Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "encapsulation",
            }),
        }
    }

    /// Recover a shared secret with a stored key-exchange key.
    ///
    /// Allowed on `Active` keys and on `Rotating` keys still inside the
    /// grace window.
    pub fn use_for_decapsulation(&self, id: KeyId, ciphertext: &[u8]) -> Result<Secret32> {
        self.retire_if_expired(id, Utc::now())?;

        let records = self.records_read()?;
        let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
        match record.status {
            KeyStatus::Active | KeyStatus::Rotating => {}
            KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
            other => {
                return Err(KeystoreError::InvalidState(format!(
                    "cannot decapsulate with a {other:?} key"
                )))
            }
        }
        if record.purpose != KeyPurpose::KeyExchange {
            return Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "decapsulation",
            });
        }
        let private = record
            .private_key
            .as_ref()
            .ok_or_else(|| KeystoreError::InvalidState("private key material is absent".to_string()))?;

        match (record.key_type, private) {
            (AlgorithmFamily::MlKem, PrivateKeyMaterial::Raw(sk)) => {
                self.kem.decapsulate(record.level, ciphertext, sk.as_bytes())
            }
            _ => Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "decapsulation",
            }),
        }
    }

    /// Encrypt to a recipient's hybrid public keys. No stored key is
    /// involved; the recipient may be a peer service.
    pub fn encrypt_hybrid(&self, plaintext: &[u8], recipient: &HybridPublicKey) -> Result<EncryptedBundle> {
        self.hybrid.encrypt(plaintext, recipient)
    }

    /// Decrypt a bundle with a stored encryption key.
    pub fn decrypt_hybrid(&self, id: KeyId, bundle: &EncryptedBundle) -> Result<Vec<u8>> {
        self.retire_if_expired(id, Utc::now())?;

        let records = self.records_read()?;
        let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
        match record.status {
            KeyStatus::Active | KeyStatus::Rotating => {}
            KeyStatus::Revoked => return Err(KeystoreError::KeyRevoked(id)),
            other => {
                return Err(KeystoreError::InvalidState(format!(
                    "cannot decrypt with a {other:?} key"
                )))
            }
        }
        if record.purpose != KeyPurpose::Encryption {
            return Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "decryption",
            });
        }
        let private = record
            .private_key
            .as_ref()
            .ok_or_else(|| KeystoreError::InvalidState("private key material is absent".to_string()))?;

        match private {
            PrivateKeyMaterial::Hybrid(sk) => self.hybrid.decrypt(bundle, sk),
            PrivateKeyMaterial::Raw(_) => Err(KeystoreError::PurposeMismatch {
                id,
                purpose: record.purpose,
                operation: "decryption",
            }),
        }
    }

    /// Encapsulate to a raw public key that is not stored here.
    pub fn encapsulate(&self, level: SecurityLevel, public_key: &[u8]) -> Result<(Vec<u8>, Secret32)> {
        self.kem.encapsulate(level, public_key)
    }

    /// Verify a detached signature against a raw public key.
    pub fn verify_detached(
        &self,
        family: AlgorithmFamily,
        level: SecurityLevel,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool> {
        match family {
            AlgorithmFamily::MlDsa => self.mldsa.verify(level, message, signature, public_key),
            AlgorithmFamily::SlhDsa => self.slhdsa.verify(level, message, signature, public_key),
            AlgorithmFamily::MlKem | AlgorithmFamily::HybridKem => Err(
                KeystoreError::UnsupportedAlgorithm(format!("{family:?} is not a signature family")),
            ),
        }
    }

    /// Sign a structured value with canonical serialization.
    pub fn sign_object<T: Serialize>(&self, id: KeyId, value: &T) -> Result<SignedObject> {
        let algorithm = {
            let records = self.records_read()?;
            let record = records.get(&id).ok_or(KeystoreError::KeyNotFound(id))?;
            parameters_for(record.key_type, record.level).parameter_set
        };

        let message = signed::canonical_bytes(value)?;
        let signature = self.use_for_signing(id, &message)?;
        signed::envelope(value, &signature, algorithm, id)
    }

    /// Verify a signed envelope against a raw public key.
    pub fn verify_object(&self, signed_obj: &SignedObject, public_key: &[u8]) -> Result<Verification> {
        signed::verify_object(signed_obj, public_key)
    }

    /// Retire a rotating key in place once its grace window has elapsed,
    /// so expiry takes effect on access even when no sweep has run.
    fn retire_if_expired(&self, id: KeyId, now: DateTime<Utc>) -> Result<()> {
        let expired = {
            let records = self.records_read()?;
            match records.get(&id) {
                Some(record) => {
                    record.status == KeyStatus::Rotating
                        && grace_expired(record.rotated_at, self.config.grace_period, now)
                }
                None => false,
            }
        };
        if !expired {
            return Ok(());
        }

        {
            let mut records = self.records_write()?;
            match records.get_mut(&id) {
                Some(record)
                    if record.status == KeyStatus::Rotating
                        && grace_expired(record.rotated_at, self.config.grace_period, now) =>
                {
                    record.status = KeyStatus::Retired;
                    record.retired_at = Some(now);
                    record.erase_private_key();
                }
                _ => return Ok(()),
            }
        }

        self.push_audit(id, AuditAction::Retired, "grace window elapsed")?;
        debug!(key_id = %id, "key retired, private material erased");
        Ok(())
    }
}

fn grace_expired(rotated_at: Option<DateTime<Utc>>, grace: Duration, now: DateTime<Utc>) -> bool {
    match rotated_at.and_then(|t| t.checked_add_signed(grace)) {
        Some(deadline) => now >= deadline,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore() -> Keystore {
        Keystore::default()
    }

    fn keystore_with_grace(seconds: i64) -> Keystore {
        Keystore::new(KeystoreConfig {
            grace_period: Duration::seconds(seconds),
        })
    }

    #[test]
    fn test_generate_and_get_active() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L3)
            .unwrap();

        let info = store.get_active_key(KeyPurpose::Signing).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.status, KeyStatus::Active);
        assert_eq!(info.version, 1);
        assert!(info.has_private_key);
        assert!(info.activated_at.is_some());
    }

    #[test]
    fn test_no_active_key() {
        let store = keystore();
        assert!(matches!(
            store.get_active_key(KeyPurpose::Signing).unwrap_err(),
            KeystoreError::NoActiveKey(KeyPurpose::Signing)
        ));
    }

    #[test]
    fn test_occupied_slot_rejects_second_key() {
        let store = keystore();
        store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        assert!(matches!(
            store
                .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
                .unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
    }

    #[test]
    fn test_purpose_slots_are_independent() {
        let store = keystore();
        store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        store
            .generate_key(AlgorithmFamily::SlhDsa, KeyPurpose::Authentication, SecurityLevel::L1)
            .unwrap();
        store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        store
            .generate_key(AlgorithmFamily::HybridKem, KeyPurpose::Encryption, SecurityLevel::L1)
            .unwrap();
        assert_eq!(store.list_keys().unwrap().len(), 4);
    }

    #[test]
    fn test_incompatible_pairings_rejected() {
        let store = keystore();
        for key_type in [
            AlgorithmFamily::MlKem,
            AlgorithmFamily::MlDsa,
            AlgorithmFamily::SlhDsa,
            AlgorithmFamily::HybridKem,
        ] {
            for purpose in KeyPurpose::ALL {
                if record::compatible(key_type, purpose) {
                    continue;
                }
                assert!(
                    matches!(
                        store
                            .generate_key(key_type, purpose, SecurityLevel::L1)
                            .unwrap_err(),
                        KeystoreError::InvalidPurpose { .. }
                    ),
                    "{key_type:?} for {purpose:?} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_deferred_activation() {
        let store = keystore();
        let id = store
            .generate_key_deferred(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();

        assert_eq!(store.get_key(id).unwrap().status, KeyStatus::Pending);
        assert!(store.get_active_key(KeyPurpose::Signing).is_err());

        // A pending key cannot sign.
        assert!(matches!(
            store.use_for_signing(id, b"m").unwrap_err(),
            KeystoreError::InvalidState(_)
        ));

        store.activate_key(id).unwrap();
        assert_eq!(store.get_active_key(KeyPurpose::Signing).unwrap().id, id);

        // Re-activation is an invalid transition.
        let second = store
            .generate_key_deferred(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        assert!(matches!(
            store.activate_key(second).unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
    }

    #[test]
    fn test_sign_verify_through_store() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L3)
            .unwrap();

        let sig = store.use_for_signing(id, b"service heartbeat").unwrap();
        assert!(store.use_for_verification(id, b"service heartbeat", &sig).unwrap());
        assert!(!store.use_for_verification(id, b"forged heartbeat", &sig).unwrap());
    }

    #[test]
    fn test_purpose_isolation() {
        let store = keystore();
        let signing = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        let exchange = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        let encryption = store
            .generate_key(AlgorithmFamily::HybridKem, KeyPurpose::Encryption, SecurityLevel::L1)
            .unwrap();

        assert!(matches!(
            store.use_for_encapsulation(signing).unwrap_err(),
            KeystoreError::PurposeMismatch { operation: "encapsulation", .. }
        ));
        assert!(matches!(
            store.use_for_signing(exchange, b"m").unwrap_err(),
            KeystoreError::PurposeMismatch { operation: "signing", .. }
        ));
        assert!(matches!(
            store.use_for_signing(encryption, b"m").unwrap_err(),
            KeystoreError::PurposeMismatch { operation: "signing", .. }
        ));
        assert!(matches!(
            store.use_for_decapsulation(encryption, &[0u8; 768]).unwrap_err(),
            KeystoreError::PurposeMismatch { operation: "decapsulation", .. }
        ));
        assert!(matches!(
            store.use_for_verification(exchange, b"m", &[0u8; 4]).unwrap_err(),
            KeystoreError::PurposeMismatch { operation: "verification", .. }
        ));
    }

    #[test]
    fn test_kem_through_store() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L3)
            .unwrap();

        let (ct, ss_sender) = store.use_for_encapsulation(id).unwrap();
        let ss_receiver = store.use_for_decapsulation(id, &ct).unwrap();
        assert_eq!(ss_sender.as_bytes(), ss_receiver.as_bytes());
    }

    #[test]
    fn test_rotation_exclusivity() {
        let store = keystore();
        let old = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        let new = store.rotate_key(old).unwrap();

        let active = store.get_active_key(KeyPurpose::Signing).unwrap();
        assert_eq!(active.id, new);
        assert_eq!(active.version, 2);
        assert_eq!(active.predecessor, Some(old));

        let old_info = store.get_key(old).unwrap();
        assert_eq!(old_info.status, KeyStatus::Rotating);
        assert!(old_info.rotated_at.is_some());
        assert!(old_info.has_private_key);

        // Exactly one active key for the slot.
        let active_count = store
            .list_keys()
            .unwrap()
            .iter()
            .filter(|k| k.purpose == KeyPurpose::Signing && k.status == KeyStatus::Active)
            .count();
        assert_eq!(active_count, 1);

        // The superseded key cannot rotate again or sign.
        assert!(matches!(
            store.rotate_key(old).unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
        assert!(matches!(
            store.use_for_signing(old, b"m").unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
    }

    #[test]
    fn test_rotation_scenario_telemetry_batch() {
        let store = keystore();
        let old = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L3)
            .unwrap();

        let message = b"telemetry-batch-001";
        let sig = store.use_for_signing(old, message).unwrap();
        assert!(store.use_for_verification(old, message, &sig).unwrap());

        let mut mutated = sig.clone();
        mutated[7] ^= 0x01;
        assert!(!store.use_for_verification(old, message, &mutated).unwrap());

        let new = store.rotate_key(old).unwrap();

        // The old key still verifies the signature it issued.
        assert!(store.use_for_verification(old, message, &sig).unwrap());

        // A signature from the new key fails under the old public key.
        let new_sig = store.use_for_signing(new, message).unwrap();
        assert!(!store.use_for_verification(old, message, &new_sig).unwrap());
    }

    #[test]
    fn test_rotated_key_decapsulates_during_grace() {
        let store = keystore();
        let old = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();

        let (ct, ss) = store.use_for_encapsulation(old).unwrap();
        store.rotate_key(old).unwrap();

        // Inside the default grace window the old key still decapsulates
        // material issued before rotation.
        let recovered = store.use_for_decapsulation(old, &ct).unwrap();
        assert_eq!(recovered.as_bytes(), ss.as_bytes());

        // But it no longer receives new encapsulations.
        assert!(matches!(
            store.use_for_encapsulation(old).unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
    }

    #[test]
    fn test_sweep_retires_after_grace() {
        let store = keystore();
        let old = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        store.rotate_key(old).unwrap();

        // Nothing to retire inside the window.
        assert_eq!(store.sweep_expired(Utc::now()).unwrap(), 0);

        let later = Utc::now() + Duration::seconds(DEFAULT_GRACE_PERIOD_SECS + 1);
        assert_eq!(store.sweep_expired(later).unwrap(), 1);

        let info = store.get_key(old).unwrap();
        assert_eq!(info.status, KeyStatus::Retired);
        assert!(!info.has_private_key);
        assert!(info.retired_at.is_some());
    }

    #[test]
    fn test_expired_grace_applies_lazily_on_access() {
        let store = keystore_with_grace(0);
        let old = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        let (ct, _) = store.use_for_encapsulation(old).unwrap();
        store.rotate_key(old).unwrap();

        // Zero grace: the first access after rotation retires the key.
        assert!(matches!(
            store.use_for_decapsulation(old, &ct).unwrap_err(),
            KeystoreError::InvalidState(_)
        ));
        let info = store.get_key(old).unwrap();
        assert_eq!(info.status, KeyStatus::Retired);
        assert!(!info.has_private_key);
    }

    #[test]
    fn test_retired_key_still_verifies() {
        let store = keystore_with_grace(0);
        let old = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        let sig = store.use_for_signing(old, b"history").unwrap();
        store.rotate_key(old).unwrap();
        store.sweep_expired(Utc::now() + Duration::seconds(1)).unwrap();

        assert_eq!(store.get_key(old).unwrap().status, KeyStatus::Retired);
        assert!(store.use_for_verification(old, b"history", &sig).unwrap());
    }

    #[test]
    fn test_revocation_finality() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();
        let sig = store.use_for_signing(id, b"before revocation").unwrap();

        store.revoke_key(id, "compromise reported").unwrap();

        let info = store.get_key(id).unwrap();
        assert_eq!(info.status, KeyStatus::Revoked);
        assert!(!info.has_private_key);
        assert_eq!(info.revocation_reason.as_deref(), Some("compromise reported"));

        assert!(matches!(
            store.use_for_signing(id, b"after").unwrap_err(),
            KeystoreError::KeyRevoked(_)
        ));
        assert!(matches!(
            store.rotate_key(id).unwrap_err(),
            KeystoreError::KeyRevoked(_)
        ));
        assert!(matches!(
            store.revoke_key(id, "again").unwrap_err(),
            KeystoreError::KeyRevoked(_)
        ));

        // The slot is freed and historical signatures remain verifiable.
        assert!(matches!(
            store.get_active_key(KeyPurpose::Signing).unwrap_err(),
            KeystoreError::NoActiveKey(_)
        ));
        assert!(store.use_for_verification(id, b"before revocation", &sig).unwrap());

        let log = store.audit_log().unwrap();
        assert!(log
            .iter()
            .any(|e| e.key_id == id && e.action == AuditAction::Revoked));
    }

    #[test]
    fn test_revoke_rotating_key() {
        let store = keystore();
        let old = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        let new = store.rotate_key(old).unwrap();

        store.revoke_key(old, "superseded key leaked").unwrap();
        assert!(matches!(
            store.use_for_decapsulation(old, &[0u8; 768]).unwrap_err(),
            KeystoreError::KeyRevoked(_)
        ));

        // The successor is untouched.
        assert_eq!(store.get_active_key(KeyPurpose::KeyExchange).unwrap().id, new);
    }

    #[test]
    fn test_hybrid_through_store() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::HybridKem, KeyPurpose::Encryption, SecurityLevel::L3)
            .unwrap();

        let info = store.get_key(id).unwrap();
        let recipient = match info.public_key {
            PublicKeyMaterial::Hybrid(key) => key,
            PublicKeyMaterial::Raw(_) => unreachable!("hybrid keys carry hybrid material"),
        };

        let bundle = store.encrypt_hybrid(b"dashboard session token", &recipient).unwrap();
        let plaintext = store.decrypt_hybrid(id, &bundle).unwrap();
        assert_eq!(plaintext, b"dashboard session token");

        store.revoke_key(id, "test").unwrap();
        assert!(matches!(
            store.decrypt_hybrid(id, &bundle).unwrap_err(),
            KeystoreError::KeyRevoked(_)
        ));
    }

    #[test]
    fn test_sign_object_through_store() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L3)
            .unwrap();

        let payload = serde_json::json!({
            "batch": "telemetry-batch-001",
            "site": "plant-7",
            "readings": [12, 14, 9],
        });
        let signed_obj = store.sign_object(id, &payload).unwrap();
        assert_eq!(signed_obj.algorithm, "ML-DSA-65");
        assert_eq!(signed_obj.key_id, id);

        let public_key = store.get_key(id).unwrap().public_key.as_bytes();
        let result = store.verify_object(&signed_obj, &public_key).unwrap();
        assert!(result.valid);

        let mut tampered = signed_obj.clone();
        tampered.data["site"] = serde_json::json!("plant-8");
        assert!(!store.verify_object(&tampered, &public_key).unwrap().valid);
    }

    #[test]
    fn test_raw_key_operations() {
        let store = keystore();
        let id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();

        // A peer holding only the public key can verify through the store.
        let public_key = store.get_key(id).unwrap().public_key.as_bytes();
        let sig = store.use_for_signing(id, b"peer message").unwrap();
        assert!(store
            .verify_detached(AlgorithmFamily::MlDsa, SecurityLevel::L1, b"peer message", &sig, &public_key)
            .unwrap());
        assert!(matches!(
            store
                .verify_detached(AlgorithmFamily::MlKem, SecurityLevel::L1, b"m", &sig, &public_key)
                .unwrap_err(),
            KeystoreError::UnsupportedAlgorithm(_)
        ));

        // Encapsulation to a peer's raw public key.
        let kem_id = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        let peer_public = store.get_key(kem_id).unwrap().public_key.as_bytes();
        let (ct, ss) = store.encapsulate(SecurityLevel::L1, &peer_public).unwrap();
        let recovered = store.use_for_decapsulation(kem_id, &ct).unwrap();
        assert_eq!(ss.as_bytes(), recovered.as_bytes());
    }

    #[test]
    fn test_unknown_key_id() {
        let store = keystore();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.use_for_signing(id, b"m").unwrap_err(),
            KeystoreError::KeyNotFound(_)
        ));
        assert!(matches!(
            store.rotate_key(id).unwrap_err(),
            KeystoreError::KeyNotFound(_)
        ));
        assert!(matches!(
            store.revoke_key(id, "r").unwrap_err(),
            KeystoreError::KeyNotFound(_)
        ));
    }

    #[test]
    fn test_rotation_is_atomic_for_readers() {
        let store = std::sync::Arc::new(keystore());
        let mut id = store
            .generate_key(AlgorithmFamily::MlDsa, KeyPurpose::Signing, SecurityLevel::L1)
            .unwrap();

        std::thread::scope(|scope| {
            let reader_store = std::sync::Arc::clone(&store);
            let reader = scope.spawn(move || {
                // Readers must always observe exactly one active key.
                for _ in 0..200 {
                    let info = reader_store.get_active_key(KeyPurpose::Signing).unwrap();
                    assert_eq!(info.status, KeyStatus::Active);
                }
            });

            for _ in 0..5 {
                id = store.rotate_key(id).unwrap();
            }
            reader.join().unwrap();
        });
    }

    #[test]
    fn test_audit_trail_covers_lifecycle() {
        let store = keystore_with_grace(0);
        let old = store
            .generate_key(AlgorithmFamily::MlKem, KeyPurpose::KeyExchange, SecurityLevel::L1)
            .unwrap();
        let new = store.rotate_key(old).unwrap();
        store.sweep_expired(Utc::now() + Duration::seconds(1)).unwrap();
        store.revoke_key(new, "drill").unwrap();

        let log = store.audit_log().unwrap();
        let actions_for = |id: KeyId| {
            log.iter()
                .filter(|e| e.key_id == id)
                .map(|e| e.action)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            actions_for(old),
            vec![
                AuditAction::Created,
                AuditAction::Activated,
                AuditAction::Rotated,
                AuditAction::Retired,
            ]
        );
        assert!(actions_for(new).contains(&AuditAction::Revoked));
    }
}
