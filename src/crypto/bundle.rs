/// Wire format for hybrid ciphertext bundles.
///
/// Layout:
/// [version(1) | mode(1) | level(1) | eph_x25519_pk(32, classical modes)
///  | kem_ct(level-sized, PQC modes) | nonce(24) | sealed payload]
///
/// The three header bytes double as the AEAD associated data, so a bundle
/// whose mode or level tag was altered in transit fails authentication.
/// Parsing failures are reported uniformly as `DecryptionFailed`; the
/// format gives no oracle for which section was malformed.
use crate::crypto::aead::{NONCE_LEN, TAG_LEN};
use crate::crypto::hybrid::HybridMode;
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel, X25519_KEY_LEN};

pub const BUNDLE_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 3;

/// Parsed encrypted bundle.
#[derive(Debug, Clone)]
pub struct EncryptedBundle {
    pub mode: HybridMode,
    pub level: SecurityLevel,
    /// Ephemeral X25519 public key; present unless mode is PQC-only.
    pub eph_public: Option<[u8; X25519_KEY_LEN]>,
    /// ML-KEM ciphertext; present unless mode is classical-only.
    pub kem_ciphertext: Option<Vec<u8>>,
    pub nonce: [u8; NONCE_LEN],
    /// XChaCha20-Poly1305 ciphertext with trailing tag.
    pub sealed: Vec<u8>,
}

impl EncryptedBundle {
    /// The header bytes, also used as AEAD associated data.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        [BUNDLE_VERSION, self.mode.as_u8(), self.level.as_u8()]
    }

    /// Serialize the bundle to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self.eph_public.map_or(0, |p| p.len())
                + self.kem_ciphertext.as_ref().map_or(0, |c| c.len())
                + NONCE_LEN
                + self.sealed.len(),
        );
        out.extend_from_slice(&self.header());
        if let Some(eph) = &self.eph_public {
            out.extend_from_slice(eph);
        }
        if let Some(ct) = &self.kem_ciphertext {
            out.extend_from_slice(ct);
        }
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Parse a bundle from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(KeystoreError::DecryptionFailed);
        }
        if data[0] != BUNDLE_VERSION {
            return Err(KeystoreError::DecryptionFailed);
        }
        let mode = HybridMode::from_u8(data[1]).ok_or(KeystoreError::DecryptionFailed)?;
        let level = SecurityLevel::from_u8(data[2]).ok_or(KeystoreError::DecryptionFailed)?;

        let kem_ct_len = if mode.has_pqc() {
            parameters_for(AlgorithmFamily::MlKem, level).output_len
        } else {
            0
        };
        let eph_len = if mode.has_classical() { X25519_KEY_LEN } else { 0 };

        let fixed = HEADER_LEN + eph_len + kem_ct_len + NONCE_LEN + TAG_LEN;
        if data.len() < fixed {
            return Err(KeystoreError::DecryptionFailed);
        }

        let mut offset = HEADER_LEN;

        let eph_public = if mode.has_classical() {
            let mut eph = [0u8; X25519_KEY_LEN];
            eph.copy_from_slice(&data[offset..offset + X25519_KEY_LEN]);
            offset += X25519_KEY_LEN;
            Some(eph)
        } else {
            None
        };

        let kem_ciphertext = if mode.has_pqc() {
            let ct = data[offset..offset + kem_ct_len].to_vec();
            offset += kem_ct_len;
            Some(ct)
        } else {
            None
        };

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[offset..offset + NONCE_LEN]);
        offset += NONCE_LEN;

        let sealed = data[offset..].to_vec();

        Ok(Self {
            mode,
            level,
            eph_public,
            kem_ciphertext,
            nonce,
            sealed,
        })
    }
}
