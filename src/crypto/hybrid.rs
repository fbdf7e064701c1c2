/// Hybrid encryption service: X25519 + ML-KEM.
///
/// In hybrid mode, two shared secrets are derived, one from classical
/// Diffie-Hellman and one from ML-KEM encapsulation, then combined through
/// a domain-separated BLAKE3 keyed hash into a single symmetric key. Both
/// secrets feed the derivation, so compromise of either primitive alone
/// is insufficient to recover the payload key. Single-primitive modes are
/// available for callers that need only one side.
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::aead;
use crate::crypto::bundle::EncryptedBundle;
use crate::crypto::kem::KemService;
use crate::crypto::secret::{Secret32, SecretBytes};
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel, X25519_KEY_LEN};

/// Domain separator for combining the two shared secrets (32 bytes).
const COMBINE_DOMAIN: &[u8; 32] = b"pq-keystore-hybrid-v1-combine!!!";

/// Derivation contexts for the single-primitive modes.
const CLASSICAL_CONTEXT: &str = "pq-keystore hybrid v1 classical only";
const PQC_CONTEXT: &str = "pq-keystore hybrid v1 pqc only";

/// Which primitives participate in the scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HybridMode {
    ClassicalOnly,
    PqcOnly,
    Hybrid,
}

impl HybridMode {
    pub fn has_classical(self) -> bool {
        matches!(self, HybridMode::ClassicalOnly | HybridMode::Hybrid)
    }

    pub fn has_pqc(self) -> bool {
        matches!(self, HybridMode::PqcOnly | HybridMode::Hybrid)
    }

    /// Single-byte wire tag for bundle headers.
    pub fn as_u8(self) -> u8 {
        match self {
            HybridMode::ClassicalOnly => 1,
            HybridMode::PqcOnly => 2,
            HybridMode::Hybrid => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(HybridMode::ClassicalOnly),
            2 => Some(HybridMode::PqcOnly),
            3 => Some(HybridMode::Hybrid),
            _ => None,
        }
    }
}

/// Recipient public keys for the hybrid scheme.
#[derive(Debug, Clone)]
pub struct HybridPublicKey {
    pub mode: HybridMode,
    pub level: SecurityLevel,
    pub classical: Option<[u8; X25519_KEY_LEN]>,
    pub pqc: Option<Vec<u8>>,
}

impl HybridPublicKey {
    /// Concatenated raw bytes (classical part first), for storage and
    /// size accounting.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(classical) = &self.classical {
            out.extend_from_slice(classical);
        }
        if let Some(pqc) = &self.pqc {
            out.extend_from_slice(pqc);
        }
        out
    }
}

/// Recipient private keys; components are zeroized on drop.
pub struct HybridPrivateKey {
    pub mode: HybridMode,
    pub level: SecurityLevel,
    pub(crate) classical: Option<Secret32>,
    pub(crate) pqc: Option<SecretBytes>,
}

impl std::fmt::Debug for HybridPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridPrivateKey")
            .field("mode", &self.mode)
            .field("level", &self.level)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Freshly generated hybrid key pair.
pub struct HybridKeyPair {
    pub public: HybridPublicKey,
    private: HybridPrivateKey,
}

impl HybridKeyPair {
    pub fn into_parts(self) -> (HybridPublicKey, HybridPrivateKey) {
        (self.public, self.private)
    }
}

/// Stateless hybrid encryption service, composing the KEM service with
/// classical key agreement.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridService {
    kem: KemService,
}

impl HybridService {
    /// Generate recipient keys for the given mode and level.
    pub fn generate_keypair(&self, mode: HybridMode, level: SecurityLevel) -> HybridKeyPair {
        let (classical_pk, classical_sk) = if mode.has_classical() {
            let secret = StaticSecret::random_from_rng(OsRng);
            let public = X25519PublicKey::from(&secret);
            (
                Some(public.to_bytes()),
                Some(Secret32::new(secret.to_bytes())),
            )
        } else {
            (None, None)
        };

        let (pqc_pk, pqc_sk) = if mode.has_pqc() {
            let (pk, sk) = self.kem.generate_keypair(level).into_parts();
            (Some(pk), Some(sk))
        } else {
            (None, None)
        };

        HybridKeyPair {
            public: HybridPublicKey {
                mode,
                level,
                classical: classical_pk,
                pqc: pqc_pk,
            },
            private: HybridPrivateKey {
                mode,
                level,
                classical: classical_sk,
                pqc: pqc_sk,
            },
        }
    }

    /// Encrypt a payload to the recipient's public keys.
    pub fn encrypt(&self, plaintext: &[u8], recipient: &HybridPublicKey) -> Result<EncryptedBundle> {
        let mode = recipient.mode;
        let level = recipient.level;

        let (eph_public, classical_secret) = if mode.has_classical() {
            let their_pk = recipient.classical.ok_or(KeystoreError::InvalidKey {
                expected: X25519_KEY_LEN,
                actual: 0,
            })?;
            let eph = EphemeralSecret::random_from_rng(OsRng);
            let eph_public = X25519PublicKey::from(&eph).to_bytes();
            let shared = eph.diffie_hellman(&X25519PublicKey::from(their_pk));
            (
                Some(eph_public),
                Some(Secret32::new(*shared.as_bytes())),
            )
        } else {
            (None, None)
        };

        let (kem_ciphertext, pqc_secret) = if mode.has_pqc() {
            let their_pk = recipient.pqc.as_deref().ok_or(KeystoreError::InvalidKey {
                expected: parameters_for(AlgorithmFamily::MlKem, level).public_key_len,
                actual: 0,
            })?;
            let (ct, ss) = self.kem.encapsulate(level, their_pk)?;
            (Some(ct), Some(ss))
        } else {
            (None, None)
        };

        let payload_key = derive_payload_key(mode, classical_secret.as_ref(), pqc_secret.as_ref());

        let aad = [crate::crypto::bundle::BUNDLE_VERSION, mode.as_u8(), level.as_u8()];
        let (nonce, sealed) = aead::seal(&payload_key, plaintext, &aad)?;

        Ok(EncryptedBundle {
            mode,
            level,
            eph_public,
            kem_ciphertext,
            nonce,
            sealed,
        })
    }

    /// Decrypt a bundle with the recipient's private keys.
    ///
    /// Tag mismatch, mode or level mismatch, and missing or corrupted
    /// components all report the same `DecryptionFailed`.
    pub fn decrypt(&self, bundle: &EncryptedBundle, recipient: &HybridPrivateKey) -> Result<Vec<u8>> {
        if bundle.mode != recipient.mode || bundle.level != recipient.level {
            return Err(KeystoreError::DecryptionFailed);
        }
        let mode = bundle.mode;

        let classical_secret = if mode.has_classical() {
            let sk = recipient
                .classical
                .as_ref()
                .ok_or(KeystoreError::DecryptionFailed)?;
            let eph = bundle.eph_public.ok_or(KeystoreError::DecryptionFailed)?;
            let shared = StaticSecret::from(*sk.as_bytes())
                .diffie_hellman(&X25519PublicKey::from(eph));
            Some(Secret32::new(*shared.as_bytes()))
        } else {
            None
        };

        let pqc_secret = if mode.has_pqc() {
            let sk = recipient
                .pqc
                .as_ref()
                .ok_or(KeystoreError::DecryptionFailed)?;
            let ct = bundle
                .kem_ciphertext
                .as_deref()
                .ok_or(KeystoreError::DecryptionFailed)?;
            let ss = self
                .kem
                .decapsulate(bundle.level, ct, sk.as_bytes())
                .map_err(|_| KeystoreError::DecryptionFailed)?;
            Some(ss)
        } else {
            None
        };

        let payload_key = derive_payload_key(mode, classical_secret.as_ref(), pqc_secret.as_ref());

        let aad = bundle.header();
        aead::open(&payload_key, &bundle.nonce, &bundle.sealed, &aad)
            .map_err(|_| KeystoreError::DecryptionFailed)
    }
}

/// Combine the available shared secrets into the payload key.
///
/// In hybrid mode both secrets are concatenated under a keyed hash; in
/// single-primitive modes the one secret passes through a mode-specific
/// derivation context, so keys from different modes never collide.
fn derive_payload_key(
    mode: HybridMode,
    classical: Option<&Secret32>,
    pqc: Option<&Secret32>,
) -> Secret32 {
    let key = match (mode, classical, pqc) {
        (HybridMode::Hybrid, Some(classical), Some(pqc)) => {
            let mut combined = Vec::with_capacity(64);
            combined.extend_from_slice(pqc.as_bytes());
            combined.extend_from_slice(classical.as_bytes());
            let out = blake3::keyed_hash(COMBINE_DOMAIN, &combined).into();
            combined.zeroize();
            out
        }
        (HybridMode::ClassicalOnly, Some(classical), _) => {
            blake3::derive_key(CLASSICAL_CONTEXT, classical.as_bytes())
        }
        (HybridMode::PqcOnly, _, Some(pqc)) => blake3::derive_key(PQC_CONTEXT, pqc.as_bytes()),
        // Component presence is enforced by the callers before derivation.
        _ => [0u8; 32],
    };
    Secret32::new(key)
}
