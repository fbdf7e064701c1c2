/// ML-DSA (FIPS 204) lattice signature service.
///
/// Signing is hedged (randomized) per the standard's default. Verification
/// is a boolean outcome: malformed or wrong-size signatures report `false`
/// the same way a genuine mismatch does, never an error.
use pqcrypto_mldsa::{mldsa44, mldsa65, mldsa87};
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as PqPublicKey, SecretKey as PqSecretKey,
};

use crate::crypto::secret::SecretBytes;
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel};

/// Freshly generated ML-DSA key pair.
pub struct MlDsaKeyPair {
    pub public_key: Vec<u8>,
    private_key: SecretBytes,
    pub level: SecurityLevel,
}

impl MlDsaKeyPair {
    pub fn private_key_bytes(&self) -> &[u8] {
        self.private_key.as_bytes()
    }

    pub fn into_parts(self) -> (Vec<u8>, SecretBytes) {
        (self.public_key, self.private_key)
    }
}

/// Stateless ML-DSA service.
#[derive(Debug, Clone, Copy, Default)]
pub struct MlDsaService;

impl MlDsaService {
    pub fn generate_keypair(&self, level: SecurityLevel) -> MlDsaKeyPair {
        let (public_key, private_key) = match level {
            SecurityLevel::L1 => {
                let (pk, sk) = mldsa44::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L3 => {
                let (pk, sk) = mldsa65::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L5 => {
                let (pk, sk) = mldsa87::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
        };

        MlDsaKeyPair {
            public_key,
            private_key: SecretBytes::new(private_key),
            level,
        }
    }

    /// Produce a detached signature of the exact declared size for the level.
    pub fn sign(&self, level: SecurityLevel, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>> {
        let params = parameters_for(AlgorithmFamily::MlDsa, level);
        if private_key.len() != params.private_key_len {
            return Err(KeystoreError::InvalidKey {
                expected: params.private_key_len,
                actual: private_key.len(),
            });
        }

        let signature = match level {
            SecurityLevel::L1 => {
                let sk = mldsa44::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                mldsa44::detached_sign(message, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L3 => {
                let sk = mldsa65::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                mldsa65::detached_sign(message, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L5 => {
                let sk = mldsa87::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                mldsa87::detached_sign(message, &sk).as_bytes().to_vec()
            }
        };

        Ok(signature)
    }

    /// Verify a detached signature.
    ///
    /// A wrong-size public key is a structural error; everything else,
    /// including wrong-size signatures, is `Ok(false)`.
    pub fn verify(
        &self,
        level: SecurityLevel,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool> {
        let params = parameters_for(AlgorithmFamily::MlDsa, level);
        if public_key.len() != params.public_key_len {
            return Err(KeystoreError::InvalidKey {
                expected: params.public_key_len,
                actual: public_key.len(),
            });
        }
        if signature.len() != params.output_len {
            return Ok(false);
        }

        let valid = match level {
            SecurityLevel::L1 => {
                match (
                    mldsa44::PublicKey::from_bytes(public_key),
                    mldsa44::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        mldsa44::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
            SecurityLevel::L3 => {
                match (
                    mldsa65::PublicKey::from_bytes(public_key),
                    mldsa65::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        mldsa65::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
            SecurityLevel::L5 => {
                match (
                    mldsa87::PublicKey::from_bytes(public_key),
                    mldsa87::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        mldsa87::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
        };

        Ok(valid)
    }
}
