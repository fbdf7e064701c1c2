/// SLH-DSA (FIPS 205) hash-based signature service.
///
/// Same contract as the lattice service with a different tradeoff:
/// security rests only on hash-function properties, and signatures are
/// an order of magnitude larger. This is the *stateless* hash-based
/// family: there is no one-time-key counter to persist, and repeated
/// signing with the same private key is safe. The service keeps it that
/// way: no caching, no interior mutability.
use pqcrypto_sphincsplus::{
    sphincssha2128fsimple as slh_128f, sphincssha2192fsimple as slh_192f,
    sphincssha2256fsimple as slh_256f,
};
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as PqPublicKey, SecretKey as PqSecretKey,
};

use crate::crypto::secret::SecretBytes;
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel};

/// Freshly generated SLH-DSA key pair.
pub struct SlhDsaKeyPair {
    pub public_key: Vec<u8>,
    private_key: SecretBytes,
    pub level: SecurityLevel,
}

impl SlhDsaKeyPair {
    pub fn private_key_bytes(&self) -> &[u8] {
        self.private_key.as_bytes()
    }

    pub fn into_parts(self) -> (Vec<u8>, SecretBytes) {
        (self.public_key, self.private_key)
    }
}

/// Stateless SLH-DSA service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlhDsaService;

impl SlhDsaService {
    pub fn generate_keypair(&self, level: SecurityLevel) -> SlhDsaKeyPair {
        let (public_key, private_key) = match level {
            SecurityLevel::L1 => {
                let (pk, sk) = slh_128f::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L3 => {
                let (pk, sk) = slh_192f::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L5 => {
                let (pk, sk) = slh_256f::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
        };

        SlhDsaKeyPair {
            public_key,
            private_key: SecretBytes::new(private_key),
            level,
        }
    }

    pub fn sign(&self, level: SecurityLevel, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>> {
        let params = parameters_for(AlgorithmFamily::SlhDsa, level);
        if private_key.len() != params.private_key_len {
            return Err(KeystoreError::InvalidKey {
                expected: params.private_key_len,
                actual: private_key.len(),
            });
        }

        let signature = match level {
            SecurityLevel::L1 => {
                let sk = slh_128f::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                slh_128f::detached_sign(message, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L3 => {
                let sk = slh_192f::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                slh_192f::detached_sign(message, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L5 => {
                let sk = slh_256f::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                slh_256f::detached_sign(message, &sk).as_bytes().to_vec()
            }
        };

        Ok(signature)
    }

    /// Verify a detached signature; same outcome rules as the lattice
    /// service.
    pub fn verify(
        &self,
        level: SecurityLevel,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool> {
        let params = parameters_for(AlgorithmFamily::SlhDsa, level);
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
                    slh_128f::PublicKey::from_bytes(public_key),
                    slh_128f::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        slh_128f::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
            SecurityLevel::L3 => {
                match (
                    slh_192f::PublicKey::from_bytes(public_key),
                    slh_192f::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        slh_192f::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
            SecurityLevel::L5 => {
                match (
                    slh_256f::PublicKey::from_bytes(public_key),
                    slh_256f::DetachedSignature::from_bytes(signature),
                ) {
                    (Ok(pk), Ok(sig)) => {
                        slh_256f::verify_detached_signature(&sig, message, &pk).is_ok()
                    }
                    _ => false,
                }
            }
        };

        Ok(valid)
    }
}
