/// ML-KEM (FIPS 203) key encapsulation service.
///
/// A thin, stateless wrapper over the reference ML-KEM implementation,
/// dispatching on security level and enforcing the registry size contract
/// at the call boundary. Decapsulation preserves the scheme's implicit
/// rejection: a well-sized but tampered ciphertext yields a pseudorandom
/// secret rather than an error.
use pqcrypto_mlkem::{mlkem1024, mlkem512, mlkem768};
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as PqPublicKey, SecretKey as PqSecretKey, SharedSecret as _,
};

use crate::crypto::secret::{Secret32, SecretBytes};
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_for, AlgorithmFamily, SecurityLevel, SHARED_SECRET_LEN};

/// Freshly generated ML-KEM key pair.
pub struct KemKeyPair {
    pub public_key: Vec<u8>,
    private_key: SecretBytes,
    pub level: SecurityLevel,
}

impl KemKeyPair {
    pub fn private_key_bytes(&self) -> &[u8] {
        self.private_key.as_bytes()
    }

    /// Split into (public, private) for storage by the keystore.
    pub fn into_parts(self) -> (Vec<u8>, SecretBytes) {
        (self.public_key, self.private_key)
    }
}

/// Stateless ML-KEM service. Safe to share across threads; all state is
/// in the arguments and the process-wide randomness source.
#[derive(Debug, Clone, Copy, Default)]
pub struct KemService;

impl KemService {
    /// Generate a fresh key pair at the given level.
    ///
    /// Every call draws independent randomness from the operating system;
    /// no two calls produce the same private key.
    pub fn generate_keypair(&self, level: SecurityLevel) -> KemKeyPair {
        let (public_key, private_key) = match level {
            SecurityLevel::L1 => {
                let (pk, sk) = mlkem512::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L3 => {
                let (pk, sk) = mlkem768::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SecurityLevel::L5 => {
                let (pk, sk) = mlkem1024::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
        };

        KemKeyPair {
            public_key,
            private_key: SecretBytes::new(private_key),
            level,
        }
    }

    /// Encapsulate a fresh shared secret to the given public key.
    ///
    /// Returns (ciphertext, shared_secret). The shared secret is always
    /// 32 bytes regardless of level.
    pub fn encapsulate(
        &self,
        level: SecurityLevel,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Secret32)> {
        let params = parameters_for(AlgorithmFamily::MlKem, level);
        if public_key.len() != params.public_key_len {
            return Err(KeystoreError::InvalidKey {
                expected: params.public_key_len,
                actual: public_key.len(),
            });
        }

        let (ciphertext, secret) = match level {
            SecurityLevel::L1 => {
                let pk = mlkem512::PublicKey::from_bytes(public_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.public_key_len,
                        actual: public_key.len(),
                    })?;
                let (ss, ct) = mlkem512::encapsulate(&pk);
                (ct.as_bytes().to_vec(), ss.as_bytes().to_vec())
            }
            SecurityLevel::L3 => {
                let pk = mlkem768::PublicKey::from_bytes(public_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.public_key_len,
                        actual: public_key.len(),
                    })?;
                let (ss, ct) = mlkem768::encapsulate(&pk);
                (ct.as_bytes().to_vec(), ss.as_bytes().to_vec())
            }
            SecurityLevel::L5 => {
                let pk = mlkem1024::PublicKey::from_bytes(public_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.public_key_len,
                        actual: public_key.len(),
                    })?;
                let (ss, ct) = mlkem1024::encapsulate(&pk);
                (ct.as_bytes().to_vec(), ss.as_bytes().to_vec())
            }
        };

        let secret = Secret32::from_slice(&secret).ok_or(KeystoreError::InvalidKey {
            expected: SHARED_SECRET_LEN,
            actual: secret.len(),
        })?;

        Ok((ciphertext, secret))
    }

    /// Recover the shared secret from a ciphertext.
    ///
    /// Never fails on a well-sized tampered ciphertext; the underlying
    /// scheme derives a deterministic pseudorandom secret instead, so a
    /// caller cannot use this as a validity oracle.
    pub fn decapsulate(
        &self,
        level: SecurityLevel,
        ciphertext: &[u8],
        private_key: &[u8],
    ) -> Result<Secret32> {
        let params = parameters_for(AlgorithmFamily::MlKem, level);
        if private_key.len() != params.private_key_len {
            return Err(KeystoreError::InvalidKey {
                expected: params.private_key_len,
                actual: private_key.len(),
            });
        }
        if ciphertext.len() != params.output_len {
            return Err(KeystoreError::InvalidCiphertext {
                expected: params.output_len,
                actual: ciphertext.len(),
            });
        }

        let secret = match level {
            SecurityLevel::L1 => {
                let sk = mlkem512::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                let ct = mlkem512::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| KeystoreError::InvalidCiphertext {
                        expected: params.output_len,
                        actual: ciphertext.len(),
                    })?;
                mlkem512::decapsulate(&ct, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L3 => {
                let sk = mlkem768::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                let ct = mlkem768::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| KeystoreError::InvalidCiphertext {
                        expected: params.output_len,
                        actual: ciphertext.len(),
                    })?;
                mlkem768::decapsulate(&ct, &sk).as_bytes().to_vec()
            }
            SecurityLevel::L5 => {
                let sk = mlkem1024::SecretKey::from_bytes(private_key)
                    .map_err(|_| KeystoreError::InvalidKey {
                        expected: params.private_key_len,
                        actual: private_key.len(),
                    })?;
                let ct = mlkem1024::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| KeystoreError::InvalidCiphertext {
                        expected: params.output_len,
                        actual: ciphertext.len(),
                    })?;
                mlkem1024::decapsulate(&ct, &sk).as_bytes().to_vec()
            }
        };

        Secret32::from_slice(&secret).ok_or(KeystoreError::InvalidKey {
            expected: SHARED_SECRET_LEN,
            actual: secret.len(),
        })
    }
}
