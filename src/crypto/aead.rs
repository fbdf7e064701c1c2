/// Authenticated encryption of hybrid payloads (XChaCha20-Poly1305).
///
/// Every sealed payload gets a fresh random nonce; the 24-byte XChaCha20
/// nonce space makes collisions a non-concern at any realistic volume.
/// The bundle header rides along as associated data, so the mode and
/// level tags are covered by the authentication tag without being
/// encrypted.
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::crypto::secret::Secret32;
use crate::error::{KeystoreError, Result};

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seal a plaintext under a derived payload key.
///
/// Returns the nonce and the ciphertext with its trailing tag.
pub fn seal(key: &Secret32, plaintext: &[u8], aad: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = random_nonce();

    let sealed = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| KeystoreError::EncryptionFailed)?;

    Ok((nonce, sealed))
}

/// Open a sealed payload.
///
/// Fails uniformly: a wrong key, a tampered ciphertext and tampered
/// associated data all produce the same error.
pub fn open(key: &Secret32, nonce: &[u8; NONCE_LEN], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: sealed, aad })
        .map_err(|_| KeystoreError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Secret32 {
        Secret32::new([byte; 32])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = key(0x21);
        let plaintext = b"telemetry frame 0017, encrypted at rest";
        let aad = b"purpose:encryption";

        let (nonce, sealed) = seal(&key, plaintext, aad).unwrap();
        assert_eq!(sealed.len(), plaintext.len() + TAG_LEN);
        assert_eq!(open(&key, &nonce, &sealed, aad).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (nonce, sealed) = seal(&key(0x01), b"secret", b"").unwrap();
        assert!(open(&key(0x02), &nonce, &sealed, b"").is_err());
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = key(0x21);
        let (nonce, sealed) = seal(&key, b"secret", b"header v1").unwrap();
        assert!(open(&key, &nonce, &sealed, b"header v2").is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key(0x21);
        let (nonce, mut sealed) = seal(&key, b"secret", b"").unwrap();
        sealed[0] ^= 0xFF;
        assert!(matches!(
            open(&key, &nonce, &sealed, b"").unwrap_err(),
            KeystoreError::DecryptionFailed
        ));
    }

    #[test]
    fn test_nonces_are_fresh_per_seal() {
        let key = key(0x21);
        let (n1, _) = seal(&key, b"x", b"").unwrap();
        let (n2, _) = seal(&key, b"x", b"").unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = key(0x21);
        let (nonce, sealed) = seal(&key, b"", b"").unwrap();
        assert!(open(&key, &nonce, &sealed, b"").unwrap().is_empty());
    }
}
