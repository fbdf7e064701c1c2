/// Cryptographic algorithm services.
///
/// Each service is a stateless wrapper over an externally-verified
/// primitive, enforcing the registry size contract at its boundary:
/// - `kem`: ML-KEM key encapsulation (FIPS 203)
/// - `mldsa`: ML-DSA lattice signatures (FIPS 204)
/// - `slhdsa`: SLH-DSA hash-based signatures (FIPS 205)
/// - `hybrid`: X25519 + ML-KEM hybrid encryption
pub mod aead;
pub mod bundle;
pub mod hybrid;
pub mod kem;
pub mod mldsa;
pub mod secret;
pub mod slhdsa;
