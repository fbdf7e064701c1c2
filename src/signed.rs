/// Signed-object envelopes with canonical serialization.
///
/// Structured values are reduced to canonical JSON bytes before signing:
/// the value is converted to a `serde_json::Value`, whose object maps are
/// key-ordered, so two semantically equal objects always serialize to the
/// same bytes regardless of field declaration order. The envelope carries
/// the algorithm tag and key id, so verification needs no out-of-band
/// knowledge of which parameter set produced the signature.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::mldsa::MlDsaService;
use crate::crypto::slhdsa::SlhDsaService;
use crate::error::{KeystoreError, Result};
use crate::params::{parameters_by_name, AlgorithmFamily};

/// A structured value plus its detached signature and the metadata needed
/// to verify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedObject {
    /// The signed data, as the canonicalized JSON value.
    pub data: Value,
    /// Hex-encoded detached signature over the canonical bytes.
    pub signature: String,
    /// Parameter-set name, e.g. "ML-DSA-65".
    pub algorithm: String,
    /// Id of the signing key.
    pub key_id: Uuid,
}

/// Outcome of verifying a [`SignedObject`].
#[derive(Debug, Clone)]
pub struct Verification {
    pub valid: bool,
    /// The data the signature was checked against.
    pub data: Value,
}

/// Canonical byte encoding of any serializable value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value =
        serde_json::to_value(value).map_err(|e| KeystoreError::Serialization(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| KeystoreError::Serialization(e.to_string()))
}

/// Build a signed envelope from an already-computed signature.
pub(crate) fn envelope<T: Serialize>(
    value: &T,
    signature: &[u8],
    algorithm: &'static str,
    key_id: Uuid,
) -> Result<SignedObject> {
    let data =
        serde_json::to_value(value).map_err(|e| KeystoreError::Serialization(e.to_string()))?;
    Ok(SignedObject {
        data,
        signature: hex::encode(signature),
        algorithm: algorithm.to_string(),
        key_id,
    })
}

/// Verify a signed envelope against a raw public key.
///
/// The algorithm tag selects the verification parameters; an unknown tag
/// or a non-signature family is `UnsupportedAlgorithm`. A signature that
/// fails to decode or verify yields `valid: false`, not an error.
pub fn verify_object(signed: &SignedObject, public_key: &[u8]) -> Result<Verification> {
    let params = parameters_by_name(&signed.algorithm)?;

    let message = serde_json::to_vec(&signed.data)
        .map_err(|e| KeystoreError::Serialization(e.to_string()))?;

    let signature = match hex::decode(&signed.signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(Verification {
                valid: false,
                data: signed.data.clone(),
            })
        }
    };

    let valid = match params.family {
        AlgorithmFamily::MlDsa => {
            MlDsaService.verify(params.level, &message, &signature, public_key)?
        }
        AlgorithmFamily::SlhDsa => {
            SlhDsaService.verify(params.level, &message, &signature, public_key)?
        }
        AlgorithmFamily::MlKem | AlgorithmFamily::HybridKem => {
            return Err(KeystoreError::UnsupportedAlgorithm(signed.algorithm.clone()))
        }
    };

    Ok(Verification {
        valid,
        data: signed.data.clone(),
    })
}
