/// Audit trail for key lifecycle transitions.
///
/// Events record the transition, never the key material. The keystore
/// appends one event per transition; retention and export are the
/// embedding application's concern.
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::KeyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    Created,
    Activated,
    Rotated,
    Retired,
    Revoked,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub key_id: KeyId,
    pub action: AuditAction,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(key_id: KeyId, action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            key_id,
            action,
            detail: detail.into(),
        }
    }
}
