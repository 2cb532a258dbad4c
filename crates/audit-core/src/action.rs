//! Typed audit actions
//!
//! Applications declare the closed set of things they audit as one enum,
//! serialized adjacently tagged so each variant carries its own payload shape:
//!
//! ```rust
//! use audit_core::AuditAction;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! #[serde(tag = "type", content = "payload")]
//! enum AppAction {
//!     #[serde(rename = "user.created")]
//!     UserCreated { user_id: u64, email: String },
//!     #[serde(rename = "user.deleted")]
//!     UserDeleted { user_id: u64 },
//! }
//!
//! impl AuditAction for AppAction {}
//! ```
//!
//! An `Auditor<_, AppAction>` then only accepts those variants.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{AuditError, AuditResult};

/// Marker for a `{type, payload}` union an auditor accepts
pub trait AuditAction: Serialize {}

/// Action whose type is only known at runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UntypedAction {
    #[serde(rename = "type")]
    pub audit_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

impl UntypedAction {
    pub fn new(audit_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            audit_type: audit_type.into(),
            payload: Some(payload),
        }
    }

    /// Action with no payload
    pub fn bare(audit_type: impl Into<String>) -> Self {
        Self {
            audit_type: audit_type.into(),
            payload: None,
        }
    }
}

impl AuditAction for UntypedAction {}

/// Split an action into its type string and payload
pub(crate) fn split_action<A: AuditAction>(action: &A) -> AuditResult<(String, Option<JsonValue>)> {
    let JsonValue::Object(mut fields) = serde_json::to_value(action)? else {
        return Err(AuditError::invalid_action(
            "action must serialize to an object with a 'type' field",
        ));
    };

    let audit_type = match fields.remove("type") {
        Some(JsonValue::String(t)) if !t.is_empty() => t,
        Some(_) => return Err(AuditError::invalid_action("'type' must be a non-empty string")),
        None => return Err(AuditError::invalid_action("missing 'type' field")),
    };

    let payload = fields.remove("payload");

    if let Some(unexpected) = fields.keys().next() {
        return Err(AuditError::invalid_action(format!(
            "unexpected field '{unexpected}'; use #[serde(tag = \"type\", content = \"payload\")]"
        )));
    }

    Ok((audit_type, payload))
}
