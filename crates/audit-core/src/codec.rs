//! Column-level encoding shared by storage backends
//!
//! Relational drivers disagree on what a JSON-capable column hands back: some
//! return raw text, others an already-parsed value. [`JsonColumn`] names both
//! cases so row mappers decode each exactly once.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditActor, EntityId};

/// A JSON-capable column value as returned by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum JsonColumn {
    /// Raw column text that still needs parsing
    Text(String),
    /// Value the driver already deserialized
    Decoded(JsonValue),
}

impl JsonColumn {
    pub fn into_value(self) -> AuditResult<JsonValue> {
        match self {
            Self::Text(text) => Ok(serde_json::from_str(&text)?),
            Self::Decoded(value) => Ok(value),
        }
    }
}

/// Encode a JSON value for a text column
pub fn encode_json(value: &JsonValue) -> AuditResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Column form of an entity id: keys verbatim, composites as canonical JSON
pub fn encode_entity_id(entity_id: &EntityId) -> String {
    entity_id.canonical()
}

/// Rebuild an entity id from its column form, keeping its original shape
///
/// Text is a composite only when it parses as a JSON object; anything else,
/// brace-wrapped GUIDs included, is a plain key.
pub fn decode_entity_id(column: JsonColumn) -> AuditResult<EntityId> {
    match column {
        JsonColumn::Text(text) if text.trim_start().starts_with('{') => {
            match serde_json::from_str::<Map<String, JsonValue>>(&text) {
                Ok(fields) => Ok(EntityId::Composite(fields)),
                Err(_) => Ok(EntityId::Key(text)),
            }
        },
        JsonColumn::Text(text) => Ok(EntityId::Key(text)),
        JsonColumn::Decoded(JsonValue::Object(fields)) => Ok(EntityId::Composite(fields)),
        JsonColumn::Decoded(JsonValue::String(key)) => Ok(EntityId::Key(key)),
        JsonColumn::Decoded(JsonValue::Number(n)) => Ok(EntityId::Key(n.to_string())),
        JsonColumn::Decoded(other) => Err(AuditError::invalid_record(format!(
            "entity id must be a string or object, got {other}"
        ))),
    }
}

/// Actor columns: `(actor_id, actor_type, actor_data)`
pub type ActorColumns = (Option<String>, Option<String>, Option<JsonValue>);

/// Split an actor into indexed columns plus a JSON object of the extra fields
///
/// `actor_data` is `None` when the actor carries no extra fields.
pub fn split_actor(actor: Option<&AuditActor>) -> ActorColumns {
    match actor {
        Some(actor) => (
            actor.id.clone(),
            actor.actor_type.clone(),
            (!actor.extra.is_empty()).then(|| JsonValue::Object(actor.extra.clone())),
        ),
        None => (None, None, None),
    }
}

/// Inverse of [`split_actor`]; all-null columns mean "no actor"
pub fn join_actor(
    id: Option<String>,
    actor_type: Option<String>,
    data: Option<JsonColumn>,
) -> AuditResult<Option<AuditActor>> {
    let extra = match data.map(JsonColumn::into_value).transpose()? {
        Some(JsonValue::Object(fields)) => fields,
        Some(JsonValue::Null) | None => Map::new(),
        Some(other) => {
            return Err(AuditError::invalid_record(format!(
                "actor data must be an object, got {other}"
            )))
        },
    };

    let actor = AuditActor {
        id,
        actor_type,
        extra,
    };

    Ok((!actor.is_empty()).then_some(actor))
}

/// Timestamp column form: RFC 3339, millisecond precision, `Z` suffix
///
/// Fixed width, so text ordering matches chronological ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(text: &str) -> AuditResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AuditError::invalid_record(format!("invalid timestamp '{text}': {e}")))
}
