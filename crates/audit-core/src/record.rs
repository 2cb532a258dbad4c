//! Audit record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Free-form request context attached to records (request id, route, ip, ...)
pub type AuditMetadata = Map<String, JsonValue>;

/// Kind of change an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
    /// Application-defined action that is not a row change
    #[default]
    Custom,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditOperation {
    type Err = crate::AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(crate::AuditError::invalid_record(format!(
                "unknown operation '{other}'"
            ))),
        }
    }
}

/// Key of the entity an audit record refers to
///
/// Serializes untagged: a plain key stays a JSON string and a composite key
/// stays a JSON object, so both shapes survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Key(String),
    Composite(Map<String, JsonValue>),
}

impl EntityId {
    /// Build a composite key from `(field, value)` pairs
    pub fn composite<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<JsonValue>,
    {
        Self::Composite(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Canonical string form used for equality filtering
    ///
    /// Keys are returned verbatim. Composites render as compact JSON with
    /// object keys sorted at every level, so `{b, a}` and `{a, b}` compare
    /// equal regardless of insertion order.
    pub fn canonical(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Composite(fields) => sorted_json(&JsonValue::Object(fields.clone())).to_string(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

impl From<&str> for EntityId {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for EntityId {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<Map<String, JsonValue>> for EntityId {
    fn from(fields: Map<String, JsonValue>) -> Self {
        Self::Composite(fields)
    }
}

fn sorted_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted_json(v)))
                    .collect(),
            )
        },
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sorted_json).collect()),
        other => other.clone(),
    }
}

/// Who or what performed an audited action
///
/// `id` and `type` are indexed by storage backends; every other key lands in
/// `extra` and is preserved opaquely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditActor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub actor_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl AuditActor {
    pub fn new(id: impl Into<String>, actor_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            actor_type: Some(actor_type.into()),
            extra: Map::new(),
        }
    }

    /// Attach an opaque extra field
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.actor_type.is_none() && self.extra.is_empty()
    }
}

/// A single persisted audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    /// Dot-namespaced action type, e.g. `user.created`
    #[serde(rename = "type")]
    pub audit_type: String,
    #[serde(default)]
    pub operation: AuditOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<AuditActor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AuditMetadata>,
}

impl AuditRecord {
    /// A `CUSTOM` record stamped with the current instant
    pub fn new(id: impl Into<String>, audit_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audit_type: audit_type.into(),
            operation: AuditOperation::Custom,
            table: None,
            entity_id: None,
            old_values: None,
            new_values: None,
            payload: None,
            timestamp: current_timestamp(),
            actor: None,
            metadata: None,
        }
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor.as_ref().and_then(|a| a.id.as_deref())
    }
}

/// Options accepted by [`Auditor::audit`](crate::Auditor::audit)
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub operation: Option<AuditOperation>,
    pub table: Option<String>,
    pub entity_id: Option<EntityId>,
    pub old_values: Option<JsonValue>,
    pub new_values: Option<JsonValue>,
}

impl AuditOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(mut self, operation: AuditOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn old_values(mut self, values: JsonValue) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: JsonValue) -> Self {
        self.new_values = Some(values);
        self
    }
}

/// Caller-controlled record contents for [`Auditor::record`](crate::Auditor::record)
///
/// `id`, `timestamp` and `actor` are deliberately absent: the auditor always
/// assigns them.
#[derive(Debug, Clone, Default)]
pub struct RawAuditRecord {
    pub audit_type: String,
    pub operation: Option<AuditOperation>,
    pub table: Option<String>,
    pub entity_id: Option<EntityId>,
    pub old_values: Option<JsonValue>,
    pub new_values: Option<JsonValue>,
    pub payload: Option<JsonValue>,
    pub metadata: Option<AuditMetadata>,
}

impl RawAuditRecord {
    pub fn new(audit_type: impl Into<String>) -> Self {
        Self {
            audit_type: audit_type.into(),
            ..Default::default()
        }
    }

    pub fn operation(mut self, operation: AuditOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn old_values(mut self, values: JsonValue) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: JsonValue) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, metadata: AuditMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Current instant at millisecond precision
pub fn current_timestamp() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision; records and range bounds compare at this
/// granularity in every backend.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
