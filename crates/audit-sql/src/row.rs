//! Mapping between audit records and table rows

use std::str::FromStr;

use audit_core::codec::{
    decode_entity_id, encode_entity_id, encode_json, format_timestamp, join_actor,
    parse_timestamp, split_actor, JsonColumn,
};
use audit_core::{AuditError, AuditOperation, AuditRecord, AuditResult};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// Column list in table order, shared by every SELECT
pub(crate) const SELECT_COLUMNS: &str = r#"id, type, operation, "table", entity_id, old_values, new_values, payload, timestamp, actor_id, actor_type, actor_data, metadata"#;

/// One row of the audit table; every JSON-valued column is kept as text
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AuditRow {
    pub id: String,
    #[sqlx(rename = "type")]
    pub audit_type: String,
    pub operation: String,
    #[sqlx(rename = "table")]
    pub table_name: Option<String>,
    pub entity_id: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub payload: Option<String>,
    pub timestamp: String,
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub actor_data: Option<String>,
    pub metadata: Option<String>,
}

impl AuditRow {
    pub fn from_record(record: &AuditRecord) -> AuditResult<Self> {
        let (actor_id, actor_type, actor_data) = split_actor(record.actor.as_ref());

        Ok(Self {
            id: record.id.clone(),
            audit_type: record.audit_type.clone(),
            operation: record.operation.as_str().to_string(),
            table_name: record.table.clone(),
            entity_id: record.entity_id.as_ref().map(encode_entity_id),
            old_values: encode_optional(record.old_values.as_ref())?,
            new_values: encode_optional(record.new_values.as_ref())?,
            payload: encode_optional(record.payload.as_ref())?,
            timestamp: format_timestamp(&record.timestamp),
            actor_id,
            actor_type,
            actor_data: encode_optional(actor_data.as_ref())?,
            metadata: record
                .metadata
                .as_ref()
                .map(|m| encode_json(&JsonValue::Object(m.clone())))
                .transpose()?,
        })
    }

    pub fn into_record(self) -> AuditResult<AuditRecord> {
        let metadata = match decode_optional(self.metadata)? {
            Some(JsonValue::Object(fields)) => Some(fields),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(AuditError::invalid_record(format!(
                    "metadata of record '{}' must be an object, got {other}",
                    self.id
                )))
            },
        };

        Ok(AuditRecord {
            operation: AuditOperation::from_str(&self.operation)?,
            table: self.table_name,
            entity_id: self
                .entity_id
                .map(|text| decode_entity_id(JsonColumn::Text(text)))
                .transpose()?,
            old_values: decode_optional(self.old_values)?,
            new_values: decode_optional(self.new_values)?,
            payload: decode_optional(self.payload)?,
            timestamp: parse_timestamp(&self.timestamp)?,
            actor: join_actor(self.actor_id, self.actor_type, self.actor_data.map(JsonColumn::Text))?,
            metadata,
            id: self.id,
            audit_type: self.audit_type,
        })
    }
}

fn encode_optional(value: Option<&JsonValue>) -> AuditResult<Option<String>> {
    value.map(encode_json).transpose()
}

fn decode_optional(text: Option<String>) -> AuditResult<Option<JsonValue>> {
    text.map(|t| JsonColumn::Text(t).into_value()).transpose()
}
