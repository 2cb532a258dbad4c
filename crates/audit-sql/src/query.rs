//! SQL generation for the audit table
//!
//! Every filter value travels as a bound parameter; only the validated table
//! name and fixed keywords are spliced into the statement text.

use audit_common::config::IdStrategy;
use audit_core::codec::{encode_entity_id, format_timestamp};
use audit_core::record::truncate_to_millis;
use audit_core::{AuditFilter, OrderBy, QueryOptions, TypeFilter};
use sqlx::{QueryBuilder, Sqlite};

use crate::row::{AuditRow, SELECT_COLUMNS};

/// Rows per multi-row INSERT, well under SQLite's bound parameter limit
pub const MAX_ROWS_PER_INSERT: usize = 500;

pub(crate) fn order_column(order_by: OrderBy) -> &'static str {
    match order_by {
        OrderBy::Timestamp => "timestamp",
        OrderBy::Type => "type",
    }
}

/// Append ` AND ...` for every set filter field, after a `WHERE 1=1`
pub(crate) fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    builder.push(" WHERE 1=1");

    match filter.audit_type {
        Some(TypeFilter::One(ref audit_type)) => {
            builder.push(" AND type = ").push_bind(audit_type.clone());
        },
        Some(TypeFilter::Any(ref types)) if types.is_empty() => {
            builder.push(" AND 1=0");
        },
        Some(TypeFilter::Any(ref types)) => {
            builder.push(" AND type IN (");
            let mut separated = builder.separated(", ");
            for audit_type in types {
                separated.push_bind(audit_type.clone());
            }
            separated.push_unseparated(")");
        },
        None => {},
    }

    if let Some(ref entity_id) = filter.entity_id {
        builder.push(" AND entity_id = ").push_bind(encode_entity_id(entity_id));
    }
    if let Some(ref table) = filter.table {
        builder.push(r#" AND "table" = "#).push_bind(table.clone());
    }
    if let Some(ref actor_id) = filter.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id.clone());
    }
    if let Some(from) = filter.from {
        builder
            .push(" AND timestamp >= ")
            .push_bind(format_timestamp(&truncate_to_millis(from)));
    }
    if let Some(to) = filter.to {
        builder
            .push(" AND timestamp <= ")
            .push_bind(format_timestamp(&truncate_to_millis(to)));
    }
}

/// SELECT with filter, ordering and pagination
///
/// Ties fall back to `rowid`, i.e. insertion order, in both directions.
pub(crate) fn select_records<'a>(table: &str, options: &QueryOptions) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM {table}"));
    push_filter(&mut builder, &options.filter);

    builder.push(format!(
        " ORDER BY {} {}, rowid ASC",
        order_column(options.order_by),
        options.order_direction.as_sql()
    ));

    match (options.limit, options.offset) {
        (None, None) => {},
        (limit, offset) => {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            let limit = limit.map(clamp).unwrap_or(-1);
            builder.push(" LIMIT ").push_bind(limit);
            builder.push(" OFFSET ").push_bind(offset.map(clamp).unwrap_or(0));
        },
    }

    builder
}

pub(crate) fn count_records<'a>(table: &str, filter: &AuditFilter) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
    push_filter(&mut builder, filter);
    builder
}

/// One multi-row INSERT for `rows`, in order
///
/// With [`IdStrategy::Database`] the id column is left to its default.
pub(crate) fn insert_records<'a>(
    table: &str,
    id_strategy: IdStrategy,
    rows: &'a [AuditRow],
) -> QueryBuilder<'a, Sqlite> {
    let with_id = id_strategy == IdStrategy::Generated;

    let mut builder = QueryBuilder::new(format!("INSERT INTO {table} ("));
    if with_id {
        builder.push("id, ");
    }
    builder.push(
        r#"type, operation, "table", entity_id, old_values, new_values, payload, timestamp, actor_id, actor_type, actor_data, metadata) "#,
    );

    builder.push_values(rows, |mut b, row| {
        if with_id {
            b.push_bind(&row.id);
        }
        b.push_bind(&row.audit_type)
            .push_bind(&row.operation)
            .push_bind(&row.table_name)
            .push_bind(&row.entity_id)
            .push_bind(&row.old_values)
            .push_bind(&row.new_values)
            .push_bind(&row.payload)
            .push_bind(&row.timestamp)
            .push_bind(&row.actor_id)
            .push_bind(&row.actor_type)
            .push_bind(&row.actor_data)
            .push_bind(&row.metadata);
    });

    builder
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
