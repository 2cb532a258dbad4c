//! In-memory filter, sort and pagination
//!
//! The one implementation of query semantics for backends that hold records
//! as a list. The SQL backend pushes the same predicates into its WHERE
//! clause; the two must agree record-for-record, including tie order.

use crate::record::{truncate_to_millis, AuditRecord};
use crate::storage::{AuditFilter, OrderBy, OrderDirection, QueryOptions};

/// Whether `record` satisfies every set field of `filter`
pub fn matches(record: &AuditRecord, filter: &AuditFilter) -> bool {
    if let Some(ref audit_type) = filter.audit_type {
        if !audit_type.matches(&record.audit_type) {
            return false;
        }
    }

    if let Some(ref entity_id) = filter.entity_id {
        match record.entity_id {
            Some(ref stored) if stored.canonical() == entity_id.canonical() => {},
            _ => return false,
        }
    }

    if let Some(ref table) = filter.table {
        if record.table.as_ref() != Some(table) {
            return false;
        }
    }

    if let Some(ref actor_id) = filter.actor_id {
        if record.actor_id() != Some(actor_id.as_str()) {
            return false;
        }
    }

    let ts = truncate_to_millis(record.timestamp);

    if let Some(from) = filter.from {
        if ts < truncate_to_millis(from) {
            return false;
        }
    }

    if let Some(to) = filter.to {
        if ts > truncate_to_millis(to) {
            return false;
        }
    }

    true
}

/// Stable sort: records with equal keys keep their incoming order
pub fn sort_records(records: &mut [AuditRecord], order_by: OrderBy, direction: OrderDirection) {
    records.sort_by(|a, b| {
        let ordering = match order_by {
            OrderBy::Timestamp => {
                truncate_to_millis(a.timestamp).cmp(&truncate_to_millis(b.timestamp))
            },
            OrderBy::Type => a.audit_type.cmp(&b.audit_type),
        };
        match direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    });
}

pub fn paginate(records: Vec<AuditRecord>, limit: Option<u64>, offset: Option<u64>) -> Vec<AuditRecord> {
    let skip = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    records.into_iter().skip(skip).take(take).collect()
}

/// Filter, order and paginate `records`, given in insertion order
pub fn apply_query(records: Vec<AuditRecord>, options: &QueryOptions) -> Vec<AuditRecord> {
    let mut matched: Vec<AuditRecord> = records
        .into_iter()
        .filter(|r| matches(r, &options.filter))
        .collect();

    sort_records(&mut matched, options.order_by, options.order_direction);

    paginate(matched, options.limit, options.offset)
}

pub fn count_matching<'a>(records: impl IntoIterator<Item = &'a AuditRecord>, filter: &AuditFilter) -> u64 {
    records.into_iter().filter(|r| matches(r, filter)).count() as u64
}
