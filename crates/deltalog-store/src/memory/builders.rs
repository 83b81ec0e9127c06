use deltalog_core::query::{FilterBuilder, Predicate, SortBuilder, SortKey};
use deltalog_core::Query;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::record::Record;

pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;
pub type RecordOrder = Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>;

/// Compiles filters into closures over [`Record`]
pub struct MemoryFilterBuilder;

impl FilterBuilder for MemoryFilterBuilder {
    type Filter = RecordFilter;

    fn and(&self, filters: Vec<RecordFilter>) -> RecordFilter {
        Arc::new(move |record| filters.iter().all(|f| f(record)))
    }

    fn or(&self, filters: Vec<RecordFilter>) -> RecordFilter {
        Arc::new(move |record| filters.iter().any(|f| f(record)))
    }

    fn not(&self, filter: RecordFilter) -> RecordFilter {
        Arc::new(move |record| !filter(record))
    }

    fn predicate(&self, predicate: &Predicate) -> RecordFilter {
        let predicate = predicate.clone();
        Arc::new(move |record| record.matches(&predicate))
    }
}

/// Compiles sort orders into comparators over [`Record`]
pub struct MemorySortBuilder;

impl SortBuilder for MemorySortBuilder {
    type Sort = RecordOrder;

    fn key(&self, key: SortKey, ascending: bool) -> RecordOrder {
        Arc::new(move |a, b| {
            let ordering = a.compare(b, key);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        })
    }

    fn combine(&self, sorts: Vec<RecordOrder>) -> RecordOrder {
        Arc::new(move |a, b| {
            sorts
                .iter()
                .map(|cmp| cmp(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

/// Run a query over one stream: filter, sort, skip, take
pub fn execute<'a>(records: impl IntoIterator<Item = &'a Record>, query: &Query) -> Vec<Record> {
    let filter = query.filter(&MemoryFilterBuilder);
    let order = query.sort(&MemorySortBuilder);

    let mut matched: Vec<Record> = records
        .into_iter()
        .filter(|r| r.kind() == query.record_kind() && filter(r))
        .cloned()
        .collect();
    matched.sort_by(|a, b| order(a, b));

    matched
        .into_iter()
        .skip(query.skip().unwrap_or(0))
        .take(query.take().unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBody;
    use chrono::Utc;
    use deltalog_core::query::{Reverse, SortOrder};
    use deltalog_core::{Filter, VersionNumber};
    use deltalog_core_types::{EntityId, TransactionId};

    fn records() -> Vec<Record> {
        let entity_id = EntityId::new();
        (1..=4)
            .map(|n| Record {
                sequence: n,
                transaction_id: TransactionId::new(),
                timestamp: Utc::now(),
                body: RecordBody::Delta {
                    entity_id,
                    version: VersionNumber(n % 2),
                    delta: None,
                },
            })
            .collect()
    }

    #[test]
    fn test_reverse_comparator_inverts_ties_on_secondary_key() {
        let order = SortOrder::new()
            .ascending(SortKey::EntityVersion)
            .ascending(SortKey::Sequence);
        let forward = order.build(&MemorySortBuilder);
        let backward = order.build(&Reverse(&MemorySortBuilder));

        let mut a = records();
        a.sort_by(|x, y| forward(x, y));
        let mut b = records();
        b.sort_by(|x, y| backward(x, y));
        b.reverse();

        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_matches_all_empty_or_matches_none() {
        let all = MemoryFilterBuilder.build(&Filter::all());
        let none = MemoryFilterBuilder.build(&Filter::none());
        let record = &records()[0];
        assert!(all(record));
        assert!(!none(record));
    }
}
