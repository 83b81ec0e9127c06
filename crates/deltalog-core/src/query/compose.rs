use chrono::{DateTime, Utc};
use deltalog_core_types::{EntityId, TransactionId};

use super::filter::{Filter, FilterBuilder, Predicate};
use super::sort::{SortBuilder, SortKey, SortOrder};
use super::RecordKind;
use crate::model::VersionNumber;

/// Non-destructive rewrite applied by [`Query::modified`]
///
/// `replace_skip` and `replace_take` use a nested option: `None` keeps the
/// wrapped query's value, `Some(None)` clears it and `Some(Some(n))`
/// replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedQueryOptions {
    pub invert_filter: bool,
    pub reverse_sort: bool,
    pub replace_skip: Option<Option<usize>>,
    pub replace_take: Option<Option<usize>>,
}

impl ModifiedQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invert_filter(mut self) -> Self {
        self.invert_filter = true;
        self
    }

    pub fn reverse_sort(mut self) -> Self {
        self.reverse_sort = true;
        self
    }

    pub fn replace_skip(mut self, skip: Option<usize>) -> Self {
        self.replace_skip = Some(skip);
        self
    }

    pub fn replace_take(mut self, take: Option<usize>) -> Self {
        self.replace_take = Some(take);
        self
    }
}

/// A read query over one record stream
///
/// Every kind answers the same four questions (filter, sort, skip, take), so
/// backends execute all of them through the same builders.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Transactions with any of the given ids
    TransactionId(Vec<TransactionId>),
    /// Transactions committed within an inclusive time range
    TimestampRange {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    /// Transactions submitted by one agent
    Agent(String),
    /// Steps of any of the given entities, in version order
    EntityId(Vec<EntityId>),
    /// Steps of one entity within an inclusive version range
    EntityVersions {
        entity_id: EntityId,
        gte: Option<VersionNumber>,
        lte: Option<VersionNumber>,
    },
    /// Steps carrying a delta of the given type
    DeltaType(String),
    /// Active leases matching every given component
    Lease {
        scope: Option<String>,
        label: Option<String>,
        value: Option<String>,
    },
    /// Active tags matching every given component
    Tag {
        label: Option<String>,
        value: Option<String>,
    },
    /// Caller-supplied predicate over any stream
    Custom {
        record: RecordKind,
        filter: Filter,
        sort: SortOrder,
        skip: Option<usize>,
        take: Option<usize>,
    },
    /// `inner` narrowed by an extra filter
    Filtered { inner: Box<Query>, extra: Filter },
    /// `inner` rewritten by options
    Modified {
        inner: Box<Query>,
        options: ModifiedQueryOptions,
    },
}

impl Query {
    pub fn transaction_id(id: TransactionId) -> Query {
        Query::TransactionId(vec![id])
    }

    pub fn timestamp_range(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Query {
        Query::TimestampRange { from, to }
    }

    pub fn agent(agent_id: impl Into<String>) -> Query {
        Query::Agent(agent_id.into())
    }

    pub fn entity_id(id: EntityId) -> Query {
        Query::EntityId(vec![id])
    }

    pub fn entity_versions(
        entity_id: EntityId,
        gte: Option<VersionNumber>,
        lte: Option<VersionNumber>,
    ) -> Query {
        Query::EntityVersions {
            entity_id,
            gte,
            lte,
        }
    }

    pub fn delta_type(type_name: impl Into<String>) -> Query {
        Query::DeltaType(type_name.into())
    }

    pub fn lease(
        scope: Option<String>,
        label: Option<String>,
        value: Option<String>,
    ) -> Query {
        Query::Lease {
            scope,
            label,
            value,
        }
    }

    pub fn tag(label: Option<String>, value: Option<String>) -> Query {
        Query::Tag { label, value }
    }

    /// Arbitrary filter over a stream, in commit order, unpaginated
    pub fn custom(record: RecordKind, filter: Filter) -> Query {
        Query::Custom {
            record,
            filter,
            sort: SortOrder::new().ascending(SortKey::Sequence),
            skip: None,
            take: None,
        }
    }

    /// Narrow this query: the result filter is `AND(original, extra)`
    pub fn filtered(self, extra: Filter) -> Query {
        Query::Filtered {
            inner: Box::new(self),
            extra,
        }
    }

    /// Wrap this query with inverted filter, reversed sort or new pagination
    pub fn modified(self, options: ModifiedQueryOptions) -> Query {
        Query::Modified {
            inner: Box::new(self),
            options,
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            Query::TransactionId(_) | Query::TimestampRange { .. } | Query::Agent(_) => {
                RecordKind::Transaction
            }
            Query::EntityId(_) | Query::EntityVersions { .. } | Query::DeltaType(_) => {
                RecordKind::Delta
            }
            Query::Lease { .. } => RecordKind::Lease,
            Query::Tag { .. } => RecordKind::Tag,
            Query::Custom { record, .. } => *record,
            Query::Filtered { inner, .. } | Query::Modified { inner, .. } => inner.record_kind(),
        }
    }

    /// The backend-agnostic filter expression of this query
    pub fn filter_expr(&self) -> Filter {
        match self {
            Query::TransactionId(ids) => Filter::from(Predicate::TransactionIdIn(ids.clone())),
            Query::TimestampRange { from, to } => Filter::and(
                from.map(|t| Filter::from(Predicate::TimestampGte(t)))
                    .into_iter()
                    .chain(to.map(|t| Filter::from(Predicate::TimestampLte(t))))
                    .collect(),
            ),
            Query::Agent(agent_id) => Filter::from(Predicate::AgentIdEq(agent_id.clone())),
            Query::EntityId(ids) => Filter::from(Predicate::EntityIdIn(ids.clone())),
            Query::EntityVersions {
                entity_id,
                gte,
                lte,
            } => {
                let mut filters: Vec<Filter> =
                    vec![Filter::from(Predicate::EntityIdIn(vec![*entity_id]))];
                filters.extend(gte.map(|v| Filter::from(Predicate::VersionGte(v))));
                filters.extend(lte.map(|v| Filter::from(Predicate::VersionLte(v))));
                Filter::and(filters)
            }
            Query::DeltaType(type_name) => Filter::from(Predicate::DeltaTypeEq(type_name.clone())),
            Query::Lease {
                scope,
                label,
                value,
            } => {
                let mut filters: Vec<Filter> = Vec::new();
                filters.extend(scope.clone().map(|s| Filter::from(Predicate::LeaseScopeEq(s))));
                filters.extend(label.clone().map(|l| Filter::from(Predicate::LeaseLabelEq(l))));
                filters.extend(value.clone().map(|v| Filter::from(Predicate::LeaseValueEq(v))));
                Filter::and(filters)
            }
            Query::Tag { label, value } => {
                let mut filters: Vec<Filter> = Vec::new();
                filters.extend(label.clone().map(|l| Filter::from(Predicate::TagLabelEq(l))));
                filters.extend(value.clone().map(|v| Filter::from(Predicate::TagValueEq(v))));
                Filter::and(filters)
            }
            Query::Custom { filter, .. } => filter.clone(),
            Query::Filtered { inner, extra } => {
                Filter::and(vec![inner.filter_expr(), extra.clone()])
            }
            Query::Modified { inner, options } => {
                let filter = inner.filter_expr();
                if options.invert_filter {
                    Filter::not(filter)
                } else {
                    filter
                }
            }
        }
    }

    /// The sort order of this query
    ///
    /// Built-in kinds always end with [`SortKey::Sequence`], so their order
    /// is total and reversing it yields the exact inverse.
    pub fn sort_order(&self) -> SortOrder {
        match self {
            Query::TransactionId(_) | Query::TimestampRange { .. } | Query::Agent(_) => {
                SortOrder::new()
                    .ascending(SortKey::Timestamp)
                    .ascending(SortKey::Sequence)
            }
            Query::EntityId(_) | Query::EntityVersions { .. } => SortOrder::new()
                .ascending(SortKey::EntityId)
                .ascending(SortKey::EntityVersion)
                .ascending(SortKey::Sequence),
            Query::DeltaType(_) => SortOrder::new().ascending(SortKey::Sequence),
            Query::Lease { .. } => SortOrder::new()
                .ascending(SortKey::LeaseScope)
                .ascending(SortKey::LeaseLabel)
                .ascending(SortKey::LeaseValue)
                .ascending(SortKey::Sequence),
            Query::Tag { .. } => SortOrder::new()
                .ascending(SortKey::TagLabel)
                .ascending(SortKey::TagValue)
                .ascending(SortKey::Sequence),
            Query::Custom { sort, .. } => sort.clone(),
            Query::Filtered { inner, .. } => inner.sort_order(),
            Query::Modified { inner, options } => {
                let sort = inner.sort_order();
                if options.reverse_sort {
                    sort.reversed()
                } else {
                    sort
                }
            }
        }
    }

    /// Compile the filter with a backend's builder
    pub fn filter<B: FilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.build(&self.filter_expr())
    }

    /// Compile the sort with a backend's builder
    pub fn sort<B: SortBuilder>(&self, builder: &B) -> B::Sort {
        self.sort_order().build(builder)
    }

    /// Records to drop from the front of the ordered result; `None` is unconstrained
    pub fn skip(&self) -> Option<usize> {
        match self {
            Query::Custom { skip, .. } => *skip,
            Query::Filtered { inner, .. } => inner.skip(),
            Query::Modified { inner, options } => match options.replace_skip {
                Some(replacement) => replacement,
                None => inner.skip(),
            },
            _ => None,
        }
    }

    /// Maximum number of records to return; `None` is unconstrained
    pub fn take(&self) -> Option<usize> {
        match self {
            Query::Custom { take, .. } => *take,
            Query::Filtered { inner, .. } => inner.take(),
            Query::Modified { inner, options } => match options.replace_take {
                Some(replacement) => replacement,
                None => inner.take(),
            },
            _ => None,
        }
    }
}
