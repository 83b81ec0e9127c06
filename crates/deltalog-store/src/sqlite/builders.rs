use chrono::{DateTime, Utc};
use deltalog_core::query::{FilterBuilder, Predicate, SortBuilder, SortKey};
use deltalog_core::RecordKind;
use rusqlite::types::Value;

/// A parenthesized SQL boolean expression with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    fn constant(value: bool) -> Self {
        Self {
            sql: if value { "1" } else { "0" }.to_string(),
            params: Vec::new(),
        }
    }

    fn binary(sql: impl Into<String>, param: Value) -> Self {
        Self {
            sql: sql.into(),
            params: vec![param],
        }
    }

    fn join(filters: Vec<SqlFragment>, operator: &str, empty: bool) -> Self {
        if filters.is_empty() {
            return Self::constant(empty);
        }
        let mut params = Vec::new();
        let parts: Vec<String> = filters
            .into_iter()
            .map(|f| {
                params.extend(f.params);
                f.sql
            })
            .collect();
        Self {
            sql: format!("({})", parts.join(operator)),
            params,
        }
    }
}

fn text(value: impl ToString) -> Value {
    Value::Text(value.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Smallest stored millisecond value that is `>= t`
fn millis_at_or_after(t: DateTime<Utc>) -> i64 {
    let floor = t.timestamp_millis();
    if t.timestamp_subsec_nanos() % 1_000_000 == 0 {
        floor
    } else {
        floor + 1
    }
}

/// Compiles filters into SQL over one record table
///
/// Every atom yields 0 or 1, never NULL, so `NOT` behaves like the
/// in-memory backend. Atoms over columns the table lacks compile to `0`.
pub struct SqlFilterBuilder {
    kind: RecordKind,
}

impl SqlFilterBuilder {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind }
    }

    fn in_list<T: std::fmt::Display>(&self, column: &str, values: &[T]) -> SqlFragment {
        if values.is_empty() {
            return SqlFragment::constant(false);
        }
        SqlFragment {
            sql: format!("{} IN ({})", column, placeholders(values.len())),
            params: values.iter().map(text).collect(),
        }
    }

    fn transaction_column(&self) -> &'static str {
        match self.kind {
            RecordKind::Transaction => "id",
            _ => "transaction_id",
        }
    }

    fn for_kind(&self, kind: RecordKind, sql: &str, param: Value) -> SqlFragment {
        if self.kind == kind {
            SqlFragment::binary(sql, param)
        } else {
            SqlFragment::constant(false)
        }
    }

    fn for_steps(&self, sql: &str, param: Value) -> SqlFragment {
        if self.kind == RecordKind::Transaction {
            SqlFragment::constant(false)
        } else {
            SqlFragment::binary(sql, param)
        }
    }
}

impl FilterBuilder for SqlFilterBuilder {
    type Filter = SqlFragment;

    fn and(&self, filters: Vec<SqlFragment>) -> SqlFragment {
        SqlFragment::join(filters, " AND ", true)
    }

    fn or(&self, filters: Vec<SqlFragment>) -> SqlFragment {
        SqlFragment::join(filters, " OR ", false)
    }

    fn not(&self, filter: SqlFragment) -> SqlFragment {
        SqlFragment {
            sql: format!("(NOT {})", filter.sql),
            params: filter.params,
        }
    }

    fn predicate(&self, predicate: &Predicate) -> SqlFragment {
        match predicate {
            Predicate::TransactionIdIn(ids) => self.in_list(self.transaction_column(), ids),
            Predicate::TimestampGte(t) => SqlFragment::binary(
                "timestamp_ms >= ?",
                Value::Integer(millis_at_or_after(*t)),
            ),
            Predicate::TimestampLte(t) => {
                SqlFragment::binary("timestamp_ms <= ?", Value::Integer(t.timestamp_millis()))
            }
            Predicate::AgentIdEq(agent_id) => {
                self.for_kind(RecordKind::Transaction, "agent_id IS ?", text(agent_id))
            }
            Predicate::EntityIdIn(ids) => match self.kind {
                RecordKind::Transaction if !ids.is_empty() => SqlFragment {
                    sql: format!(
                        "id IN (SELECT transaction_id FROM deltas WHERE entity_id IN ({}))",
                        placeholders(ids.len())
                    ),
                    params: ids.iter().map(text).collect(),
                },
                RecordKind::Transaction => SqlFragment::constant(false),
                _ => self.in_list("entity_id", ids),
            },
            Predicate::VersionGte(v) => {
                self.for_steps("version >= ?", Value::Integer(v.get() as i64))
            }
            Predicate::VersionLte(v) => {
                self.for_steps("version <= ?", Value::Integer(v.get() as i64))
            }
            Predicate::DeltaTypeEq(type_name) => {
                self.for_kind(RecordKind::Delta, "delta_type IS ?", text(type_name))
            }
            Predicate::LeaseScopeEq(s) => self.for_kind(RecordKind::Lease, "scope IS ?", text(s)),
            Predicate::LeaseLabelEq(s) => self.for_kind(RecordKind::Lease, "label IS ?", text(s)),
            Predicate::LeaseValueEq(s) => self.for_kind(RecordKind::Lease, "value IS ?", text(s)),
            Predicate::TagLabelEq(s) => self.for_kind(RecordKind::Tag, "label IS ?", text(s)),
            Predicate::TagValueEq(s) => self.for_kind(RecordKind::Tag, "value IS ?", text(s)),
        }
    }
}

/// Compiles sort orders into `ORDER BY` terms for one record table
///
/// Keys the table lacks are dropped, matching the in-memory backend where
/// they compare equal.
pub struct SqlSortBuilder {
    kind: RecordKind,
}

impl SqlSortBuilder {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind }
    }

    fn column(&self, key: SortKey) -> Option<&'static str> {
        let is_transaction = self.kind == RecordKind::Transaction;
        match key {
            SortKey::Timestamp => Some("timestamp_ms"),
            SortKey::TransactionId if is_transaction => Some("id"),
            SortKey::TransactionId => Some("transaction_id"),
            SortKey::EntityId if !is_transaction => Some("entity_id"),
            SortKey::EntityVersion if !is_transaction => Some("version"),
            SortKey::LeaseScope if self.kind == RecordKind::Lease => Some("scope"),
            SortKey::LeaseLabel if self.kind == RecordKind::Lease => Some("label"),
            SortKey::LeaseValue if self.kind == RecordKind::Lease => Some("value"),
            SortKey::TagLabel if self.kind == RecordKind::Tag => Some("label"),
            SortKey::TagValue if self.kind == RecordKind::Tag => Some("value"),
            SortKey::Sequence => Some("seq"),
            _ => None,
        }
    }
}

impl SortBuilder for SqlSortBuilder {
    type Sort = Vec<String>;

    fn key(&self, key: SortKey, ascending: bool) -> Vec<String> {
        self.column(key)
            .map(|column| format!("{} {}", column, if ascending { "ASC" } else { "DESC" }))
            .into_iter()
            .collect()
    }

    fn combine(&self, sorts: Vec<Vec<String>>) -> Vec<String> {
        sorts.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalog_core::query::{Reverse, SortOrder};
    use deltalog_core::Filter;

    #[test]
    fn test_not_wraps_fragment_and_keeps_params() {
        let b = SqlFilterBuilder::new(RecordKind::Tag);
        let f = b.build(&Filter::not(Predicate::TagLabelEq("color".into()).into()));
        assert_eq!(f.sql, "(NOT label IS ?)");
        assert_eq!(f.params, vec![Value::Text("color".into())]);
    }

    #[test]
    fn test_missing_column_compiles_to_false() {
        let b = SqlFilterBuilder::new(RecordKind::Delta);
        assert_eq!(b.predicate(&Predicate::TagLabelEq("x".into())).sql, "0");
        assert_eq!(b.and(Vec::new()).sql, "1");
        assert_eq!(b.or(Vec::new()).sql, "0");
    }

    #[test]
    fn test_reverse_flips_all_order_terms() {
        let order = SortOrder::new()
            .ascending(SortKey::LeaseScope)
            .ascending(SortKey::Sequence);
        let b = SqlSortBuilder::new(RecordKind::Lease);
        assert_eq!(order.build(&b), vec!["scope ASC", "seq ASC"]);
        assert_eq!(order.build(&Reverse(&b)), vec!["scope DESC", "seq DESC"]);
    }

    #[test]
    fn test_sub_millisecond_lower_bound_rounds_up() {
        let t = DateTime::from_timestamp(10, 1_500_000).unwrap();
        assert_eq!(millis_at_or_after(t), 10_002);
        let exact = DateTime::from_timestamp(10, 2_000_000).unwrap();
        assert_eq!(millis_at_or_after(exact), 10_002);
    }
}
