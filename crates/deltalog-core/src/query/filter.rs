use chrono::{DateTime, Utc};
use deltalog_core_types::{EntityId, TransactionId};

use crate::model::VersionNumber;

/// Atomic condition over a single record field
///
/// A predicate that names a field the record kind does not carry evaluates
/// to false, so `Not` of it is true.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    TransactionIdIn(Vec<TransactionId>),
    TimestampGte(DateTime<Utc>),
    TimestampLte(DateTime<Utc>),
    AgentIdEq(String),
    EntityIdIn(Vec<EntityId>),
    VersionGte(VersionNumber),
    VersionLte(VersionNumber),
    DeltaTypeEq(String),
    LeaseScopeEq(String),
    LeaseLabelEq(String),
    LeaseValueEq(String),
    TagLabelEq(String),
    TagValueEq(String),
}

/// Backend-agnostic filter expression
///
/// `And(vec![])` matches everything and `Or(vec![])` matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Predicate(Predicate),
}

impl Filter {
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn none() -> Filter {
        Filter::Or(Vec::new())
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Filter {
        Filter::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    pub fn nand(filters: Vec<Filter>) -> Filter {
        Filter::not(Filter::and(filters))
    }

    pub fn nor(filters: Vec<Filter>) -> Filter {
        Filter::not(Filter::or(filters))
    }

    pub fn xor(a: Filter, b: Filter) -> Filter {
        Filter::or(vec![
            Filter::and(vec![a.clone(), Filter::not(b.clone())]),
            Filter::and(vec![Filter::not(a), b]),
        ])
    }

    pub fn xnor(a: Filter, b: Filter) -> Filter {
        Filter::not(Filter::xor(a, b))
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Filter::Predicate(predicate)
    }
}

/// Compiles filter expressions into a backend's native representation
///
/// Backends implement the three primitives and the predicate leaf. The
/// derived operators are defined here in terms of the primitives only, so
/// every backend gets them unchanged.
pub trait FilterBuilder {
    type Filter: Clone;

    fn and(&self, filters: Vec<Self::Filter>) -> Self::Filter;

    fn or(&self, filters: Vec<Self::Filter>) -> Self::Filter;

    fn not(&self, filter: Self::Filter) -> Self::Filter;

    fn predicate(&self, predicate: &Predicate) -> Self::Filter;

    fn nand(&self, filters: Vec<Self::Filter>) -> Self::Filter {
        self.not(self.and(filters))
    }

    fn nor(&self, filters: Vec<Self::Filter>) -> Self::Filter {
        self.not(self.or(filters))
    }

    fn xor(&self, a: Self::Filter, b: Self::Filter) -> Self::Filter {
        let only_a = self.and(vec![a.clone(), self.not(b.clone())]);
        let only_b = self.and(vec![self.not(a), b]);
        self.or(vec![only_a, only_b])
    }

    fn xnor(&self, a: Self::Filter, b: Self::Filter) -> Self::Filter {
        self.not(self.xor(a, b))
    }

    /// Compile a whole expression tree
    fn build(&self, filter: &Filter) -> Self::Filter {
        match filter {
            Filter::And(filters) => self.and(filters.iter().map(|f| self.build(f)).collect()),
            Filter::Or(filters) => self.or(filters.iter().map(|f| self.build(f)).collect()),
            Filter::Not(inner) => self.not(self.build(inner)),
            Filter::Predicate(predicate) => self.predicate(predicate),
        }
    }
}
