use async_trait::async_trait;
use deltalog_core::{
    AgentSignature, AnnotatedDelta, CommitError, Entity, EntityBuilder, Lease, Payload, Query,
    Repository, Tag, Transaction, Versioned,
};
use deltalog_core_types::{EntityId, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimal account aggregate used across engine tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub email: Option<String>,
    pub balance: i64,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountDelta {
    Open { email: String },
    Deposit { amount: i64 },
    ChangeEmail { email: String },
    Close,
}

impl Entity for Account {
    type Delta = AccountDelta;
    const DELTA_TYPE: &'static str = "AccountDelta";

    fn construct(_entity_id: EntityId) -> Self {
        Account::default()
    }

    fn reduce(&self, delta: &AccountDelta) -> Self {
        let mut next = self.clone();
        match delta {
            AccountDelta::Open { email } | AccountDelta::ChangeEmail { email } => {
                next.email = Some(email.clone())
            }
            AccountDelta::Deposit { amount } => next.balance += amount,
            AccountDelta::Close => next.closed = true,
        }
        next
    }

    fn leases(&self) -> BTreeSet<Lease> {
        self.email
            .iter()
            .map(|email| Lease::new("accounts", "email", email.clone()))
            .collect()
    }

    fn tags(&self) -> BTreeSet<Tag> {
        let status = if self.closed { "closed" } else { "open" };
        [Tag::new("status", status)].into_iter().collect()
    }
}

#[allow(dead_code)]
pub fn open(email: &str) -> AccountDelta {
    AccountDelta::Open {
        email: email.to_string(),
    }
}

#[allow(dead_code)]
pub fn builder() -> EntityBuilder<Account> {
    EntityBuilder::new(AgentSignature::new("tester"))
}

/// Counter whose snapshot policies are fixed by the type parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter<const MOST_RECENT: bool, const VERSIONED: bool> {
    pub total: i64,
}

/// Always replaces the most-recent snapshot and keeps every version
#[allow(dead_code)]
pub type EagerCounter = Counter<true, true>;

/// Never writes any snapshot
#[allow(dead_code)]
pub type LazyCounter = Counter<false, false>;

impl<const MOST_RECENT: bool, const VERSIONED: bool> Entity for Counter<MOST_RECENT, VERSIONED> {
    type Delta = i64;
    const DELTA_TYPE: &'static str = "CounterDelta";

    fn construct(_entity_id: EntityId) -> Self {
        Self::default()
    }

    fn reduce(&self, delta: &i64) -> Self {
        Self {
            total: self.total + delta,
        }
    }

    fn should_record_as_most_recent(
        _candidate: &Versioned<Self>,
        _previous: Option<&Versioned<Self>>,
    ) -> bool {
        MOST_RECENT
    }

    fn should_record(_candidate: &Versioned<Self>) -> bool {
        VERSIONED
    }
}

/// Backend that fails every operation
#[allow(dead_code)]
pub struct BrokenRepository;

#[allow(dead_code)]
fn offline() -> CommitError {
    CommitError::Backend {
        message: "backend offline".to_string(),
    }
}

#[async_trait]
impl Repository for BrokenRepository {
    async fn enumerate_transaction_ids(
        &self,
        _query: &Query,
    ) -> Result<Vec<TransactionId>, CommitError> {
        Err(offline())
    }

    async fn enumerate_entity_ids(&self, _query: &Query) -> Result<Vec<EntityId>, CommitError> {
        Err(offline())
    }

    async fn enumerate_agent_signatures(
        &self,
        _query: &Query,
    ) -> Result<Vec<AgentSignature>, CommitError> {
        Err(offline())
    }

    async fn enumerate_deltas(&self, _query: &Query) -> Result<Vec<Payload>, CommitError> {
        Err(offline())
    }

    async fn enumerate_leases(&self, _query: &Query) -> Result<Vec<Lease>, CommitError> {
        Err(offline())
    }

    async fn enumerate_tags(&self, _query: &Query) -> Result<Vec<Tag>, CommitError> {
        Err(offline())
    }

    async fn enumerate_annotated_deltas(
        &self,
        _query: &Query,
    ) -> Result<Vec<AnnotatedDelta>, CommitError> {
        Err(offline())
    }

    async fn put_transaction(&self, _transaction: &Transaction) -> Result<(), CommitError> {
        Err(offline())
    }
}
