use deltalog_core::{AgentSignature, Entity, EntityBuilder, Lease, Repository, SessionOptions, Tag};
use deltalog_core_types::EntityId;
use serde::{Deserialize, Serialize};
use deltalog_store::{MemoryRepository, SqliteHandle, SqliteRepository};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Minimal account aggregate used across store tests
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

/// One repository per backend, each over a fresh empty store
#[allow(dead_code)]
pub fn backends() -> Vec<(&'static str, Arc<dyn Repository>)> {
    let options = SessionOptions::default();
    let handle = SqliteHandle::open_in_memory(&options).expect("in-memory sqlite");
    vec![
        ("memory", Arc::new(MemoryRepository::new(options.clone()))),
        ("sqlite", Arc::new(SqliteRepository::new(handle, options))),
    ]
}
