use async_trait::async_trait;
use deltalog_core::{BuilderError, Entity, EntityReader, Lease, Tag, VersionNumber, Versioned};
use deltalog_core_types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Minimal account aggregate used across builder tests
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

/// Reader backed by a fixed map; unknown ids come back at version 0
#[allow(dead_code)]
#[derive(Default)]
pub struct FixedReader {
    pub entities: HashMap<EntityId, Versioned<Account>>,
}

#[allow(dead_code)]
impl FixedReader {
    pub fn with(mut self, entity_id: EntityId, version: u64, value: Account) -> Self {
        self.entities.insert(
            entity_id,
            Versioned::new(entity_id, VersionNumber(version), value),
        );
        self
    }
}

#[async_trait]
impl EntityReader<Account> for FixedReader {
    async fn get(&self, entity_id: EntityId) -> Result<Versioned<Account>, BuilderError> {
        Ok(self.entities.get(&entity_id).cloned().unwrap_or_else(|| {
            Versioned::new(entity_id, VersionNumber::ZERO, Account::construct(entity_id))
        }))
    }
}

#[allow(dead_code)]
pub fn open(email: &str) -> AccountDelta {
    AccountDelta::Open {
        email: email.to_string(),
    }
}
