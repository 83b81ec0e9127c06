//! Entity builder
//!
//! Assembles a [`Transaction`] in memory. Nothing is durable until the built
//! transaction is handed to a repository. Tracked entity values survive
//! [`EntityBuilder::build`]; only the pending steps are drained.

use chrono::{DateTime, SubsecRound, Utc};
use deltalog_core_types::{EntityId, TransactionId};
use std::collections::HashMap;

use crate::entity::{Authorization, Entity};
use crate::errors::{BuilderError, Result};
use crate::model::{
    AgentSignature, Diff, Lease, Payload, Step, StepState, Tag, Transaction, VersionNumber,
    Versioned,
};
use crate::repository::EntityReader;

pub struct EntityBuilder<E: Entity> {
    agent: AgentSignature,
    authorization: Option<Box<dyn Authorization<E>>>,
    entities: HashMap<EntityId, Versioned<E>>,
    steps: Vec<Step>,
}

impl<E: Entity> EntityBuilder<E> {
    pub fn new(agent: AgentSignature) -> Self {
        Self {
            agent,
            authorization: None,
            entities: HashMap::new(),
            steps: Vec::new(),
        }
    }

    /// Check every appended delta with `authorization`
    ///
    /// Without a strategy every delta is authorized.
    pub fn with_authorization(mut self, authorization: impl Authorization<E> + 'static) -> Self {
        self.authorization = Some(Box::new(authorization));
        self
    }

    pub fn agent(&self) -> &AgentSignature {
        &self.agent
    }

    pub fn is_known(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    /// Current in-memory value of a tracked entity
    pub fn get(&self, entity_id: EntityId) -> Option<&Versioned<E>> {
        self.entities.get(&entity_id)
    }

    /// Steps accumulated since the last build
    pub fn pending_steps(&self) -> &[Step] {
        &self.steps
    }

    /// Start tracking an entity with committed history
    ///
    /// # Errors
    ///
    /// - `EntityAlreadyKnown` if the entity is already tracked
    /// - `EntityNotCreated` if the reader returns version 0
    /// - any error returned by the reader
    pub async fn load<R>(&mut self, entity_id: EntityId, reader: &R) -> Result<&Versioned<E>>
    where
        R: EntityReader<E> + ?Sized,
    {
        if self.is_known(entity_id) {
            return Err(BuilderError::EntityAlreadyKnown { entity_id });
        }

        let current = reader.get(entity_id).await?;
        if current.version.is_zero() {
            return Err(BuilderError::EntityNotCreated { entity_id });
        }

        tracing::debug!(%entity_id, version = current.version.get(), "entity loaded");
        Ok(self.entities.entry(entity_id).or_insert(current))
    }

    /// Start tracking a new entity and record its first delta
    ///
    /// # Errors
    ///
    /// - `EntityAlreadyKnown` if the entity is already tracked
    /// - any error [`EntityBuilder::append`] can return; the entity is then
    ///   left untracked
    pub fn create(&mut self, entity_id: EntityId, delta: E::Delta) -> Result<&Versioned<E>> {
        if self.is_known(entity_id) {
            return Err(BuilderError::EntityAlreadyKnown { entity_id });
        }

        self.entities.insert(
            entity_id,
            Versioned::new(entity_id, VersionNumber::ZERO, E::construct(entity_id)),
        );

        if let Err(err) = self.append_inner(entity_id, delta) {
            self.entities.remove(&entity_id);
            return Err(err);
        }
        self.tracked(entity_id)
    }

    /// Like [`EntityBuilder::create`], but first asks `reader` whether the
    /// entity already has committed history
    ///
    /// # Errors
    ///
    /// - `EntityAlreadyKnown` if the entity is already tracked
    /// - `EntityAlreadyCreated` if the reader returns a non-zero version
    /// - any error [`EntityBuilder::create`] can return
    pub async fn create_unique<R>(
        &mut self,
        entity_id: EntityId,
        delta: E::Delta,
        reader: &R,
    ) -> Result<&Versioned<E>>
    where
        R: EntityReader<E> + ?Sized,
    {
        if self.is_known(entity_id) {
            return Err(BuilderError::EntityAlreadyKnown { entity_id });
        }
        if !reader.get(entity_id).await?.version.is_zero() {
            return Err(BuilderError::EntityAlreadyCreated { entity_id });
        }
        self.create(entity_id, delta)
    }

    /// Apply a delta to a tracked entity and record the step
    ///
    /// # Errors
    ///
    /// - `EntityNotLoaded` if the entity is not tracked
    /// - `CommandNotAuthorized` if the authorization strategy rejects it
    /// - `Serialization` if the delta cannot be encoded
    pub fn append(&mut self, entity_id: EntityId, delta: E::Delta) -> Result<&Versioned<E>> {
        self.append_inner(entity_id, delta)?;
        self.tracked(entity_id)
    }

    /// Record a metadata-only step that inserts a lease
    ///
    /// # Errors
    ///
    /// Returns `EntityNotLoaded` if the entity is not tracked.
    pub fn add_lease(&mut self, entity_id: EntityId, lease: Lease) -> Result<()> {
        self.metadata_step(entity_id, Diff::inserting(lease), Diff::default())
    }

    /// Record a metadata-only step that removes a lease
    ///
    /// # Errors
    ///
    /// Returns `EntityNotLoaded` if the entity is not tracked.
    pub fn delete_lease(&mut self, entity_id: EntityId, lease: Lease) -> Result<()> {
        self.metadata_step(entity_id, Diff::deleting(lease), Diff::default())
    }

    /// Record a metadata-only step that inserts a tag
    ///
    /// # Errors
    ///
    /// Returns `EntityNotLoaded` if the entity is not tracked.
    pub fn add_tag(&mut self, entity_id: EntityId, tag: Tag) -> Result<()> {
        self.metadata_step(entity_id, Diff::default(), Diff::inserting(tag))
    }

    /// Record a metadata-only step that removes a tag
    ///
    /// # Errors
    ///
    /// Returns `EntityNotLoaded` if the entity is not tracked.
    pub fn delete_tag(&mut self, entity_id: EntityId, tag: Tag) -> Result<()> {
        self.metadata_step(entity_id, Diff::default(), Diff::deleting(tag))
    }

    /// Drain the pending steps into an immutable transaction
    ///
    /// The timestamp is `timestamp_override` or the current time, in UTC
    /// truncated to milliseconds so it survives storage unchanged.
    pub fn build(
        &mut self,
        transaction_id: TransactionId,
        timestamp_override: Option<DateTime<Utc>>,
    ) -> Transaction {
        let timestamp = timestamp_override.unwrap_or_else(Utc::now).trunc_subsecs(3);
        let steps = std::mem::take(&mut self.steps);

        tracing::debug!(
            %transaction_id,
            step_count = steps.len(),
            "transaction built"
        );

        Transaction {
            id: transaction_id,
            timestamp,
            agent: self.agent.clone(),
            steps,
        }
    }

    fn tracked(&self, entity_id: EntityId) -> Result<&Versioned<E>> {
        self.entities
            .get(&entity_id)
            .ok_or(BuilderError::EntityNotLoaded { entity_id })
    }

    fn append_inner(&mut self, entity_id: EntityId, delta: E::Delta) -> Result<()> {
        let current = self
            .entities
            .get(&entity_id)
            .ok_or(BuilderError::EntityNotLoaded { entity_id })?;

        if let Some(authorization) = &self.authorization {
            if !authorization.is_authorized(current, &delta) {
                return Err(BuilderError::CommandNotAuthorized {
                    entity_id,
                    delta_type: E::DELTA_TYPE.to_string(),
                });
            }
        }

        let payload = Payload::encode(E::DELTA_TYPE, &delta).map_err(|e| {
            BuilderError::Serialization {
                message: e.to_string(),
            }
        })?;

        let next = Versioned::new(
            entity_id,
            current.version.next(),
            current.value.reduce(&delta),
        );
        let leases = Diff::between(&current.value.leases(), &next.value.leases());
        let tags = Diff::between(&current.value.tags(), &next.value.tags());

        self.steps.push(Step {
            entity_id,
            previous_version: current.version,
            next_version: next.version,
            delta: Some(payload),
            leases,
            tags,
            state: Some(StepState::new(next.clone())),
        });
        self.entities.insert(entity_id, next);
        Ok(())
    }

    fn metadata_step(
        &mut self,
        entity_id: EntityId,
        leases: Diff<Lease>,
        tags: Diff<Tag>,
    ) -> Result<()> {
        let current = self
            .entities
            .get(&entity_id)
            .ok_or(BuilderError::EntityNotLoaded { entity_id })?;
        let next = Versioned::new(entity_id, current.version.next(), current.value.clone());

        self.steps.push(Step {
            entity_id,
            previous_version: current.version,
            next_version: next.version,
            delta: None,
            leases,
            tags,
            state: Some(StepState::new(next.clone())),
        });
        self.entities.insert(entity_id, next);
        Ok(())
    }
}
