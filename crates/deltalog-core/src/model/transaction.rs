use chrono::{DateTime, Utc};
use deltalog_core_types::{EntityId, TransactionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::metadata::{Diff, Lease, Tag};
use super::version::VersionNumber;

/// Serialized delta with the type metadata needed to resolve it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub type_name: String,
    pub data: serde_json::Value,
}

impl Payload {
    /// Encode a typed delta under the given type name
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the delta cannot be represented as JSON.
    pub fn encode<D: Serialize>(
        type_name: impl Into<String>,
        delta: &D,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            type_name: type_name.into(),
            data: serde_json::to_value(delta)?,
        })
    }

    /// Decode the payload back into a typed delta
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if the stored JSON does not match `D`.
    pub fn decode<D: DeserializeOwned>(&self) -> Result<D, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Identity of whoever submitted a transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentSignature {
    pub agent_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl AgentSignature {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Signature used when the caller does not identify itself
    pub fn unknown() -> Self {
        Self::new("unknown")
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An entity value together with its position in the entity's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<E> {
    pub entity_id: EntityId,
    pub version: VersionNumber,
    pub value: E,
}

impl<E> Versioned<E> {
    pub fn new(entity_id: EntityId, version: VersionNumber, value: E) -> Self {
        Self {
            entity_id,
            version,
            value,
        }
    }
}

/// In-memory resulting entity value attached to a step
///
/// Produced by the builder and consumed by snapshot subscribers. It is never
/// persisted; steps read back from a repository carry no state.
#[derive(Clone)]
pub struct StepState(Arc<dyn Any + Send + Sync>);

impl StepState {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StepState(..)")
    }
}

/// One durable unit of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub entity_id: EntityId,
    pub previous_version: VersionNumber,
    pub next_version: VersionNumber,
    /// `None` for metadata-only steps
    pub delta: Option<Payload>,
    pub leases: Diff<Lease>,
    pub tags: Diff<Tag>,
    #[serde(skip)]
    pub state: Option<StepState>,
}

impl Step {
    /// Resulting entity value, if this step was produced in memory for `E`
    pub fn state_as<E: Any>(&self) -> Option<&Versioned<E>> {
        self.state.as_ref().and_then(|s| s.downcast_ref::<Versioned<E>>())
    }
}

/// An atomically committed, ordered batch of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentSignature,
    pub steps: Vec<Step>,
}

impl Transaction {
    /// Distinct entity ids touched by this transaction, in first-step order
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if !seen.contains(&step.entity_id) {
                seen.push(step.entity_id);
            }
        }
        seen
    }
}
