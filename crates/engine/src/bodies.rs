//! Kind-specific entity bodies
//!
//! Relationships are identifier fields; the registry owns every entity and
//! bodies never embed references to one another.

use crate::entity::{Entity, EntityBody};
use chrono::{DateTime, Utc};
use choreo_core::{
    CorrelationProperties, DataDependencyGraphId, DataElementId, DataElementInstanceId,
    DataModelId, DataObjectId, DataObjectInstanceId, DataValueId, EntityId, InstanceState,
    ModelState,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Data dependency graph entity
pub type DataDependencyGraph = Entity<DataDependencyGraphBody>;
/// Data model entity
pub type DataModel = Entity<DataModelBody>;
/// Data object entity
pub type DataObject = Entity<DataObjectBody>;
/// Data element entity
pub type DataElement = Entity<DataElementBody>;
/// Data object instance entity
pub type DataObjectInstance = Entity<DataObjectInstanceBody>;
/// Data element instance entity
pub type DataElementInstance = Entity<DataElementInstanceBody>;
/// Data value entity
pub type DataValue = Entity<DataValueBody>;

/// Source document holder; compiles into exactly one DataModel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDependencyGraphBody {
    /// Owning choreography participant
    pub entity_name: String,
    /// Graph name
    pub name: String,
    /// Namespace the compiled model is expected to live in
    pub target_namespace: String,
    /// Model produced by compilation; set once
    pub data_model: Option<DataModelId>,
}

impl EntityBody for DataDependencyGraphBody {
    type Id = DataDependencyGraphId;
    type State = ModelState;

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn entity_name(&self) -> Option<&str> {
        Some(&self.entity_name)
    }
}

/// Namespace-qualified schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModelBody {
    /// Owning choreography participant
    pub entity_name: String,
    /// Namespace half of the qualified name
    pub namespace: String,
    /// Local half of the qualified name
    pub name: String,
    /// Graph this model was compiled from
    pub graph: Option<DataDependencyGraphId>,
    /// Objects in insertion order
    pub objects: Vec<DataObjectId>,
}

impl EntityBody for DataModelBody {
    type Id = DataModelId;
    type State = ModelState;

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn entity_name(&self) -> Option<&str> {
        Some(&self.entity_name)
    }

    fn parent(&self) -> Option<Uuid> {
        self.graph.map(|g| g.as_uuid())
    }
}

/// Named group of elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObjectBody {
    /// Owning choreography participant
    pub entity_name: String,
    /// Object name
    pub name: String,
    /// Owning model; `Some` marks the object as model-owned
    pub data_model: Option<DataModelId>,
    /// Elements in insertion order
    pub elements: Vec<DataElementId>,
    /// Instances in creation order
    pub instances: Vec<DataObjectInstanceId>,
}

impl DataObjectBody {
    /// Check if the object was produced by compiling a model
    pub fn is_model_owned(&self) -> bool {
        self.data_model.is_some()
    }
}

impl EntityBody for DataObjectBody {
    type Id = DataObjectId;
    type State = ModelState;

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn entity_name(&self) -> Option<&str> {
        Some(&self.entity_name)
    }

    fn parent(&self) -> Option<Uuid> {
        self.data_model.map(|m| m.as_uuid())
    }
}

/// Typed field of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElementBody {
    /// Owning choreography participant
    pub entity_name: String,
    /// Element name
    pub name: String,
    /// Value type tag
    pub value_type: String,
    /// MIME content type
    pub content_type: String,
    /// Element instances hold N values instead of one
    pub is_collection: bool,
    /// Parent object
    pub object: DataObjectId,
    /// Element instances in creation order
    pub instances: Vec<DataElementInstanceId>,
}

impl EntityBody for DataElementBody {
    type Id = DataElementId;
    type State = ModelState;

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn entity_name(&self) -> Option<&str> {
        Some(&self.entity_name)
    }

    fn parent(&self) -> Option<Uuid> {
        Some(self.object.as_uuid())
    }
}

/// One choreography run's copy of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObjectInstanceBody {
    /// Participant that created the instance
    pub created_by: String,
    /// Correlation properties; immutable after creation
    pub correlation: CorrelationProperties,
    /// Instantiated object
    pub object: DataObjectId,
    /// One element instance per element of the object at instantiation
    pub element_instances: Vec<DataElementInstanceId>,
}

impl EntityBody for DataObjectInstanceBody {
    type Id = DataObjectInstanceId;
    type State = InstanceState;

    fn parent(&self) -> Option<Uuid> {
        Some(self.object.as_uuid())
    }
}

/// One choreography run's copy of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElementInstanceBody {
    /// Participant that created the instance
    pub created_by: String,
    /// Correlation properties; immutable after creation
    pub correlation: CorrelationProperties,
    /// Instantiated element
    pub element: DataElementId,
    /// Object instance this belongs to
    pub object_instance: DataObjectInstanceId,
    /// Referenced values; at most one unless the element is a collection
    pub values: Vec<DataValueId>,
}

impl EntityBody for DataElementInstanceBody {
    type Id = DataElementInstanceId;
    type State = InstanceState;

    fn parent(&self) -> Option<Uuid> {
        Some(self.object_instance.as_uuid())
    }
}

/// Payload holder
///
/// The payload itself lives in the persistence provider; the body carries
/// only its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValueBody {
    /// Value name
    pub name: String,
    /// Owning participant
    pub owner: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Time of the last payload change
    pub last_modified: DateTime<Utc>,
    /// Payload size in bytes
    pub size: u64,
    /// Value type tag
    pub value_type: String,
    /// MIME content type
    pub content_type: String,
    /// Element instances referencing this value
    pub associations: Vec<DataElementInstanceId>,
}

impl EntityBody for DataValueBody {
    type Id = DataValueId;
    type State = InstanceState;

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn entity_name(&self) -> Option<&str> {
        Some(&self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::{EntityKind, Error, InstanceOp, ModelOp};

    fn value_body() -> DataValueBody {
        let now = Utc::now();
        DataValueBody {
            name: "total".into(),
            owner: "svc1".into(),
            created: now,
            last_modified: now,
            size: 0,
            value_type: "number".into(),
            content_type: "text/plain".into(),
            associations: Vec::new(),
        }
    }

    fn object_body() -> DataObjectBody {
        DataObjectBody {
            entity_name: "hahnml".into(),
            name: "invoice".into(),
            data_model: None,
            elements: vec![DataElementId::new()],
            instances: Vec::new(),
        }
    }

    #[test]
    fn test_record_round_trip_keeps_cell() {
        let value = DataValue::new(DataValueId::new(), value_body());
        value.transition(InstanceOp::Initialize, 4).unwrap();
        value.transition(InstanceOp::Archive, 4).unwrap();

        let record = value.to_record().unwrap();
        assert_eq!(record.kind, EntityKind::DataValue);
        assert_eq!(record.version, 3);

        let restored = DataValue::from_record(record).unwrap();
        assert_eq!(restored.id(), value.id());
        assert_eq!(restored.snapshot(), value.snapshot());
        assert_eq!(restored.body(), value.body());

        // The pre-archive state survives the trip
        restored.transition(InstanceOp::Unarchive, 4).unwrap();
        assert_eq!(restored.state(), InstanceState::Initialized);
    }

    #[test]
    fn test_record_of_other_kind_is_rejected() {
        let object = DataObject::new(DataObjectId::new(), object_body());
        let record = object.to_record().unwrap();
        assert!(matches!(
            DataElement::from_record(record),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_record_of_wrong_flavor_is_rejected() {
        let object = DataObject::new(DataObjectId::new(), object_body());
        let mut record = object.to_record().unwrap();
        record.state = InstanceState::Created.into();
        assert!(matches!(
            DataObject::from_record(record),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_illegal_transition_names_entity() {
        let object = DataObject::new(DataObjectId::new(), object_body());
        let err = object.transition(ModelOp::Archive, 4).unwrap_err();
        match err {
            Error::LifecycleViolation {
                kind,
                id,
                state,
                operation,
            } => {
                assert_eq!(kind, EntityKind::DataObject);
                assert_eq!(id, object.uuid());
                assert_eq!(state, ModelState::Initial.into());
                assert_eq!(operation, "archive");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(object.state(), ModelState::Initial);
        assert_eq!(object.version(), 1);
    }

    #[test]
    fn test_ensure_state() {
        let object = DataObject::new(DataObjectId::new(), object_body());
        object
            .ensure_state(&[ModelState::Initial, ModelState::Ready], "add_data_element")
            .unwrap();
        let err = object
            .ensure_state(&[ModelState::Ready], "instantiate")
            .unwrap_err();
        assert!(err.is_lifecycle_violation());
    }

    #[test]
    fn test_filter_accessors() {
        let object = DataObject::new(DataObjectId::new(), object_body());
        object.read(|b| {
            assert_eq!(b.name(), Some("invoice"));
            assert_eq!(b.entity_name(), Some("hahnml"));
            assert_eq!(b.parent(), None);
            assert!(!b.is_model_owned());
        });
    }
}
