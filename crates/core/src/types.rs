//! Core types for choreodata
//!
//! This module defines the foundational identifier types:
//! - One typed identifier per entity kind (`DataModelId`, `DataObjectId`, ...)
//! - EntityKind: discriminator used by the registry, the event bus and the stores
//!
//! Every identifier is a wrapper around a UUID v4, assigned at creation and
//! never reused. Relationships between entities are expressed through these
//! identifiers rather than embedded references.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of a managed entity
///
/// Each kind owns one registry index and one lifecycle flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Source document compiled into a DataModel
    DataDependencyGraph,
    /// Namespace-qualified schema of DataObjects
    DataModel,
    /// Named group of DataElements
    DataObject,
    /// Typed field of a DataObject
    DataElement,
    /// Per-run instance of a DataObject
    DataObjectInstance,
    /// Per-run instance of a DataElement
    DataElementInstance,
    /// Payload holder referenced by DataElementInstances
    DataValue,
}

impl EntityKind {
    /// All kinds, in rehydration order (parents before children)
    pub const ALL: [EntityKind; 7] = [
        EntityKind::DataDependencyGraph,
        EntityKind::DataModel,
        EntityKind::DataObject,
        EntityKind::DataElement,
        EntityKind::DataObjectInstance,
        EntityKind::DataElementInstance,
        EntityKind::DataValue,
    ];

    /// Stable name used for storage collections and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::DataDependencyGraph => "data_dependency_graph",
            EntityKind::DataModel => "data_model",
            EntityKind::DataObject => "data_object",
            EntityKind::DataElement => "data_element",
            EntityKind::DataObjectInstance => "data_object_instance",
            EntityKind::DataElementInstance => "data_element_instance",
            EntityKind::DataValue => "data_value",
        }
    }

    /// True for kinds that follow the model-object lifecycle flavor
    pub fn is_model_object(&self) -> bool {
        matches!(
            self,
            EntityKind::DataDependencyGraph
                | EntityKind::DataModel
                | EntityKind::DataObject
                | EntityKind::DataElement
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of the typed identifiers
pub trait EntityId:
    Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Kind of entity this identifier addresses
    const KIND: EntityKind;

    /// Wrap a raw UUID
    fn from_uuid(uuid: Uuid) -> Self;

    /// Raw UUID behind this identifier
    fn as_uuid(&self) -> Uuid;
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier using UUID v4
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from raw bytes
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Parse an identifier from its string representation
            ///
            /// Returns None if the string is not a valid UUID.
            pub fn from_string(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl EntityId for $name {
            const KIND: EntityKind = EntityKind::$kind;

            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a DataDependencyGraph
    DataDependencyGraphId => DataDependencyGraph
);
entity_id!(
    /// Identifier of a DataModel
    DataModelId => DataModel
);
entity_id!(
    /// Identifier of a DataObject
    DataObjectId => DataObject
);
entity_id!(
    /// Identifier of a DataElement
    DataElementId => DataElement
);
entity_id!(
    /// Identifier of a DataObjectInstance
    DataObjectInstanceId => DataObjectInstance
);
entity_id!(
    /// Identifier of a DataElementInstance
    DataElementInstanceId => DataElementInstance
);
entity_id!(
    /// Identifier of a DataValue
    DataValueId => DataValue
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<DataObjectId> = (0..1000).map(|_| DataObjectId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_id_string_roundtrip() {
        let id = DataValueId::new();
        let parsed = DataValueId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(DataValueId::from_string("not-a-uuid").is_none());
    }

    #[test]
    fn test_id_kind() {
        assert_eq!(DataModelId::KIND, EntityKind::DataModel);
        assert_eq!(DataElementInstanceId::KIND, EntityKind::DataElementInstance);
        let raw = Uuid::new_v4();
        assert_eq!(DataElementId::from_uuid(raw).as_uuid(), raw);
    }

    #[test]
    fn test_kind_flavor() {
        assert!(EntityKind::DataDependencyGraph.is_model_object());
        assert!(EntityKind::DataElement.is_model_object());
        assert!(!EntityKind::DataValue.is_model_object());
        assert!(!EntityKind::DataObjectInstance.is_model_object());
    }

    #[test]
    fn test_kind_names_distinct() {
        let names: HashSet<&str> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }
}
