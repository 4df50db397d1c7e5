//! DataValues: payload holders shared between element instances
//!
//! The payload lives in the persistence provider under the `data_values`
//! collection; the entity carries name, owner, timestamps, size and type.
//! A value is CREATED while it has no payload and INITIALIZED once one is
//! stored.
//!
//! Associations are kept on both sides. [`DataValues::associate`] and
//! [`DataValues::remove_association`] go through the element instance so
//! the two lists never disagree.

use crate::bodies::{DataElementInstance, DataValue, DataValueBody};
use crate::context::{Context, VALUE_COLLECTION};
use crate::facades::element_instances;
use crate::registry::ListFilter;
use chrono::Utc;
use choreo_compiler::{default_content_type, VALUE_TYPES};
use choreo_core::{
    DataElementInstanceId, DataValueId, Error, InstanceOp, InstanceState, Result,
};
use std::sync::Arc;
use tracing::{debug, info};

/// DataValue operations
///
/// # Example
///
/// ```rust
/// use choreo_core::InstanceState;
/// use choreo_engine::{Context, DataValues};
///
/// let ctx = Context::in_memory().unwrap();
/// let values = DataValues::new(ctx);
///
/// let v = values.create("total", "svc1", "number", None).unwrap();
/// values.set_data(v.id(), Some(b"99.50".to_vec())).unwrap();
/// assert_eq!(v.state(), InstanceState::Initialized);
/// assert_eq!(values.get_data(v.id()).unwrap(), Some(b"99.50".to_vec()));
/// ```
#[derive(Clone)]
pub struct DataValues {
    ctx: Arc<Context>,
}

impl DataValues {
    /// Create new DataValues facade
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create an empty value in CREATED
    pub fn create(
        &self,
        name: &str,
        owner: &str,
        value_type: &str,
        content_type: Option<&str>,
    ) -> Result<Arc<DataValue>> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("value name must not be empty"));
        }
        if !VALUE_TYPES.contains(&value_type) {
            return Err(Error::invalid_input(format!(
                "unknown value type '{}'",
                value_type
            )));
        }
        let now = Utc::now();
        let value = Arc::new(DataValue::new(
            DataValueId::new(),
            DataValueBody {
                name: name.to_string(),
                owner: owner.to_string(),
                created: now,
                last_modified: now,
                size: 0,
                value_type: value_type.to_string(),
                content_type: content_type
                    .map(str::to_string)
                    .unwrap_or_else(|| default_content_type(value_type).to_string()),
                associations: Vec::new(),
            },
        ));
        self.ctx
            .admit(self.ctx.registry().values(), Arc::clone(&value))?;
        info!(target: "choreo::registry", id = %value.id(), name, owner, "Created data value");
        Ok(value)
    }

    /// Look up a value
    pub fn get(&self, id: DataValueId) -> Result<Arc<DataValue>> {
        self.ctx.registry().values().get(id)
    }

    /// Values matching `filter`; the owner matches `entity_name`
    pub fn list_where(&self, filter: &ListFilter) -> Vec<Arc<DataValue>> {
        self.ctx.registry().values().list_where(filter)
    }

    /// Element instances referencing the value
    pub fn associations(&self, id: DataValueId) -> Result<Vec<Arc<DataElementInstance>>> {
        Ok(self
            .get(id)?
            .read(|b| b.associations.clone())
            .into_iter()
            .filter_map(|ei| self.ctx.registry().element_instances().find(ei))
            .collect())
    }

    /// Store or clear the payload
    ///
    /// The blob is written (or removed) first; only then are size and
    /// modification time updated and the state toggled between CREATED and
    /// INITIALIZED. A persistence failure leaves the value unchanged.
    pub fn set_data(&self, id: DataValueId, data: Option<Vec<u8>>) -> Result<()> {
        let value = self.get(id)?;
        let _guard = value.lock();
        value.ensure_state(
            &[InstanceState::Created, InstanceState::Initialized],
            "set_data",
        )?;

        match &data {
            Some(bytes) => self.ctx.blobs().store(VALUE_COLLECTION, value.uuid(), bytes)?,
            None => self.ctx.blobs().remove(VALUE_COLLECTION, value.uuid())?,
        }
        let size = data.as_ref().map_or(0, |b| b.len() as u64);
        value.update(|b| {
            b.size = size;
            b.last_modified = Utc::now();
        });
        debug!(target: "choreo::registry", id = %value.id(), size, "Stored value payload");

        match (value.state(), data.is_some()) {
            (InstanceState::Created, true) => {
                self.ctx.apply(&value, InstanceOp::Initialize)?;
            }
            (InstanceState::Initialized, false) => {
                self.ctx.apply(&value, InstanceOp::Create)?;
            }
            _ => self.ctx.persist(&value)?,
        }
        Ok(())
    }

    /// Payload, or `None` if none is stored
    pub fn get_data(&self, id: DataValueId) -> Result<Option<Vec<u8>>> {
        let value = self.get(id)?;
        match self.ctx.blobs().load(VALUE_COLLECTION, value.uuid()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reference the value from an element instance
    pub fn associate(&self, id: DataValueId, instance: DataElementInstanceId) -> Result<()> {
        let value = self.get(id)?;
        let instance = self.ctx.registry().element_instances().get(instance)?;
        element_instances::add_value(&self.ctx, &instance, &value)
    }

    /// Drop the reference from an element instance
    ///
    /// If the element instance is gone, only the value's list is updated.
    pub fn remove_association(&self, id: DataValueId, instance: DataElementInstanceId) -> Result<()> {
        let value = self.get(id)?;
        match self.ctx.registry().element_instances().find(instance) {
            Some(ei) if ei.state() != InstanceState::Deleted => {
                element_instances::remove_value(&self.ctx, &ei, id)
            }
            _ => {
                let _guard = value.lock();
                value.update(|b| b.associations.retain(|i| *i != instance));
                self.ctx.persist(&value)
            }
        }
    }

    /// Archive (CREATED/INITIALIZED -> ARCHIVED)
    pub fn archive(&self, id: DataValueId) -> Result<()> {
        let value = self.get(id)?;
        let _guard = value.lock();
        self.ctx.apply(&value, InstanceOp::Archive)?;
        Ok(())
    }

    /// Unarchive, restoring the state held before archiving
    pub fn unarchive(&self, id: DataValueId) -> Result<()> {
        let value = self.get(id)?;
        let _guard = value.lock();
        self.ctx.apply(&value, InstanceOp::Unarchive)?;
        Ok(())
    }

    /// Delete the value and its payload
    ///
    /// # Errors
    /// `ValueInUse` while any element instance still references it.
    pub fn delete(&self, id: DataValueId) -> Result<()> {
        let value = self.get(id)?;
        let _guard = value.lock();
        let references = value.read(|b| b.associations.len());
        if references > 0 {
            return Err(Error::ValueInUse {
                id: value.uuid(),
                references,
            });
        }
        value.ensure_state(
            &[
                InstanceState::Created,
                InstanceState::Initialized,
                InstanceState::Archived,
            ],
            "delete",
        )?;
        self.ctx.blobs().remove(VALUE_COLLECTION, value.uuid())?;
        self.ctx.apply(&value, InstanceOp::Delete)?;
        self.ctx.registry().values().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Collaborators;
    use crate::config::ChoreoConfig;
    use choreo_core::PersistenceProvider;
    use choreo_storage::MemoryBlobStore;
    use uuid::Uuid;

    struct FailingBlobs;

    impl PersistenceProvider for FailingBlobs {
        fn store(&self, _: &str, _: Uuid, _: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        fn load(&self, collection: &str, id: Uuid) -> Result<Vec<u8>> {
            Err(Error::not_found(collection, id))
        }

        fn remove(&self, _: &str, _: Uuid) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_payload_toggles_state() {
        let ctx = Context::in_memory().unwrap();
        let values = DataValues::new(ctx);
        let v = values.create("total", "svc1", "number", None).unwrap();
        assert_eq!(v.state(), InstanceState::Created);
        assert_eq!(values.get_data(v.id()).unwrap(), None);

        values.set_data(v.id(), Some(vec![1, 2, 3])).unwrap();
        assert_eq!(v.state(), InstanceState::Initialized);
        assert_eq!(v.read(|b| b.size), 3);

        values.set_data(v.id(), Some(vec![4])).unwrap();
        assert_eq!(v.state(), InstanceState::Initialized);
        assert_eq!(values.get_data(v.id()).unwrap(), Some(vec![4]));

        values.set_data(v.id(), None).unwrap();
        assert_eq!(v.state(), InstanceState::Created);
        assert_eq!(v.read(|b| b.size), 0);
        assert_eq!(values.get_data(v.id()).unwrap(), None);
    }

    #[test]
    fn test_failed_store_leaves_value_unchanged() {
        let collaborators = Collaborators {
            blobs: Arc::new(FailingBlobs),
            ..Collaborators::in_memory()
        };
        let ctx = Context::open(ChoreoConfig::default(), collaborators).unwrap();
        let values = DataValues::new(ctx);
        let v = values.create("total", "svc1", "number", None).unwrap();
        let before = v.body();

        let err = values.set_data(v.id(), Some(vec![1])).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(v.state(), InstanceState::Created);
        assert_eq!(v.version(), 1);
        assert_eq!(v.body(), before);
    }

    #[test]
    fn test_delete_removes_payload() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let collaborators = Collaborators {
            blobs: blobs.clone(),
            ..Collaborators::in_memory()
        };
        let ctx = Context::open(ChoreoConfig::default(), collaborators).unwrap();
        let values = DataValues::new(Arc::clone(&ctx));
        let v = values.create("total", "svc1", "number", None).unwrap();
        values.set_data(v.id(), Some(vec![9; 16])).unwrap();
        assert_eq!(blobs.len(), 1);

        values.delete(v.id()).unwrap();
        assert_eq!(v.state(), InstanceState::Deleted);
        assert!(blobs.is_empty());
        assert!(values.get(v.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_archived_value_rejects_payload() {
        let ctx = Context::in_memory().unwrap();
        let values = DataValues::new(ctx);
        let v = values.create("total", "svc1", "number", None).unwrap();
        values.archive(v.id()).unwrap();
        let err = values.set_data(v.id(), Some(vec![1])).unwrap_err();
        assert!(err.is_lifecycle_violation());
        values.unarchive(v.id()).unwrap();
        assert_eq!(v.state(), InstanceState::Created);
    }
}
