//! Entity: one managed object of any kind
//!
//! ## Layout
//!
//! An [`Entity`] is a typed identifier plus three independently guarded
//! parts:
//!
//! - a lock-free [`StateCell`] holding the lifecycle state and version
//! - an operation lock, held for the whole of a mutating operation
//!   (including any cascade over children)
//! - the kind-specific body behind a leaf `RwLock`
//!
//! ## Lock Order
//!
//! Operation locks are only ever taken top-down:
//!
//! ```text
//! graph -> model -> object -> { element, object instance } -> element instance -> value
//! ```
//!
//! Body locks are leaves: no code acquires another lock while holding one.
//! Every transition of an entity happens under its own operation lock.

use choreo_core::{
    CellSnapshot, EntityId, EntityKind, EntityRecord, EntityState, Error, LifecycleState, Result,
    StateCell, Transition, TransitionError,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Kind-specific part of an entity
pub trait EntityBody:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identifier type of this kind
    type Id: EntityId;
    /// Lifecycle flavor of this kind
    type State: LifecycleState;

    /// Name used by list filters
    fn name(&self) -> Option<&str> {
        None
    }

    /// Entity name (choreography participant) used by list filters
    fn entity_name(&self) -> Option<&str> {
        None
    }

    /// Owning entity, if any
    fn parent(&self) -> Option<Uuid> {
        None
    }
}

/// A managed entity
pub struct Entity<B: EntityBody> {
    id: B::Id,
    cell: StateCell<B::State>,
    op_lock: Mutex<()>,
    body: RwLock<B>,
}

impl<B: EntityBody> Entity<B> {
    /// Create an entity in its flavor's initial state
    pub fn new(id: B::Id, body: B) -> Self {
        Self {
            id,
            cell: StateCell::new(B::State::INITIAL),
            op_lock: Mutex::new(()),
            body: RwLock::new(body),
        }
    }

    /// Identifier
    pub fn id(&self) -> B::Id {
        self.id
    }

    /// Raw identifier
    pub fn uuid(&self) -> Uuid {
        self.id.as_uuid()
    }

    /// Entity kind
    pub fn kind(&self) -> EntityKind {
        B::Id::KIND
    }

    /// Current lifecycle state
    pub fn state(&self) -> B::State {
        self.cell.state()
    }

    /// Current lifecycle version
    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    /// Consistent snapshot of state, pre-archive state and version
    pub fn snapshot(&self) -> CellSnapshot<B::State> {
        self.cell.load()
    }

    /// Copy of the body
    pub fn body(&self) -> B {
        self.body.read().clone()
    }

    /// Read part of the body
    pub fn read<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.body.read())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.body.write())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock()
    }

    /// Fail with `LifecycleViolation` unless the state is one of `allowed`
    pub(crate) fn ensure_state(&self, allowed: &[B::State], operation: &str) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(self.violation(state, operation))
        }
    }

    pub(crate) fn violation(&self, state: B::State, operation: &str) -> Error {
        Error::LifecycleViolation {
            kind: self.kind(),
            id: self.uuid(),
            state: state.into(),
            operation: operation.to_string(),
        }
    }

    /// Run one guarded transition against the cell
    pub(crate) fn transition(
        &self,
        op: <B::State as LifecycleState>::Op,
        max_retries: u32,
    ) -> Result<Transition<B::State>> {
        self.cell
            .transition(op, max_retries)
            .map_err(|e| self.transition_error(e, op))
    }

    /// State `op` would lead to from the current state, if the guard allows it
    pub(crate) fn target(&self, op: <B::State as LifecycleState>::Op) -> Option<B::State> {
        let snap = self.cell.load();
        snap.state.target(op, snap.before_archive)
    }

    fn transition_error(
        &self,
        e: TransitionError<B::State>,
        op: <B::State as LifecycleState>::Op,
    ) -> Error {
        match e {
            TransitionError::Illegal { state, op } => self.violation(state, &op.to_string()),
            TransitionError::Contended { attempts } => Error::StateTransitionExhausted {
                kind: self.kind(),
                id: self.uuid(),
                operation: op.to_string(),
                attempts,
            },
            // Only compare_and_transition reports a version mismatch
            TransitionError::VersionMismatch { .. } => Error::StateTransitionExhausted {
                kind: self.kind(),
                id: self.uuid(),
                operation: op.to_string(),
                attempts: 1,
            },
        }
    }

    /// Persisted form
    pub fn to_record(&self) -> Result<EntityRecord> {
        let snap = self.cell.load();
        Ok(EntityRecord {
            kind: self.kind(),
            id: self.uuid(),
            state: snap.state.into(),
            before_archive: snap.before_archive.into(),
            version: snap.version,
            body: serde_json::to_value(&*self.body.read())?,
        })
    }

    /// Rebuild an entity from its persisted form
    ///
    /// # Errors
    /// `Corruption` if the record belongs to another kind or flavor.
    pub fn from_record(record: EntityRecord) -> Result<Self> {
        if record.kind != B::Id::KIND {
            return Err(Error::Corruption(format!(
                "record {} is a {}, expected {}",
                record.id,
                record.kind,
                B::Id::KIND
            )));
        }
        let state = decode_state::<B::State>(record.state, record.id)?;
        let before_archive = decode_state::<B::State>(record.before_archive, record.id)?;
        let body: B = serde_json::from_value(record.body)?;
        Ok(Self {
            id: B::Id::from_uuid(record.id),
            cell: StateCell::restore(state, before_archive, record.version),
            op_lock: Mutex::new(()),
            body: RwLock::new(body),
        })
    }
}

fn decode_state<S: LifecycleState>(state: EntityState, id: Uuid) -> Result<S> {
    let raw = match state {
        EntityState::Model(s) => s.encode(),
        EntityState::Instance(s) => s.encode(),
    };
    S::decode(raw)
        .filter(|s| Into::<EntityState>::into(*s) == state)
        .ok_or_else(|| {
            Error::Corruption(format!("record {} carries a state of the wrong flavor", id))
        })
}

impl<B: EntityBody> fmt::Debug for Entity<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind())
            .field("id", &self.id)
            .field("cell", &self.cell)
            .field("body", &*self.body.read())
            .finish()
    }
}
