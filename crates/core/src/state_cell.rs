//! StateCell: CAS-based versioned lifecycle state
//!
//! ## Design Principles
//!
//! 1. **Versioned Updates**: Every successful transition increments the version.
//! 2. **CAS Semantics**: Compare-and-swap ensures concurrent transitions never interleave.
//! 3. **Guarded**: The target state is computed by the flavor's transition table;
//!    an illegal operation fails before any write is attempted.
//!
//! ## Word Layout
//!
//! The whole cell is one `AtomicU64`:
//!
//! ```text
//! [ version: 48 bits ][ state before last archive: 8 bits ][ state: 8 bits ]
//! ```
//!
//! Reads are lock-free snapshots. A transition loads the word, consults the
//! guard, and attempts a single compare-exchange; a lost race re-reads and
//! retries, up to the configured budget.

use crate::lifecycle::LifecycleState;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

const STATE_MASK: u64 = 0xFF;
const VERSION_SHIFT: u32 = 16;

/// Snapshot of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSnapshot<S> {
    /// Current state
    pub state: S,
    /// State held when the entity was last archived
    pub before_archive: S,
    /// Version number (monotonically increasing, starts at 1)
    pub version: u64,
}

/// Successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    /// State before the transition
    pub from: S,
    /// State after the transition
    pub to: S,
    /// Version after the transition
    pub version: u64,
}

/// Why a transition did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError<S: LifecycleState> {
    /// Guard rejected the operation; nothing was written
    Illegal {
        /// State the cell was in
        state: S,
        /// Rejected operation
        op: S::Op,
    },
    /// Every attempt lost a compare-exchange race
    Contended {
        /// Attempts made
        attempts: u32,
    },
    /// Version did not match the caller's expectation
    VersionMismatch {
        /// Expected version
        expected: u64,
        /// Actual version found
        actual: u64,
    },
}

/// CAS-based versioned lifecycle cell
///
/// ## Example
///
/// ```rust
/// use choreo_core::{ModelOp, ModelState, StateCell};
///
/// let cell = StateCell::new(ModelState::Initial);
/// assert_eq!(cell.version(), 1);
///
/// let t = cell.transition(ModelOp::Ready, 8).unwrap();
/// assert_eq!(t.to, ModelState::Ready);
/// assert_eq!(t.version, 2);
///
/// // READY cannot become READY again
/// assert!(cell.transition(ModelOp::Ready, 8).is_err());
/// assert_eq!(cell.state(), ModelState::Ready);
/// ```
pub struct StateCell<S: LifecycleState> {
    word: AtomicU64,
    _flavor: PhantomData<S>,
}

impl<S: LifecycleState> StateCell<S> {
    /// Create a cell in the flavor's initial state with version 1
    pub fn new(initial: S) -> Self {
        Self::restore(initial, initial, 1)
    }

    /// Recreate a cell from persisted parts
    pub fn restore(state: S, before_archive: S, version: u64) -> Self {
        Self {
            word: AtomicU64::new(pack(state, before_archive, version)),
            _flavor: PhantomData,
        }
    }

    /// Read the current snapshot
    pub fn load(&self) -> CellSnapshot<S> {
        unpack(self.word.load(Ordering::Acquire))
    }

    /// Current state
    pub fn state(&self) -> S {
        self.load().state
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.load().version
    }

    /// Apply `op` with bounded retries on contention
    ///
    /// Makes at most `max_retries + 1` attempts. The guard is re-evaluated on
    /// every attempt against the freshly loaded state, so a racing transition
    /// that makes `op` illegal surfaces as `Illegal`, not as `Contended`.
    pub fn transition(
        &self,
        op: S::Op,
        max_retries: u32,
    ) -> Result<Transition<S>, TransitionError<S>> {
        self.transition_with(op, max_retries, || {})
    }

    /// `transition` with a hook run between the load and the exchange
    fn transition_with(
        &self,
        op: S::Op,
        max_retries: u32,
        mut before_exchange: impl FnMut(),
    ) -> Result<Transition<S>, TransitionError<S>> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let raw = self.word.load(Ordering::Acquire);
            before_exchange();
            match self.try_apply(raw, op) {
                Ok(t) => return Ok(t),
                Err(Attempt::Illegal(state)) => {
                    return Err(TransitionError::Illegal { state, op });
                }
                Err(Attempt::Lost) => {
                    if attempts > max_retries {
                        return Err(TransitionError::Contended { attempts });
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Apply `op` only if the cell is still at `expected_version`
    pub fn compare_and_transition(
        &self,
        expected_version: u64,
        op: S::Op,
    ) -> Result<Transition<S>, TransitionError<S>> {
        let raw = self.word.load(Ordering::Acquire);
        let current = unpack::<S>(raw);
        if current.version != expected_version {
            return Err(TransitionError::VersionMismatch {
                expected: expected_version,
                actual: current.version,
            });
        }
        match self.try_apply(raw, op) {
            Ok(t) => Ok(t),
            Err(Attempt::Illegal(state)) => Err(TransitionError::Illegal { state, op }),
            Err(Attempt::Lost) => Err(TransitionError::VersionMismatch {
                expected: expected_version,
                actual: self.version(),
            }),
        }
    }

    fn try_apply(&self, raw: u64, op: S::Op) -> Result<Transition<S>, Attempt<S>> {
        let current = unpack::<S>(raw);
        let to = current
            .state
            .target(op, current.before_archive)
            .ok_or(Attempt::Illegal(current.state))?;
        let before_archive = if to.is_archived() {
            current.state
        } else {
            current.before_archive
        };
        let version = current.version + 1;
        let next = pack(to, before_archive, version);
        self.word
            .compare_exchange(raw, next, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Transition {
                from: current.state,
                to,
                version,
            })
            .map_err(|_| Attempt::Lost)
    }
}

impl<S: LifecycleState> std::fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.load();
        f.debug_struct("StateCell")
            .field("state", &snap.state)
            .field("version", &snap.version)
            .finish()
    }
}

enum Attempt<S> {
    Illegal(S),
    Lost,
}

fn pack<S: LifecycleState>(state: S, before_archive: S, version: u64) -> u64 {
    (version << VERSION_SHIFT) | ((before_archive.encode() as u64) << 8) | state.encode() as u64
}

fn unpack<S: LifecycleState>(raw: u64) -> CellSnapshot<S> {
    let decode = |byte: u64| {
        S::decode(byte as u8).expect("state cell word only ever holds encoded states")
    };
    CellSnapshot {
        state: decode(raw & STATE_MASK),
        before_archive: decode((raw >> 8) & STATE_MASK),
        version: raw >> VERSION_SHIFT,
    }
}
