//! State guard tests
//!
//! Random operation sequences against the facades. Every operation the
//! current state does not permit must fail with `LifecycleViolation` and
//! leave state and version untouched; every permitted one must land in the
//! state the transition table names.

use choreo_core::{InstanceState, ModelState};
use choreo_engine::{Context, DataElements, DataObjects, DataValues};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Instance flavor (DataValue)
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum ValueOp {
    Attach,
    Detach,
    Archive,
    Unarchive,
}

fn value_op() -> impl Strategy<Value = ValueOp> {
    prop_oneof![
        Just(ValueOp::Attach),
        Just(ValueOp::Detach),
        Just(ValueOp::Archive),
        Just(ValueOp::Unarchive),
    ]
}

/// Expected (state, pre-archive state) after `op`, or `None` if illegal
fn expected_value(
    state: InstanceState,
    before_archive: InstanceState,
    op: ValueOp,
) -> Option<(InstanceState, InstanceState)> {
    use InstanceState::*;
    match (state, op) {
        (Created | Initialized, ValueOp::Attach) => Some((Initialized, before_archive)),
        (Created | Initialized, ValueOp::Detach) => Some((Created, before_archive)),
        (Created | Initialized, ValueOp::Archive) => Some((Archived, state)),
        (Archived, ValueOp::Unarchive) => Some((before_archive, before_archive)),
        _ => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_value_guard(ops in proptest::collection::vec(value_op(), 1..24)) {
        let ctx = Context::in_memory().unwrap();
        let values = DataValues::new(Arc::clone(&ctx));
        let v = values.create("v", "svc1", "string", None).unwrap();

        let mut state = InstanceState::Created;
        let mut before_archive = InstanceState::Created;

        for op in ops {
            let version = v.version();
            let result = match op {
                ValueOp::Attach => values.set_data(v.id(), Some(vec![1, 2])),
                ValueOp::Detach => values.set_data(v.id(), None),
                ValueOp::Archive => values.archive(v.id()),
                ValueOp::Unarchive => values.unarchive(v.id()),
            };
            match expected_value(state, before_archive, op) {
                Some((next, archived_from)) => {
                    prop_assert!(result.is_ok(), "{:?} from {:?}: {:?}", op, state, result);
                    state = next;
                    before_archive = archived_from;
                }
                None => {
                    let err = result.unwrap_err();
                    prop_assert!(err.is_lifecycle_violation(), "{:?} from {:?}: {}", op, state, err);
                    prop_assert_eq!(v.version(), version);
                }
            }
            prop_assert_eq!(v.state(), state);
        }
    }
}

// ============================================================================
// Model-object flavor (DataObject / DataElement)
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum ObjectOp {
    Archive,
    Unarchive,
    Instantiate,
    ArchiveElement,
    UnarchiveElement,
}

fn object_op() -> impl Strategy<Value = ObjectOp> {
    prop_oneof![
        Just(ObjectOp::Archive),
        Just(ObjectOp::Unarchive),
        Just(ObjectOp::Instantiate),
        Just(ObjectOp::ArchiveElement),
        Just(ObjectOp::UnarchiveElement),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_object_guard(ops in proptest::collection::vec(object_op(), 1..24)) {
        let ctx = Context::in_memory().unwrap();
        let objects = DataObjects::new(Arc::clone(&ctx));
        let elements = DataElements::new(Arc::clone(&ctx));
        let obj = objects.create("hahnml", "invoice").unwrap();
        let el = elements
            .create(obj.id(), "hahnml", "total", "number", None, false)
            .unwrap();

        let mut object_state = ModelState::Ready;
        let mut element_state = ModelState::Ready;
        let mut runs = 0u32;

        for op in ops {
            let versions = (obj.version(), el.version());
            let (result, legal) = match op {
                ObjectOp::Archive => (
                    objects.archive(obj.id()),
                    object_state == ModelState::Ready && element_state == ModelState::Ready,
                ),
                ObjectOp::Unarchive => (
                    objects.unarchive(obj.id()),
                    object_state == ModelState::Archived && element_state == ModelState::Archived,
                ),
                ObjectOp::Instantiate => {
                    runs += 1;
                    let run = choreo_core::CorrelationProperties::from_pairs([("run", runs.to_string())]);
                    (
                        objects.instantiate(obj.id(), "svc1", run).map(|_| ()),
                        object_state == ModelState::Ready,
                    )
                }
                ObjectOp::ArchiveElement => (
                    elements.archive(el.id()),
                    element_state == ModelState::Ready,
                ),
                ObjectOp::UnarchiveElement => (
                    elements.unarchive(el.id()),
                    element_state == ModelState::Archived,
                ),
            };

            if legal {
                prop_assert!(result.is_ok(), "{:?}: {:?}", op, result);
                match op {
                    ObjectOp::Archive => {
                        object_state = ModelState::Archived;
                        element_state = ModelState::Archived;
                    }
                    ObjectOp::Unarchive => {
                        object_state = ModelState::Ready;
                        element_state = ModelState::Ready;
                    }
                    // The object follows its only element between READY and INITIAL
                    ObjectOp::ArchiveElement => {
                        element_state = ModelState::Archived;
                        if object_state == ModelState::Ready {
                            object_state = ModelState::Initial;
                        }
                    }
                    ObjectOp::UnarchiveElement => {
                        element_state = ModelState::Ready;
                        if object_state == ModelState::Initial {
                            object_state = ModelState::Ready;
                        }
                    }
                    ObjectOp::Instantiate => {}
                }
            } else {
                let err = result.unwrap_err();
                prop_assert!(err.is_lifecycle_violation(), "{:?}: {}", op, err);
                prop_assert_eq!((obj.version(), el.version()), versions);
            }
            prop_assert_eq!(obj.state(), object_state);
            prop_assert_eq!(el.state(), element_state);
        }
    }
}

// ============================================================================
// Deleted entities
// ============================================================================

#[test]
fn test_deleted_entities_stay_deleted() {
    let ctx = Context::in_memory().unwrap();
    let values = DataValues::new(Arc::clone(&ctx));
    let v = values.create("v", "svc1", "string", None).unwrap();
    values.delete(v.id()).unwrap();

    // Gone from the registry; the held handle still reports DELETED
    assert_eq!(v.state(), InstanceState::Deleted);
    assert!(values.archive(v.id()).unwrap_err().is_not_found());
    assert!(values.set_data(v.id(), Some(vec![1])).unwrap_err().is_not_found());
    assert!(values.delete(v.id()).unwrap_err().is_not_found());
    assert_eq!(v.state(), InstanceState::Deleted);
}
