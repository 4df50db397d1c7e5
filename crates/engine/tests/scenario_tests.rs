//! End-to-end scenarios
//!
//! The invoice walk-through, value reference rules and protection of
//! model-owned entities, driven only through the public facades.

use choreo_core::{
    CorrelationProperties, Error, InstanceState, LifecycleEvent, LifecycleListener, ModelState,
};
use choreo_engine::{
    Context, DataDependencyGraphs, DataElementInstances, DataElements, DataObjectInstances,
    DataObjects, DataValues,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Audit {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl LifecycleListener for Audit {
    fn on_event(&self, event: &LifecycleEvent) {
        self.events.lock().push(event.clone());
    }
}

#[test]
fn test_invoice_scenario() {
    let ctx = Context::in_memory().unwrap();
    let audit = Arc::new(Audit::default());
    ctx.subscribe(audit.clone());

    let objects = DataObjects::new(Arc::clone(&ctx));
    let elements = DataElements::new(Arc::clone(&ctx));
    let object_instances = DataObjectInstances::new(Arc::clone(&ctx));
    let element_instances = DataElementInstances::new(Arc::clone(&ctx));
    let values = DataValues::new(Arc::clone(&ctx));

    // Register the object and its element
    let invoice = objects.create("hahnml", "invoice").unwrap();
    elements
        .create(invoice.id(), "hahnml", "total", "number", None, false)
        .unwrap();

    // Instantiate for one choreography run
    let run = CorrelationProperties::from_pairs([("orderId", "42")]);
    let instance = objects.instantiate(invoice.id(), "svc1", run).unwrap();
    assert_eq!(instance.state(), InstanceState::Created);
    assert_eq!(ctx.registry().object_instances().len(), 1);

    let slots = object_instances.element_instances(instance.id()).unwrap();
    assert_eq!(slots.len(), 1);
    let slot = &slots[0];
    assert_eq!(slot.state(), InstanceState::Created);
    assert_eq!(slot.read(|b| b.created_by.clone()), "svc1");

    // Attach a value with a payload
    let total = values.create("total", "svc1", "number", None).unwrap();
    values.set_data(total.id(), Some(b"99.50".to_vec())).unwrap();
    values.associate(total.id(), slot.id()).unwrap();
    assert_eq!(slot.state(), InstanceState::Initialized);
    assert_eq!(
        element_instances.values(slot.id()).unwrap()[0].id(),
        total.id()
    );

    // Delete the object: every descendant goes with it
    objects.delete(invoice.id()).unwrap();
    ctx.flush_events();
    assert!(ctx.registry().objects().is_empty());
    assert!(ctx.registry().elements().is_empty());
    assert!(ctx.registry().object_instances().is_empty());
    assert!(ctx.registry().element_instances().is_empty());

    // The value survives and still records where it was used
    assert_eq!(total.state(), InstanceState::Initialized);
    let err = values.delete(total.id()).unwrap_err();
    assert!(matches!(err, Error::ValueInUse { references: 1, .. }));

    values.remove_association(total.id(), slot.id()).unwrap();
    values.delete(total.id()).unwrap();
    ctx.flush_events();
    assert!(ctx.registry().values().is_empty());

    // Every deletion was announced
    let deletions = audit
        .events
        .lock()
        .iter()
        .filter(|e| e.is_deletion())
        .count();
    assert_eq!(deletions, 5);
}

#[test]
fn test_value_in_use_until_unassociated() {
    let ctx = Context::in_memory().unwrap();
    let objects = DataObjects::new(Arc::clone(&ctx));
    let elements = DataElements::new(Arc::clone(&ctx));
    let values = DataValues::new(Arc::clone(&ctx));

    let obj = objects.create("hahnml", "invoice").unwrap();
    elements
        .create(obj.id(), "hahnml", "lines", "json", None, true)
        .unwrap();
    let inst = objects
        .instantiate(
            obj.id(),
            "svc1",
            CorrelationProperties::from_pairs([("orderId", "7")]),
        )
        .unwrap();
    let slot = inst.read(|b| b.element_instances[0]);

    let v = values.create("line", "svc1", "json", None).unwrap();
    values.associate(v.id(), slot).unwrap();
    assert_eq!(values.associations(v.id()).unwrap().len(), 1);

    match values.delete(v.id()) {
        Err(Error::ValueInUse { id, references }) => {
            assert_eq!(id, v.uuid());
            assert_eq!(references, 1);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(v.state(), InstanceState::Created);

    values.remove_association(v.id(), slot).unwrap();
    let slot = ctx.registry().element_instances().get(slot).unwrap();
    assert_eq!(slot.state(), InstanceState::Created);
    assert!(slot.read(|b| b.values.is_empty()));

    values.delete(v.id()).unwrap();
    assert_eq!(v.state(), InstanceState::Deleted);
}

#[test]
fn test_protected_element_rejects_edits() {
    let ctx = Context::in_memory().unwrap();
    let graphs = DataDependencyGraphs::new(Arc::clone(&ctx));
    let elements = DataElements::new(Arc::clone(&ctx));
    let graph = graphs.create("hahnml", "shop", "urn:shop").unwrap();
    graphs
        .set_source(
            graph.id(),
            br#"{"namespace": "urn:shop", "name": "orders", "objects": [
                {"name": "invoice", "elements": [
                    {"name": "scan", "type": "binary", "contentType": "image/png"}
                ]}
            ]}"#,
        )
        .unwrap();

    let scan = ctx.registry().elements().all().pop().unwrap();
    let before = scan.body();

    for result in [
        elements.rename(scan.id(), "picture"),
        elements.set_type(scan.id(), "string"),
        elements.set_content_type(scan.id(), "image/jpeg"),
        elements.delete(scan.id()),
    ] {
        assert!(matches!(result, Err(Error::IllegalModification { .. })));
    }
    assert_eq!(scan.body(), before);
    assert_eq!(scan.state(), ModelState::Ready);
    assert_eq!(scan.version(), 2);
}

#[test]
fn test_compilation_failure_reports_every_issue() {
    let ctx = Context::in_memory().unwrap();
    let graphs = DataDependencyGraphs::new(Arc::clone(&ctx));
    let graph = graphs.create("hahnml", "shop", "urn:shop").unwrap();

    let source = br#"{
        "namespace": "urn:shop",
        "name": "orders",
        "objects": [
            { "name": "invoice", "elements": [
                { "name": "total", "type": "money" },
                { "name": "total", "type": "number" }
            ] },
            { "name": "receipt", "elements": [] }
        ]
    }"#;
    let err = graphs.set_source(graph.id(), source).unwrap_err();
    let issues = match err {
        Error::CompilationFailed { issues, .. } => issues,
        other => panic!("unexpected error: {other}"),
    };
    let codes: Vec<_> = issues.iter().map(|i| i.code.as_str()).collect();
    assert!(codes.contains(&"E_UNKNOWN_TYPE"));
    assert!(codes.contains(&"E_DUPLICATE_ELEMENT"));
    assert!(codes.contains(&"E_EMPTY_OBJECT"));
    assert!(issues.iter().all(|i| i.position.is_some()));

    assert_eq!(graph.state(), ModelState::Initial);
    assert!(ctx.registry().models().is_empty());
    assert!(ctx.registry().objects().is_empty());
}
