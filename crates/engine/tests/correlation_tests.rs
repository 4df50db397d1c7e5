//! Correlation resolver tests
//!
//! Matching is exact map equality; supersets and subsets never match, and
//! more than one live match is reported rather than resolved.

use choreo_core::{CorrelationProperties, Error};
use choreo_engine::{Context, DataModels, DataObjectInstances, DataObjects, DataValues, Resolver};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const ORDERS: &[u8] = br#"{
    "namespace": "urn:shop",
    "name": "orders",
    "objects": [
        { "name": "invoice", "elements": [
            { "name": "total", "type": "number" },
            { "name": "lines", "type": "json", "collection": true }
        ] }
    ]
}"#;

struct Shop {
    ctx: Arc<Context>,
    objects: DataObjects,
    resolver: Resolver,
    invoice: choreo_core::DataObjectId,
}

fn shop() -> Shop {
    let ctx = Context::in_memory().unwrap();
    let models = DataModels::new(Arc::clone(&ctx));
    let model = models.create("hahnml", "urn:shop", "orders").unwrap();
    models.compile(model.id(), ORDERS).unwrap();
    let invoice = models.objects(model.id()).unwrap()[0].id();
    Shop {
        objects: DataObjects::new(Arc::clone(&ctx)),
        resolver: Resolver::new(Arc::clone(&ctx)),
        ctx,
        invoice,
    }
}

fn props(pairs: &[(&str, &str)]) -> CorrelationProperties {
    CorrelationProperties::from_pairs(pairs.iter().copied())
}

#[test]
fn test_superset_and_subset_never_match() {
    let shop = shop();
    let narrow = shop
        .objects
        .instantiate(shop.invoice, "svc1", props(&[("a", "1")]))
        .unwrap();
    let wide = shop
        .objects
        .instantiate(shop.invoice, "svc1", props(&[("a", "1"), ("b", "2")]))
        .unwrap();
    assert_ne!(narrow.id(), wide.id());

    let found = shop
        .resolver
        .find_object_instances("urn:shop", "orders", "invoice", &props(&[("a", "1")]));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), narrow.id());

    let resolved = shop
        .resolver
        .resolve_object_instance(
            "urn:shop",
            "orders",
            "invoice",
            &props(&[("a", "1"), ("b", "2")]),
        )
        .unwrap();
    assert_eq!(resolved.id(), wide.id());

    assert!(!shop
        .resolver
        .object_instance_exists("urn:shop", "orders", "invoice", &props(&[("b", "2")])));
}

#[test]
fn test_scope_filters_by_model_and_object() {
    let shop = shop();
    let run = props(&[("orderId", "42")]);
    shop.objects
        .instantiate(shop.invoice, "svc1", run.clone())
        .unwrap();

    let resolver = &shop.resolver;
    assert!(resolver.object_instance_exists("urn:shop", "orders", "invoice", &run));
    assert!(!resolver.object_instance_exists("urn:other", "orders", "invoice", &run));
    assert!(!resolver.object_instance_exists("urn:shop", "billing", "invoice", &run));
    assert!(!resolver.object_instance_exists("urn:shop", "orders", "receipt", &run));

    let err = resolver
        .resolve_object_instance("urn:shop", "orders", "receipt", &run)
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(resolver.element_instance_exists("urn:shop", "orders", "invoice", "total", &run));
    assert!(!resolver.element_instance_exists("urn:shop", "orders", "invoice", "tax", &run));
}

#[test]
fn test_archived_instances_are_not_live() {
    let shop = shop();
    let run = props(&[("orderId", "42")]);
    let inst = shop
        .objects
        .instantiate(shop.invoice, "svc1", run.clone())
        .unwrap();
    DataObjectInstances::new(Arc::clone(&shop.ctx))
        .archive(inst.id())
        .unwrap();

    assert!(!shop
        .resolver
        .object_instance_exists("urn:shop", "orders", "invoice", &run));
    assert!(!shop
        .resolver
        .element_instance_exists("urn:shop", "orders", "invoice", "total", &run));

    // A fresh instance is created for the same run
    let again = shop.objects.instantiate(shop.invoice, "svc1", run).unwrap();
    assert_ne!(again.id(), inst.id());
}

#[test]
fn test_duplicate_live_instances_are_ambiguous() {
    let shop = shop();
    let run = props(&[("orderId", "42")]);
    let first = shop
        .objects
        .instantiate(shop.invoice, "svc1", run.clone())
        .unwrap();
    let instances = DataObjectInstances::new(Arc::clone(&shop.ctx));

    // Archive, instantiate again, then bring the first one back
    instances.archive(first.id()).unwrap();
    shop.objects
        .instantiate(shop.invoice, "svc1", run.clone())
        .unwrap();
    instances.unarchive(first.id()).unwrap();

    let err = shop
        .resolver
        .resolve_object_instance("urn:shop", "orders", "invoice", &run)
        .unwrap_err();
    match err {
        Error::AmbiguousCorrelation { scope, matches } => {
            assert_eq!(scope, "urn:shop:orders/invoice");
            assert_eq!(matches, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        shop.objects.instantiate(shop.invoice, "svc1", run),
        Err(Error::AmbiguousCorrelation { .. })
    ));
}

#[test]
fn test_value_access_by_index() {
    let shop = shop();
    let run = props(&[("orderId", "42")]);
    shop.objects
        .instantiate(shop.invoice, "svc1", run.clone())
        .unwrap();
    let lines = shop
        .resolver
        .resolve_element_instance("urn:shop", "orders", "invoice", "lines", &run)
        .unwrap();
    let total = shop
        .resolver
        .resolve_element_instance("urn:shop", "orders", "invoice", "total", &run)
        .unwrap();

    assert!(shop
        .resolver
        .is_collection_element(lines.read(|b| b.element))
        .unwrap());
    assert!(!shop
        .resolver
        .is_collection_element(total.read(|b| b.element))
        .unwrap());

    let values = DataValues::new(Arc::clone(&shop.ctx));
    let a = values.create("line", "svc1", "json", None).unwrap();
    let b = values.create("line", "svc1", "json", None).unwrap();
    values.associate(a.id(), lines.id()).unwrap();
    values.associate(b.id(), lines.id()).unwrap();

    assert_eq!(shop.resolver.get_data_value(lines.id(), 0).unwrap().id(), a.id());
    assert_eq!(shop.resolver.get_data_value(lines.id(), 1).unwrap().id(), b.id());
    assert!(shop
        .resolver
        .get_data_value(lines.id(), 2)
        .unwrap_err()
        .is_not_found());
}

fn correlation_map() -> impl Strategy<Value = BTreeMap<String, String>> {
    proptest::collection::btree_map("[a-c]", "[0-2]", 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_resolver_returns_only_exact_matches(
        stored in proptest::collection::vec(correlation_map(), 1..6),
        query in correlation_map(),
    ) {
        let shop = shop();
        for map in &stored {
            shop.objects
                .instantiate(shop.invoice, "svc1", map.clone().into_iter().collect())
                .unwrap();
        }
        let query: CorrelationProperties = query.into_iter().collect();
        let found = shop
            .resolver
            .find_object_instances("urn:shop", "orders", "invoice", &query);

        // Instantiation is idempotent per map, so at most one can match
        prop_assert!(found.len() <= 1);
        for inst in &found {
            prop_assert_eq!(inst.read(|b| b.correlation.clone()), query.clone());
        }
        let expected = stored
            .iter()
            .any(|m| m.clone().into_iter().collect::<CorrelationProperties>() == query);
        prop_assert_eq!(found.len() == 1, expected);
    }
}
