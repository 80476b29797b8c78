mod common;

use common::mock_api;
use pretty_assertions::assert_eq;
use restmodel_core::transport::mock::MockReply;
use restmodel_core::{
    Api, CommonApi, DefaultPacker, Define, Hook, Method, Model, OpSet, Record, Related, Relation,
    RestError, ScopeApi,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn related_record(record: &Record, name: &str) -> Record {
    record
        .relation(name)
        .unwrap()
        .and_then(|related| related.as_record())
        .unwrap()
}

fn pks(record: &Record, name: &str) -> Vec<Value> {
    let related = record.relation(name).unwrap().unwrap();
    related
        .as_collection()
        .unwrap()
        .records()
        .iter()
        .filter_map(Record::pk)
        .collect()
}

fn bike_with_parts(api: &Api, relation: Relation) -> Model {
    api.define("Part").url("/parts").build().unwrap();
    api.define("Bike")
        .url("/bikes")
        .has_many("parts", relation)
        .build()
        .unwrap()
}

// ── has_many ─────────────────────────────────────────────────────

#[tokio::test]
async fn has_many_is_a_nested_collection() {
    let (api, transport) = mock_api();
    transport.on(
        Method::Get,
        "/bikes/1/parts",
        MockReply::ok(json!([{"id": 7, "name": "fork"}])),
    );
    let bike = bike_with_parts(&api, Relation::to("Part").param("active", true));
    let record = bike.new_record(Some(json!(1))).unwrap();

    let parts = record.relation("parts").unwrap().unwrap();
    let parts = parts.as_collection().unwrap().clone();
    assert_eq!(parts.url().as_deref(), Some("/bikes/1/parts"));

    parts.fetch(None).unwrap().as_promise().await.unwrap();

    assert_eq!(transport.last_request().unwrap().params.get("active"), Some(&json!(true)));
    let part = parts.get(0).unwrap();
    assert_eq!(part.url().as_deref(), Some("/bikes/1/parts/7"));
    assert_eq!(part.model().name(), "Part");
}

#[test]
fn has_many_decodes_inline_items_with_inverse() {
    let (api, _) = mock_api();
    let bike = bike_with_parts(&api, Relation::to("Part").inverse("bike"));

    let record = bike
        .build_raw(&json!({"id": 1, "parts": [{"id": 7}, {"id": 8}]}), OpSet::READ)
        .unwrap();

    assert_eq!(record.get("parts"), None);
    assert_eq!(pks(&record, "parts"), vec![json!(7), json!(8)]);
    let related = record.relation("parts").unwrap().unwrap();
    let first = related.as_collection().unwrap().get(0).unwrap();
    assert_eq!(related_record(&first, "bike"), record);
}

#[test]
fn has_many_is_never_sent() {
    let (api, _) = mock_api();
    let bike = bike_with_parts(&api, Relation::to("Part"));
    let record = bike
        .build_raw(&json!({"id": 1, "brand": "Trek", "parts": [{"id": 7}]}), OpSet::READ)
        .unwrap();

    assert_eq!(record.encode(OpSet::CREATE).unwrap(), json!({"id": 1, "brand": "Trek"}));
    assert_eq!(record.encode(OpSet::UPDATE).unwrap(), json!({"id": 1, "brand": "Trek"}));
}

#[test]
fn relation_hooks_are_registered_on_the_related_collection() {
    let (api, _) = mock_api();
    let added = Arc::new(AtomicUsize::new(0));
    let counter = added.clone();
    let bike = bike_with_parts(
        &api,
        Relation::to("Part").on(Hook::AfterAdd, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    bike.build_raw(&json!({"id": 1, "parts": [{"id": 7}, {"id": 8}]}), OpSet::READ)
        .unwrap();

    assert_eq!(added.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_targets_fail_on_first_use() {
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .url("/bikes")
        .has_many("parts", Relation::to("Nope"))
        .build()
        .unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();

    let err = record.relation("parts").unwrap_err();
    assert!(matches!(err, RestError::UnknownModel(name) if name == "Nope"));
}

#[test]
fn dotted_relation_names_are_rejected() {
    let (api, _) = mock_api();
    let err = api
        .define("Bike")
        .has_many("info.parts", Relation::to("Part"))
        .build()
        .unwrap_err();
    assert!(matches!(err, RestError::Definition(_)));
}

// ── has_one ──────────────────────────────────────────────────────

#[tokio::test]
async fn has_one_is_a_singleton_under_the_owner() {
    let (api, transport) = mock_api();
    transport.on(Method::Get, "/bikes/1/owner", MockReply::ok(json!({"id": 3, "name": "ana"})));
    api.define("User").url("/users").build().unwrap();
    let bike = api
        .define("Bike")
        .url("/bikes")
        .has_one("owner", Relation::to("User").inverse("bike"))
        .build()
        .unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();

    let owner = related_record(&record, "owner");
    assert_eq!(owner.url().as_deref(), Some("/bikes/1/owner"));
    assert_eq!(related_record(&owner, "bike"), record);

    owner.fetch(None).unwrap().as_promise().await.unwrap();
    assert_eq!(owner.get("name"), Some(json!("ana")));
    assert_eq!(owner.url().as_deref(), Some("/bikes/1/owner"));
}

#[test]
fn has_one_decodes_inline_object() {
    let (api, _) = mock_api();
    api.define("User").url("/users").build().unwrap();
    let bike = api
        .define("Bike")
        .url("/bikes")
        .has_one("owner", Relation::to("User"))
        .build()
        .unwrap();

    let record = bike
        .build_raw(&json!({"id": 1, "owner": {"id": 3, "name": "ana"}}), OpSet::READ)
        .unwrap();

    let owner = related_record(&record, "owner");
    assert_eq!(owner.pk(), Some(json!(3)));
    assert_eq!(owner.get("name"), Some(json!("ana")));
}

#[test]
fn null_children_replace_the_previous_relation() {
    let (api, _) = mock_api();
    api.define("User").url("/users").build().unwrap();
    api.define("Part").url("/parts").build().unwrap();
    let bike = api
        .define("Bike")
        .url("/bikes")
        .has_one("owner", Relation::to("User"))
        .has_many("parts", Relation::to("Part"))
        .build()
        .unwrap();
    let record = bike
        .build_raw(
            &json!({"id": 1, "owner": {"id": 3}, "parts": [{"id": 7}]}),
            OpSet::READ,
        )
        .unwrap();
    let stale_owner = related_record(&record, "owner");

    record
        .decode(&json!({"owner": null, "parts": null}), OpSet::READ)
        .unwrap();

    let owner = related_record(&record, "owner");
    assert_ne!(owner, stale_owner);
    assert_eq!(owner.pk(), None);
    assert_eq!(owner.url().as_deref(), Some("/bikes/1/owner"));
    assert!(pks(&record, "parts").is_empty());
}

// ── belongs_to ───────────────────────────────────────────────────

fn part_with_bike(api: &Api) -> Model {
    api.define("Bike").url("/bikes").build().unwrap();
    api.define("Part")
        .url("/parts")
        .belongs_to("bike", Relation::to("Bike"))
        .build()
        .unwrap()
}

#[test]
fn belongs_to_decodes_the_key_and_encodes_it_back() {
    let (api, _) = mock_api();
    let part = part_with_bike(&api);

    let record = part.build_raw(&json!({"id": 7, "bikeId": 1}), OpSet::READ).unwrap();

    let bike = related_record(&record, "bike");
    assert_eq!(bike.pk(), Some(json!(1)));
    assert_eq!(bike.url().as_deref(), Some("/bikes/1"));
    assert!(!bike.is_resolved());
    assert_eq!(record.get("bikeId"), None);
    assert_eq!(record.encode(OpSet::UPDATE).unwrap(), json!({"id": 7, "bikeId": 1}));
}

#[test]
fn belongs_to_prefers_inline_objects() {
    let (api, _) = mock_api();
    let part = part_with_bike(&api);

    let record = part
        .build_raw(&json!({"id": 7, "bike": {"id": 1, "brand": "Trek"}}), OpSet::READ)
        .unwrap();

    let bike = related_record(&record, "bike");
    assert_eq!(bike.get("brand"), Some(json!("Trek")));
    assert_eq!(record.get("bike"), None);
    assert_eq!(record.encode(OpSet::UPDATE).unwrap()["bikeId"], json!(1));
}

#[test]
fn belongs_to_null_key_is_kept_as_null() {
    let (api, _) = mock_api();
    let part = part_with_bike(&api);

    let record = part.build_raw(&json!({"id": 7, "bikeId": null}), OpSet::READ).unwrap();

    assert_eq!(record.get("bike"), Some(Value::Null));
    assert_eq!(record.encode(OpSet::UPDATE).unwrap()["bikeId"], Value::Null);
}

#[test]
fn belongs_to_honours_a_custom_key() {
    let (api, _) = mock_api();
    api.define("Bike").url("/bikes").build().unwrap();
    let part = api
        .define("Part")
        .belongs_to("bike", Relation::to("Bike").key("frame"))
        .build()
        .unwrap();

    let record = part.build_raw(&json!({"frame": 9}), OpSet::READ).unwrap();

    assert_eq!(related_record(&record, "bike").pk(), Some(json!(9)));
    assert_eq!(record.encode(OpSet::UPDATE).unwrap(), json!({"frame": 9}));
}

#[tokio::test]
async fn belongs_to_uses_side_loaded_data() {
    let (api, transport) = mock_api();
    transport.on(
        Method::Get,
        "/parts/7",
        MockReply::ok(json!({
            "part": {"id": 7, "bikeId": 1},
            "meta": {"version": 3},
            "linked": {"bikes": [{"id": 1, "brand": "Trek"}, {"id": 2, "brand": "Giant"}]},
        })),
    );
    api.define("Bike").url("/bikes").build().unwrap();
    let part = api
        .define("Part")
        .url("/parts")
        .packer(DefaultPacker::new())
        .belongs_to("bike", Relation::to("Bike"))
        .build()
        .unwrap();

    let record = part.find(7, None).unwrap().as_promise().await.unwrap();

    let bike = related_record(&record, "bike");
    assert_eq!(bike.get("brand"), Some(json!("Trek")));
    assert_eq!(record.meta(), Some(json!({"version": 3})));
}

// ── belongs_to_many ──────────────────────────────────────────────

fn bike_with_part_refs(api: &Api) -> Model {
    api.define("Part").url("/parts").build().unwrap();
    api.define("Bike")
        .url("/bikes")
        .belongs_to_many("parts", Relation::to("Part"))
        .build()
        .unwrap()
}

#[test]
fn belongs_to_many_decodes_key_arrays() {
    let (api, _) = mock_api();
    let bike = bike_with_part_refs(&api);

    let record = bike
        .build_raw(&json!({"id": 1, "partIds": [1, 2, 3]}), OpSet::READ)
        .unwrap();

    assert_eq!(pks(&record, "parts"), vec![json!(1), json!(2), json!(3)]);
    let related = record.relation("parts").unwrap().unwrap();
    let first = related.as_collection().unwrap().get(0).unwrap();
    assert_eq!(first.url().as_deref(), Some("/parts/1"));
    assert_eq!(record.encode(OpSet::UPDATE).unwrap()["partIds"], json!([1, 2, 3]));
}

#[test]
fn belongs_to_many_decodes_inline_objects() {
    let (api, _) = mock_api();
    let bike = bike_with_part_refs(&api);

    let record = bike
        .build_raw(&json!({"id": 1, "parts": [{"id": 4, "name": "fork"}]}), OpSet::READ)
        .unwrap();

    let related = record.relation("parts").unwrap().unwrap();
    let fork = related.as_collection().unwrap().get(0).unwrap();
    assert_eq!(fork.get("name"), Some(json!("fork")));
    assert_eq!(record.encode(OpSet::UPDATE).unwrap()["partIds"], json!([4]));
}

#[test]
fn belongs_to_many_null_is_an_empty_collection() {
    let (api, _) = mock_api();
    let bike = bike_with_part_refs(&api);

    let record = bike
        .build_raw(&json!({"id": 1, "partIds": null}), OpSet::READ)
        .unwrap();

    assert!(pks(&record, "parts").is_empty());
}

#[test]
fn belongs_to_many_rejects_scalar_keys() {
    let (api, _) = mock_api();
    let bike = bike_with_part_refs(&api);

    let err = bike
        .build_raw(&json!({"id": 1, "partIds": 5}), OpSet::READ)
        .unwrap_err();
    assert!(matches!(err, RestError::Malformed(_)));
}

#[test]
fn empty_relations_are_created_on_first_access() {
    let (api, _) = mock_api();
    let bike = bike_with_part_refs(&api);
    let record = bike.new_record(None).unwrap();

    let first = record.relation("parts").unwrap().unwrap();
    let second = record.relation("parts").unwrap().unwrap();

    assert!(first.as_collection().unwrap().is_empty());
    assert_eq!(first.as_collection(), second.as_collection());
    assert!(matches!(record.relation("missing"), Ok(None)));
    assert!(matches!(first, Related::Collection(_)));
}
