mod common;

use common::{mock_api, obj};
use restmodel_core::transport::mock::MockReply;
use restmodel_core::{
    CommonApi, Define, Hook, HookArgs, HookCall, HookTable, Method, OpSet, Request, RestError,
    RestResult, ScopeApi, Status,
};
use serde_json::{Map, json};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, label: &'static str) -> impl Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static {
    let log = log.clone();
    move |_: &mut HookCall<'_>| {
        log.lock().unwrap().push(label.to_string());
        Ok(())
    }
}

// ── Dispatch order ───────────────────────────────────────────────

#[test]
fn dispatch_visits_decorator_instance_collection_then_type() {
    let log: Log = Arc::default();
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .url("/bikes")
        .on(Hook::AfterFeed, recorder(&log, "type"))
        .build()
        .unwrap();
    let bikes = bike.collection(Map::new());
    bikes.on(Hook::AfterFeed, recorder(&log, "collection"));
    let record = bikes.new_record(None).unwrap();
    record.on(Hook::AfterFeed, recorder(&log, "instance"));

    let decorated = record.decorated(HookTable::new().on(Hook::AfterFeed, recorder(&log, "decorated")));
    decorated.decode(&json!({"id": 1}), OpSet::READ).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["decorated", "instance", "collection", "type"]
    );
}

#[test]
fn record_without_collection_bubbles_to_type() {
    let log: Log = Arc::default();
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .on(Hook::AfterInit, recorder(&log, "type"))
        .build()
        .unwrap();

    bike.new_record(None).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["type"]);
}

#[test]
fn nested_decorations_run_outermost_first() {
    let log: Log = Arc::default();
    let (api, _) = mock_api();
    let bike = api.define("Bike").build().unwrap();
    let record = bike.new_record(None).unwrap();

    let outer = record.decorated(HookTable::new().on(Hook::AfterFeed, recorder(&log, "outer")));
    let inner = outer.decorated_with(recorder(&log, "inner"));
    inner.decode(&json!({}), OpSet::READ).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
}

#[test]
fn custom_hooks_reach_type_listeners() {
    let log: Log = Arc::default();
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .on(Hook::Custom("tuned".into()), recorder(&log, "tuned"))
        .build()
        .unwrap();
    let record = bike.new_record(None).unwrap();

    record.dispatch(Hook::Custom("tuned".into()), HookArgs::None).unwrap();
    record.dispatch(Hook::Custom("other".into()), HookArgs::None).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["tuned"]);
}

#[test]
fn hook_errors_propagate_to_the_caller() {
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .on(Hook::AfterFeed, |_| Err(RestError::Hook("rejected".into())))
        .build()
        .unwrap();
    let record = bike.new_record(None).unwrap();

    let err = record.decode(&json!({"id": 1}), OpSet::READ).unwrap_err();
    assert!(matches!(err, RestError::Hook(msg) if msg == "rejected"));
}

#[test]
fn before_render_can_rewrite_the_payload() {
    let (api, _) = mock_api();
    let bike = api
        .define("Bike")
        .on(Hook::BeforeRender, |call| {
            if let Some(raw) = call.raw_mut() {
                raw["version"] = json!(2);
            }
            Ok(())
        })
        .build()
        .unwrap();
    let record = bike.build(obj(json!({"brand": "Trek"}))).unwrap();

    assert_eq!(
        record.encode(OpSet::CREATE).unwrap(),
        json!({"brand": "Trek", "version": 2})
    );
}

// ── Request lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn before_request_can_modify_the_request() {
    let (api, transport) = mock_api();
    transport.on(Method::Get, "/bikes/1", MockReply::ok(json!({"id": 1})));
    let bike = api
        .define("Bike")
        .url("/bikes")
        .on(Hook::BeforeRequest, |call| {
            if let Some(request) = call.request() {
                request.headers.insert("x-token".into(), "abc".into());
                request.params.insert("expand".into(), json!("parts"));
            }
            Ok(())
        })
        .build()
        .unwrap();

    bike.find(1, None).unwrap().as_promise().await.unwrap();

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.headers.get("x-token").map(String::as_str), Some("abc"));
    assert_eq!(sent.params.get("expand"), Some(&json!("parts")));
}

#[tokio::test]
async fn failing_before_hook_prevents_the_request() {
    let (api, transport) = mock_api();
    let bike = api.define("Bike").url("/bikes").build().unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();
    record.on(Hook::BeforeFetch, |_| Err(RestError::Hook("offline".into())));

    record.fetch(None).unwrap();
    let err = record.as_promise().await.unwrap_err();

    assert!(matches!(err, RestError::Hook(_)));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn error_hooks_fire_with_the_error() {
    let log: Log = Arc::default();
    let (api, transport) = mock_api();
    transport.on(Method::Get, "/bikes/1", MockReply::json(503, json!({"reason": "maintenance"})));
    let bike = api.define("Bike").url("/bikes").build().unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();
    let seen = log.clone();
    record.on(Hook::AfterRequestError, recorder(&log, "after-request-error"));
    record.on(Hook::AfterFetchError, move |call| {
        let status = call.error().and_then(RestError::response).map(|r| r.status);
        seen.lock().unwrap().push(format!("after-fetch-error {status:?}"));
        Ok(())
    });

    record.fetch(None).unwrap();
    assert!(record.as_promise().await.is_err());

    assert_eq!(
        *log.lock().unwrap(),
        vec!["after-request-error", "after-fetch-error Some(503)"]
    );
    assert_eq!(record.status(), Some(Status::Error));
    assert_eq!(record.response().unwrap().data, json!({"reason": "maintenance"}));
}

#[tokio::test]
async fn custom_requests_go_through_the_lifecycle() {
    let log: Log = Arc::default();
    let (api, transport) = mock_api();
    transport.on(Method::Post, "/bikes/1/service", MockReply::ok(json!({"queued": true})));
    let bike = api.define("Bike").url("/bikes").build().unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();
    record.on(Hook::BeforeRequest, recorder(&log, "before-request"));
    record.on(Hook::AfterRequest, recorder(&log, "after-request"));

    let (ok, failed) = (log.clone(), log.clone());
    record.send(
        Request::new(Method::Post, "/bikes/1/service").with_data(json!({"kind": "tune-up"})),
        move |_, response| {
            ok.lock().unwrap().push(format!("success {}", response.data["queued"]));
            Ok(())
        },
        move |_, _| {
            failed.lock().unwrap().push("error".to_string());
            Ok(())
        },
    );
    record.as_promise().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["before-request", "after-request", "success true"]
    );
    assert_eq!(record.status(), Some(Status::Ok));
    assert_eq!(record.response().unwrap().data, json!({"queued": true}));
    assert_eq!(transport.last_request().unwrap().data, Some(json!({"kind": "tune-up"})));
}

#[tokio::test]
async fn custom_request_failures_reject_the_chain() {
    let log: Log = Arc::default();
    let (api, transport) = mock_api();
    transport.on(Method::Get, "/status", MockReply::json(500, json!({})));
    let bike = api.define("Bike").url("/bikes").build().unwrap();
    let record = bike.new_record(None).unwrap();
    record.on(Hook::AfterRequestError, recorder(&log, "after-request-error"));

    let failed = log.clone();
    record.send(
        Request::new(Method::Get, "/status"),
        |_, _| panic!("success callback ran"),
        move |_, err| {
            failed.lock().unwrap().push(format!("error {:?}", err.response().map(|r| r.status)));
            Ok(())
        },
    );
    let err = record.as_promise().await.unwrap_err();

    assert!(matches!(err, RestError::Http { status: 500, .. }));
    assert_eq!(*log.lock().unwrap(), vec!["after-request-error", "error Some(500)"]);
    assert_eq!(record.status(), Some(Status::Error));
}

#[tokio::test]
async fn decoration_survives_the_await() {
    let log: Log = Arc::default();
    let (api, transport) = mock_api();
    transport.on(Method::Get, "/bikes/1", MockReply::ok(json!({"id": 1})));
    let bike = api.define("Bike").url("/bikes").build().unwrap();
    let record = bike.new_record(Some(json!(1))).unwrap();

    let hooks = HookTable::new().on(Hook::AfterFetch, recorder(&log, "decorated"));
    record.decorate(hooks, |r| r.fetch(None)).unwrap();
    record.fetch(None).unwrap();
    record.as_promise().await.unwrap();

    assert_eq!(transport.request_count(), 2);
    assert_eq!(*log.lock().unwrap(), vec!["decorated"]);
}
