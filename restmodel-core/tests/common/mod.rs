//! Shared test helpers for restmodel-core tests.

#![allow(dead_code)]

use restmodel_core::transport::mock::MockTransport;
use restmodel_core::{Api, ApiConfig, NamingStyle};
use serde_json::{Map, Value};
use std::sync::Arc;

/// An API with default config over a fresh mock transport.
pub fn mock_api() -> (Api, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    (Api::new(transport.clone()), transport)
}

/// An API with snake_case raw names over a fresh mock transport.
pub fn snake_api() -> (Api, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let config = ApiConfig {
        naming: NamingStyle::SnakeCase,
        ..ApiConfig::default()
    };
    (Api::with_config(transport.clone(), config), transport)
}

/// Unwraps a `json!({...})` literal into a map.
pub fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
