//! [`Transport`] over reqwest.

use crate::config::HttpConfig;
use crate::error::{HttpError, HttpResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use restmodel_core::{Method, Request, Response, Transport, TransportError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Sends model requests as JSON over HTTP.
///
/// Query params are flattened to strings; arrays repeat the key and `null`
/// values are dropped. Response bodies are parsed as JSON, an empty body
/// becomes `Value::Null` and anything else unparsable is kept as a string.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> HttpResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        debug!(method = %request.method, url = %request.url, "http request");

        let mut builder = self
            .client
            .request(method, &request.url)
            .query(&query_pairs(&request.params));
        for (name, value) in &request.headers {
            let (name, value) =
                header_pair(name, value).map_err(|e| TransportError::Network(e.to_string()))?;
            builder = builder.header(name, value);
        }
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        let reply = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = reply.status().as_u16();
        let headers: BTreeMap<String, String> = reply
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = reply
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("failed to read body: {e}")))?;

        let response = Response {
            status,
            data: parse_body(&body),
            headers,
        };
        debug!(status, url = %request.url, "http response");
        if response.is_success() {
            Ok(response)
        } else {
            warn!(status, url = %request.url, "http request failed");
            Err(TransportError::Status(response))
        }
    }
}

fn header_pair(name: &str, value: &str) -> HttpResult<(HeaderName, HeaderValue)> {
    let invalid = |reason: String| HttpError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header, value))
}

fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    pairs.push((key.clone(), scalar(item)));
                }
            }
            other => pairs.push((key.clone(), scalar(other))),
        }
    }
    pairs
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_flatten_to_pairs() {
        let params = json!({"page": 2, "q": "red", "tag": ["a", "b"], "skip": null});
        let Value::Object(params) = params else { unreachable!() };

        let pairs = query_pairs(&params);

        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "red".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn bodies_parse_leniently() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("  \n"), Value::Null);
        assert_eq!(parse_body(r#"{"id": 1}"#), json!({"id": 1}));
        assert_eq!(parse_body("gateway timeout"), json!("gateway timeout"));
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let config = HttpConfig::default().with_header("bad header", "x");
        let err = HttpTransport::new(config).unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeader { name, .. } if name == "bad header"));
    }
}
