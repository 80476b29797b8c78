//! Transport abstraction.
//!
//! The model layer never talks HTTP itself. Every request goes through a
//! [`Transport`], so the same models run against a real server
//! (`restmodel-http`) or an in-memory backend in tests.

use async_trait::async_trait;
use restmodel_types::{Request, Response};
use thiserror::Error;

/// Failure reported by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("server responded with status {}", .0.status)]
    Status(Response),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
}

/// Performs requests on behalf of records and collections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request. Non-2xx answers must be reported as
    /// [`TransportError::Status`].
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use crate::action::lock;
    use restmodel_types::Method;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A canned answer.
    #[derive(Debug, Clone)]
    pub struct MockReply {
        status: u16,
        body: Value,
        delay: Option<Duration>,
        network_error: Option<String>,
    }

    impl MockReply {
        /// Replies with `status` and a JSON body.
        pub fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                body,
                delay: None,
                network_error: None,
            }
        }

        /// Replies 200 with a JSON body.
        pub fn ok(body: Value) -> Self {
            Self::json(200, body)
        }

        /// Replies 204 with no body.
        pub fn no_content() -> Self {
            Self::json(204, Value::Null)
        }

        /// Fails without a response.
        pub fn network(message: impl Into<String>) -> Self {
            Self {
                status: 0,
                body: Value::Null,
                delay: None,
                network_error: Some(message.into()),
            }
        }

        /// Settles only after `delay`.
        #[must_use]
        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    struct Route {
        method: Method,
        url: String,
        once: VecDeque<MockReply>,
        sticky: Option<MockReply>,
    }

    /// An in-memory transport answering from registered routes.
    ///
    /// Routes match on method and URL (query params are ignored). One-shot
    /// replies are consumed first, then the sticky reply is reused. Unmatched
    /// requests get a 404.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<Vec<Route>>,
        log: Mutex<Vec<Request>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockTransport {
        /// Creates a transport with no routes.
        pub fn new() -> Self {
            Self::default()
        }

        /// Answers every matching request with `reply`.
        pub fn on(&self, method: Method, url: impl Into<String>, reply: MockReply) -> &Self {
            let url = url.into();
            let mut routes = lock(&self.routes);
            match routes.iter_mut().find(|r| r.method == method && r.url == url) {
                Some(route) => route.sticky = Some(reply),
                None => routes.push(Route {
                    method,
                    url,
                    once: VecDeque::new(),
                    sticky: Some(reply),
                }),
            }
            self
        }

        /// Answers the next matching request with `reply`.
        pub fn once(&self, method: Method, url: impl Into<String>, reply: MockReply) -> &Self {
            let url = url.into();
            let mut routes = lock(&self.routes);
            match routes.iter_mut().find(|r| r.method == method && r.url == url) {
                Some(route) => route.once.push_back(reply),
                None => routes.push(Route {
                    method,
                    url,
                    once: VecDeque::from([reply]),
                    sticky: None,
                }),
            }
            self
        }

        /// Every request received so far, in arrival order.
        pub fn requests(&self) -> Vec<Request> {
            lock(&self.log).clone()
        }

        /// The most recent request.
        pub fn last_request(&self) -> Option<Request> {
            lock(&self.log).last().cloned()
        }

        /// Number of requests received so far.
        pub fn request_count(&self) -> usize {
            lock(&self.log).len()
        }

        /// Highest number of requests that were in flight at the same time.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn reply_for(&self, request: &Request) -> Option<MockReply> {
            let mut routes = lock(&self.routes);
            let route = routes
                .iter_mut()
                .find(|r| r.method == request.method && r.url == request.url)?;
            route.once.pop_front().or_else(|| route.sticky.clone())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: Request) -> Result<Response, TransportError> {
            lock(&self.log).push(request.clone());
            let reply = self.reply_for(&request).unwrap_or_else(|| {
                MockReply::json(404, json!({ "error": format!("no route for {} {}", request.method, request.url) }))
            });

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(message) = reply.network_error {
                return Err(TransportError::Network(message));
            }
            let response = Response::new(reply.status, reply.body);
            if response.is_success() {
                Ok(response)
            } else {
                Err(TransportError::Status(response))
            }
        }
    }
}
