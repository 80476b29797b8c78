//! Behaviour shared by records and collections.
//!
//! [`CommonApi`] carries the action queue, the promise-like combinators
//! (`then`, `always`, `finally`, `as_promise`), hook dispatch and decoration,
//! and the request-sending primitive used by every network operation.

use crate::action::{ActionQueue, ActionTicket, Settled, lock};
use crate::error::{RestError, RestResult};
use crate::hook::{DispatchLayer, Hook, HookArgs, HookCall, HookFn, HookTable, LayerHandler, Target};
use crate::model::Model;
use restmodel_types::{Request, Response};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Status of the last request sent by an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Ok,
    Error,
    Canceled,
}

/// State shared by every handle of one record or collection.
#[derive(Default)]
pub struct Common {
    queue: ActionQueue,
    status: Mutex<Option<Status>>,
    response: Mutex<Option<Response>>,
    callbacks: Mutex<HookTable>,
}

impl Common {
    pub(crate) fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub(crate) fn set_status(&self, status: Status) {
        *lock(&self.status) = Some(status);
    }

    fn set_response(&self, response: Option<Response>) {
        *lock(&self.response) = response;
    }

    /// Registers every callback of `hooks` on this instance.
    pub(crate) fn extend_callbacks(&self, hooks: &HookTable) {
        lock(&self.callbacks).merge(hooks);
    }

    fn callbacks(&self, hook: &Hook) -> Vec<HookFn> {
        lock(&self.callbacks).handlers(hook)
    }
}

/// Operations available on every record and collection handle.
///
/// Handles are cheap clones of a shared instance. A handle may additionally
/// carry dispatch layers added by [`decorated`](CommonApi::decorated); actions
/// queued through that handle keep those layers until they settle.
pub trait CommonApi: Clone + Send + Sync + 'static {
    #[doc(hidden)]
    fn owner_model(&self) -> &Model;

    #[doc(hidden)]
    fn common(&self) -> &Common;

    #[doc(hidden)]
    fn layers(&self) -> Option<&Arc<DispatchLayer>>;

    #[doc(hidden)]
    fn with_layers(&self, layers: Option<Arc<DispatchLayer>>) -> Self;

    /// The undecorated instance, as handed to hook callbacks.
    #[doc(hidden)]
    fn as_target(&self) -> Target;

    /// Forwards a dispatch to the next level (collection or model type).
    #[doc(hidden)]
    fn bubble(&self, call: &mut HookCall<'_>) -> RestResult<()>;

    /// Status of the last request, if any was sent.
    fn status(&self) -> Option<Status> {
        *lock(&self.common().status)
    }

    /// The last response received, including error responses.
    fn response(&self) -> Option<Response> {
        lock(&self.common().response).clone()
    }

    /// Registers an instance-level hook callback.
    fn on<F>(&self, hook: Hook, f: F) -> Self
    where
        F: Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static,
    {
        lock(&self.common().callbacks).add(hook, Arc::new(f));
        self.clone()
    }

    /// Fires `hook` on this instance.
    fn dispatch(&self, hook: Hook, args: HookArgs<'_>) -> RestResult<()> {
        let target = self.as_target();
        let mut call = HookCall {
            hook: &hook,
            target: &target,
            args,
        };
        self.dispatch_call(&mut call)
    }

    #[doc(hidden)]
    fn dispatch_call(&self, call: &mut HookCall<'_>) -> RestResult<()> {
        if let Some(layers) = self.layers() {
            layers.dispatch(call)?;
        }
        for f in self.common().callbacks(call.hook) {
            f(call)?;
        }
        self.bubble(call)
    }

    /// Returns a handle whose dispatches also run `hooks`.
    fn decorated(&self, hooks: HookTable) -> Self {
        let layer = DispatchLayer::push(self.layers().cloned(), LayerHandler::Table(hooks));
        self.with_layers(Some(layer))
    }

    /// Returns a handle whose dispatches all go through `f` as well.
    fn decorated_with<F>(&self, f: F) -> Self
    where
        F: Fn(&mut HookCall<'_>) -> RestResult<()> + Send + Sync + 'static,
    {
        let layer = DispatchLayer::push(self.layers().cloned(), LayerHandler::Func(Arc::new(f)));
        self.with_layers(Some(layer))
    }

    /// Runs `body` with a decorated handle.
    ///
    /// Actions started inside `body` keep the decoration for their whole
    /// lifetime, including across awaits.
    fn decorate<T, B>(&self, hooks: HookTable, body: B) -> T
    where
        B: FnOnce(&Self) -> T,
    {
        body(&self.decorated(hooks))
    }

    /// Queues an asynchronous action on this instance.
    fn action<F, Fut>(&self, body: F) -> Self
    where
        F: FnOnce(Self, Arc<ActionTicket>) -> Fut + Send + 'static,
        Fut: Future<Output = Settled> + Send + 'static,
    {
        let this = self.clone();
        self.common()
            .queue()
            .enqueue(move |ticket| body(this, ticket));
        self.clone()
    }

    /// Runs a synchronous action now, or after pending actions if any.
    fn sync_action<F>(&self, body: F) -> Self
    where
        F: FnOnce(&Self) -> Settled + Send + 'static,
    {
        let this = self.clone();
        self.common().queue().enqueue_sync(move || body(&this));
        self.clone()
    }

    /// Runs `success` after pending actions succeed.
    fn then<F>(&self, success: F) -> Self
    where
        F: FnOnce(&Self) -> Settled + Send + 'static,
    {
        let this = self.clone();
        self.common().queue().chain(move |prev| match prev {
            Ok(()) => success(&this),
            Err(err) => Err(err),
        });
        self.clone()
    }

    /// Runs `success` or `failure` depending on the outcome of pending actions.
    /// An `Ok` from `failure` recovers the chain.
    fn then_else<F, E>(&self, success: F, failure: E) -> Self
    where
        F: FnOnce(&Self) -> Settled + Send + 'static,
        E: FnOnce(&Self, RestError) -> Settled + Send + 'static,
    {
        let this = self.clone();
        self.common().queue().chain(move |prev| match prev {
            Ok(()) => success(&this),
            Err(err) => failure(&this, err),
        });
        self.clone()
    }

    /// Runs `f` whatever the outcome; its result replaces the chain's.
    fn always<F>(&self, f: F) -> Self
    where
        F: FnOnce(&Self) -> Settled + Send + 'static,
    {
        let this = self.clone();
        self.common().queue().chain(move |_| f(&this));
        self.clone()
    }

    /// Runs `f` whatever the outcome, keeping the chain's result.
    fn finally<F>(&self, f: F) -> Self
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        let this = self.clone();
        self.common().queue().chain(move |prev| {
            f(&this);
            prev
        });
        self.clone()
    }

    /// Future settling once every action queued so far has settled.
    fn as_promise(&self) -> impl Future<Output = RestResult<Self>> + Send + 'static {
        let tail = self.common().queue().tail();
        let this = self.clone();
        async move {
            if let Some(tail) = tail {
                tail.await?;
            }
            Ok(this)
        }
    }

    /// Cancels pending actions. In-flight requests are not aborted, but
    /// their results are discarded.
    fn cancel(&self) -> Self {
        let flagged = self.common().queue().cancel();
        if flagged > 0 {
            debug!(count = flagged, "cancelled pending actions");
        }
        self.clone()
    }

    /// Queues `request` through the request lifecycle: status tracking,
    /// request hooks and the stored response.
    ///
    /// `on_success` or `on_error` runs once the response arrives. Neither runs
    /// if the action is cancelled; the action then settles with
    /// [`RestError::Canceled`]. A failure keeps the chain rejected unless
    /// `on_error` itself fails.
    fn send<S, E>(&self, request: Request, on_success: S, on_error: E) -> Self
    where
        S: FnOnce(&Self, &Response) -> Settled + Send + 'static,
        E: FnOnce(&Self, &RestError) -> Settled + Send + 'static,
    {
        self.action(move |this, ticket| async move {
            match send_request(&this, &ticket, request).await {
                Ok(Some(response)) => on_success(&this, &response),
                Ok(None) => Err(RestError::Canceled),
                Err(err) => {
                    on_error(&this, &err)?;
                    Err(err)
                }
            }
        })
    }

    fn has_pending_actions(&self) -> bool {
        self.common().queue().has_pending()
    }
}

/// Sends `request` through the model's transport, tracking status and
/// firing the request hooks.
///
/// Returns `Ok(None)` when the action was cancelled while the request was in
/// flight; the result is then discarded.
pub(crate) async fn send_request<R: CommonApi>(
    resource: &R,
    ticket: &ActionTicket,
    mut request: Request,
) -> RestResult<Option<Response>> {
    let common = resource.common();
    common.set_status(Status::Pending);
    resource.dispatch(Hook::BeforeRequest, HookArgs::Request(&mut request))?;

    debug!(method = %request.method, url = %request.url, "sending request");
    let result = resource.owner_model().transport().send(request).await;

    if ticket.is_canceled() {
        warn!(action = ticket.id(), "discarding result of cancelled request");
        common.set_status(Status::Canceled);
        return Ok(None);
    }

    match result {
        Ok(response) => {
            common.set_status(Status::Ok);
            common.set_response(Some(response.clone()));
            resource.dispatch(Hook::AfterRequest, HookArgs::Response(&response))?;
            Ok(Some(response))
        }
        Err(err) => {
            let err = RestError::from(err);
            common.set_status(Status::Error);
            common.set_response(err.response());
            resource.dispatch(Hook::AfterRequestError, HookArgs::Error(&err))?;
            Err(err)
        }
    }
}
