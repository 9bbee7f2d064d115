//! RpcClient - executes requests for one module

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, debug_span, field, info_span, warn, Instrument, Span};

use contracts::{
    inject_span, Envelope, IpcError, RpcModule, RpcRequest, RpcResponse, RpcTransport,
    TransportFault, TAG_LOCATION, TAG_SYSTEM_ID,
};

use crate::factory::Shared;
use crate::future::RpcFuture;
use crate::guard::guarded_send;

/// Extra time the transport gets to report its own timeout
const REPLY_GRACE: Duration = Duration::from_millis(250);

pub struct RpcClient<M, T: ?Sized> {
    module: Arc<M>,
    shared: Arc<Shared<T>>,
}

impl<M, T: ?Sized> Clone for RpcClient<M, T> {
    fn clone(&self) -> Self {
        Self {
            module: Arc::clone(&self.module),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Labels and span carried from `execute` into the completion paths
struct CallContext {
    module_id: String,
    location: String,
    message_id: String,
    span: Span,
    started: Instant,
}

impl CallContext {
    fn fail(&self, error: &IpcError) {
        self.span.record("rpc.failed", true);
        observability::record_rpc_failed(&self.location, &self.module_id);
        warn!(
            message_id = %self.message_id,
            location = %self.location,
            error = %error,
            "RPC failed"
        );
    }

    fn finish(&self) {
        observability::record_rpc_duration_ms(&self.location, &self.module_id, self.started.elapsed());
    }
}

impl<M, T> RpcClient<M, T>
where
    M: RpcModule,
    T: RpcTransport + ?Sized + 'static,
{
    pub(crate) fn new(module: Arc<M>, shared: Arc<Shared<T>>) -> Self {
        Self { module, shared }
    }

    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    /// Start executing `request` and return at once.
    ///
    /// Requests without a location, or addressed to this process's location,
    /// run in-process and never touch the transport. The module still runs on
    /// a spawned task, so the returned future completes when it finishes
    /// rather than already being resolved. Remote requests resolve within
    /// the effective timeout plus a short grace period even if the transport
    /// never calls back.
    pub fn execute(&self, request: M::Request) -> RpcFuture<M::Response> {
        match request.location() {
            Some(location) if location != self.shared.location => {
                let location = location.to_string();
                self.execute_remote(request, location)
            }
            _ => self.execute_local(request),
        }
    }

    fn execute_local(&self, request: M::Request) -> RpcFuture<M::Response> {
        let (future, completion) = RpcFuture::pending();
        let module = Arc::clone(&self.module);
        let span = debug_span!("rpc_local", module = %module.id());

        self.shared.runtime.spawn(
            async move {
                let outcome = module.execute(request).await.map_err(|e| match e {
                    e @ IpcError::Module { .. } => e,
                    other => IpcError::module(module.id(), other),
                });
                completion.complete(outcome);
            }
            .instrument(span),
        );
        future
    }

    /// Effective timeout: the request TTL bounded by the default. Zero means unset.
    fn effective_timeout(&self, request: &M::Request) -> Duration {
        let default = self.shared.default_timeout;
        request
            .time_to_live()
            .filter(|ttl| !ttl.is_zero())
            .map_or(default, |ttl| ttl.min(default))
    }

    fn execute_remote(&self, request: M::Request, location: String) -> RpcFuture<M::Response> {
        let module_id = self.module.id().to_string();
        let system_id = request.system_id().map(str::to_string);
        let span = match request.parent_span() {
            Some(parent) => info_span!(
                parent: parent,
                "rpc",
                module = %module_id,
                location = %location,
                system_id = field::Empty,
                rpc.failed = field::Empty,
                rpc.timeout = field::Empty
            ),
            None => info_span!(
                "rpc",
                module = %module_id,
                location = %location,
                system_id = field::Empty,
                rpc.failed = field::Empty,
                rpc.timeout = field::Empty
            ),
        };
        if let Some(system_id) = &system_id {
            span.record("system_id", system_id.as_str());
        }

        let mut tracing_info = request.tracing_info();
        span.in_scope(|| {
            for (tag, value) in &tracing_info {
                debug!(tag = %tag, value = %value, "RPC tag");
            }
        });
        inject_span(&mut tracing_info, &span);
        tracing_info.insert(TAG_LOCATION.to_string(), location.clone());
        if let Some(system_id) = &system_id {
            tracing_info.insert(TAG_SYSTEM_ID.to_string(), system_id.clone());
        }

        let timeout = self.effective_timeout(&request);

        let payload = match self.module.marshal_request(&request) {
            Ok(payload) => payload,
            Err(e) => {
                span.record("rpc.failed", true);
                observability::record_rpc_failed(&location, &module_id);
                return RpcFuture::ready(Err(IpcError::request_rejected_by(
                    "could not marshal request",
                    e,
                )));
            }
        };
        let envelope = Envelope::new(module_id.clone(), payload)
            .with_destination(Some(location.clone()))
            .with_system_id(system_id)
            .with_tracing_info(tracing_info);

        let context = Arc::new(CallContext {
            module_id,
            location,
            message_id: envelope.id.clone(),
            span: span.clone(),
            started: Instant::now(),
        });
        let (future, completion) = RpcFuture::pending();
        let completion = Arc::new(completion);

        let on_complete = {
            let module = Arc::clone(&self.module);
            let context = Arc::clone(&context);
            let completion = Arc::clone(&completion);
            Box::new(move |result: Result<Bytes, TransportFault>| {
                // Transport-owned thread: restore the caller's span first
                let _entered = context.span.enter();
                let outcome = classify(module.as_ref(), &context, result);
                if let Err(e) = &outcome {
                    context.fail(e);
                }
                context.finish();
                if !completion.complete(outcome) {
                    debug!(message_id = %context.message_id, "Late RPC completion ignored");
                }
            })
        };

        let transport = Arc::clone(&self.shared.transport);
        let runtime = self.shared.runtime.clone();
        self.shared.runtime.spawn(
            async move {
                observability::record_rpc_request_sent(&context.location, &context.module_id);
                debug!(
                    message_id = %context.message_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Sending RPC request"
                );
                if let Err(e) = guarded_send(&runtime, transport, envelope, timeout, on_complete).await {
                    context.fail(&e);
                    context.finish();
                    completion.complete(Err(e));
                    return;
                }

                // The transport owns the reply deadline; this only catches a
                // callback that is kept but never invoked. A dropped callback
                // still abandons the request.
                let finished = completion.finished();
                let pending = Arc::downgrade(&completion);
                drop(completion);

                let deadline = timeout + REPLY_GRACE;
                tokio::select! {
                    _ = finished.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        let Some(completion) = pending.upgrade() else {
                            return;
                        };
                        let message = format!("no reply within {deadline:?}");
                        if completion.complete(Err(IpcError::request_timed_out(message.clone()))) {
                            context.span.record("rpc.timeout", true);
                            context.fail(&IpcError::request_timed_out(message));
                            context.finish();
                        }
                    }
                }
            }
            .instrument(span),
        );

        future
    }
}

/// Map a transport outcome to the caller-visible result
fn classify<M: RpcModule>(
    module: &M,
    context: &CallContext,
    result: Result<Bytes, TransportFault>,
) -> Result<M::Response, IpcError> {
    match result {
        Ok(bytes) => {
            observability::record_rpc_response_size(&context.location, &context.module_id, bytes.len());
            let response = module
                .unmarshal_response(&bytes)
                .map_err(|e| IpcError::remote_execution(e.to_string()))?;
            match response.error_message().map(str::to_string) {
                Some(message) => Err(IpcError::remote_execution(message)),
                None => Ok(response),
            }
        }
        Err(TransportFault::Timeout(message)) => {
            context.span.record("rpc.timeout", true);
            Err(IpcError::request_timed_out(message))
        }
        Err(TransportFault::NoConsumer(message)) => Err(IpcError::request_rejected(message)),
        Err(fault) => Err(IpcError::Transport(fault)),
    }
}
