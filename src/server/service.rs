//! Per-connection HTTP service for one worker process.
//!
//! The connection coroutine never runs handler logic itself: it builds a
//! request context, hands it to the dispatcher on a fresh coroutine, and
//! blocks on the coordinator channel for the terminal reply. That split is
//! what lets a bulk batch answer the client while its tail is still being
//! processed, and lets the timeout timer fire through the same at-most-once
//! gate as every other writer.

use crate::context::RequestContext;
use crate::coordinator::{Reply, ResponseCoordinator};
use crate::dispatcher::{classify_path, RequestDispatcher};
use crate::server::request::parse_request;
use crate::server::response::{write_json_error, write_reply};
use http::Method;
use may::coroutine;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Clone)]
pub struct GateService {
    pub dispatcher: Arc<RequestDispatcher>,
    /// Requests that produce no terminal write within this window are answered
    /// with 408 through the coordinator.
    pub request_timeout: Duration,
    /// Formatted once per process; the pid never changes.
    pid_header: &'static str,
}

impl GateService {
    #[must_use]
    pub fn new(dispatcher: Arc<RequestDispatcher>, request_timeout: Duration) -> Self {
        Self {
            dispatcher,
            request_timeout,
            pid_header: Box::leak(
                format!("X-Worker-Pid: {}", std::process::id()).into_boxed_str(),
            ),
        }
    }

    fn spawn_timeout_timer(
        &self,
        coordinator: ResponseCoordinator,
    ) -> Option<coroutine::JoinHandle<()>> {
        let timeout = self.request_timeout;
        let stack_size = self.dispatcher.config.stack_size;
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may
        // runtime. The closure is Send + 'static and only touches the cloned
        // coordinator, whose at-most-once gate makes a late fire a no-op.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    coroutine::sleep(timeout);
                    // write_now punches through batch buffering; a blocked
                    // bulk batch must not hold the client past the deadline.
                    coordinator.write_now(Reply::message(408, "Request timed out"));
                })
        };
        match spawn_result {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn timeout timer");
                None
            }
        }
    }
}

impl HttpService for GateService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);
        let Ok(method) = Method::from_bytes(parsed.method.as_bytes()) else {
            write_json_error(res, 400, json!({ "result": "Invalid method" }));
            return Ok(());
        };

        let (api_path, full_path) =
            classify_path(&parsed.path, &self.dispatcher.config.root_path);
        let (coordinator, reply_rx) = ResponseCoordinator::channel();
        let ctx = RequestContext::new(
            method,
            full_path,
            api_path,
            parsed.params,
            parsed.headers,
            coordinator.clone(),
        );
        let request_id = ctx.request_id;
        debug!(request_id = %request_id, path = %ctx.full_path, "request accepted");

        let timer = self.spawn_timeout_timer(coordinator);

        let dispatcher = Arc::clone(&self.dispatcher);
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may
        // runtime. Both captures are Send + 'static; the dispatch outcome
        // reaches this coroutine through the coordinator channel, never by
        // unwinding across the spawn boundary.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(dispatcher.config.stack_size)
                .spawn(move || dispatcher.dispatch(ctx))
        };
        if let Err(e) = spawn_result {
            error!(request_id = %request_id, error = %e, "failed to spawn dispatch coroutine");
            write_json_error(res, 503, json!({ "result": "Server is overloaded" }));
            return Ok(());
        }

        let outcome = reply_rx.recv();

        // The reply has been decided either way; a still-sleeping timer would
        // otherwise pin its stack for the rest of the timeout window.
        if let Some(timer) = timer {
            // SAFETY: cancel() is marked unsafe by the may runtime. The handle
            // is valid (we hold it) and the timer coroutine parks only in
            // coroutine::sleep, a cancellation point.
            unsafe {
                timer.coroutine().cancel();
            }
        }

        match outcome {
            Ok(reply) => {
                res.header(self.pid_header);
                write_reply(res, reply);
            }
            Err(_) => {
                // Every writer hung up without a terminal write.
                error!(request_id = %request_id, "dispatch ended without a response");
                write_json_error(res, 500, json!({ "result": "Server error" }));
            }
        }
        Ok(())
    }
}
