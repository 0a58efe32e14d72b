//! Long-lived worker loop.
//!
//! The runtime hands requests over a [`WorkerTransport`]; every request is
//! passed to the host [`Application`] and its response sent back. A failing
//! or panicking application never takes the loop down: the client receives
//! the fixed 500 response and the error goes to the log and the transport's
//! error channel.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::{debug, error, info};

use crate::adapters::AdapterError;
use crate::exchange::{CanonicalRequest, CanonicalResponse};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Transport closed: {0}")]
    Closed(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    #[error("Worker transport failed after {handled} request(s): {source}")]
    Transport {
        handled: u64,
        source: TransportError,
    },
}

/// The host application behind the runtime.
pub trait Application {
    fn handle(
        &self,
        request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, BoxError>;

    /// Called after the response was handed to the runtime.
    fn terminate(&self, request: &CanonicalRequest) {
        let _ = request;
    }
}

impl<F> Application for F
where
    F: Fn(&CanonicalRequest) -> Result<CanonicalResponse, BoxError>,
{
    fn handle(
        &self,
        request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, BoxError> {
        self(request)
    }
}

/// Answers every request with `200 OK`.
///
/// Used when the bridge packages are missing and the worker has to keep the
/// runtime satisfied in degraded mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoApplication;

impl Application for EchoApplication {
    fn handle(
        &self,
        _request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, BoxError> {
        Ok(CanonicalResponse::text(200, "OK"))
    }
}

/// Runtime side of the worker loop.
pub trait WorkerTransport {
    /// Blocks for the next request; `None` means the runtime asked the
    /// worker to stop.
    fn wait_request(&mut self) -> Result<Option<CanonicalRequest>, TransportError>;

    fn respond(&mut self, response: CanonicalResponse) -> Result<(), TransportError>;

    /// Reports a handler failure to the runtime's log channel.
    fn error(&mut self, message: &str) -> Result<(), TransportError> {
        let _ = message;
        Ok(())
    }
}

/// Callbacks invoked while the worker loop runs. All default to no-ops.
pub trait WorkerHooks {
    fn on_request(&mut self, request: &CanonicalRequest) {
        let _ = request;
    }

    /// Called before the response is sent.
    fn on_response(
        &mut self,
        request: &CanonicalRequest,
        response: &CanonicalResponse,
    ) {
        let _ = (request, response);
    }

    fn on_failure(&mut self, message: &str) {
        let _ = message;
    }

    fn on_stop(&mut self, summary: &WorkerSummary) {
        let _ = summary;
    }
}

/// No-op implementation of `WorkerHooks`.
pub struct NoOpHooks;

impl WorkerHooks for NoOpHooks {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub handled: u64,
    pub failed: u64,
}

/// Response for one request plus the failure message, if the application
/// failed.
#[derive(Debug)]
pub struct Guarded {
    pub response: CanonicalResponse,
    pub failure: Option<String>,
}

/// Runs the application for one request, converting `Err` and panics into
/// the fixed 500 response.
pub fn respond_guarded<A>(app: &A, request: &CanonicalRequest) -> Guarded
where
    A: Application + ?Sized,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| app.handle(request)));

    let failure = match outcome {
        Ok(Ok(response)) => {
            return Guarded {
                response,
                failure: None,
            }
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    #[cfg(feature = "tracing")]
    error!(
        method = request.method(),
        uri = request.uri(),
        error = %failure,
        "Request handling failed"
    );

    Guarded {
        response: CanonicalResponse::internal_error(),
        failure: Some(failure),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

pub struct Worker<A, H = NoOpHooks> {
    app: A,
    hooks: H,
}

impl<A: Application> Worker<A, NoOpHooks> {
    pub fn new(app: A) -> Self {
        Self {
            app,
            hooks: NoOpHooks,
        }
    }
}

impl<A: Application, H: WorkerHooks> Worker<A, H> {
    pub fn with_hooks<H2: WorkerHooks>(self, hooks: H2) -> Worker<A, H2> {
        Worker {
            app: self.app,
            hooks,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn run<T>(&mut self, transport: &mut T) -> Result<WorkerSummary, WorkerError>
    where
        T: WorkerTransport + ?Sized,
    {
        #[cfg(feature = "tracing")]
        info!("Worker loop started");

        let mut summary = WorkerSummary::default();

        loop {
            match self.serve_one(transport, &mut summary) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => {
                    return Err(WorkerError::Transport {
                        handled: summary.handled,
                        source,
                    })
                }
            }
        }

        #[cfg(feature = "tracing")]
        info!(
            handled = summary.handled,
            failed = summary.failed,
            "Worker loop stopped"
        );

        self.hooks.on_stop(&summary);
        Ok(summary)
    }

    fn serve_one<T>(
        &mut self,
        transport: &mut T,
        summary: &mut WorkerSummary,
    ) -> Result<bool, TransportError>
    where
        T: WorkerTransport + ?Sized,
    {
        let Some(request) = transport.wait_request()? else {
            return Ok(false);
        };

        #[cfg(feature = "tracing")]
        debug!(method = request.method(), uri = request.uri(), "Request received");

        self.hooks.on_request(&request);

        let Guarded { response, failure } = respond_guarded(&self.app, &request);
        summary.handled += 1;

        if let Some(ref message) = failure {
            summary.failed += 1;
            self.hooks.on_failure(message);
        }

        self.hooks.on_response(&request, &response);
        transport.respond(response)?;

        // The client gets its 500 even when the error channel is gone.
        match failure {
            Some(message) => transport.error(&message)?,
            None => self.app.terminate(&request),
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct ScriptedTransport {
        pending: VecDeque<CanonicalRequest>,
        responses: Vec<CanonicalResponse>,
        errors: Vec<String>,
        error_channel_closed: bool,
    }

    impl ScriptedTransport {
        fn with_paths(paths: &[&str]) -> Self {
            Self {
                pending: paths
                    .iter()
                    .map(|p| {
                        CanonicalRequest::builder("get")
                            .with_uri(*p)
                            .build()
                            .unwrap()
                    })
                    .collect(),
                responses: Vec::new(),
                errors: Vec::new(),
                error_channel_closed: false,
            }
        }
    }

    impl WorkerTransport for ScriptedTransport {
        fn wait_request(
            &mut self,
        ) -> Result<Option<CanonicalRequest>, TransportError> {
            Ok(self.pending.pop_front())
        }

        fn respond(
            &mut self,
            response: CanonicalResponse,
        ) -> Result<(), TransportError> {
            self.responses.push(response);
            Ok(())
        }

        fn error(&mut self, message: &str) -> Result<(), TransportError> {
            if self.error_channel_closed {
                return Err(TransportError::Closed("error channel".into()));
            }
            self.errors.push(message.to_string());
            Ok(())
        }
    }

    fn routed(request: &CanonicalRequest) -> Result<CanonicalResponse, BoxError> {
        match request.path() {
            "/fail" => Err("database unavailable".into()),
            "/panic" => panic!("boom"),
            path => Ok(CanonicalResponse::text(200, format!("hello {}", path))),
        }
    }

    #[test]
    fn test_failures_become_500_and_loop_continues() {
        let mut transport =
            ScriptedTransport::with_paths(&["/a", "/fail", "/panic", "/b"]);

        let summary = Worker::new(routed)
            .run(&mut transport)
            .unwrap();

        assert_eq!(summary, WorkerSummary { handled: 4, failed: 2 });

        let statuses: Vec<u16> = transport
            .responses
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![200, 500, 500, 200]);

        for failed in &transport.responses[1..3] {
            assert_eq!(failed.body_string(), "Internal Server Error");
            assert_eq!(failed.header("Content-Type"), Some("text/plain"));
            assert!(!failed.body_string().contains("database"));
        }

        assert_eq!(transport.errors.len(), 2);
        assert_eq!(transport.errors[0], "database unavailable");
        assert!(transport.errors[1].contains("boom"));
        assert_eq!(transport.responses[3].body_string(), "hello /b");
    }

    #[test]
    fn test_failed_request_is_answered_before_error_report() {
        let mut transport = ScriptedTransport::with_paths(&["/fail", "/b"]);
        transport.error_channel_closed = true;

        let err = Worker::new(routed)
            .run(&mut transport)
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::Transport { handled: 1, source: TransportError::Closed(_) }
        ));
        assert_eq!(transport.responses.len(), 1);
        assert_eq!(transport.responses[0].status, 500);
        assert_eq!(transport.pending.len(), 1);
    }

    #[test]
    fn test_echo_application() {
        let mut transport = ScriptedTransport::with_paths(&["/x"]);
        Worker::new(EchoApplication)
            .run(&mut transport)
            .unwrap();

        assert_eq!(transport.responses[0].status, 200);
        assert_eq!(transport.responses[0].body_string(), "OK");
    }

    struct Counting {
        terminated: Cell<u32>,
    }

    impl Application for Counting {
        fn handle(
            &self,
            request: &CanonicalRequest,
        ) -> Result<CanonicalResponse, BoxError> {
            routed(request)
        }

        fn terminate(&self, _request: &CanonicalRequest) {
            self.terminated
                .set(self.terminated.get() + 1);
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        seen: Vec<String>,
        failures: u32,
        stopped: Option<WorkerSummary>,
    }

    impl WorkerHooks for RecordingHooks {
        fn on_request(&mut self, request: &CanonicalRequest) {
            self.seen.push(request.path().to_string());
        }

        fn on_failure(&mut self, _message: &str) {
            self.failures += 1;
        }

        fn on_stop(&mut self, summary: &WorkerSummary) {
            self.stopped = Some(*summary);
        }
    }

    #[test]
    fn test_hooks_and_terminate() {
        let mut transport = ScriptedTransport::with_paths(&["/a", "/fail"]);
        let app = Counting {
            terminated: Cell::new(0),
        };

        let mut worker = Worker::new(app).with_hooks(RecordingHooks::default());
        worker.run(&mut transport).unwrap();

        assert_eq!(worker.hooks().seen, vec!["/a", "/fail"]);
        assert_eq!(worker.hooks().failures, 1);
        assert_eq!(
            worker.hooks().stopped,
            Some(WorkerSummary { handled: 2, failed: 1 })
        );
        assert_eq!(worker.app.terminated.get(), 1);
    }

    struct BrokenTransport;

    impl WorkerTransport for BrokenTransport {
        fn wait_request(
            &mut self,
        ) -> Result<Option<CanonicalRequest>, TransportError> {
            Err(TransportError::Closed("relay gone".into()))
        }

        fn respond(
            &mut self,
            _response: CanonicalResponse,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_transport_error_ends_loop() {
        let err = Worker::new(EchoApplication)
            .run(&mut BrokenTransport)
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Worker transport failed after 0 request(s): Transport closed: relay gone"
        );
    }
}
