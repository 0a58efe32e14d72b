//! Run a PHP application under RoadRunner, Swoole/OpenSwoole or FrankenPHP
//! instead of PHP-FPM.
//!
//! The crate picks a runtime from configuration, starts it (or describes how
//! to host it in-process), and translates between the runtime's native
//! request/response shapes and one canonical pair of types the host
//! application works with.
//!
//! # Execution Model
//!
//! RoadRunner and FrankenPHP are external binaries that own the socket; the
//! `serve` command blocks on them and forwards their exit code. Swoole and
//! OpenSwoole live inside the PHP interpreter, so they are started through a
//! bootstrap script. Worker loops ([`Worker`], [`SwooleHandler`]) run one
//! request at a time per worker and never let a failing request stop the
//! loop.
//!
//! # Example
//!
//! ```no_run
//! use runiva::{RuntimeConfig, RuntimeRegistry, Launcher};
//!
//! let config = RuntimeConfig::load("/srv/app").expect("config");
//! let plan = RuntimeRegistry::builtin().plan(&config).expect("plan");
//!
//! let code = Launcher::from_env()
//!     .run(plan.command())
//!     .expect("launch");
//! std::process::exit(code);
//! ```

pub mod adapters;
pub mod address;
pub mod config;
pub mod exchange;
pub mod probe;
pub mod process;
pub mod runtime;
pub mod serve;
pub mod worker;

/// Value reported as `SERVER_SOFTWARE`.
pub const SERVER_SOFTWARE: &str = concat!("Runiva/", env!("CARGO_PKG_VERSION"));

pub use adapters::{
    emit_response, AdapterError, ResponseSink, SwooleHandler, SwooleRequest,
};

#[cfg(feature = "http")]
pub use adapters::{
    from_http_request, into_http_response, HttpTransport, Psr7Transport,
};

pub use address::{AddressError, ListenAddress};
pub use config::{ConfigError, RuntimeConfig};

pub use exchange::{
    CanonicalRequest, CanonicalResponse, FileNode, HeaderList, RequestBuilder,
    RequestError, Scheme, ServerVars, SetCookie, UploadedFile,
};

pub use probe::{Check, CheckStatus, ProbeReport};
pub use process::{locate_binary, BinaryLocator, LaunchCommand, LaunchError, Launcher};

pub use runtime::{
    EmbeddedLaunch, LaunchPlan, Runtime, RuntimeDriver, RuntimeError,
    RuntimeRegistry, SpawnLaunch,
};

pub use serve::{ServeCommand, ServeError, ServeOptions};

pub use worker::{
    Application, BoxError, EchoApplication, NoOpHooks, TransportError, Worker,
    WorkerError, WorkerHooks, WorkerSummary, WorkerTransport,
};

pub mod prelude {
    pub use crate::{
        Application, BoxError, CanonicalRequest, CanonicalResponse,
        LaunchPlan, ResponseSink, Runtime, RuntimeConfig, RuntimeRegistry,
        SwooleHandler, SwooleRequest, Worker, WorkerHooks, WorkerTransport,
    };

    #[cfg(feature = "http")]
    pub use crate::{HttpTransport, Psr7Transport};
}
