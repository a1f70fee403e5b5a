pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod listen;
pub mod policy;
pub mod server;
pub mod signal;
pub mod tls;

pub use config::ServeConfig;
pub use connection::{ConnectionGuard, ConnectionTracker};
pub use coordinator::{coordinate, Coordinator, RunPhase, ServingUnit};
pub use error::{Result, ServeError};
pub use listen::{listen_and_serve, listen_and_serve_tls, serve, serve_tls};
pub use policy::{ShutdownPolicy, ShutdownPolicyBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use server::HttpServer;
pub use signal::{ShutdownSignal, SignalHandler};
pub use tls::{load_tls_config, TlsConfig};

pub use tokio_util::sync::CancellationToken;
