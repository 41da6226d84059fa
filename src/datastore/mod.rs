//! Datastore bootstrap subsystem.
//!
//! # Data Flow
//! ```text
//! DatastoreConfig (URLs, timeout, retry policy)
//!     → bootstrap.rs (Bootstrap::connect_all, one retry loop per store)
//!         → connector.rs (one attempt, bounded by the connect timeout)
//!         → resilience::retries (backoff between attempts)
//!     → Connections handed to the HTTP layer for readiness reporting
//! ```

pub mod bootstrap;
pub mod connector;

pub use bootstrap::{
    connect_with_retry, AttemptOutcome, Bootstrap, BootstrapError, ConnectionAttempt, Connections,
};
pub use connector::{
    ConnectError, Connection, DatastoreConnector, DatastoreKind, DatastoreTarget, TcpConnector,
};
