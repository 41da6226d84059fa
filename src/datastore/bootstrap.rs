//! Connection bootstrap with retry.
//!
//! # Responsibilities
//! - Drive a connector under a retry policy until it connects
//! - Emit one structured event and one metric per attempt
//! - Connect the relational and document stores concurrently
//!
//! # Design Decisions
//! - With the default policy (unbounded, fixed 2s) `connect_with_retry`
//!   resolves only on success; startup simply waits for its dependencies
//! - The two stores retry independently; one being down never delays the
//!   other's attempts

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::config::schema::DatastoreConfig;
use crate::datastore::connector::{
    ConnectError, Connection, DatastoreConnector, DatastoreKind, DatastoreTarget, TcpConnector,
};
use crate::observability::metrics;
use crate::resilience::retries::{RetryError, RetryPolicy};

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure => "failure",
        }
    }
}

/// One connection attempt, reported through logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub target: DatastoreKind,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Delay before the next attempt, `None` on success or when giving up.
    pub retry_in: Option<Duration>,
    pub timestamp: SystemTime,
}

impl ConnectionAttempt {
    pub fn new(target: DatastoreKind, attempt: u32, outcome: AttemptOutcome) -> Self {
        Self {
            target,
            attempt,
            outcome,
            retry_in: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn retry_in(mut self, delay: Option<Duration>) -> Self {
        self.retry_in = delay;
        self
    }

    fn emit(&self, result: Result<&Connection, &ConnectError>) {
        metrics::record_connection_attempt(self.target.as_str(), self.outcome.as_str());
        match result {
            Ok(connection) => tracing::info!(
                target_store = %self.target,
                attempt = self.attempt,
                endpoint = %connection.endpoint,
                "Datastore connected"
            ),
            Err(e) => match self.retry_in {
                Some(delay) => tracing::error!(
                    target_store = %self.target,
                    attempt = self.attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Datastore connection failed, retrying"
                ),
                None => tracing::error!(
                    target_store = %self.target,
                    attempt = self.attempt,
                    error = %e,
                    "Datastore connection failed, giving up"
                ),
            },
        }
    }
}

/// Bootstrap gave up on a store.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{target} store unreachable after {attempts} attempt(s): {source}")]
    Exhausted {
        target: DatastoreKind,
        attempts: u32,
        #[source]
        source: ConnectError,
    },
}

/// Connect to `target`, retrying per `policy`.
pub async fn connect_with_retry<C>(
    target: &DatastoreTarget,
    connector: &C,
    policy: &RetryPolicy,
) -> Result<Connection, BootstrapError>
where
    C: DatastoreConnector + ?Sized,
{
    tracing::info!(target_store = %target.kind, store = ?target, "Connecting to datastore");

    policy
        .run_notify(
            |attempt| async move {
                let result = connector.connect(target).await;
                if let Ok(connection) = &result {
                    ConnectionAttempt::new(target.kind, attempt, AttemptOutcome::Success)
                        .emit(Ok(connection));
                }
                result
            },
            |attempt, error, retry_in| {
                ConnectionAttempt::new(target.kind, attempt, AttemptOutcome::Failure)
                    .retry_in(retry_in)
                    .emit(Err(error));
            },
        )
        .await
        .map_err(|RetryError { attempts, last_error }| BootstrapError::Exhausted {
            target: target.kind,
            attempts,
            source: last_error,
        })
}

/// Both store connections, held for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connections {
    pub relational: Connection,
    pub document: Connection,
}

/// Connects every configured store.
pub struct Bootstrap {
    connector: Arc<dyn DatastoreConnector>,
    policy: RetryPolicy,
    relational: DatastoreTarget,
    document: DatastoreTarget,
}

impl Bootstrap {
    pub fn new(
        connector: Arc<dyn DatastoreConnector>,
        policy: RetryPolicy,
        relational: DatastoreTarget,
        document: DatastoreTarget,
    ) -> Self {
        Self {
            connector,
            policy,
            relational,
            document,
        }
    }

    /// TCP reachability bootstrap from configuration.
    pub fn from_config(config: &DatastoreConfig) -> Self {
        Self::new(
            Arc::new(TcpConnector::new(Duration::from_millis(config.connect_timeout_ms))),
            RetryPolicy::from_config(&config.retry),
            DatastoreTarget::relational(config.relational_url.clone()),
            DatastoreTarget::document(config.document_url.clone()),
        )
    }

    /// Connect both stores concurrently.
    pub async fn connect_all(&self) -> Result<Connections, BootstrapError> {
        let connector = self.connector.as_ref();
        let (relational, document) = tokio::join!(
            connect_with_retry(&self.relational, connector, &self.policy),
            connect_with_retry(&self.document, connector, &self.policy),
        );
        Ok(Connections {
            relational: relational?,
            document: document?,
        })
    }
}
