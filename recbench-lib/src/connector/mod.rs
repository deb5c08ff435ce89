//! Boundary to the record service under test.
//!
//! The engine only knows the [`Connector`] capability; wire protocol,
//! authentication and payloads are the business of the implementation.

use std::{fmt, sync::Arc};

use rama::error::BoxError;

use crate::identifiers::Key;

pub mod memory;

/// Operations the engine issues against the record service.
///
/// Read, update and delete report a missing record as [`ConnectorError::NotFound`],
/// which the engine treats as a completed operation.
pub trait Connector: Send + Sync + 'static {
    /// Clear or initialise the remote state for a fresh run.
    fn prepare_run(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn create_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn read_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn update_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn delete_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    /// Storage consumption of a remote resource, formatted as
    /// `tableSize: N, recordCount: N, totalSize: N`.
    fn storage_metrics(
        &self,
        resource: &str,
    ) -> impl Future<Output = Result<String, ConnectorError>> + Send;
}

impl<C: Connector> Connector for Arc<C> {
    fn prepare_run(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).prepare_run()
    }

    fn create_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).create_record(key)
    }

    fn read_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).read_record(key)
    }

    fn update_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).update_record(key)
    }

    fn delete_record(&self, key: &Key) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).delete_record(key)
    }

    fn ping(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send {
        (**self).ping()
    }

    fn storage_metrics(
        &self,
        resource: &str,
    ) -> impl Future<Output = Result<String, ConnectorError>> + Send {
        (**self).storage_metrics(resource)
    }
}

/// Produces the connectors used during a run.
///
/// The orchestrator asks for one connector per worker plus one for itself,
/// so implementations can keep session or authentication state per connector.
pub trait ConnectorFactory: Send + Sync + 'static {
    type Connector: Connector;

    fn create(&self) -> impl Future<Output = Result<Self::Connector, ConnectorError>> + Send;

    /// Release resources shared by all connectors of this factory.
    fn shutdown(&self) {}
}

/// Factory handing out the same connector to every caller.
#[derive(Debug)]
pub struct SharedConnector<C>(Arc<C>);

impl<C> SharedConnector<C> {
    pub fn new(connector: C) -> Self {
        Self(Arc::new(connector))
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.0
    }
}

impl<C> Clone for SharedConnector<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C: Connector> ConnectorFactory for SharedConnector<C> {
    type Connector = Arc<C>;

    async fn create(&self) -> Result<Self::Connector, ConnectorError> {
        Ok(self.0.clone())
    }
}

/// Failure reported by a [`Connector`].
#[derive(Debug)]
pub enum ConnectorError {
    /// The targeted record does not exist (anymore).
    NotFound,
    /// Any other failure: transport, authentication, unexpected response, ...
    Other(BoxError),
}

impl ConnectorError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::NotFound => write!(f, "ConnectorError: record not found"),
            ConnectorError::Other(err) => write!(f, "ConnectorError: {err}"),
        }
    }
}

impl std::error::Error for ConnectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectorError::NotFound => None,
            ConnectorError::Other(err) => Some(err.as_ref()),
        }
    }
}
