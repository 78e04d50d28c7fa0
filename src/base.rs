//! Setup shared by every endpoint role

use crate::error::{Error, Result};
use crate::interface::BusInterface;
use crate::transport::TransportEndpoint;
use crate::NodeId;
use std::fmt;
use tracing::{info, warn};

/// Lifecycle of an endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Built, no path opened yet
    Constructed,
    /// Initialized; registration, receive and publish are allowed
    Ready,
    /// Initialization failed; the instance must be discarded
    Failed,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointState::Constructed => write!(f, "constructed"),
            EndpointState::Ready => write!(f, "ready"),
            EndpointState::Failed => write!(f, "failed"),
        }
    }
}

/// Node identity, transport endpoint and lifecycle state.
///
/// Roles own a `Base` and call [`Base::initialize_after`] with their own path-opening
/// step. `initialize` may run only once per instance: a second call, or a call after
/// a failure, returns [`Error::InvalidState`].
pub struct Base<T: TransportEndpoint> {
    node_id: NodeId,
    transport: T,
    state: EndpointState,
}

impl<T: TransportEndpoint> Base<T> {
    pub fn new(node_id: NodeId, transport: T) -> Self {
        Self {
            node_id,
            transport,
            state: EndpointState::Constructed,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EndpointState::Ready
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bind the node identity into the transport endpoint
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_constructed()?;

        match self.transport.bind(self.node_id) {
            Ok(()) => {
                self.state = EndpointState::Ready;
                info!(
                    "Node {} ready on {}",
                    self.node_id,
                    self.transport.interface().name()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Failed to bind node {}: {}", self.node_id, e);
                self.state = EndpointState::Failed;
                Err(e)
            }
        }
    }

    /// Run `open` against the bus interface, then [`Base::initialize`].
    ///
    /// If `open` fails the binding step does not run.
    pub fn initialize_after<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce(&mut T::Interface) -> Result<()>,
    {
        self.expect_constructed()?;

        if let Err(e) = open(self.transport.interface_mut()) {
            warn!(
                "Failed to open {} for node {}: {}",
                self.transport.interface().name(),
                self.node_id,
                e
            );
            self.state = EndpointState::Failed;
            return Err(e);
        }

        self.initialize()
    }

    /// The transport, provided the endpoint is ready
    pub fn ready_transport(&mut self, operation: &'static str) -> Result<&mut T> {
        if self.state != EndpointState::Ready {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(&mut self.transport)
    }

    fn expect_constructed(&self) -> Result<()> {
        if self.state != EndpointState::Constructed {
            return Err(Error::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        Ok(())
    }
}
