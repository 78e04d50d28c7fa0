//! Transfer-level contract between endpoint roles and the transport.

mod can;
mod filter;

pub use can::CanTransport;
pub use filter::SubjectFilter;

use crate::error::{Error, Result};
use crate::frame::Mtu;
use crate::interface::BusInterface;
use crate::{NodeId, PortId, Priority, Transfer, TransferKind};
use serde::{Deserialize, Serialize};

/// Receives transfers completed by a transport endpoint.
///
/// Listeners are invoked synchronously from within
/// [`TransportEndpoint::process_incoming_transfers`], once per transfer, in the order
/// the endpoint completes them.
pub trait Listener {
    fn on_message(&self, transfer: &Transfer);
}

impl<F> Listener for F
where
    F: Fn(&Transfer),
{
    fn on_message(&self, transfer: &Transfer) {
        self(transfer)
    }
}

/// Transfer-level semantics on top of a bus interface
pub trait TransportEndpoint {
    type Interface: BusInterface;

    fn interface(&self) -> &Self::Interface;

    fn interface_mut(&mut self) -> &mut Self::Interface;

    /// Bind the local node identity
    fn bind(&mut self, node_id: NodeId) -> Result<()>;

    /// Accept inbound transfers of `kind` on `port`
    fn register_subscription(&mut self, port: PortId, kind: TransferKind) -> Result<()>;

    /// Drain pending bus activity, handing every completed transfer to `listener`
    fn process_incoming_transfers(&mut self, listener: &dyn Listener) -> Result<()>;

    /// Send a message transfer on `port`
    fn transmit(&mut self, port: PortId, priority: Priority, payload: &[u8]) -> Result<()>;
}

/// Configuration of a [`CanTransport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mtu: Mtu,
    /// Longest payload kept per transfer; longer payloads are truncated
    pub extent: usize,
    /// Maximum number of subscribed subjects
    pub max_subscriptions: usize,
    /// Upper bound on frames consumed by one receive call
    pub max_frames_per_receive: usize,
    pub default_priority: Priority,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: Mtu::Classic,
            extent: 64,
            max_subscriptions: 64,
            max_frames_per_receive: 256,
            default_priority: Priority::Nominal,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.extent == 0 {
            return Err(Error::InvalidConfig("Extent cannot be zero".into()));
        }
        if self.max_subscriptions == 0 {
            return Err(Error::InvalidConfig(
                "Subscription limit cannot be zero".into(),
            ));
        }
        if self.max_frames_per_receive == 0 {
            return Err(Error::InvalidConfig(
                "Frames per receive cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Statistics about a transport endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Number of subscribed subjects
    pub subscriptions: usize,
    pub frames_received: u64,
    /// Frames dropped by filtering or because they were not single-frame transfers
    pub frames_ignored: u64,
    pub transfers_delivered: u64,
    pub transfers_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TransportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"mtu": "Fd", "extent": 32}"#).unwrap();
        assert_eq!(config.mtu, Mtu::Fd);
        assert_eq!(config.extent, 32);
        assert_eq!(config.max_subscriptions, 64);
        assert_eq!(config.default_priority, Priority::Nominal);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = TransportConfig {
            extent: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = TransportConfig {
            max_frames_per_receive: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
