use super::{Listener, SubjectFilter, TransportConfig, TransportEndpoint, TransportStats};
use crate::error::{Error, Result};
use crate::frame::{CanFrame, MessageHeader};
use crate::interface::BusInterface;
use crate::memory::MemoryResource;
use crate::{
    NodeId, PortId, Priority, SubjectId, Transfer, TransferId, TransferKind, TransferMetadata,
};
use std::collections::HashMap;
use tracing::{debug, error, info, trace};

/// Cyphal/CAN message transport over a [`BusInterface`].
///
/// Handles single-frame message transfers: inbound frames are filtered by subject and
/// handed to the listener one by one; outbound payloads must fit one frame.
/// Service transfers and multi-frame transfers are ignored.
pub struct CanTransport<I: BusInterface> {
    interface: I,
    config: TransportConfig,
    memory: MemoryResource,
    node_id: Option<NodeId>,
    subscriptions: SubjectFilter,
    transfer_ids: HashMap<SubjectId, TransferId>,
    stats: TransportStats,
}

impl<I: BusInterface> CanTransport<I> {
    /// Create a transport with the default configuration
    pub fn new(interface: I, memory: MemoryResource) -> Self {
        Self::with_config(interface, memory, TransportConfig::default())
    }

    /// Create a transport. The configuration is checked when the node is bound.
    pub fn with_config(interface: I, memory: MemoryResource, config: TransportConfig) -> Self {
        Self {
            interface,
            config,
            memory,
            node_id: None,
            subscriptions: SubjectFilter::new(),
            transfer_ids: HashMap::new(),
            stats: TransportStats::default(),
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryResource {
        &self.memory
    }

    pub fn subscriptions(&self) -> &SubjectFilter {
        &self.subscriptions
    }

    /// Stop accepting transfers on `port`; its memory is returned to the resource.
    pub fn unsubscribe(&mut self, port: PortId) -> Result<()> {
        let subject = SubjectId::try_from(port)?;
        if self.subscriptions.remove(subject) {
            debug!("Unsubscribed from subject {}", subject);
        }
        self.stats.subscriptions = self.subscriptions.len();
        Ok(())
    }

    /// Get transport statistics
    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }

    fn accept(&self, frame: &CanFrame) -> Option<Transfer> {
        let Some(header) = MessageHeader::from_can_id(frame.id) else {
            trace!("Ignoring non-message frame {:#010x}", frame.id);
            return None;
        };
        let extent = self.subscriptions.matches(header.subject)?;
        let Some(tail) = frame.tail() else {
            debug!("Ignoring empty frame on subject {}", header.subject);
            return None;
        };
        if !tail.is_single_frame() {
            debug!(
                "Ignoring multi-frame transfer on subject {} (transfer ID {})",
                header.subject,
                tail.transfer_id().into_u8()
            );
            return None;
        }

        let mut payload = frame.payload();
        payload.truncate(extent);

        Some(Transfer {
            metadata: TransferMetadata {
                kind: TransferKind::Message,
                priority: header.priority,
                subject: header.subject,
                source: header.source,
                transfer_id: tail.transfer_id(),
            },
            payload,
        })
    }
}

impl<I: BusInterface> TransportEndpoint for CanTransport<I> {
    type Interface = I;

    fn interface(&self) -> &I {
        &self.interface
    }

    fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    fn bind(&mut self, node_id: NodeId) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| Error::Binding(e.to_string()))?;

        if !self.interface.is_input_open() && !self.interface.is_output_open() {
            return Err(Error::Binding(format!(
                "interface {} has no open path",
                self.interface.name()
            )));
        }

        match self.node_id {
            Some(bound) if bound != node_id => {
                return Err(Error::Binding(format!(
                    "already bound to node {}",
                    bound
                )));
            }
            _ => self.node_id = Some(node_id),
        }

        info!("Bound node {} on {}", node_id, self.interface.name());
        Ok(())
    }

    fn register_subscription(&mut self, port: PortId, kind: TransferKind) -> Result<()> {
        if self.node_id.is_none() {
            return Err(Error::Registration {
                port: port.0,
                reason: "endpoint is not bound".into(),
            });
        }
        if kind != TransferKind::Message {
            return Err(Error::Registration {
                port: port.0,
                reason: format!("{} transfers are not supported", kind),
            });
        }

        let subject = SubjectId::try_from(port)?;
        if self.subscriptions.contains(subject) {
            debug!("Subject {} already subscribed", subject);
            return Ok(());
        }

        if self.subscriptions.len() >= self.config.max_subscriptions {
            error!(
                "Subscription limit exceeded on {}: {}",
                self.interface.name(),
                self.config.max_subscriptions
            );
            return Err(Error::SubscriptionLimitExceeded(
                self.config.max_subscriptions,
            ));
        }

        let reservation = self.memory.reserve(self.config.extent)?;
        self.subscriptions
            .insert(subject, self.config.extent, reservation);
        self.stats.subscriptions = self.subscriptions.len();

        debug!("Subscribed to subject {} on {}", subject, self.interface.name());
        Ok(())
    }

    fn process_incoming_transfers(&mut self, listener: &dyn Listener) -> Result<()> {
        if self.node_id.is_none() {
            return Err(Error::Receive("endpoint is not bound".into()));
        }

        for _ in 0..self.config.max_frames_per_receive {
            let frame = match self.interface.receive_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("Error receiving from {}: {}", self.interface.name(), e);
                    return Err(match e {
                        e @ Error::Receive(_) => e,
                        other => Error::Receive(other.to_string()),
                    });
                }
            };
            self.stats.frames_received += 1;

            match self.accept(&frame) {
                Some(transfer) => {
                    debug!(
                        "Delivering transfer {} on subject {} ({} bytes)",
                        transfer.metadata.transfer_id.into_u8(),
                        transfer.metadata.subject,
                        transfer.payload.len()
                    );
                    listener.on_message(&transfer);
                    self.stats.transfers_delivered += 1;
                }
                None => self.stats.frames_ignored += 1,
            }
        }

        Ok(())
    }

    fn transmit(&mut self, port: PortId, priority: Priority, payload: &[u8]) -> Result<()> {
        let source = self
            .node_id
            .ok_or_else(|| Error::Transmit("endpoint is not bound".into()))?;
        let subject = SubjectId::try_from(port)?;

        let header = MessageHeader {
            priority,
            subject,
            source: Some(source),
        };
        let transfer_id = self.transfer_ids.get(&subject).copied().unwrap_or_default();
        let frame = CanFrame::single_frame_message(&header, transfer_id, payload, self.config.mtu)
            .ok_or(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.config.mtu.max_single_frame_payload(),
            })?;

        self.interface.transmit_frame(frame).map_err(|e| {
            error!("Error transmitting on {}: {}", self.interface.name(), e);
            e
        })?;
        self.transfer_ids.insert(subject, transfer_id.next());
        self.stats.transfers_sent += 1;

        debug!(
            "Sent transfer {} on subject {} ({} bytes)",
            transfer_id.into_u8(),
            subject,
            payload.len()
        );
        Ok(())
    }
}
