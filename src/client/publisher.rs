use crate::base::{Base, EndpointState};
use crate::error::Result;
use crate::interface::{BusInterface, VirtualInterface};
use crate::memory::MemoryResource;
use crate::transport::{CanTransport, TransportConfig, TransportEndpoint};
use crate::{NodeId, PortId, Priority};
use tracing::debug;

/// Sends single-frame messages on a bus.
pub struct Publisher<T: TransportEndpoint = CanTransport<VirtualInterface>> {
    base: Base<T>,
    default_priority: Priority,
}

impl Publisher {
    /// Create a publisher on the virtual bus `can_interface`. Nothing is opened yet.
    pub fn new(can_interface: &str, node_id: NodeId, resource: MemoryResource) -> Self {
        Self::with_config(can_interface, node_id, resource, TransportConfig::default())
    }

    pub fn with_config(
        can_interface: &str,
        node_id: NodeId,
        resource: MemoryResource,
        config: TransportConfig,
    ) -> Self {
        let priority = config.default_priority;
        let transport =
            CanTransport::with_config(VirtualInterface::new(can_interface), resource, config);
        let mut publisher = Self::with_transport(node_id, transport);
        publisher.default_priority = priority;
        publisher
    }
}

impl<T: TransportEndpoint> Publisher<T> {
    /// Create a publisher over any transport endpoint
    pub fn with_transport(node_id: NodeId, transport: T) -> Self {
        debug!("Creating publisher for node {}", node_id);
        Self {
            base: Base::new(node_id, transport),
            default_priority: Priority::default(),
        }
    }

    /// Open the output path, then bind the node identity.
    pub fn initialize(&mut self) -> Result<()> {
        self.base
            .initialize_after(|interface| interface.initialize_output())
    }

    /// Publish a message with the default priority
    pub fn publish(&mut self, subject_id: PortId, payload: &[u8]) -> Result<()> {
        self.publish_with_priority(subject_id, self.default_priority, payload)
    }

    pub fn publish_with_priority(
        &mut self,
        subject_id: PortId,
        priority: Priority,
        payload: &[u8],
    ) -> Result<()> {
        debug!(
            "Publishing to subject {} (size: {} bytes)",
            subject_id,
            payload.len()
        );
        self.base
            .ready_transport("publish")?
            .transmit(subject_id, priority, payload)
    }

    pub fn node_id(&self) -> NodeId {
        self.base.node_id()
    }

    pub fn state(&self) -> EndpointState {
        self.base.state()
    }

    pub fn transport(&self) -> &T {
        self.base.transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusConfig, VirtualBus};
    use crate::error::Error;
    use crate::frame::MessageHeader;

    #[test]
    fn test_publish_requires_initialize() {
        let mut publisher = Publisher::new(
            "pub-unit-uninitialized",
            NodeId::new(1).unwrap(),
            MemoryResource::default(),
        );
        assert!(matches!(
            publisher.publish(PortId(1), &[1]),
            Err(Error::InvalidState {
                operation: "publish",
                ..
            })
        ));
    }

    #[test]
    fn test_publish_uses_configured_priority() {
        let bus = VirtualBus::create(BusConfig::named("pub-unit-priority")).unwrap();
        let mut probe = VirtualInterface::new(bus.name());
        probe.initialize_input().unwrap();

        let config = TransportConfig {
            default_priority: Priority::Slow,
            ..Default::default()
        };
        let mut publisher = Publisher::with_config(
            bus.name(),
            NodeId::new(9).unwrap(),
            MemoryResource::default(),
            config,
        );
        publisher.initialize().unwrap();
        assert!(publisher.transport().interface().is_output_open());
        assert!(!publisher.transport().interface().is_input_open());

        publisher.publish(PortId(300), &[1, 2]).unwrap();
        publisher
            .publish_with_priority(PortId(300), Priority::Exceptional, &[3])
            .unwrap();

        let first = probe.receive_frame().unwrap().unwrap();
        let second = probe.receive_frame().unwrap().unwrap();
        assert_eq!(
            MessageHeader::from_can_id(first.id).unwrap().priority,
            Priority::Slow
        );
        assert_eq!(
            MessageHeader::from_can_id(second.id).unwrap().priority,
            Priority::Exceptional
        );
    }

    #[test]
    fn test_publish_failure_after_shutdown() {
        let bus = VirtualBus::create(BusConfig::named("pub-unit-shutdown")).unwrap();
        let mut publisher =
            Publisher::new(bus.name(), NodeId::new(9).unwrap(), MemoryResource::default());
        publisher.initialize().unwrap();

        bus.shutdown();
        assert!(matches!(
            publisher.publish(PortId(300), &[1]),
            Err(Error::Transmit(_))
        ));
    }
}
