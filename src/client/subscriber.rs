use crate::base::{Base, EndpointState};
use crate::error::Result;
use crate::interface::{BusInterface, VirtualInterface};
use crate::memory::MemoryResource;
use crate::transport::{CanTransport, Listener, TransportConfig, TransportEndpoint};
use crate::{NodeId, PortId, TransferKind};
use tracing::debug;

/// Receives messages on registered subjects and hands them to a listener.
///
/// The listener is borrowed for `'l`; the subscriber never owns or clones it.
///
/// ```no_run
/// use canport::{MemoryResource, NodeId, PortId, Subscriber, Transfer};
///
/// let listener = |transfer: &Transfer| println!("{:?}", transfer.payload);
/// let mut subscriber = Subscriber::new(
///     "vcan0",
///     NodeId::new(42).unwrap(),
///     &listener,
///     MemoryResource::default(),
/// );
/// subscriber.initialize()?;
/// subscriber.register_subject_id(PortId(1000))?;
/// loop {
///     subscriber.receive()?;
/// }
/// # Ok::<(), canport::Error>(())
/// ```
pub struct Subscriber<'l, T: TransportEndpoint = CanTransport<VirtualInterface>> {
    base: Base<T>,
    listener: &'l dyn Listener,
}

impl<'l> Subscriber<'l> {
    /// Create a subscriber on the virtual bus `can_interface`. Nothing is opened yet.
    pub fn new(
        can_interface: &str,
        node_id: NodeId,
        listener: &'l dyn Listener,
        resource: MemoryResource,
    ) -> Self {
        Self::with_config(
            can_interface,
            node_id,
            listener,
            resource,
            TransportConfig::default(),
        )
    }

    pub fn with_config(
        can_interface: &str,
        node_id: NodeId,
        listener: &'l dyn Listener,
        resource: MemoryResource,
        config: TransportConfig,
    ) -> Self {
        let transport =
            CanTransport::with_config(VirtualInterface::new(can_interface), resource, config);
        Self::with_transport(node_id, transport, listener)
    }
}

impl<'l, T: TransportEndpoint> Subscriber<'l, T> {
    /// Create a subscriber over any transport endpoint
    pub fn with_transport(node_id: NodeId, transport: T, listener: &'l dyn Listener) -> Self {
        debug!("Creating subscriber for node {}", node_id);
        Self {
            base: Base::new(node_id, transport),
            listener,
        }
    }

    /// Open the input path, then bind the node identity.
    ///
    /// A failed open skips binding. Any failure leaves the subscriber in
    /// [`EndpointState::Failed`]; it must then be discarded.
    pub fn initialize(&mut self) -> Result<()> {
        self.base
            .initialize_after(|interface| interface.initialize_input())
    }

    /// Accept messages on `subject_id`. Registrations accumulate.
    pub fn register_subject_id(&mut self, subject_id: PortId) -> Result<()> {
        self.base
            .ready_transport("register a subject")?
            .register_subscription(subject_id, TransferKind::Message)
    }

    /// Hand every transfer currently available on the bus to the listener.
    pub fn receive(&mut self) -> Result<()> {
        let listener = self.listener;
        self.base
            .ready_transport("receive")?
            .process_incoming_transfers(listener)
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
    use crate::frame::{CanFrame, MessageHeader, Mtu};
    use crate::{Priority, SubjectId, Transfer, TransferId};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn node() -> NodeId {
        NodeId::new(42).unwrap()
    }

    fn frame(subject: u16, payload: &[u8]) -> CanFrame {
        let header = MessageHeader {
            priority: Priority::Nominal,
            subject: SubjectId::new(subject).unwrap(),
            source: NodeId::new(5),
        };
        CanFrame::single_frame_message(&header, TransferId::default(), payload, Mtu::Classic)
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_receive_through_virtual_bus() {
        let bus = VirtualBus::create(BusConfig::named("sub-unit-receive")).unwrap();
        let received = Mutex::new(Vec::new());
        let listener = |transfer: &Transfer| received.lock().push(transfer.payload.clone());

        let mut subscriber =
            Subscriber::new(bus.name(), node(), &listener, MemoryResource::default());
        subscriber.initialize().unwrap();
        subscriber.register_subject_id(PortId(1000)).unwrap();

        bus.inject(frame(1000, b"abc")).unwrap();
        subscriber.receive().unwrap();

        assert_eq!(received.lock().len(), 1);
        assert_eq!(&received.lock()[0][..], b"abc");
        assert!(logs_contain("Node 42 ready on sub-unit-receive"));
    }

    #[test]
    fn test_operations_rejected_before_initialize() {
        let listener = |_: &Transfer| {};
        let mut subscriber = Subscriber::new(
            "sub-unit-uninitialized",
            node(),
            &listener,
            MemoryResource::default(),
        );

        assert!(matches!(
            subscriber.register_subject_id(PortId(1)),
            Err(Error::InvalidState {
                state: EndpointState::Constructed,
                ..
            })
        ));
        assert!(matches!(
            subscriber.receive(),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_failed_initialize_is_terminal() {
        let listener = |_: &Transfer| {};
        let mut subscriber =
            Subscriber::new("sub-unit-missing", node(), &listener, MemoryResource::default());

        assert!(matches!(
            subscriber.initialize(),
            Err(Error::InterfaceOpen { .. })
        ));
        assert_eq!(subscriber.state(), EndpointState::Failed);
        assert!(logs_contain("Failed to open sub-unit-missing for node 42"));

        let _bus = VirtualBus::create(BusConfig::named("sub-unit-missing")).unwrap();
        assert!(matches!(
            subscriber.initialize(),
            Err(Error::InvalidState {
                state: EndpointState::Failed,
                ..
            })
        ));
        assert!(subscriber.receive().is_err());
    }

    #[test]
    fn test_invalid_config_fails_binding() {
        let _bus = VirtualBus::create(BusConfig::named("sub-unit-config")).unwrap();
        let listener = |_: &Transfer| {};
        let config = TransportConfig {
            extent: 0,
            ..Default::default()
        };
        let mut subscriber = Subscriber::with_config(
            "sub-unit-config",
            node(),
            &listener,
            MemoryResource::default(),
            config,
        );

        assert!(matches!(subscriber.initialize(), Err(Error::Binding(_))));
        assert!(subscriber.transport().interface().is_input_open());
        assert_eq!(subscriber.transport().node_id(), None);
    }
}
