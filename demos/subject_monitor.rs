//! Subscribes node 42 to subject 1000 on `vcan0` and prints what arrives.
//!
//! A publisher thread on the same bus stands in for the rest of the network.
//! `CANPORT_TRANSPORT` may hold a JSON transport config, e.g. `{"extent": 8}`.

use canport::{
    BusConfig, MemoryResource, NodeId, PortId, Publisher, Subscriber, Transfer, TransportConfig,
    TransportEndpoint, VirtualBus,
};
use std::env;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

const BUS_NAME: &str = "vcan0";
const SUBJECT: PortId = PortId(1000);
const MESSAGES: u32 = 5;

fn transport_config() -> TransportConfig {
    let Ok(raw) = env::var("CANPORT_TRANSPORT") else {
        return TransportConfig::default();
    };
    match serde_json::from_str::<TransportConfig>(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring CANPORT_TRANSPORT: {}", e);
            TransportConfig::default()
        }
    }
}

fn main() -> canport::Result<()> {
    canport::logging::init("subject_monitor=info,canport=debug");

    let bus = VirtualBus::create(BusConfig::named(BUS_NAME))?;
    let config = transport_config();

    let listener = |transfer: &Transfer| {
        let source = transfer
            .metadata
            .source
            .map_or_else(|| "anonymous".to_string(), |node| node.to_string());
        info!(
            "subject {} from {} (transfer {}, {:?}): {:02x?}",
            transfer.subject(),
            source,
            transfer.metadata.transfer_id.into_u8(),
            transfer.metadata.priority,
            &transfer.payload[..]
        );
    };

    let mut subscriber = Subscriber::with_config(
        BUS_NAME,
        NodeId::try_from(42u8)?,
        &listener,
        MemoryResource::default(),
        config.clone(),
    );
    subscriber.initialize()?;
    subscriber.register_subject_id(SUBJECT)?;

    let publisher = thread::spawn(move || -> canport::Result<()> {
        let mut publisher = Publisher::with_config(
            BUS_NAME,
            NodeId::try_from(7u8)?,
            MemoryResource::default(),
            config,
        );
        publisher.initialize()?;
        for i in 0..MESSAGES {
            publisher.publish(SUBJECT, &i.to_be_bytes())?;
            thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    });

    while !publisher.is_finished() {
        subscriber.receive()?;
        thread::sleep(Duration::from_millis(20));
    }
    match publisher.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Publisher failed: {}", e),
        Err(_) => error!("Publisher thread panicked"),
    }
    subscriber.receive()?;

    let stats = subscriber.transport().stats();
    info!(
        "{} transfers delivered, {} frames lost, bus {:?}",
        stats.transfers_delivered,
        subscriber.transport().interface().frames_lost(),
        bus.stats()
    );
    Ok(())
}
