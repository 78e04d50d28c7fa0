use canport::{
    BusConfig, MemoryResource, Mtu, NodeId, PortId, Publisher, Subscriber, Transfer,
    TransportConfig, VirtualBus,
};
use crossbeam::channel::{self, Sender, TryRecvError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

const BUS_NAME: &str = "telemetry0";
const TEMPERATURE_SUBJECT: PortId = PortId(2100);
const MONITOR_NODE: u8 = 100;

#[derive(Serialize, Deserialize, Debug)]
struct TemperatureReading {
    sensor: u8,
    temperature: f32,
    timestamp: u64,
    location: String,
}

fn main() {
    canport::logging::init("temperature_telemetry=info,canport=info");

    let args: Vec<String> = env::args().collect();
    let threshold: f32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(30.0);
    let readings: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    let bus = match VirtualBus::create(BusConfig::named(BUS_NAME)) {
        Ok(bus) => bus,
        Err(e) => {
            error!("Failed to create bus: {}", e);
            return;
        }
    };

    let fd = TransportConfig {
        mtu: Mtu::Fd,
        ..Default::default()
    };

    let listener = |transfer: &Transfer| match bincode::deserialize::<TemperatureReading>(
        &transfer.payload,
    ) {
        Ok(reading) => {
            info!(
                "Sensor {} at {} - Temperature: {:.1}°C",
                reading.sensor, reading.location, reading.temperature
            );
            if reading.temperature > threshold {
                warn!(
                    "High temperature {:.1}°C at {} (sensor {}, t={})",
                    reading.temperature, reading.location, reading.sensor, reading.timestamp
                );
            }
        }
        Err(e) => warn!("Failed to decode reading: {}", e),
    };

    let mut monitor = Subscriber::with_config(
        BUS_NAME,
        NodeId::from_u8_truncating(MONITOR_NODE),
        &listener,
        MemoryResource::default(),
        fd.clone(),
    );
    let started = match monitor.initialize() {
        Ok(()) => monitor.register_subject_id(TEMPERATURE_SUBJECT),
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        error!("Failed to start monitor: {}", e);
        return;
    }
    info!("Temperature monitor started, alert threshold {:.1}°C", threshold);

    // Each sensor holds a sender; the channel disconnects once all have finished
    let (progress_tx, progress_rx) = channel::unbounded::<u8>();
    let sensors: Vec<_> = [(1u8, "lab"), (2u8, "server-room")]
        .into_iter()
        .map(|(sensor, location)| {
            let config = fd.clone();
            let progress = progress_tx.clone();
            thread::spawn(move || run_sensor(sensor, location, readings, config, progress))
        })
        .collect();
    drop(progress_tx);

    loop {
        match progress_rx.try_recv() {
            Ok(sensor) => info!("Sensor {} finished", sensor),
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        if let Err(e) = monitor.receive() {
            error!("Error receiving: {}", e);
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    for sensor in sensors {
        let _ = sensor.join();
    }
    if let Err(e) = monitor.receive() {
        error!("Error receiving: {}", e);
    }

    let stats = monitor.transport().stats();
    info!(
        "Monitor received {} readings, {} frames ignored, {} frames written to {}",
        stats.transfers_delivered,
        stats.frames_ignored,
        bus.stats().frames_written,
        bus.name()
    );
}

fn run_sensor(
    sensor: u8,
    location: &str,
    readings: usize,
    config: TransportConfig,
    progress: Sender<u8>,
) {
    let mut publisher = Publisher::with_config(
        BUS_NAME,
        NodeId::from_u8_truncating(sensor),
        MemoryResource::default(),
        config,
    );
    if let Err(e) = publisher.initialize() {
        error!("Sensor {} failed to start: {}", sensor, e);
        return;
    }
    info!("Temperature sensor {} started at {}", sensor, location);

    let mut rng = rand::thread_rng();
    for _ in 0..readings {
        let reading = TemperatureReading {
            sensor,
            temperature: 25.0 + rng.gen_range(-10.0..10.0),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            location: location.to_string(),
        };

        let payload = match bincode::serialize(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode reading: {}", e);
                continue;
            }
        };
        if let Err(e) = publisher.publish(TEMPERATURE_SUBJECT, &payload) {
            error!("Failed to publish temperature: {}", e);
        }

        thread::sleep(Duration::from_millis(200));
    }

    let _ = progress.send(sensor);
}
