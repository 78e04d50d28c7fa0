//! Named in-process CAN bus segments.
//!
//! A bus is created once under a name and looked up by interfaces when they open a
//! path. The registry holds weak references only, so a bus disappears when the last
//! handle to it is dropped.

mod ring_buffer;

pub use ring_buffer::ReadCursor;

use crate::error::{Error, Result};
use crate::frame::CanFrame;
use crate::interface::InterfaceId;
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

lazy_static! {
    static ref REGISTRY: RwLock<HashMap<String, Weak<VirtualBus>>> = RwLock::new(HashMap::new());
}

/// Configuration for creating a new bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Name interfaces use to find the bus
    pub name: String,
    /// Number of frames retained before the oldest is overwritten
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "vcan0".to_string(),
            capacity: 1024,
        }
    }
}

impl BusConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Statistics about a bus
#[derive(Debug, Clone)]
pub struct BusStats {
    pub name: String,
    pub capacity: usize,
    /// Total number of frames written since creation
    pub frames_written: u64,
    /// Frames currently held in the ring
    pub frames_retained: usize,
    /// Interfaces with an open path
    pub attached_interfaces: usize,
}

/// A shared, lossy CAN bus living in process memory
pub struct VirtualBus {
    name: String,
    ring: Mutex<RingBuffer>,
    closed: AtomicBool,
    attached: AtomicUsize,
    external: InterfaceId,
}

impl VirtualBus {
    /// Create and register a new bus
    pub fn create(config: BusConfig) -> Result<Arc<Self>> {
        info!("Creating virtual bus with config: {:?}", config);

        if config.name.is_empty() {
            return Err(Error::InvalidConfig("Bus name cannot be empty".into()));
        }
        let ring = RingBuffer::new(config.capacity)?;

        let mut registry = REGISTRY.write();
        if registry
            .get(&config.name)
            .is_some_and(|weak| weak.strong_count() > 0)
        {
            warn!("Bus {} already exists", config.name);
            return Err(Error::BusExists(config.name));
        }

        let bus = Arc::new(Self {
            name: config.name.clone(),
            ring: Mutex::new(ring),
            closed: AtomicBool::new(false),
            attached: AtomicUsize::new(0),
            external: InterfaceId::new(),
        });
        registry.insert(config.name, Arc::downgrade(&bus));

        Ok(bus)
    }

    /// Look up an existing bus by name
    pub fn connect(name: &str) -> Result<Arc<Self>> {
        debug!("Connecting to virtual bus: {}", name);
        REGISTRY
            .read()
            .get(name)
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::BusNotFound(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put a frame on the bus as if another node had sent it
    pub fn inject(&self, frame: CanFrame) -> Result<()> {
        self.write(&self.external, frame)
    }

    /// Stop the bus; subsequent reads and writes fail
    pub fn shutdown(&self) {
        info!("Shutting down virtual bus: {}", self.name);
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get bus statistics
    pub fn stats(&self) -> BusStats {
        let ring = self.ring.lock();
        BusStats {
            name: self.name.clone(),
            capacity: ring.capacity(),
            frames_written: ring.written(),
            frames_retained: ring.len(),
            attached_interfaces: self.attached.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn attach(&self) -> ReadCursor {
        self.attached.fetch_add(1, Ordering::Relaxed);
        self.ring.lock().tail_cursor()
    }

    pub(crate) fn detach(&self) {
        self.attached.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, origin: &InterfaceId, frame: CanFrame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::BusClosed(self.name.clone()));
        }
        let seq = self.ring.lock().write(origin.clone(), frame);
        debug!("Frame {} written to bus {} by {}", seq, self.name, origin);
        Ok(())
    }

    pub(crate) fn read(&self, reader: &InterfaceId, cursor: &mut ReadCursor) -> Result<Option<CanFrame>> {
        if self.is_closed() {
            return Err(Error::BusClosed(self.name.clone()));
        }
        Ok(self.ring.lock().read(reader, cursor))
    }
}

impl Drop for VirtualBus {
    fn drop(&mut self) {
        let mut registry = REGISTRY.write();
        if registry
            .get(&self.name)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            debug!("Unregistering virtual bus: {}", self.name);
            registry.remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_connect() {
        let bus = VirtualBus::create(BusConfig::named("bus-unit-connect")).unwrap();
        let same = VirtualBus::connect("bus-unit-connect").unwrap();
        assert!(Arc::ptr_eq(&bus, &same));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let _bus = VirtualBus::create(BusConfig::named("bus-unit-duplicate")).unwrap();
        assert!(matches!(
            VirtualBus::create(BusConfig::named("bus-unit-duplicate")),
            Err(Error::BusExists(_))
        ));
    }

    #[test]
    fn test_name_released_on_drop() {
        let bus = VirtualBus::create(BusConfig::named("bus-unit-release")).unwrap();
        drop(bus);
        assert!(matches!(
            VirtualBus::connect("bus-unit-release"),
            Err(Error::BusNotFound(_))
        ));
        assert!(VirtualBus::create(BusConfig::named("bus-unit-release")).is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            VirtualBus::create(BusConfig::named("")),
            Err(Error::InvalidConfig(_))
        ));
        let config = BusConfig {
            name: "bus-unit-zero".to_string(),
            capacity: 0,
        };
        assert!(matches!(
            VirtualBus::create(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_shutdown_rejects_io() {
        let bus = VirtualBus::create(BusConfig::named("bus-unit-shutdown")).unwrap();
        bus.shutdown();
        assert!(matches!(
            bus.inject(CanFrame::new(0, vec![0xe0])),
            Err(Error::BusClosed(_))
        ));
        let mut cursor = bus.attach();
        assert!(bus.read(&InterfaceId::new(), &mut cursor).is_err());
    }

    #[test]
    fn test_stats() {
        let bus = VirtualBus::create(BusConfig {
            name: "bus-unit-stats".to_string(),
            capacity: 2,
        })
        .unwrap();
        for _ in 0..3 {
            bus.inject(CanFrame::new(0, vec![0xe0])).unwrap();
        }
        let _cursor = bus.attach();

        let stats = bus.stats();
        assert_eq!(stats.name, "bus-unit-stats");
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.frames_written, 3);
        assert_eq!(stats.frames_retained, 2);
        assert_eq!(stats.attached_interfaces, 1);
    }
}
