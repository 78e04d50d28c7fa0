//! Link-level access to a CAN bus

use crate::bus::{ReadCursor, VirtualBus};
use crate::error::{Error, Result};
use crate::frame::CanFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Link-level send and receive over a named bus.
///
/// Opening a path is separate from construction so that failures surface as
/// `Result`s instead of from a constructor.
pub trait BusInterface {
    /// Name of the bus this interface talks to
    fn name(&self) -> &str;

    /// Open the receive path
    fn initialize_input(&mut self) -> Result<()>;

    /// Open the transmit path
    fn initialize_output(&mut self) -> Result<()>;

    fn is_input_open(&self) -> bool;

    fn is_output_open(&self) -> bool;

    /// Next pending frame, or `None` when nothing is pending. Never blocks.
    fn receive_frame(&mut self) -> Result<Option<CanFrame>>;

    fn transmit_frame(&mut self, frame: CanFrame) -> Result<()>;
}

/// Unique identifier for an interface attached to a bus
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct InterfaceId(Uuid);

impl Default for InterfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceId {
    /// Create a new random interface ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Attachment {
    bus: Arc<VirtualBus>,
    cursor: ReadCursor,
}

/// Interface to a [`VirtualBus`] looked up by name when a path is opened
pub struct VirtualInterface {
    id: InterfaceId,
    name: String,
    input: Option<Attachment>,
    output: Option<Arc<VirtualBus>>,
}

impl VirtualInterface {
    /// Create an interface for the bus called `name`. No bus access happens here.
    pub fn new(name: &str) -> Self {
        Self {
            id: InterfaceId::new(),
            name: name.to_string(),
            input: None,
            output: None,
        }
    }

    pub fn id(&self) -> &InterfaceId {
        &self.id
    }

    /// Frames this interface missed because the bus overwrote them
    pub fn frames_lost(&self) -> u64 {
        self.input
            .as_ref()
            .map_or(0, |attachment| attachment.cursor.lost())
    }

    fn open_bus(&self, direction: &str) -> Result<Arc<VirtualBus>> {
        if self.name.is_empty() {
            return Err(Error::InterfaceOpen {
                interface: self.name.clone(),
                reason: "interface name is empty".into(),
            });
        }
        let bus = VirtualBus::connect(&self.name).map_err(|e| {
            error!("Failed to open {} on {}: {}", direction, self.name, e);
            Error::InterfaceOpen {
                interface: self.name.clone(),
                reason: e.to_string(),
            }
        })?;
        if bus.is_closed() {
            return Err(Error::InterfaceOpen {
                interface: self.name.clone(),
                reason: "bus is closed".into(),
            });
        }
        info!("Opened {} on {} ({})", direction, self.name, self.id);
        Ok(bus)
    }
}

impl BusInterface for VirtualInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize_input(&mut self) -> Result<()> {
        if self.input.is_some() {
            debug!("Input on {} already open", self.name);
            return Ok(());
        }
        let bus = self.open_bus("input")?;
        let cursor = bus.attach();
        self.input = Some(Attachment { bus, cursor });
        Ok(())
    }

    fn initialize_output(&mut self) -> Result<()> {
        if self.output.is_some() {
            debug!("Output on {} already open", self.name);
            return Ok(());
        }
        self.output = Some(self.open_bus("output")?);
        Ok(())
    }

    fn is_input_open(&self) -> bool {
        self.input.is_some()
    }

    fn is_output_open(&self) -> bool {
        self.output.is_some()
    }

    fn receive_frame(&mut self) -> Result<Option<CanFrame>> {
        let attachment = self
            .input
            .as_mut()
            .ok_or_else(|| Error::Receive(format!("input on {} is not open", self.name)))?;
        attachment
            .bus
            .read(&self.id, &mut attachment.cursor)
            .map_err(|e| Error::Receive(e.to_string()))
    }

    fn transmit_frame(&mut self, frame: CanFrame) -> Result<()> {
        let bus = self
            .output
            .as_ref()
            .ok_or_else(|| Error::Transmit(format!("output on {} is not open", self.name)))?;
        bus.write(&self.id, frame)
            .map_err(|e| Error::Transmit(e.to_string()))
    }
}

impl Drop for VirtualInterface {
    fn drop(&mut self) {
        if let Some(attachment) = self.input.take() {
            attachment.bus.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;

    #[test]
    fn test_construction_does_not_touch_bus() {
        let interface = VirtualInterface::new("iface-unit-missing");
        assert_eq!(interface.name(), "iface-unit-missing");
        assert!(!interface.is_input_open());
        assert!(!interface.is_output_open());
    }

    #[test]
    fn test_open_missing_bus_fails() {
        let mut interface = VirtualInterface::new("iface-unit-missing");
        let err = interface.initialize_input().unwrap_err();
        assert!(matches!(err, Error::InterfaceOpen { .. }));
        assert!(!interface.is_input_open());
    }

    #[test]
    fn test_empty_name_fails() {
        let mut interface = VirtualInterface::new("");
        assert!(matches!(
            interface.initialize_output(),
            Err(Error::InterfaceOpen { .. })
        ));
    }

    #[test]
    fn test_closed_paths_reject_io() {
        let mut interface = VirtualInterface::new("iface-unit-closed");
        assert!(matches!(interface.receive_frame(), Err(Error::Receive(_))));
        assert!(matches!(
            interface.transmit_frame(CanFrame::new(0, vec![0xe0])),
            Err(Error::Transmit(_))
        ));
    }

    #[test]
    fn test_frames_flow_between_interfaces() {
        let bus = VirtualBus::create(BusConfig::named("iface-unit-flow")).unwrap();
        let mut rx = VirtualInterface::new("iface-unit-flow");
        let mut tx = VirtualInterface::new("iface-unit-flow");
        rx.initialize_input().unwrap();
        tx.initialize_output().unwrap();
        assert_eq!(bus.stats().attached_interfaces, 1);

        let frame = CanFrame::new(0x1234, vec![1, 0xe0]);
        tx.transmit_frame(frame.clone()).unwrap();
        assert_eq!(rx.receive_frame().unwrap(), Some(frame));
        assert_eq!(rx.receive_frame().unwrap(), None);

        drop(rx);
        assert_eq!(bus.stats().attached_interfaces, 0);
    }

    #[test]
    fn test_own_frames_not_looped_back() {
        let _bus = VirtualBus::create(BusConfig::named("iface-unit-loop")).unwrap();
        let mut interface = VirtualInterface::new("iface-unit-loop");
        interface.initialize_input().unwrap();
        interface.initialize_output().unwrap();

        interface
            .transmit_frame(CanFrame::new(0x1234, vec![0xe0]))
            .unwrap();
        assert_eq!(interface.receive_frame().unwrap(), None);
    }
}
