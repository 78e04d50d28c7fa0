//! Endpoint roles for Cyphal-style publish/subscribe over a CAN bus.
//!
//! A [`Subscriber`] binds a node identity to a bus interface, registers interest in
//! message subjects and pumps received transfers into a caller-supplied [`Listener`].
//! A [`Publisher`] shares the same two-phase setup and sends single-frame messages.
//!
//! Roles are passive: nothing runs unless the caller invokes an operation. Setup is
//! split into construction (never fails, no I/O) and [`Subscriber::initialize`], which
//! opens the interface path and then binds the node identity through [`Base`].
//!
//! The crate ships in-process collaborators so the roles can run without hardware:
//! a named [`VirtualBus`], a [`VirtualInterface`] attached to it and a [`CanTransport`]
//! that filters message frames by subject.

pub mod base;
pub mod bus;
pub mod client;
pub mod error;
pub mod frame;
pub mod interface;
pub mod logging;
pub mod memory;
pub mod transport;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use base::{Base, EndpointState};
pub use bus::{BusConfig, BusStats, VirtualBus};
pub use client::{Publisher, Subscriber};
pub use error::{Error, ErrorKind, Result, Status};
pub use frame::{CanFrame, Mtu};
pub use interface::{BusInterface, VirtualInterface};
pub use memory::MemoryResource;
pub use transport::{CanTransport, Listener, TransportConfig, TransportEndpoint, TransportStats};

/// Address of a participant on the bus (0..=127)
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u8);

impl NodeId {
    const MAX_VALUE: u8 = 0x7f;
    pub const MAX: NodeId = NodeId(Self::MAX_VALUE);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value).ok_or_else(|| Error::InvalidConfig(format!("node ID {} out of range", value)))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw port identifier as supplied by a caller.
///
/// The valid range depends on the transfer kind, so validation is left to the
/// transport endpoint.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u16);

impl From<u16> for PortId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message subject identifier (0..=8191)
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(u16);

impl SubjectId {
    const MAX_VALUE: u16 = 0x1fff;
    pub const MAX: SubjectId = SubjectId(Self::MAX_VALUE);

    pub const fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u16_truncating(value: u16) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl TryFrom<PortId> for SubjectId {
    type Error = Error;

    fn try_from(port: PortId) -> Result<Self> {
        Self::new(port.0).ok_or(Error::InvalidPortId(port.0))
    }
}

impl From<SubjectId> for PortId {
    fn from(value: SubjectId) -> Self {
        PortId(value.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modulo-32 transfer counter carried in the tail byte
#[derive(Debug, Copy, Clone, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferId(u8);

impl TransferId {
    const MAX_VALUE: u8 = 0x1f;

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        Self::from_u8_truncating(self.0.wrapping_add(1))
    }
}

/// Transfer priority; encoding matches the CAN ID, so lower values win arbitration.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Exceptional = 0,
    Immediate = 1,
    Fast = 2,
    High = 3,
    Nominal = 4,
    Low = 5,
    Slow = 6,
    Optional = 7,
}

impl Priority {
    pub const fn from_u8_truncating(code: u8) -> Priority {
        match code & 0x7 {
            0 => Priority::Exceptional,
            1 => Priority::Immediate,
            2 => Priority::Fast,
            3 => Priority::High,
            4 => Priority::Nominal,
            5 => Priority::Low,
            6 => Priority::Slow,
            _ => Priority::Optional,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Nominal
    }
}

/// Category of a transfer
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Message,
    Request,
    Response,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Message => write!(f, "message"),
            TransferKind::Request => write!(f, "request"),
            TransferKind::Response => write!(f, "response"),
        }
    }
}

/// Transport-level properties of a received transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferMetadata {
    pub kind: TransferKind,
    pub priority: Priority,
    pub subject: SubjectId,
    /// `None` for anonymous publishers
    pub source: Option<NodeId>,
    pub transfer_id: TransferId,
}

/// A complete application-level transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub metadata: TransferMetadata,
    pub payload: Bytes,
}

impl Transfer {
    /// Create a message transfer
    pub fn message(
        subject: SubjectId,
        source: Option<NodeId>,
        transfer_id: TransferId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            metadata: TransferMetadata {
                kind: TransferKind::Message,
                priority: Priority::default(),
                subject,
                source,
                transfer_id,
            },
            payload: payload.into(),
        }
    }

    pub fn subject(&self) -> SubjectId {
        self.metadata.subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert_eq!(NodeId::new(42).map(NodeId::into_u8), Some(42));
        assert!(NodeId::new(128).is_none());
        assert!(NodeId::try_from(200u8).is_err());
    }

    #[test]
    fn test_subject_from_port() {
        assert_eq!(SubjectId::try_from(PortId(1000)).unwrap().into_u16(), 1000);
        assert!(matches!(
            SubjectId::try_from(PortId(8192)),
            Err(Error::InvalidPortId(8192))
        ));
    }

    #[test]
    fn test_transfer_id_wraps() {
        let id = TransferId::from_u8_truncating(31);
        assert_eq!(id.next().into_u8(), 0);
    }
}
