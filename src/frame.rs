//! CAN frames and the Cyphal/CAN message identifier layout
//!
//! Only message identifiers are decoded into headers. Service frames are recognized
//! so they can be skipped, but their fields are not interpreted.

use crate::{NodeId, Priority, SubjectId, TransferId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

const fn lsb_mask(bits: u32) -> u32 {
    (1 << bits) - 1
}

pub const CAN_ID_MASK: u32 = lsb_mask(29);
const NODE_ID_MASK: u32 = lsb_mask(7);
const SUBJECT_ID_MASK: u32 = lsb_mask(13);
const PRIORITY_MASK: u32 = lsb_mask(3);

const PRIORITY_OFFSET: u32 = 26;
const SOURCE_OFFSET: u32 = 0;
const MSG_SUBJECT_OFFSET: u32 = 8;

const SERVICE_FLAG: u32 = 1 << 25;
const MSG_ANONYMOUS_FLAG: u32 = 1 << 24;
const RES_23_FLAG: u32 = 1 << 23;
const MSG_RES_7_FLAG: u32 = 1 << 7;

const MSG_CHECK_MASK: u32 = SERVICE_FLAG | RES_23_FLAG | MSG_RES_7_FLAG;

/// Maximum transmission unit of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mtu {
    Classic,
    Fd,
}

impl Mtu {
    pub const fn bytes(self) -> usize {
        match self {
            Mtu::Classic => 8,
            Mtu::Fd => 64,
        }
    }

    /// Largest payload a single-frame transfer can carry (one byte goes to the tail).
    pub const fn max_single_frame_payload(self) -> usize {
        self.bytes() - 1
    }
}

impl Default for Mtu {
    fn default() -> Self {
        Mtu::Classic
    }
}

/// Rounds a length up to the next valid CAN-FD data length.
pub const fn padded_length(value: usize) -> Option<usize> {
    match value {
        0..=8 => Some(value),
        9..=24 => Some(value.div_ceil(4) * 4),
        25..=32 => Some(32),
        33..=64 => Some(value.div_ceil(16) * 16),
        _ => None,
    }
}

/// Header fields of a message frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub priority: Priority,
    pub subject: SubjectId,
    /// `None` when the anonymous flag is set
    pub source: Option<NodeId>,
}

impl MessageHeader {
    /// Builds the 29-bit extended CAN ID.
    pub fn to_can_id(&self) -> u32 {
        let mut id = u32::from(self.priority.into_u8()) << PRIORITY_OFFSET
            | u32::from(self.subject.into_u16()) << MSG_SUBJECT_OFFSET;
        match self.source {
            Some(source) => id |= u32::from(source.into_u8()) << SOURCE_OFFSET,
            None => id |= MSG_ANONYMOUS_FLAG,
        }
        id
    }

    /// Decodes a message CAN ID. Returns `None` for service frames and frames with
    /// reserved bits set.
    pub fn from_can_id(can_id: u32) -> Option<Self> {
        let can_id = can_id & CAN_ID_MASK;
        if can_id & MSG_CHECK_MASK != 0 {
            return None;
        }
        let priority = Priority::from_u8_truncating(((can_id >> PRIORITY_OFFSET) & PRIORITY_MASK) as u8);
        let subject =
            SubjectId::from_u16_truncating(((can_id >> MSG_SUBJECT_OFFSET) & SUBJECT_ID_MASK) as u16);
        let source = if can_id & MSG_ANONYMOUS_FLAG != 0 {
            None
        } else {
            Some(NodeId::from_u8_truncating(
                ((can_id >> SOURCE_OFFSET) & NODE_ID_MASK) as u8,
            ))
        };
        Some(Self {
            priority,
            subject,
            source,
        })
    }
}

/// Last byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailByte(u8);

impl TailByte {
    const START_OF_TRANSFER: u8 = 7;
    const END_OF_TRANSFER: u8 = 6;
    const TOGGLE_BIT: u8 = 5;

    pub fn new(sot: bool, eot: bool, toggle: bool, transfer_id: TransferId) -> Self {
        Self(
            (sot as u8) << Self::START_OF_TRANSFER
                | (eot as u8) << Self::END_OF_TRANSFER
                | (toggle as u8) << Self::TOGGLE_BIT
                | transfer_id.into_u8(),
        )
    }

    /// Tail byte of a transfer that fits in one frame
    pub fn single_frame(transfer_id: TransferId) -> Self {
        Self::new(true, true, true, transfer_id)
    }

    pub fn sot(&self) -> bool {
        (self.0 >> Self::START_OF_TRANSFER) & 0x1 != 0
    }

    pub fn eot(&self) -> bool {
        (self.0 >> Self::END_OF_TRANSFER) & 0x1 != 0
    }

    pub fn toggle(&self) -> bool {
        (self.0 >> Self::TOGGLE_BIT) & 0x1 != 0
    }

    pub fn is_single_frame(&self) -> bool {
        self.sot() && self.eot() && self.toggle()
    }

    pub fn transfer_id(&self) -> TransferId {
        TransferId::from_u8_truncating(self.0)
    }
}

impl From<u8> for TailByte {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<TailByte> for u8 {
    fn from(value: TailByte) -> Self {
        value.0
    }
}

/// An extended-ID CAN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub data: Bytes,
}

impl CanFrame {
    pub fn new(id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            id: id & CAN_ID_MASK,
            data: data.into(),
        }
    }

    /// Builds a single-frame message transfer, padding the data to a valid CAN length.
    ///
    /// Returns `None` if the payload does not fit one frame of the given MTU.
    pub fn single_frame_message(
        header: &MessageHeader,
        transfer_id: TransferId,
        payload: &[u8],
        mtu: Mtu,
    ) -> Option<Self> {
        if payload.len() > mtu.max_single_frame_payload() {
            return None;
        }
        let length = padded_length(payload.len() + 1)?;
        let mut data = Vec::with_capacity(length);
        data.extend_from_slice(payload);
        data.resize(length - 1, 0);
        data.push(TailByte::single_frame(transfer_id).into());
        Some(Self::new(header.to_can_id(), data))
    }

    pub fn tail(&self) -> Option<TailByte> {
        self.data.last().copied().map(TailByte::from)
    }

    /// Frame data without the tail byte
    pub fn payload(&self) -> Bytes {
        match self.data.len() {
            0 => Bytes::new(),
            len => self.data.slice(..len - 1),
        }
    }
}
