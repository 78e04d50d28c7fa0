use crate::error::{Error, Result};
use crate::frame::CanFrame;
use crate::interface::InterfaceId;
use std::collections::VecDeque;
use tracing::warn;

/// Per-reader position in the ring
#[derive(Debug, Clone, Default)]
pub struct ReadCursor {
    next_seq: u64,
    lost: u64,
}

impl ReadCursor {
    /// Frames skipped because the writer overtook this reader
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

struct Entry {
    seq: u64,
    origin: InterfaceId,
    frame: CanFrame,
}

/// A bounded frame log with sequence numbers.
///
/// Writers never block: once the ring is full the oldest frame is dropped. Readers
/// keep their own cursor and notice when frames they have not read yet were dropped.
pub struct RingBuffer {
    capacity: usize,
    entries: VecDeque<Entry>,
    next_seq: u64,
}

impl RingBuffer {
    /// Create a new ring buffer holding up to `capacity` frames
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("Bus capacity cannot be zero".into()));
        }

        Ok(Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_seq: 0,
        })
    }

    /// Cursor positioned after the newest frame
    pub fn tail_cursor(&self) -> ReadCursor {
        ReadCursor {
            next_seq: self.next_seq,
            lost: 0,
        }
    }

    /// Append a frame, overwriting the oldest one if full. Returns its sequence number.
    pub fn write(&mut self, origin: InterfaceId, frame: CanFrame) -> u64 {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(Entry { seq, origin, frame });
        seq
    }

    /// Next frame for `reader`, skipping frames it wrote itself.
    pub fn read(&self, reader: &InterfaceId, cursor: &mut ReadCursor) -> Option<CanFrame> {
        let oldest = self.oldest_seq();

        if cursor.next_seq < oldest {
            let lost = oldest - cursor.next_seq;
            warn!("Reader {} overtaken, {} frames lost", reader, lost);
            cursor.lost += lost;
            cursor.next_seq = oldest;
        }

        while cursor.next_seq < self.next_seq {
            let index = (cursor.next_seq - oldest) as usize;
            cursor.next_seq += 1;
            let entry = &self.entries[index];
            if &entry.origin != reader {
                return Some(entry.frame.clone());
            }
        }

        None
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of frames ever written
    pub fn written(&self) -> u64 {
        self.next_seq
    }

    fn oldest_seq(&self) -> u64 {
        self.entries.front().map_or(self.next_seq, |entry| entry.seq)
    }
}
