use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::bytecode::format::{BufferId, ScriptPtr, SegmentedAddress, MAX_SEGMENTS};

use super::mio0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory pool exhausted: requested {requested} bytes, {available} bytes available")]
    CapacityExceeded { requested: usize, available: usize },
    #[error("content range 0x{start:X}..0x{end:X} lies outside the {image_len}-byte content image")]
    RangeOutOfImage { start: u32, end: u32, image_len: usize },
    #[error("segment {0} is outside the segment table")]
    InvalidSegment(i16),
    #[error("invalid buffer {0:?}")]
    InvalidBuffer(BufferId),
    #[error("no memory checkpoint to pop")]
    NoCheckpoint,
    #[error("compressed block is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Mio0,
}

/// Memory and segment operations the interpreter relies on.
///
/// Checkpoints nest: everything loaded after a `push_state` is released by the matching
/// `pop_state`, and the segment table returns to the mapping it had at the push.
pub trait SegmentService {
    fn push_state(&mut self);
    fn pop_state(&mut self) -> Result<(), MemoryError>;
    fn load_segment(
        &mut self,
        segment: u8,
        range: Range<u32>,
        compression: Compression,
    ) -> Result<BufferId, MemoryError>;
    /// Loads data outside the checkpointed pool and maps it at `dest`.
    fn load_fixed(
        &mut self,
        dest: SegmentedAddress,
        range: Range<u32>,
    ) -> Result<BufferId, MemoryError>;
    fn available(&self) -> usize;
    fn buffer(&self, id: BufferId) -> Option<Arc<[u8]>>;
    fn resolve(&self, address: SegmentedAddress) -> Option<ScriptPtr>;
    /// Installs a permanent buffer, e.g. an entry script or a package's replacement script.
    fn install(&mut self, bytes: Vec<u8>) -> BufferId;
    fn map_segment(&mut self, segment: u8, buffer: BufferId) -> Result<(), MemoryError>;
}

#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub capacity_bytes: usize,
    pub used_bytes: usize,
    pub buffer_count: usize,
    pub checkpoint_depth: usize,
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} used / {} capacity ({} buffers, {} checkpoints)",
            self.used_bytes, self.capacity_bytes, self.buffer_count, self.checkpoint_depth
        )
    }
}

#[derive(Debug, Clone)]
struct Buffer {
    bytes: Arc<[u8]>,
    pooled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentMapping {
    buffer: BufferId,
    base: u32,
}

type SegmentTable = [Option<SegmentMapping>; MAX_SEGMENTS];

#[derive(Debug, Clone)]
struct Checkpoint {
    used: usize,
    next_buffer: u32,
    segments: SegmentTable,
}

/// Default [`SegmentService`]: loads ranges of a content image into a checkpointed pool.
#[derive(Debug)]
pub struct ContentMemory {
    image: Arc<[u8]>,
    capacity: usize,
    used: usize,
    buffers: BTreeMap<BufferId, Buffer>,
    next_buffer: u32,
    segments: SegmentTable,
    fixed: SegmentTable,
    checkpoints: Vec<Checkpoint>,
}

impl ContentMemory {
    pub fn new(image: impl Into<Arc<[u8]>>, capacity: usize) -> Self {
        Self {
            image: image.into(),
            capacity,
            used: 0,
            buffers: BTreeMap::new(),
            next_buffer: 0,
            segments: [None; MAX_SEGMENTS],
            fixed: [None; MAX_SEGMENTS],
            checkpoints: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            capacity_bytes: self.capacity,
            used_bytes: self.used,
            buffer_count: self.buffers.len(),
            checkpoint_depth: self.checkpoints.len(),
        }
    }

    fn read_image(&self, range: &Range<u32>) -> Result<&[u8], MemoryError> {
        self.image
            .get(range.start as usize..range.end as usize)
            .ok_or(MemoryError::RangeOutOfImage {
                start: range.start,
                end: range.end,
                image_len: self.image.len(),
            })
    }

    fn allocate(&mut self, bytes: Vec<u8>, pooled: bool) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            Buffer {
                bytes: Arc::from(bytes),
                pooled,
            },
        );
        id
    }

    fn check_segment(segment: u8) -> Result<usize, MemoryError> {
        let index = segment as usize;
        if index >= MAX_SEGMENTS {
            return Err(MemoryError::InvalidSegment(i16::from(segment)));
        }
        Ok(index)
    }
}

impl SegmentService for ContentMemory {
    fn push_state(&mut self) {
        self.checkpoints.push(Checkpoint {
            used: self.used,
            next_buffer: self.next_buffer,
            segments: self.segments,
        });
    }

    fn pop_state(&mut self) -> Result<(), MemoryError> {
        let checkpoint = self.checkpoints.pop().ok_or(MemoryError::NoCheckpoint)?;
        let before = self.buffers.len();
        self.buffers
            .retain(|id, buffer| !buffer.pooled || id.0 < checkpoint.next_buffer);
        debug!(
            released = before - self.buffers.len(),
            reclaimed = self.used - checkpoint.used,
            "memory checkpoint popped"
        );
        self.used = checkpoint.used;
        self.segments = checkpoint.segments;
        Ok(())
    }

    fn load_segment(
        &mut self,
        segment: u8,
        range: Range<u32>,
        compression: Compression,
    ) -> Result<BufferId, MemoryError> {
        let index = Self::check_segment(segment)?;
        let raw = self.read_image(&range)?;
        let available = self.available();
        let bytes = match compression {
            Compression::None if raw.len() > available => {
                return Err(MemoryError::CapacityExceeded {
                    requested: raw.len(),
                    available,
                });
            }
            Compression::None => raw.to_vec(),
            Compression::Mio0 => mio0::decompress(raw, available)?,
        };
        self.used += bytes.len();
        let id = self.allocate(bytes, true);
        self.segments[index] = Some(SegmentMapping { buffer: id, base: 0 });
        debug!(segment, buffer = id.0, "segment loaded");
        Ok(id)
    }

    fn load_fixed(
        &mut self,
        dest: SegmentedAddress,
        range: Range<u32>,
    ) -> Result<BufferId, MemoryError> {
        let index = Self::check_segment(dest.segment())?;
        let bytes = self.read_image(&range)?.to_vec();
        let id = self.allocate(bytes, false);
        self.fixed[index] = Some(SegmentMapping {
            buffer: id,
            base: dest.offset(),
        });
        Ok(id)
    }

    fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    fn buffer(&self, id: BufferId) -> Option<Arc<[u8]>> {
        self.buffers.get(&id).map(|buffer| buffer.bytes.clone())
    }

    fn resolve(&self, address: SegmentedAddress) -> Option<ScriptPtr> {
        let index = address.segment() as usize;
        let mapping = self
            .segments
            .get(index)
            .copied()
            .flatten()
            .or_else(|| self.fixed.get(index).copied().flatten())?;
        let offset = address.offset().checked_sub(mapping.base)?;
        self.buffers
            .contains_key(&mapping.buffer)
            .then_some(ScriptPtr::new(mapping.buffer, offset))
    }

    fn install(&mut self, bytes: Vec<u8>) -> BufferId {
        self.allocate(bytes, false)
    }

    fn map_segment(&mut self, segment: u8, buffer: BufferId) -> Result<(), MemoryError> {
        let index = Self::check_segment(segment)?;
        if !self.buffers.contains_key(&buffer) {
            return Err(MemoryError::InvalidBuffer(buffer));
        }
        self.segments[index] = Some(SegmentMapping { buffer, base: 0 });
        Ok(())
    }
}
