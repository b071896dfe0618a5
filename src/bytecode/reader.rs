//! Bounds-checked decoding of individual commands.
//!
//! A [`Command`] is a view over one command inside a shared buffer. Operand reads go through
//! the layout's offset transform and are checked against the command's own extent, so a
//! malformed stream surfaces as a [`VmFault`] instead of reading a neighbouring command.

use std::sync::Arc;

use crate::VmFault;

use super::format::{ByteOrder, CommandLayout, Opcode, PointerWidth, ScriptPtr, SegmentedAddress};

/// Decodes command headers according to a [`CommandLayout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandReader {
    layout: CommandLayout,
}

impl CommandReader {
    pub fn new(layout: CommandLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> CommandLayout {
        self.layout
    }

    /// Reads the opcode byte at `ptr` without validating the rest of the command.
    pub fn opcode_at(&self, bytes: &[u8], ptr: ScriptPtr) -> Result<u8, VmFault> {
        bytes
            .get(ptr.offset as usize)
            .copied()
            .ok_or(VmFault::CursorOutOfBounds { ptr })
    }

    /// Decodes the full command at `ptr`, validating its size field.
    pub fn decode(&self, bytes: Arc<[u8]>, ptr: ScriptPtr) -> Result<Command, VmFault> {
        let start = ptr.offset as usize;
        let opcode = self.opcode_at(&bytes, ptr)?;
        let size = *bytes
            .get(start + 1)
            .ok_or(VmFault::CommandOverrun {
                ptr,
                opcode,
                bytes: 2,
            })?;
        if size == 0 {
            return Err(VmFault::ZeroSizedCommand { ptr, opcode });
        }
        let len = self.layout.command_bytes(size);
        if start + len > bytes.len() {
            return Err(VmFault::CommandOverrun {
                ptr,
                opcode,
                bytes: len,
            });
        }
        Ok(Command {
            ptr,
            opcode,
            size,
            bytes,
            start,
            len,
            layout: self.layout,
        })
    }
}

/// One decoded command.
#[derive(Debug, Clone)]
pub struct Command {
    ptr: ScriptPtr,
    opcode: u8,
    size: u8,
    bytes: Arc<[u8]>,
    start: usize,
    len: usize,
    layout: CommandLayout,
}

impl Command {
    pub fn ptr(&self) -> ScriptPtr {
        self.ptr
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn op(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Physical length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn raw(&self) -> &[u8] {
        &self.bytes[self.start..self.start + self.len]
    }

    /// Pointer to the command that follows this one.
    pub fn next(&self) -> ScriptPtr {
        self.ptr.advanced_by(self.len as u32)
    }

    fn order(&self) -> ByteOrder {
        self.layout.order_for(self.opcode)
    }

    fn field<const N: usize>(&self, offset: usize) -> Result<[u8; N], VmFault> {
        let physical = self.layout.transform(offset);
        if physical + N > self.len {
            return Err(VmFault::OperandOutOfBounds {
                ptr: self.ptr,
                opcode: self.opcode,
                offset,
                width: N,
            });
        }
        let mut out = [0u8; N];
        let begin = self.start + physical;
        out.copy_from_slice(&self.bytes[begin..begin + N]);
        Ok(out)
    }

    pub fn u8(&self, offset: usize) -> Result<u8, VmFault> {
        Ok(self.field::<1>(offset)?[0])
    }

    pub fn i8(&self, offset: usize) -> Result<i8, VmFault> {
        Ok(self.u8(offset)? as i8)
    }

    pub fn u16(&self, offset: usize) -> Result<u16, VmFault> {
        let raw = self.field::<2>(offset)?;
        Ok(match self.order() {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    pub fn i16(&self, offset: usize) -> Result<i16, VmFault> {
        Ok(self.u16(offset)? as i16)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, VmFault> {
        let raw = self.field::<4>(offset)?;
        Ok(match self.order() {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    pub fn i32(&self, offset: usize) -> Result<i32, VmFault> {
        Ok(self.u32(offset)? as i32)
    }

    /// Reads a pointer-sized field.
    pub fn ptr_value(&self, offset: usize) -> Result<u64, VmFault> {
        match self.layout.pointer_width {
            PointerWidth::Narrow => Ok(u64::from(self.u32(offset)?)),
            PointerWidth::Wide => {
                let raw = self.field::<8>(offset)?;
                Ok(match self.order() {
                    ByteOrder::Little => u64::from_le_bytes(raw),
                    ByteOrder::Big => u64::from_be_bytes(raw),
                })
            }
        }
    }

    /// Reads a pointer-sized field holding a segmented address.
    pub fn address(&self, offset: usize) -> Result<SegmentedAddress, VmFault> {
        let value = self.ptr_value(offset)?;
        u32::try_from(value)
            .map(SegmentedAddress::from_raw)
            .map_err(|_| VmFault::AddressOverflow {
                ptr: self.ptr,
                value,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::format::BufferId;

    fn ptr(offset: u32) -> ScriptPtr {
        ScriptPtr::new(BufferId(1), offset)
    }

    #[test]
    fn decodes_little_endian_operands() {
        let bytes: Arc<[u8]> = Arc::from(vec![0x0B, 8, 2, 0, 0x78, 0x56, 0x34, 0x12]);
        let command = CommandReader::default().decode(bytes, ptr(0)).unwrap();
        assert_eq!(command.op(), Some(Opcode::LoopUntil));
        assert_eq!(command.u8(2).unwrap(), 2);
        assert_eq!(command.u32(4).unwrap(), 0x1234_5678);
        assert_eq!(command.next(), ptr(8));
    }

    #[test]
    fn extension_order_applies_only_to_extension_range() {
        let layout = CommandLayout::new(PointerWidth::Narrow, ByteOrder::Big);
        let reader = CommandReader::new(layout);
        let ext: Arc<[u8]> = Arc::from(vec![Opcode::CallExt as u8, 8, 0x00, 0x05, 0, 0, 0, 9]);
        let command = reader.decode(ext, ptr(0)).unwrap();
        assert_eq!(command.i16(2).unwrap(), 5);
        assert_eq!(command.u32(4).unwrap(), 9);

        let plain: Arc<[u8]> = Arc::from(vec![Opcode::SetRegister as u8, 4, 0x05, 0x00]);
        let command = reader.decode(plain, ptr(0)).unwrap();
        assert_eq!(command.i16(2).unwrap(), 5);
    }

    #[test]
    fn wide_layout_reads_scaled_pointer_fields() {
        let layout = CommandLayout::new(PointerWidth::Wide, ByteOrder::Little);
        let mut bytes = vec![0u8; 16];
        bytes[0] = Opcode::Jump as u8;
        bytes[1] = 8;
        bytes[8..16].copy_from_slice(&0x0E00_0040u64.to_le_bytes());
        let command = CommandReader::new(layout)
            .decode(Arc::from(bytes), ptr(0))
            .unwrap();
        assert_eq!(command.len(), 16);
        assert_eq!(command.address(4).unwrap().raw(), 0x0E00_0040);
    }

    #[test]
    fn rejects_zero_size_and_overruns() {
        let reader = CommandReader::default();
        let zero: Arc<[u8]> = Arc::from(vec![Opcode::Nop as u8, 0, 0, 0]);
        assert!(matches!(
            reader.decode(zero, ptr(0)),
            Err(VmFault::ZeroSizedCommand { .. })
        ));
        let short: Arc<[u8]> = Arc::from(vec![Opcode::Jump as u8, 8, 0, 0]);
        assert!(matches!(
            reader.decode(short, ptr(0)),
            Err(VmFault::CommandOverrun { .. })
        ));
        let past_end: Arc<[u8]> = Arc::from(vec![Opcode::Nop as u8, 4, 0, 0]);
        assert!(matches!(
            reader.decode(past_end, ptr(4)),
            Err(VmFault::CursorOutOfBounds { .. })
        ));
    }

    #[test]
    fn operand_reads_stay_inside_the_command() {
        let bytes: Arc<[u8]> = Arc::from(vec![Opcode::Nop as u8, 4, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        let command = CommandReader::default().decode(bytes, ptr(0)).unwrap();
        assert!(matches!(
            command.u32(4),
            Err(VmFault::OperandOutOfBounds { offset: 4, width: 4, .. })
        ));
    }
}
