//! Opcode handlers, grouped by the state they touch.

pub mod control;
pub mod extension;
pub mod level;
pub mod memory;
pub mod presentation;

use crate::bytecode::reader::Command;
use crate::VmResult;

/// Reads three consecutive `i16` operands starting at `offset`.
pub(crate) fn vec3(command: &Command, offset: usize) -> VmResult<[i16; 3]> {
    Ok([
        command.i16(offset)?,
        command.i16(offset + 2)?,
        command.i16(offset + 4)?,
    ])
}
