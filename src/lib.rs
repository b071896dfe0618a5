#![forbid(unsafe_code)]

//! levelscript – a level-script bytecode interpreter with transparent script overrides.
//!
//! The crate exposes the following building blocks:
//!
//! * [`bytecode`] – the command format: opcodes, layouts, a bounds-checked command reader,
//!   an assembler for building streams and a disassembler for listing them.
//! * [`vm`] – the interpreter: control-flow stack, dispatch tables with corruption failover
//!   and the opcode handlers.
//! * [`overrides`] – per-owner substitution of one command stream for another.
//! * [`level`] – area, warp and spawn side tables populated by the level commands.
//! * [`memory`] and [`services`] – the collaborator contracts the interpreter calls into,
//!   each shipped with a default implementation.
//! * [`integration`] – the diagnostics sink hosts subscribe to.
//!
//! The interpreter is single-threaded and cooperative: [`LevelVm::execute`] runs until the
//! script sleeps, exits or faults, and returns the pointer to resume from.

pub mod bytecode;
pub mod config;
pub mod integration;
pub mod level;
pub mod memory;
pub mod overrides;
pub mod services;
pub mod vm;

use thiserror::Error;

use crate::bytecode::format::{ScriptPtr, SegmentedAddress};
use crate::vm::stack::StackFault;

pub use crate::config::{ConfigError, VmConfig};
pub use crate::integration::{Diagnostic, Diagnostics};
pub use crate::overrides::{OverrideResolver, OwnerId, Registration, Resolution};
pub use crate::vm::{HostContext, HostFunctions, LevelVm, ScriptStatus, VmParts};

/// Result type used by the interpreter.
pub type VmResult<T> = std::result::Result<T, VmFault>;

/// Faults that abort a call to [`LevelVm::execute`].
///
/// A fault leaves the script paused at the faulting command with the control stack as it was
/// before that command ran.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmFault {
    #[error(transparent)]
    Stack(#[from] StackFault),
    #[error("command pointer {ptr} lies outside its buffer")]
    CursorOutOfBounds { ptr: ScriptPtr },
    #[error("command pointer {ptr} refers to a released buffer")]
    DanglingPointer { ptr: ScriptPtr },
    #[error("command 0x{opcode:02X} at {ptr} has a zero size field")]
    ZeroSizedCommand { ptr: ScriptPtr, opcode: u8 },
    #[error("command 0x{opcode:02X} at {ptr} needs {bytes} bytes past the end of its buffer")]
    CommandOverrun { ptr: ScriptPtr, opcode: u8, bytes: usize },
    #[error("operand at offset {offset} ({width} bytes) lies outside command 0x{opcode:02X} at {ptr}")]
    OperandOutOfBounds {
        ptr: ScriptPtr,
        opcode: u8,
        offset: usize,
        width: usize,
    },
    #[error("address {address} is not mapped by any segment")]
    UnresolvedAddress { address: SegmentedAddress },
    #[error("invalid comparison operator {op} at {ptr}")]
    InvalidComparison { ptr: ScriptPtr, op: u8 },
    #[error("pointer field 0x{value:X} at {ptr} is not a segmented address")]
    AddressOverflow { ptr: ScriptPtr, value: u64 },
    #[error("script exceeded the step limit of {limit} commands")]
    StepLimitExceeded { limit: u64 },
}
