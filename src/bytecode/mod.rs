pub mod assembler;
pub mod disasm;
pub mod format;
pub mod reader;

pub use assembler::{AssemblyError, Label, ObjectPlacement, ScriptBuilder, Target};
pub use format::{
    BufferId, ByteOrder, CommandLayout, ComparisonOp, Opcode, PointerWidth, ScriptPtr,
    SegmentedAddress, EXTENSION_OPCODES, MAX_SEGMENTS, OPCODE_COUNT,
};
pub use reader::{Command, CommandReader};
