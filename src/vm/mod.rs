pub mod context;
pub mod host;
pub mod interpreter;
pub mod ops;
pub mod stack;
pub mod table;

pub use context::{ExecutionContext, ScriptStatus};
pub use host::{HostContext, HostFn, HostFunctions};
pub use interpreter::{LevelVm, VmParts};
pub use stack::{ControlStack, Frame, FrameKind, StackFault, STACK_SLOTS};
pub use table::{DispatchTable, Flow, OpHandler, OpcodeEntry, CANARY_OPCODES, CANONICAL_TABLE};
