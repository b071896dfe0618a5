//! Segment loading, script execution scopes and memory checkpoints.

use std::ops::Range;

use tracing::debug;

use crate::bytecode::format::{BufferId, Opcode};
use crate::bytecode::reader::Command;
use crate::integration::Diagnostic;
use crate::memory::{Compression, MemoryError};
use crate::vm::context::ScriptStatus;
use crate::vm::interpreter::LevelVm;
use crate::vm::stack::Frame;
use crate::vm::table::Flow;
use crate::VmResult;

struct SegmentLoad {
    segment: i16,
    range: Range<u32>,
}

impl SegmentLoad {
    fn read(command: &Command) -> VmResult<Self> {
        let segment = command.i16(2)?;
        let start = command.address(4)?.raw();
        let end = command.address(8)?.raw();
        Ok(Self {
            segment,
            range: start..end,
        })
    }

    fn run(self, vm: &mut LevelVm, compression: Compression) -> Result<BufferId, MemoryError> {
        let segment =
            u8::try_from(self.segment).map_err(|_| MemoryError::InvalidSegment(self.segment))?;
        vm.memory.load_segment(segment, self.range, compression)
    }
}

fn report_load_failure(vm: &LevelVm, opcode: Opcode, err: &MemoryError) {
    vm.emit(Diagnostic::ContentLoadFailed {
        opcode,
        reason: err.to_string(),
    });
}

/// Loads a script segment in a new memory scope and calls into it.
pub fn execute(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let load = SegmentLoad::read(command)?;
    let entry = command.address(12)?;
    vm.stack.ensure_room(Frame::Return(command.next()).slots())?;

    vm.memory.push_state();
    if let Err(err) = load.run(vm, Compression::None) {
        vm.pop_checkpoint(Opcode::Execute);
        report_load_failure(vm, Opcode::Execute, &err);
        return Ok(Flow::Next);
    }
    let target = match vm.resolve_address(entry) {
        Ok(target) => target,
        Err(fault) => {
            vm.pop_checkpoint(Opcode::Execute);
            return Err(fault);
        }
    };
    vm.stack.push_scope(command.next())?;
    debug!(%entry, depth = vm.stack.depth(), "entering script segment");
    Ok(Flow::Goto(target))
}

/// Replaces the current memory scope with a freshly loaded segment and jumps into it.
///
/// Frames pushed inside the scope are discarded; the `EXECUTE` return frame below them is kept.
pub fn exit_and_execute(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let load = SegmentLoad::read(command)?;
    let entry = command.address(12)?;

    vm.pop_checkpoint(Opcode::ExitAndExecute);
    vm.memory.push_state();
    if let Err(err) = load.run(vm, Compression::None) {
        report_load_failure(vm, Opcode::ExitAndExecute, &err);
        return Ok(Flow::Next);
    }
    let target = vm.resolve_address(entry)?;
    let dropped = vm.stack.unwind_scope();
    debug!(%entry, dropped, "replacing script segment");
    Ok(Flow::Goto(target))
}

/// Returns from an `EXECUTE` scope, or ends the script at top level.
pub fn exit(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    if vm.stack.is_empty() {
        vm.context.status = ScriptStatus::Exited;
        return Ok(Flow::Hold);
    }
    let resume = vm.stack.pop_return()?;
    vm.pop_checkpoint(Opcode::Exit);
    Ok(Flow::Goto(resume))
}

pub fn push_pool(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.memory.push_state();
    Ok(Flow::Next)
}

pub fn pop_pool(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.pop_checkpoint(Opcode::PopPool);
    Ok(Flow::Next)
}

pub fn load_fixed(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let dest = command.address(4)?;
    let start = command.address(8)?.raw();
    let end = command.address(12)?.raw();
    if let Err(err) = vm.memory.load_fixed(dest, start..end) {
        report_load_failure(vm, Opcode::LoadFixed, &err);
    }
    Ok(Flow::Next)
}

pub fn load_raw(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if let Err(err) = SegmentLoad::read(command)?.run(vm, Compression::None) {
        report_load_failure(vm, Opcode::LoadRaw, &err);
    }
    Ok(Flow::Next)
}

pub fn load_compressed(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if let Err(err) = SegmentLoad::read(command)?.run(vm, Compression::Mio0) {
        report_load_failure(vm, Opcode::LoadCompressed, &err);
    }
    Ok(Flow::Next)
}
