//! Control flow: sleeping, jumps, calls, loops, conditionals and the register.

use crate::bytecode::format::Opcode;
use crate::bytecode::reader::Command;
use crate::vm::context::ScriptStatus;
use crate::vm::interpreter::LevelVm;
use crate::vm::stack::Frame;
use crate::vm::table::Flow;
use crate::VmResult;

pub fn nop(_vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    Ok(Flow::Next)
}

/// Shared countdown for both sleep commands.
///
/// The first visit loads the counter and pauses; later visits count down and move past the
/// command once the counter reaches zero.
fn count_down(
    counter: &mut i32,
    status: &mut ScriptStatus,
    frames: i16,
    paused: ScriptStatus,
) -> Flow {
    if *counter == 0 {
        if frames <= 0 {
            return Flow::Next;
        }
        *counter = i32::from(frames);
        *status = paused;
        return Flow::Hold;
    }
    *counter -= 1;
    if *counter == 0 {
        Flow::Next
    } else {
        *status = paused;
        Flow::Hold
    }
}

pub fn sleep(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let frames = command.i16(2)?;
    let context = &mut vm.context;
    Ok(count_down(
        &mut context.delay_primary,
        &mut context.status,
        frames,
        ScriptStatus::Paused,
    ))
}

pub fn sleep_before_exit(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let frames = command.i16(2)?;
    let context = &mut vm.context;
    Ok(count_down(
        &mut context.delay_secondary,
        &mut context.status,
        frames,
        ScriptStatus::PausedSecondary,
    ))
}

pub fn jump(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let target = vm.resolve_address(command.address(4)?)?;
    Ok(Flow::Goto(target))
}

pub fn jump_link(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let target = vm.resolve_address(command.address(4)?)?;
    vm.stack.push(Frame::Return(command.next()))?;
    Ok(Flow::Goto(target))
}

pub fn return_(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    Ok(Flow::Goto(vm.stack.pop_return()?))
}

pub fn loop_begin_count(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let count = command.i16(2)?;
    vm.stack.push(Frame::Loop {
        resume: command.next(),
        remaining: i32::from(count),
    })?;
    Ok(Flow::Next)
}

pub fn loop_repeat(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    let (resume, exhausted) = {
        let (resume, remaining) = vm.stack.top_loop_mut()?;
        *remaining = remaining.saturating_sub(1);
        (resume, *remaining <= 0)
    };
    if exhausted {
        vm.stack.pop_loop()?;
        return Ok(Flow::Next);
    }
    Ok(Flow::Goto(resume))
}

pub fn loop_begin(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    vm.stack.push(Frame::Loop {
        resume: command.next(),
        remaining: 0,
    })?;
    Ok(Flow::Next)
}

pub fn loop_until(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if vm.condition(command)? {
        vm.stack.pop_loop()?;
        return Ok(Flow::Next);
    }
    let (resume, _) = vm.stack.top_loop_mut()?;
    Ok(Flow::Goto(resume))
}

pub fn jump_if(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if !vm.condition(command)? {
        return Ok(Flow::Next);
    }
    let target = vm.resolve_address(command.address(8)?)?;
    Ok(Flow::Goto(target))
}

pub fn jump_link_if(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if !vm.condition(command)? {
        return Ok(Flow::Next);
    }
    let target = vm.resolve_address(command.address(8)?)?;
    vm.stack.push(Frame::Return(command.next()))?;
    Ok(Flow::Goto(target))
}

/// When the condition is false, steps over any `SKIP`/`SKIP_NOP` run and the command after it.
pub fn skip_if(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    if vm.condition(command)? {
        return Ok(Flow::Next);
    }
    let mut cursor = command.next();
    loop {
        let next = vm.command_at(cursor)?;
        if !matches!(next.op(), Some(Opcode::Skip | Opcode::SkipNop)) {
            return Ok(Flow::Goto(next.next()));
        }
        cursor = next.next();
    }
}

pub fn skip(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let mut cursor = command.next();
    loop {
        let next = vm.command_at(cursor)?;
        if next.op() != Some(Opcode::SkipNop) {
            return Ok(Flow::Goto(next.next()));
        }
        cursor = next.next();
    }
}

pub fn call(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let arg = command.i16(2)?;
    let id = command.address(4)?.raw();
    if let Some(result) = vm.invoke_host(id, arg) {
        vm.context.register = result;
    }
    Ok(Flow::Next)
}

/// Like `CALL`, but holds on the command while the function returns zero.
pub fn call_loop(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let arg = command.i16(2)?;
    let id = command.address(4)?.raw();
    let Some(result) = vm.invoke_host(id, arg) else {
        return Ok(Flow::Next);
    };
    vm.context.register = result;
    Ok(hold_while_zero(vm, result))
}

pub(crate) fn hold_while_zero(vm: &mut LevelVm, result: i32) -> Flow {
    if result == 0 {
        vm.context.status = ScriptStatus::Paused;
        Flow::Hold
    } else {
        Flow::Next
    }
}

pub fn set_register(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    vm.context.register = i32::from(command.i16(2)?);
    Ok(Flow::Next)
}
