use crate::bytecode::reader::Command;
use crate::services::PresentationRequest;
use crate::vm::interpreter::LevelVm;
use crate::vm::table::Flow;
use crate::VmResult;

fn submit(vm: &mut LevelVm, request: PresentationRequest) -> VmResult<Flow> {
    vm.presentation.submit(request);
    Ok(Flow::Next)
}

pub fn transition(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let request = PresentationRequest::Transition {
        kind: command.u8(2)?,
        time: command.u8(3)?,
        color: [command.u8(4)?, command.u8(5)?, command.u8(6)?],
    };
    submit(vm, request)
}

pub fn blackout(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let active = command.u8(2)? != 0;
    submit(vm, PresentationRequest::Blackout { active })
}

pub fn gamma(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let enabled = command.u8(2)? != 0;
    submit(vm, PresentationRequest::Gamma { enabled })
}

pub fn set_menu_music(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let sequence = command.i16(2)?;
    submit(vm, PresentationRequest::MenuMusic { sequence })
}

pub fn stop_music(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let fade = command.i16(2)?;
    submit(vm, PresentationRequest::StopMusic { fade })
}
