//! Extension opcodes whose operands are token indices into the active owner's token list.
//!
//! A token that does not resolve turns the command into a no-op; execution continues with
//! the next command.

use crate::bytecode::format::{Opcode, SegmentedAddress};
use crate::bytecode::reader::Command;
use crate::integration::Diagnostic;
use crate::level::{BehaviorRef, SpawnInfo};
use crate::services::{ModelSource, TokenValue};
use crate::vm::interpreter::LevelVm;
use crate::vm::table::Flow;
use crate::VmResult;

use super::control::hold_while_zero;
use super::level::spawn;
use super::vec3;

fn unresolved(vm: &LevelVm, opcode: Opcode, token: u32) {
    vm.emit(Diagnostic::TokenUnresolved {
        opcode,
        token,
        owner: vm.active_owner,
    });
}

fn token_name(vm: &LevelVm, opcode: Opcode, token: u32) -> Option<String> {
    let name = vm.tokens.resolve(vm.active_owner, token);
    if name.is_none() {
        unresolved(vm, opcode, token);
    }
    name
}

fn token_value(vm: &LevelVm, opcode: Opcode, token: u32) -> Option<(String, TokenValue)> {
    let name = token_name(vm, opcode, token)?;
    match vm.tokens.lookup(vm.active_owner, &name) {
        Some(value) => Some((name, value)),
        None => {
            unresolved(vm, opcode, token);
            None
        }
    }
}

fn token_address(vm: &LevelVm, opcode: Opcode, token: u32) -> Option<(String, SegmentedAddress)> {
    let (name, value) = token_value(vm, opcode, token)?;
    match value.as_address() {
        Some(address) => Some((name, address)),
        None => {
            unresolved(vm, opcode, token);
            None
        }
    }
}

fn token_model(vm: &LevelVm, opcode: Opcode, token: u32) -> Option<u16> {
    let (_, value) = token_value(vm, opcode, token)?;
    let model = value.as_integer().and_then(|raw| u16::try_from(raw).ok());
    if model.is_none() {
        unresolved(vm, opcode, token);
    }
    model
}

fn place(vm: &mut LevelVm, opcode: Opcode, acts: u8, spawn_info: SpawnInfo) -> Flow {
    if !vm.level.vars.act_matches(acts) {
        return Flow::Next;
    }
    spawn(vm, opcode, spawn_info)
}

pub fn place_object_ext(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let opcode = Opcode::PlaceObjectExt;
    let acts = command.u8(2)?;
    let model = u16::from(command.u8(3)?);
    let position = vec3(command, 4)?;
    let angle = vec3(command, 10)?;
    let behavior_arg = command.u32(16)?;
    let Some((name, address)) = token_address(vm, opcode, command.u32(20)?) else {
        return Ok(Flow::Next);
    };
    let info = SpawnInfo {
        model,
        position,
        angle,
        behavior_arg,
        behavior: BehaviorRef::Named { name, address },
        acts,
    };
    Ok(place(vm, opcode, acts, info))
}

pub fn place_object_ext2(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let opcode = Opcode::PlaceObjectExt2;
    let acts = command.u8(2)?;
    let position = vec3(command, 4)?;
    let angle = vec3(command, 10)?;
    let behavior_arg = command.u32(16)?;
    let Some(model) = token_model(vm, opcode, command.u32(20)?) else {
        return Ok(Flow::Next);
    };
    let Some((name, address)) = token_address(vm, opcode, command.u32(24)?) else {
        return Ok(Flow::Next);
    };
    let info = SpawnInfo {
        model,
        position,
        angle,
        behavior_arg,
        behavior: BehaviorRef::Named { name, address },
        acts,
    };
    Ok(place(vm, opcode, acts, info))
}

pub fn load_model_from_geo_ext(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let opcode = Opcode::LoadModelFromGeoExt;
    let model = command.u16(2)?;
    let Some((_, geometry)) = token_address(vm, opcode, command.u32(4)?) else {
        return Ok(Flow::Next);
    };
    if let Err(err) = vm.world.load_model(model, ModelSource::Geometry(geometry)) {
        vm.emit(Diagnostic::ContentLoadFailed {
            opcode,
            reason: err.to_string(),
        });
    }
    Ok(Flow::Next)
}

fn call_token(vm: &mut LevelVm, opcode: Opcode, command: &Command) -> VmResult<Option<i32>> {
    let arg = command.i16(2)?;
    let token = command.u32(4)?;
    let Some(name) = token_name(vm, opcode, token) else {
        return Ok(None);
    };
    let owner = vm.active_owner;
    let result = vm.tokens.call(owner, &name, arg, vm.context.register);
    match result {
        Some(value) => vm.context.register = value,
        None => unresolved(vm, opcode, token),
    }
    Ok(result)
}

pub fn call_ext(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    call_token(vm, Opcode::CallExt, command)?;
    Ok(Flow::Next)
}

pub fn call_loop_ext(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    Ok(match call_token(vm, Opcode::CallLoopExt, command)? {
        Some(result) => hold_while_zero(vm, result),
        None => Flow::Next,
    })
}
