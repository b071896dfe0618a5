//! Level lifecycle, area side tables, models and object placement.

use std::mem::size_of;

use tracing::debug;

use crate::bytecode::format::Opcode;
use crate::bytecode::reader::Command;
use crate::integration::Diagnostic;
use crate::level::{
    Area, BehaviorRef, InstantWarp, MusicParams, PlayerInit, PlayerSpawn, ScriptVar, SpawnInfo,
    WarpNode, Whirlpool, AREA_COUNT,
};
use crate::services::ModelSource;
use crate::vm::interpreter::LevelVm;
use crate::vm::table::Flow;
use crate::VmResult;

use super::vec3;

/// Runs `update` on the current area, or reports that there is none.
fn with_area(vm: &mut LevelVm, opcode: Opcode, update: impl FnOnce(&mut Area)) -> Flow {
    match vm.level.current_area_mut() {
        Some(area) => update(area),
        None => vm.diagnostics.emit(Diagnostic::NoActiveArea { opcode }),
    }
    Flow::Next
}

/// Charges `bytes` to the level pool, reporting exhaustion.
fn charge(vm: &mut LevelVm, opcode: Opcode, bytes: usize) -> bool {
    match vm.level.pool.allocate(bytes) {
        Ok(()) => true,
        Err(err) => {
            vm.emit(Diagnostic::PoolExhausted {
                opcode,
                requested: err.requested,
                available: err.available,
            });
            false
        }
    }
}

/// Adds `entry` to the current area, charging its size to the level pool first.
fn emit_entry<T>(
    vm: &mut LevelVm,
    opcode: Opcode,
    entry: T,
    link: impl FnOnce(&mut Area, T),
) -> Flow {
    if vm.level.current_area().is_none() {
        vm.emit(Diagnostic::NoActiveArea { opcode });
        return Flow::Next;
    }
    if charge(vm, opcode, size_of::<T>()) {
        with_area(vm, opcode, |area| link(area, entry));
    }
    Flow::Next
}

pub(crate) fn spawn(vm: &mut LevelVm, opcode: Opcode, spawn: SpawnInfo) -> Flow {
    emit_entry(vm, opcode, spawn, |area, spawn| area.spawns.push(spawn))
}

fn slot_in_range(vm: &LevelVm, opcode: Opcode, index: u8, slots: usize) -> bool {
    if (index as usize) < slots {
        return true;
    }
    vm.emit(Diagnostic::SlotOutOfRange { opcode, index });
    false
}

pub fn init_level(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.world.init_level();
    vm.level.clear_areas();
    vm.memory.push_state();
    Ok(Flow::Next)
}

pub fn clear_level(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.world.clear_objects();
    vm.level.clear_areas();
    vm.pop_checkpoint(Opcode::ClearLevel);
    Ok(Flow::Next)
}

pub fn alloc_level_pool(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    let capacity = vm.config.level_pool_bytes.min(vm.memory.available());
    vm.level.pool.reset(capacity);
    debug!(capacity, "level pool allocated");
    Ok(Flow::Next)
}

pub fn free_level_pool(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.level.pool.freeze();
    Ok(Flow::Next)
}

pub fn begin_area(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let index = command.u8(2)?;
    let geometry = command.address(4)?;
    if index as usize >= AREA_COUNT {
        vm.emit(Diagnostic::InvalidAreaIndex {
            opcode: Opcode::BeginArea,
            index,
        });
        return Ok(Flow::Next);
    }
    match vm.world.build_area(index, geometry) {
        Ok(root) => {
            if root.camera.is_none() {
                vm.emit(Diagnostic::MissingCamera { index });
            }
            vm.level.begin_area(Area::new(index, geometry, root));
            debug!(area = index, %geometry, "area begun");
        }
        Err(err) => vm.emit(Diagnostic::AreaBeginFailed {
            index,
            reason: err.to_string(),
        }),
    }
    Ok(Flow::Next)
}

pub fn end_area(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    if vm.level.end_area().is_none() {
        vm.emit(Diagnostic::NoActiveArea {
            opcode: Opcode::EndArea,
        });
    }
    Ok(Flow::Next)
}

fn load_model(vm: &mut LevelVm, opcode: Opcode, model: u16, source: ModelSource) -> Flow {
    if let Err(err) = vm.world.load_model(model, source) {
        vm.emit(Diagnostic::ContentLoadFailed {
            opcode,
            reason: err.to_string(),
        });
    }
    Flow::Next
}

pub fn load_model_from_dl(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let model = command.u16(2)?;
    let source = ModelSource::DisplayList {
        address: command.address(4)?,
        layer: command.u16(8)?,
    };
    Ok(load_model(vm, Opcode::LoadModelFromDl, model, source))
}

pub fn load_model_from_geo(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let model = command.u16(2)?;
    let source = ModelSource::Geometry(command.address(4)?);
    Ok(load_model(vm, Opcode::LoadModelFromGeo, model, source))
}

pub fn load_model_scaled(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let model = command.u16(2)?;
    let source = ModelSource::Scaled {
        address: command.address(4)?,
        scale: f32::from_bits(command.u32(8)?),
    };
    Ok(load_model(vm, Opcode::LoadModelScaled, model, source))
}

pub fn place_object(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let acts = command.u8(2)?;
    let info = SpawnInfo {
        model: u16::from(command.u8(3)?),
        position: vec3(command, 4)?,
        angle: vec3(command, 10)?,
        behavior_arg: command.u32(16)?,
        behavior: BehaviorRef::Address(command.address(20)?),
        acts,
    };
    if !vm.level.vars.act_matches(acts) {
        return Ok(Flow::Next);
    }
    Ok(spawn(vm, Opcode::PlaceObject, info))
}

pub fn init_player(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let player = PlayerInit {
        model: command.u8(3)?,
        behavior_arg: command.u32(4)?,
        behavior: command.address(8)?,
    };
    vm.world
        .init_player(player.model, player.behavior_arg, player.behavior);
    vm.level.player = Some(player);
    Ok(Flow::Next)
}

fn read_warp_node(command: &Command) -> VmResult<WarpNode> {
    Ok(WarpNode {
        id: command.u8(2)?,
        dest_level: command.u8(3)?,
        dest_area: command.u8(4)?,
        dest_node: command.u8(5)?,
        flags: command.u8(6)?,
    })
}

pub fn create_warp_node(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let node = read_warp_node(command)?;
    Ok(emit_entry(vm, Opcode::CreateWarpNode, node, |area, node| {
        area.warp_nodes.push(node)
    }))
}

pub fn create_painting_warp_node(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let node = read_warp_node(command)?;
    let opcode = Opcode::CreatePaintingWarpNode;
    if !slot_in_range(vm, opcode, node.id, crate::level::PAINTING_WARP_SLOTS) {
        return Ok(Flow::Next);
    }
    Ok(emit_entry(vm, opcode, node, |area, node| {
        area.painting_warps[node.id as usize] = Some(node)
    }))
}

pub fn create_instant_warp(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let index = command.u8(2)?;
    let warp = InstantWarp {
        dest_area: command.u8(3)?,
        displacement: vec3(command, 4)?,
    };
    let opcode = Opcode::CreateInstantWarp;
    if !slot_in_range(vm, opcode, index, crate::level::INSTANT_WARP_SLOTS) {
        return Ok(Flow::Next);
    }
    Ok(emit_entry(vm, opcode, warp, |area, warp| {
        area.instant_warps[index as usize] = Some(warp)
    }))
}

pub fn create_whirlpool(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let index = command.u8(2)?;
    let whirlpool = Whirlpool {
        condition: command.u8(3)?,
        position: vec3(command, 4)?,
        strength: command.i16(10)?,
    };
    let opcode = Opcode::CreateWhirlpool;
    if !slot_in_range(vm, opcode, index, crate::level::WHIRLPOOL_SLOTS) {
        return Ok(Flow::Next);
    }
    Ok(emit_entry(vm, opcode, whirlpool, |area, whirlpool| {
        area.whirlpools[index as usize] = Some(whirlpool)
    }))
}

pub fn load_area(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let index = command.u8(2)?;
    let Some(area) = vm.level.area(index) else {
        vm.emit(Diagnostic::InvalidAreaIndex {
            opcode: Opcode::LoadArea,
            index,
        });
        return Ok(Flow::Next);
    };
    let spawned = vm.world.load_area(index, &area.spawns);
    vm.level.set_loaded(Some(index));
    vm.level.vars.area_index = i32::from(index);
    debug!(area = index, spawned, "area loaded");
    Ok(Flow::Next)
}

pub fn unload_area(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    if let Some(index) = vm.level.loaded_area() {
        vm.world.unload_area(index);
        vm.level.set_loaded(None);
    }
    Ok(Flow::Next)
}

pub fn set_player_start_pos(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    vm.level.player_spawn = Some(PlayerSpawn {
        area: command.u8(2)?,
        yaw: command.i16(4)?,
        position: vec3(command, 6)?,
    });
    Ok(Flow::Next)
}

pub fn unload_player_area(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.world.unload_player_area();
    Ok(Flow::Next)
}

pub fn update_objects(vm: &mut LevelVm, _command: &Command) -> VmResult<Flow> {
    vm.world.update_objects();
    Ok(Flow::Next)
}

pub fn set_terrain_data(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let data = command.address(4)?;
    Ok(with_area(vm, Opcode::SetTerrainData, |area| area.terrain = Some(data)))
}

pub fn set_rooms(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let data = command.address(4)?;
    Ok(with_area(vm, Opcode::SetRooms, |area| area.rooms = Some(data)))
}

pub fn set_macro_objects(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let data = command.address(4)?;
    Ok(with_area(vm, Opcode::SetMacroObjects, |area| {
        area.macro_objects = Some(data)
    }))
}

pub fn show_dialog(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let index = command.u8(2)?;
    let dialog = command.u8(3)?;
    if !slot_in_range(vm, Opcode::ShowDialog, index, crate::level::area::DIALOG_SLOTS) {
        return Ok(Flow::Next);
    }
    Ok(with_area(vm, Opcode::ShowDialog, |area| {
        area.dialog[index as usize] = dialog
    }))
}

pub fn set_terrain_type(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let terrain_type = command.i16(2)?;
    Ok(with_area(vm, Opcode::SetTerrainType, |area| {
        area.terrain_type = terrain_type
    }))
}

pub fn set_music(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let music = MusicParams {
        settings: command.i16(2)?,
        sequence: command.i16(4)?,
    };
    Ok(with_area(vm, Opcode::SetMusic, |area| area.music = Some(music)))
}

pub fn get_or_set(vm: &mut LevelVm, command: &Command) -> VmResult<Flow> {
    let mode = command.u8(2)?;
    let var = command.u8(3)?;
    match (mode, ScriptVar::from_index(var)) {
        (0, Some(var)) => vm.level.vars.set(var, vm.context.register),
        (1, Some(var)) => vm.context.register = vm.level.vars.get(var),
        _ => vm.emit(Diagnostic::UnknownVariable { mode, var }),
    }
    Ok(Flow::Next)
}
