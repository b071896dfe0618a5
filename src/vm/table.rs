//! Opcode dispatch tables.
//!
//! [`CANONICAL_TABLE`] is built at compile time and never changes. Each interpreter holds a
//! [`DispatchTable`], a live copy hosts may patch for instrumentation. Before every run the
//! live copy's canary entries are compared with the canonical ones by handler identity; if
//! any differ the whole run dispatches through the canonical table instead.

use std::fmt;

use crate::bytecode::format::{Opcode, OPCODE_COUNT};
use crate::bytecode::reader::Command;
use crate::VmResult;

use super::interpreter::LevelVm;
use super::ops::{control, extension, level, memory, presentation};

/// What the interpreter does with the cursor after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance past the current command.
    Next,
    Goto(crate::bytecode::format::ScriptPtr),
    /// Keep the cursor on the current command.
    Hold,
}

/// Opcode handler function signature.
pub type OpHandler = fn(&mut LevelVm, &Command) -> VmResult<Flow>;

#[derive(Clone, Copy)]
pub struct OpcodeEntry {
    pub opcode: Opcode,
    pub name: &'static str,
    pub handler: OpHandler,
}

impl OpcodeEntry {
    const fn new(opcode: Opcode, handler: OpHandler) -> Self {
        Self {
            opcode,
            name: opcode.name(),
            handler,
        }
    }

    /// Identity of the handler, used to compare table entries.
    pub fn handler_id(&self) -> usize {
        self.handler as usize
    }
}

impl fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("handler", &format_args!("{:#x}", self.handler_id()))
            .finish()
    }
}

/// Entries checked against the canonical table before each run.
pub const CANARY_OPCODES: [Opcode; 3] = [Opcode::Sleep, Opcode::Jump, Opcode::BeginArea];

/// Build the canonical dispatch table.
const fn build_canonical_table() -> [OpcodeEntry; OPCODE_COUNT] {
    use Opcode::*;
    let mut table = [OpcodeEntry::new(Nop, control::nop); OPCODE_COUNT];

    // Control flow
    table[Execute as usize] = OpcodeEntry::new(Execute, memory::execute);
    table[ExitAndExecute as usize] = OpcodeEntry::new(ExitAndExecute, memory::exit_and_execute);
    table[Exit as usize] = OpcodeEntry::new(Exit, memory::exit);
    table[Sleep as usize] = OpcodeEntry::new(Sleep, control::sleep);
    table[SleepBeforeExit as usize] = OpcodeEntry::new(SleepBeforeExit, control::sleep_before_exit);
    table[Jump as usize] = OpcodeEntry::new(Jump, control::jump);
    table[JumpLink as usize] = OpcodeEntry::new(JumpLink, control::jump_link);
    table[Return as usize] = OpcodeEntry::new(Return, control::return_);
    table[LoopBeginCount as usize] = OpcodeEntry::new(LoopBeginCount, control::loop_begin_count);
    table[LoopRepeat as usize] = OpcodeEntry::new(LoopRepeat, control::loop_repeat);
    table[LoopBegin as usize] = OpcodeEntry::new(LoopBegin, control::loop_begin);
    table[LoopUntil as usize] = OpcodeEntry::new(LoopUntil, control::loop_until);
    table[JumpIf as usize] = OpcodeEntry::new(JumpIf, control::jump_if);
    table[JumpLinkIf as usize] = OpcodeEntry::new(JumpLinkIf, control::jump_link_if);
    table[SkipIf as usize] = OpcodeEntry::new(SkipIf, control::skip_if);
    table[Skip as usize] = OpcodeEntry::new(Skip, control::skip);
    table[SkipNop as usize] = OpcodeEntry::new(SkipNop, control::nop);
    table[Call as usize] = OpcodeEntry::new(Call, control::call);
    table[CallLoop as usize] = OpcodeEntry::new(CallLoop, control::call_loop);
    table[SetRegister as usize] = OpcodeEntry::new(SetRegister, control::set_register);

    // Memory and segments
    table[PushPool as usize] = OpcodeEntry::new(PushPool, memory::push_pool);
    table[PopPool as usize] = OpcodeEntry::new(PopPool, memory::pop_pool);
    table[LoadFixed as usize] = OpcodeEntry::new(LoadFixed, memory::load_fixed);
    table[LoadRaw as usize] = OpcodeEntry::new(LoadRaw, memory::load_raw);
    table[LoadCompressed as usize] = OpcodeEntry::new(LoadCompressed, memory::load_compressed);

    // Level and areas
    table[InitLevel as usize] = OpcodeEntry::new(InitLevel, level::init_level);
    table[ClearLevel as usize] = OpcodeEntry::new(ClearLevel, level::clear_level);
    table[AllocLevelPool as usize] = OpcodeEntry::new(AllocLevelPool, level::alloc_level_pool);
    table[FreeLevelPool as usize] = OpcodeEntry::new(FreeLevelPool, level::free_level_pool);
    table[BeginArea as usize] = OpcodeEntry::new(BeginArea, level::begin_area);
    table[EndArea as usize] = OpcodeEntry::new(EndArea, level::end_area);
    table[LoadModelFromDl as usize] = OpcodeEntry::new(LoadModelFromDl, level::load_model_from_dl);
    table[LoadModelFromGeo as usize] =
        OpcodeEntry::new(LoadModelFromGeo, level::load_model_from_geo);
    table[LoadModelScaled as usize] = OpcodeEntry::new(LoadModelScaled, level::load_model_scaled);
    table[PlaceObject as usize] = OpcodeEntry::new(PlaceObject, level::place_object);
    table[InitPlayer as usize] = OpcodeEntry::new(InitPlayer, level::init_player);
    table[CreateWarpNode as usize] = OpcodeEntry::new(CreateWarpNode, level::create_warp_node);
    table[CreatePaintingWarpNode as usize] =
        OpcodeEntry::new(CreatePaintingWarpNode, level::create_painting_warp_node);
    table[CreateInstantWarp as usize] =
        OpcodeEntry::new(CreateInstantWarp, level::create_instant_warp);
    table[LoadArea as usize] = OpcodeEntry::new(LoadArea, level::load_area);
    table[UnloadArea as usize] = OpcodeEntry::new(UnloadArea, level::unload_area);
    table[SetPlayerStartPos as usize] =
        OpcodeEntry::new(SetPlayerStartPos, level::set_player_start_pos);
    table[UnloadPlayerArea as usize] =
        OpcodeEntry::new(UnloadPlayerArea, level::unload_player_area);
    table[UpdateObjects as usize] = OpcodeEntry::new(UpdateObjects, level::update_objects);
    table[SetTerrainData as usize] = OpcodeEntry::new(SetTerrainData, level::set_terrain_data);
    table[SetRooms as usize] = OpcodeEntry::new(SetRooms, level::set_rooms);
    table[ShowDialog as usize] = OpcodeEntry::new(ShowDialog, level::show_dialog);
    table[SetTerrainType as usize] = OpcodeEntry::new(SetTerrainType, level::set_terrain_type);
    table[SetMusic as usize] = OpcodeEntry::new(SetMusic, level::set_music);
    table[SetMacroObjects as usize] = OpcodeEntry::new(SetMacroObjects, level::set_macro_objects);
    table[CreateWhirlpool as usize] = OpcodeEntry::new(CreateWhirlpool, level::create_whirlpool);
    table[GetOrSet as usize] = OpcodeEntry::new(GetOrSet, level::get_or_set);

    // Presentation
    table[Transition as usize] = OpcodeEntry::new(Transition, presentation::transition);
    table[Blackout as usize] = OpcodeEntry::new(Blackout, presentation::blackout);
    table[Gamma as usize] = OpcodeEntry::new(Gamma, presentation::gamma);
    table[SetMenuMusic as usize] = OpcodeEntry::new(SetMenuMusic, presentation::set_menu_music);
    table[StopMusic as usize] = OpcodeEntry::new(StopMusic, presentation::stop_music);

    // Token-indexed extensions
    table[PlaceObjectExt as usize] = OpcodeEntry::new(PlaceObjectExt, extension::place_object_ext);
    table[PlaceObjectExt2 as usize] =
        OpcodeEntry::new(PlaceObjectExt2, extension::place_object_ext2);
    table[LoadModelFromGeoExt as usize] =
        OpcodeEntry::new(LoadModelFromGeoExt, extension::load_model_from_geo_ext);
    table[CallExt as usize] = OpcodeEntry::new(CallExt, extension::call_ext);
    table[CallLoopExt as usize] = OpcodeEntry::new(CallLoopExt, extension::call_loop_ext);

    table
}

/// Static dispatch table - computed at compile time.
pub static CANONICAL_TABLE: [OpcodeEntry; OPCODE_COUNT] = build_canonical_table();

/// Live dispatch table owned by an interpreter.
#[derive(Clone)]
pub struct DispatchTable {
    entries: [OpcodeEntry; OPCODE_COUNT],
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self {
            entries: CANONICAL_TABLE,
        }
    }
}

impl DispatchTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, opcode: u8) -> Option<&OpcodeEntry> {
        self.entries.get(opcode as usize)
    }

    /// Replaces the handler for `opcode`, returning the previous one.
    pub fn patch(&mut self, opcode: Opcode, handler: OpHandler) -> OpHandler {
        let entry = &mut self.entries[opcode as usize];
        std::mem::replace(&mut entry.handler, handler)
    }

    /// Restores every entry to the canonical handler.
    pub fn restore(&mut self) {
        self.entries = CANONICAL_TABLE;
    }

    /// Canary opcodes whose live handler differs from the canonical one.
    pub fn tampered_canaries(&self) -> Vec<Opcode> {
        CANARY_OPCODES
            .iter()
            .copied()
            .filter(|opcode| {
                let index = *opcode as usize;
                self.entries[index].handler_id() != CANONICAL_TABLE[index].handler_id()
            })
            .collect()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("tampered_canaries", &self.tampered_canaries())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identities() -> Vec<usize> {
        CANONICAL_TABLE.iter().map(OpcodeEntry::handler_id).collect()
    }

    #[test]
    fn canonical_table_is_indexed_by_opcode() {
        for (index, entry) in CANONICAL_TABLE.iter().enumerate() {
            assert_eq!(entry.opcode as usize, index);
            assert_eq!(entry.name, entry.opcode.name());
        }
    }

    #[test]
    fn canonical_identities_survive_live_patching() {
        let before = identities();
        let mut live = DispatchTable::default();
        live.patch(Opcode::Jump, control::nop);
        live.patch(Opcode::Nop, control::jump);
        assert_eq!(live.tampered_canaries(), vec![Opcode::Jump]);
        assert_eq!(identities(), before);
        live.restore();
        assert!(live.tampered_canaries().is_empty());
    }
}
