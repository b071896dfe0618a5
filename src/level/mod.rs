//! Level-wide state written by the level commands: areas, the player spawn, script
//! variables and the level pool entries are charged to.

pub mod area;
pub mod pool;

use crate::bytecode::format::SegmentedAddress;

pub use area::{
    Area, BehaviorRef, InstantWarp, MusicParams, SpawnInfo, WarpNode, Whirlpool,
    INSTANT_WARP_SLOTS, PAINTING_WARP_SLOTS, WHIRLPOOL_SLOTS,
};
pub use pool::{LevelPool, PoolExhausted};

pub const AREA_COUNT: usize = 8;

/// Act mask value that places an object in every act.
pub const ALL_ACTS: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSpawn {
    pub area: u8,
    pub yaw: i16,
    pub position: [i16; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInit {
    pub model: u8,
    pub behavior_arg: u32,
    pub behavior: SegmentedAddress,
}

/// Variables reachable through `GET_OR_SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScriptVar {
    SaveFile = 0,
    Course = 1,
    Act = 2,
    Level = 3,
    AreaIndex = 4,
}

impl ScriptVar {
    pub fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => ScriptVar::SaveFile,
            1 => ScriptVar::Course,
            2 => ScriptVar::Act,
            3 => ScriptVar::Level,
            4 => ScriptVar::AreaIndex,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptVars {
    pub save_file: i32,
    pub course: i32,
    pub act: i32,
    pub level: i32,
    pub area_index: i32,
}

impl Default for ScriptVars {
    fn default() -> Self {
        Self {
            save_file: 1,
            course: 0,
            act: 1,
            level: 0,
            area_index: 0,
        }
    }
}

impl ScriptVars {
    pub fn get(&self, var: ScriptVar) -> i32 {
        match var {
            ScriptVar::SaveFile => self.save_file,
            ScriptVar::Course => self.course,
            ScriptVar::Act => self.act,
            ScriptVar::Level => self.level,
            ScriptVar::AreaIndex => self.area_index,
        }
    }

    pub fn set(&mut self, var: ScriptVar, value: i32) {
        match var {
            ScriptVar::SaveFile => self.save_file = value,
            ScriptVar::Course => self.course = value,
            ScriptVar::Act => self.act = value,
            ScriptVar::Level => self.level = value,
            ScriptVar::AreaIndex => self.area_index = value,
        }
    }

    /// Whether an object with act mask `acts` appears in the current act.
    pub fn act_matches(&self, acts: u8) -> bool {
        if acts == ALL_ACTS {
            return true;
        }
        match self.act {
            1..=8 => acts & (1 << (self.act - 1)) != 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelState {
    areas: [Option<Area>; AREA_COUNT],
    current: Option<u8>,
    loaded: Option<u8>,
    pub pool: LevelPool,
    pub player_spawn: Option<PlayerSpawn>,
    pub player: Option<PlayerInit>,
    pub vars: ScriptVars,
}

impl LevelState {
    pub fn new(pool_bytes: usize) -> Self {
        Self {
            areas: Default::default(),
            current: None,
            loaded: None,
            pool: LevelPool::with_capacity(pool_bytes),
            player_spawn: None,
            player: None,
            vars: ScriptVars::default(),
        }
    }

    pub fn area(&self, index: u8) -> Option<&Area> {
        self.areas.get(index as usize)?.as_ref()
    }

    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.iter().flatten()
    }

    /// Index of the area between `AREA` and `END_AREA`, if any.
    pub fn current_area(&self) -> Option<u8> {
        self.current
    }

    pub fn current_area_mut(&mut self) -> Option<&mut Area> {
        let index = self.current?;
        self.areas.get_mut(index as usize)?.as_mut()
    }

    pub fn loaded_area(&self) -> Option<u8> {
        self.loaded
    }

    pub(crate) fn begin_area(&mut self, area: Area) {
        let index = area.index;
        if let Some(slot) = self.areas.get_mut(index as usize) {
            *slot = Some(area);
            self.current = Some(index);
        }
    }

    pub(crate) fn end_area(&mut self) -> Option<u8> {
        self.current.take()
    }

    pub(crate) fn set_loaded(&mut self, area: Option<u8>) {
        self.loaded = area;
    }

    /// Invalidates every area; the level pool is reset to an empty pool of the same size.
    pub fn clear_areas(&mut self) {
        self.areas = Default::default();
        self.current = None;
        self.loaded = None;
        let capacity = self.pool.capacity();
        self.pool.reset(capacity);
    }
}
