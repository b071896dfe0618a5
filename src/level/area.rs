use crate::bytecode::format::SegmentedAddress;
use crate::services::world::SceneRoot;

pub const PAINTING_WARP_SLOTS: usize = 45;
pub const INSTANT_WARP_SLOTS: usize = 4;
pub const WHIRLPOOL_SLOTS: usize = 2;
pub const DIALOG_SLOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpNode {
    pub id: u8,
    pub dest_level: u8,
    pub dest_area: u8,
    pub dest_node: u8,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantWarp {
    pub dest_area: u8,
    pub displacement: [i16; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorRef {
    Address(SegmentedAddress),
    /// Behavior named by a package token.
    Named { name: String, address: SegmentedAddress },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnInfo {
    pub model: u16,
    pub position: [i16; 3],
    pub angle: [i16; 3],
    pub behavior_arg: u32,
    pub behavior: BehaviorRef,
    pub acts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Whirlpool {
    pub condition: u8,
    pub position: [i16; 3],
    pub strength: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicParams {
    pub settings: i16,
    pub sequence: i16,
}

/// Side tables of one area, populated between `AREA` and `END_AREA`.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub index: u8,
    pub geometry: SegmentedAddress,
    pub root: SceneRoot,
    pub warp_nodes: Vec<WarpNode>,
    pub painting_warps: [Option<WarpNode>; PAINTING_WARP_SLOTS],
    pub instant_warps: [Option<InstantWarp>; INSTANT_WARP_SLOTS],
    pub spawns: Vec<SpawnInfo>,
    pub terrain: Option<SegmentedAddress>,
    pub rooms: Option<SegmentedAddress>,
    pub macro_objects: Option<SegmentedAddress>,
    pub terrain_type: i16,
    pub dialog: [u8; DIALOG_SLOTS],
    pub music: Option<MusicParams>,
    pub whirlpools: [Option<Whirlpool>; WHIRLPOOL_SLOTS],
}

impl Area {
    pub fn new(index: u8, geometry: SegmentedAddress, root: SceneRoot) -> Self {
        Self {
            index,
            geometry,
            root,
            warp_nodes: Vec::new(),
            painting_warps: [None; PAINTING_WARP_SLOTS],
            instant_warps: [None; INSTANT_WARP_SLOTS],
            spawns: Vec::new(),
            terrain: None,
            rooms: None,
            macro_objects: None,
            terrain_type: 0,
            dialog: [0; DIALOG_SLOTS],
            music: None,
            whirlpools: [None; WHIRLPOOL_SLOTS],
        }
    }

    pub fn warp_node(&self, id: u8) -> Option<&WarpNode> {
        self.warp_nodes.iter().find(|node| node.id == id)
    }
}
