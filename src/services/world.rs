//! Scene bookkeeping driven by the area, model and object commands.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::bytecode::format::SegmentedAddress;
use crate::level::SpawnInfo;
use crate::memory::{Arena, ArenaHandle};

pub type NodeHandle = ArenaHandle<SceneNode>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    AreaRoot { area: u8 },
    Camera,
    Object { model: u16 },
    Player { model: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub parent: Option<NodeHandle>,
}

/// Root of a built area graph and its camera node, when the geometry has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRoot {
    pub node: NodeHandle,
    pub camera: Option<NodeHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelSource {
    Geometry(SegmentedAddress),
    DisplayList { address: SegmentedAddress, layer: u16 },
    Scaled { address: SegmentedAddress, scale: f32 },
}

/// Shape of a geometry layout known to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryLayout {
    pub has_camera: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("no geometry layout at {0}")]
    UnknownGeometry(SegmentedAddress),
    #[error("model slot {0} is out of range")]
    ModelOutOfRange(u16),
}

pub trait WorldService {
    fn init_level(&mut self);
    /// Drops every object and scene node.
    fn clear_objects(&mut self);
    fn build_area(&mut self, area: u8, geometry: SegmentedAddress) -> Result<SceneRoot, WorldError>;
    fn load_model(&mut self, model: u16, source: ModelSource) -> Result<(), WorldError>;
    fn init_player(&mut self, model: u8, behavior_arg: u32, behavior: SegmentedAddress);
    /// Instantiates the spawn list of `area`, returning the number of objects created.
    fn load_area(&mut self, area: u8, spawns: &[SpawnInfo]) -> usize;
    fn unload_area(&mut self, area: u8);
    fn unload_player_area(&mut self);
    fn update_objects(&mut self);
}

pub const MODEL_SLOTS: u16 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub node: NodeHandle,
    pub area: u8,
    pub spawn: SpawnInfo,
}

/// Default [`WorldService`] keeping an arena-backed scene graph.
#[derive(Debug, Default)]
pub struct SceneWorld {
    nodes: Arena<SceneNode>,
    layouts: BTreeMap<SegmentedAddress, GeometryLayout>,
    models: BTreeMap<u16, ModelSource>,
    objects: Vec<WorldObject>,
    player: Option<NodeHandle>,
    loaded_area: Option<u8>,
    updates: u64,
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a geometry layout available to `build_area`.
    pub fn define_geometry(&mut self, address: SegmentedAddress, layout: GeometryLayout) {
        self.layouts.insert(address, layout);
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn model(&self, model: u16) -> Option<&ModelSource> {
        self.models.get(&model)
    }

    pub fn objects(&self) -> &[WorldObject] {
        &self.objects
    }

    pub fn player(&self) -> Option<NodeHandle> {
        self.player
    }

    pub fn loaded_area(&self) -> Option<u8> {
        self.loaded_area
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

impl WorldService for SceneWorld {
    fn init_level(&mut self) {
        self.loaded_area = None;
        self.updates = 0;
    }

    fn clear_objects(&mut self) {
        self.objects.clear();
        self.player = None;
        self.nodes.clear();
    }

    fn build_area(
        &mut self,
        area: u8,
        geometry: SegmentedAddress,
    ) -> Result<SceneRoot, WorldError> {
        let layout = *self
            .layouts
            .get(&geometry)
            .ok_or(WorldError::UnknownGeometry(geometry))?;
        let node = self.nodes.allocate(SceneNode {
            kind: NodeKind::AreaRoot { area },
            parent: None,
        });
        let camera = layout.has_camera.then(|| {
            self.nodes.allocate(SceneNode {
                kind: NodeKind::Camera,
                parent: Some(node),
            })
        });
        Ok(SceneRoot { node, camera })
    }

    fn load_model(&mut self, model: u16, source: ModelSource) -> Result<(), WorldError> {
        if model >= MODEL_SLOTS {
            return Err(WorldError::ModelOutOfRange(model));
        }
        self.models.insert(model, source);
        Ok(())
    }

    fn init_player(&mut self, model: u8, _behavior_arg: u32, _behavior: SegmentedAddress) {
        self.player = Some(self.nodes.allocate(SceneNode {
            kind: NodeKind::Player { model },
            parent: None,
        }));
    }

    fn load_area(&mut self, area: u8, spawns: &[SpawnInfo]) -> usize {
        self.loaded_area = Some(area);
        for spawn in spawns {
            let node = self.nodes.allocate(SceneNode {
                kind: NodeKind::Object { model: spawn.model },
                parent: None,
            });
            self.objects.push(WorldObject {
                node,
                area,
                spawn: spawn.clone(),
            });
        }
        debug!(area, objects = spawns.len(), "area loaded");
        spawns.len()
    }

    fn unload_area(&mut self, area: u8) {
        self.objects.retain(|object| object.area != area);
        if self.loaded_area == Some(area) {
            self.loaded_area = None;
        }
    }

    fn unload_player_area(&mut self) {
        self.player = None;
    }

    fn update_objects(&mut self) {
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_area_roots_with_optional_camera() {
        let mut world = SceneWorld::new();
        let with_camera = SegmentedAddress::from_raw(0x0E00_0100);
        let bare = SegmentedAddress::from_raw(0x0E00_0200);
        world.define_geometry(with_camera, GeometryLayout { has_camera: true });
        world.define_geometry(bare, GeometryLayout::default());

        let root = world.build_area(1, with_camera).unwrap();
        let camera = root.camera.unwrap();
        assert_eq!(world.node(camera).unwrap().parent, Some(root.node));
        assert_eq!(world.build_area(2, bare).unwrap().camera, None);
        assert_eq!(
            world.build_area(3, SegmentedAddress::NULL),
            Err(WorldError::UnknownGeometry(SegmentedAddress::NULL))
        );
    }

    #[test]
    fn clearing_objects_invalidates_nodes() {
        let mut world = SceneWorld::new();
        world.init_player(1, 0, SegmentedAddress::NULL);
        let player = world.player().unwrap();
        world.clear_objects();
        assert!(world.node(player).is_none());
        assert_eq!(world.node_count(), 0);
    }
}
