//! Collaborators the interpreter calls into, each with a default implementation.

pub mod presentation;
pub mod tokens;
pub mod world;

pub use presentation::{PresentationQueue, PresentationRequest, PresentationService};
pub use tokens::{TokenService, TokenTable, TokenValue};
pub use world::{
    GeometryLayout, ModelSource, NodeHandle, SceneNode, SceneRoot, SceneWorld, WorldError,
    WorldService,
};
