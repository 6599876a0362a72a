pub mod canvas;
pub mod config;
pub mod render;
pub mod scene;
pub mod storage;
pub mod version;

pub use canvas::{CanvasState, NodeStatus};
pub use scene::{SceneResult, Stage};
pub use version::{Version, VersionTree};
