pub mod diffusion;
pub mod llm;
pub mod render;
pub mod scene;
pub mod storage;
pub mod templates;
