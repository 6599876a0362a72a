pub mod auth;
pub mod generate;
pub mod node;
pub mod project;
pub mod reference;
pub mod scene;
pub mod upload;
