pub mod auth;
pub mod project;
pub mod scene;
pub mod shared;
pub mod upload;
