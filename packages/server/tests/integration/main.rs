mod auth;
mod common;
mod project;
