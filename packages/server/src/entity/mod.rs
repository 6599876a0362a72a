pub mod account;
pub mod project;
pub mod session;
pub mod user;
pub mod verification_token;
