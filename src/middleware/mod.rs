pub mod auth;
pub mod domain;
