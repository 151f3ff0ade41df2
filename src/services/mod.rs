pub mod auth;
pub mod credentials;
pub mod gate;
pub mod policy;
pub mod posts;
pub mod session;
pub mod session_cache;
pub mod social;
pub mod token;
