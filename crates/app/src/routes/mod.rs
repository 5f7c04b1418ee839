//! Route groups mounted under `/api`. Each group owns its own request
//! validation and persistence calls; the gateway only mounts them.

pub mod auth;
pub mod products;
pub mod session;
pub mod users;
