//! matcomp daemon library - exposes modules for testing.

pub mod error;
pub mod routes;
pub mod server;
