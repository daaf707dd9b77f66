//! Core domain types and the hierarchy reconciliation engine for TrackMesh.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod factory;
pub mod file_store;
pub mod index;
pub mod node;
pub mod record;
pub mod schema;
pub mod store;
pub mod tree;
pub mod tree_file;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
