// ABOUTME: Library root for picha - an image engine over Docker and Podman.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod ssh;
pub mod types;
