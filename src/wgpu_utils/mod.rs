// src/wgpu_utils/mod.rs
//! WGPU utility functions and helpers
//!
//! Provides convenient wrappers and builders for the compute-side wgpu
//! operations used by the device collision path.

pub mod binding_builder;
pub mod binding_types;
pub mod uniform_buffer;

// Re-export main types
pub use binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc};
pub use binding_types::*;
pub use uniform_buffer::{ArrayBuffer, UniformBuffer};
