// src/lib.rs
//! boxstorm
//!
//! Brute-force box collision simulation with serial, thread pool and GPU
//! compute detection backends that produce identical results.

pub mod performance;
pub mod prelude;
pub mod simulation;
pub mod thread_pool;
pub mod wgpu_utils;
