//! Recipe building and lifecycle orchestration for dcx
//!
//! This crate provides:
//! - Recipes: task graphs that build, start, probe and run lifecycle hooks
//! - A scheduler that runs recipes with parallel fan-out and cancellation
//! - [`Instance`], the up/down/attach state machine
//! - [`ProcessInterfaceFactory`] for running processes in the container

mod error;
mod instance;
mod instance_config;
mod log;
mod process;
pub mod recipe;
mod running;

pub use error::*;
pub use instance::*;
pub use instance_config::*;
pub use log::*;
pub use process::*;
pub use running::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
