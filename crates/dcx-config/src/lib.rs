//! Configuration parsing for dcx
//!
//! This crate handles parsing of:
//! - Global configuration (`~/.config/dcx/config.toml`)
//! - devcontainer.json files (JSON with comments), with variable substitution
//! - devcontainer-feature.json metadata, install ordering and merging

pub mod decode;
mod devcontainer;
mod error;
mod feature;
mod global;
pub mod jsonc;
mod merge;
mod substitute;

pub use devcontainer::*;
pub use error::*;
pub use feature::*;
pub use global::*;
pub use merge::*;
pub use substitute::*;
