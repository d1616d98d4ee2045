//! dcx command implementations, shared by the binary and its tests

pub mod commands;
