//! Tools for inspecting tries while debugging.

pub mod stats;
