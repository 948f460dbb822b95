//! Recipe loading and preset chains for the `terrafetch` binary.

pub mod presets;
pub mod recipe;
