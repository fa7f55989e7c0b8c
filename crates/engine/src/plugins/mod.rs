//! Core stage library built on the stage runtime.

pub mod calculator;
pub mod filter;
pub mod group_by;
pub mod utils;
