// Encoding engine: parameter resolution, command construction and execution

pub mod compat;
pub mod core;
pub mod hardware;
pub mod probe;
pub mod worker;

pub use core::*;
