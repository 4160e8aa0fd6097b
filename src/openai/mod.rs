mod core;
pub use core::*;
