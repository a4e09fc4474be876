//! helpertag: tag `helper_*` functions with an entry-point trace call.
//!
//! The crate carries a small SSA IR, a textual frontend for it, a pass
//! registry/manager, and the `TagHelpersPass` itself.

pub mod entity;
mod errors;
mod frontend;
mod interp;
mod ir;
mod ops;
pub mod pass;
pub mod passes;
pub mod plugin;

pub use errors::*;
pub use interp::*;
pub use ir::*;
pub use ops::Operator;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;
