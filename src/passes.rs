//! Passes.

pub mod tag_helpers;
