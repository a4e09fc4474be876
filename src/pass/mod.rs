//! Pass framework: the interface transform passes implement, and the
//! registry and manager that schedule them.
//!
//! Terminology note: a "pass" here is a transform over a whole
//! `Module`. It may mutate any function body, and reports whether the
//! module was (possibly) modified.

use crate::Module;

mod manager;
pub use manager::*;
mod registry;
pub use registry::*;

/// A transformation over a whole module.
pub trait ModulePass {
    /// The name this pass is registered under.
    fn name(&self) -> &'static str;

    /// Run over `module`. Returns `true` if the module may have been
    /// modified. The flag is allowed to be conservative: a pass may
    /// report `true` without having changed anything.
    fn run_on_module(&mut self, module: &mut Module) -> bool;
}

/// Static description of a registered pass, and how to construct it.
#[derive(Clone)]
pub struct PassInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// The pass never changes the control-flow graph (it may still
    /// change instructions within blocks).
    pub cfg_only: bool,
    /// The pass only computes information and never mutates the IR.
    pub is_analysis: bool,
    pub constructor: fn() -> Box<dyn ModulePass>,
}

impl PassInfo {
    pub fn create(&self) -> Box<dyn ModulePass> {
        (self.constructor)()
    }
}

impl std::fmt::Debug for PassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PassInfo")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("cfg_only", &self.cfg_only)
            .field("is_analysis", &self.is_analysis)
            .finish()
    }
}

/// Positions in the standard pipeline where plugins may ask for their
/// passes to be inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionPoint {
    /// Before anything else in the pipeline.
    EarlyAsPossible,
    /// After everything else in the pipeline.
    OptimizerLast,
}

impl ExtensionPoint {
    /// All extension points, in pipeline order.
    pub const ALL: [ExtensionPoint; 2] =
        [ExtensionPoint::EarlyAsPossible, ExtensionPoint::OptimizerLast];
}

impl std::fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExtensionPoint::EarlyAsPossible => write!(f, "early-as-possible"),
            ExtensionPoint::OptimizerLast => write!(f, "optimizer-last"),
        }
    }
}
