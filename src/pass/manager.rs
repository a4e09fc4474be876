use super::ModulePass;
use crate::Module;
use log::{debug, trace};

/// An ordered pipeline of module passes.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn ModulePass>>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager::default()
    }

    pub fn add(&mut self, pass: Box<dyn ModulePass>) {
        debug!("pass manager: adding {}", pass.name());
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass once, in order. Returns `true` if any pass
    /// reported that it modified the module.
    pub fn run(&mut self, module: &mut Module) -> bool {
        let mut modified = false;
        for pass in &mut self.passes {
            debug!("pass manager: running {}", pass.name());
            let changed = pass.run_on_module(module);
            trace!(
                "pass manager: {} returned modified={}:\n{}",
                pass.name(),
                changed,
                module.display()
            );
            modified |= changed;
        }
        modified
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_list().entries(self.pass_names()).finish()
    }
}
