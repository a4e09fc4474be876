//! Plugin entry point.
//!
//! A tool hosting these passes creates a `PassRegistry`, then hands it
//! `plugin::descriptor()` through `PassRegistry::load_plugin`. Nothing
//! is registered as a side effect of loading the crate.

use crate::pass::{ExtensionPoint, PassRegistry};
use crate::passes::tag_helpers;
use anyhow::Result;

/// Describes a plugin: its identity, and the function that registers
/// its passes into a registry.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    pub register: fn(&mut PassRegistry) -> Result<()>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// The descriptor for this crate's passes.
pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        register,
    }
}

fn register(registry: &mut PassRegistry) -> Result<()> {
    registry.register_pass(tag_helpers::pass_info())?;
    registry.add_extension(ExtensionPoint::EarlyAsPossible, tag_helpers::PASS_NAME)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registers_tag_helpers_early() {
        let mut registry = PassRegistry::new();
        registry.load_plugin(&descriptor()).unwrap();

        let info = registry.lookup("TagHelpersPass").unwrap();
        assert!(info.cfg_only);
        assert!(!info.is_analysis);
        assert_eq!(
            registry
                .extensions_at(ExtensionPoint::EarlyAsPossible)
                .collect::<Vec<_>>(),
            vec!["TagHelpersPass"]
        );
        assert_eq!(
            registry.standard_pipeline().pass_names(),
            vec!["TagHelpersPass"]
        );
    }

    #[test]
    fn loading_twice_fails() {
        let mut registry = PassRegistry::new();
        registry.load_plugin(&descriptor()).unwrap();
        assert!(registry.load_plugin(&descriptor()).is_err());
        assert_eq!(registry.passes().count(), 1);
    }
}
