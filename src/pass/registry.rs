use super::{ExtensionPoint, PassInfo, PassManager};
use crate::plugin::PluginDescriptor;
use anyhow::{bail, Result};
use log::{debug, info};

/// The set of passes known to a tool, and where plugins asked for them
/// to run in the standard pipeline.
///
/// A registry is an ordinary owned value: it starts empty and is
/// populated by explicit `register_pass` / `load_plugin` calls.
#[derive(Debug, Default)]
pub struct PassRegistry {
    passes: Vec<PassInfo>,
    extensions: Vec<(ExtensionPoint, &'static str)>,
    plugins: Vec<&'static str>,
}

impl PassRegistry {
    pub fn new() -> PassRegistry {
        PassRegistry::default()
    }

    /// Make a pass available by name. Names must be unique.
    pub fn register_pass(&mut self, info: PassInfo) -> Result<()> {
        if self.lookup(info.name).is_some() {
            bail!("pass `{}` is already registered", info.name);
        }
        debug!("registry: registered pass {} ({})", info.name, info.description);
        self.passes.push(info);
        Ok(())
    }

    /// Ask for the registered pass `name` to be scheduled at `point`
    /// in the standard pipeline.
    pub fn add_extension(&mut self, point: ExtensionPoint, name: &'static str) -> Result<()> {
        if self.lookup(name).is_none() {
            bail!("cannot extend {} with unknown pass `{}`", point, name);
        }
        debug!("registry: {} scheduled at {}", name, point);
        self.extensions.push((point, name));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&PassInfo> {
        self.passes.iter().find(|info| info.name == name)
    }

    /// All registered passes, in registration order.
    pub fn passes(&self) -> impl Iterator<Item = &PassInfo> {
        self.passes.iter()
    }

    /// Passes scheduled at `point`, in the order they were requested.
    pub fn extensions_at(&self, point: ExtensionPoint) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions
            .iter()
            .filter(move |(p, _)| *p == point)
            .map(|(_, name)| *name)
    }

    /// Run a plugin's registration entry point against this registry.
    pub fn load_plugin(&mut self, plugin: &PluginDescriptor) -> Result<()> {
        if self.plugins.contains(&plugin.name) {
            bail!("plugin `{}` is already loaded", plugin.name);
        }
        (plugin.register)(self)?;
        self.plugins.push(plugin.name);
        info!("loaded plugin {} version {}", plugin.name, plugin.version);
        Ok(())
    }

    /// Build a pipeline of the named passes, in the given order.
    pub fn pipeline<S: AsRef<str>>(&self, names: &[S]) -> Result<PassManager> {
        let mut pm = PassManager::new();
        for name in names {
            let name = name.as_ref();
            match self.lookup(name) {
                Some(info) => pm.add(info.create()),
                None => bail!("unknown pass `{}`", name),
            }
        }
        Ok(pm)
    }

    /// Build the standard pipeline: every extension point in order,
    /// each with the passes plugins requested there.
    pub fn standard_pipeline(&self) -> PassManager {
        let mut pm = PassManager::new();
        for &point in &ExtensionPoint::ALL {
            for name in self.extensions_at(point) {
                // `add_extension` only accepts registered names.
                if let Some(info) = self.lookup(name) {
                    pm.add(info.create());
                }
            }
        }
        pm
    }
}
