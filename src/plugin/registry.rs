use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::FormatType;
use crate::formats::{EpubPlugin, Fb2Plugin, HtmlPlugin, MobiPlugin, TxtPlugin};

use super::FormatPlugin;

/// Immutable map from [`FormatType`] to the plugin that reads it.
///
/// Built once at startup and shared (`Arc`) with every dispatcher. Lookups
/// take no locks.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<FormatType, Arc<dyn FormatPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    /// Registry with every built-in plugin.
    pub fn with_defaults() -> Self {
        let plugins: [Arc<dyn FormatPlugin>; 5] = [
            Arc::new(Fb2Plugin),
            Arc::new(EpubPlugin),
            Arc::new(MobiPlugin),
            Arc::new(HtmlPlugin),
            Arc::new(TxtPlugin),
        ];
        Self {
            plugins: plugins
                .into_iter()
                .map(|plugin| (plugin.support_type(), plugin))
                .collect(),
        }
    }

    pub fn get(&self, format: FormatType) -> Option<&Arc<dyn FormatPlugin>> {
        self.plugins.get(&format)
    }

    pub fn supports(&self, format: FormatType) -> bool {
        self.plugins.contains_key(&format)
    }

    /// Registered formats, in declaration order.
    pub fn formats(&self) -> Vec<FormatType> {
        let mut formats: Vec<_> = self.plugins.keys().copied().collect();
        formats.sort();
        formats
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Collects plugin registrations and validates them in [`build`](Self::build).
#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: Vec<Arc<dyn FormatPlugin>>,
}

impl PluginRegistryBuilder {
    pub fn register(self, plugin: impl FormatPlugin + 'static) -> Self {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(mut self, plugin: Arc<dyn FormatPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register every built-in plugin.
    pub fn with_defaults(mut self) -> Self {
        let defaults = PluginRegistry::with_defaults();
        for format in defaults.formats() {
            if let Some(plugin) = defaults.get(format) {
                self.plugins.push(Arc::clone(plugin));
            }
        }
        self
    }

    /// Fails on a second plugin for the same format or a plugin claiming
    /// `FormatType::Unknown`.
    pub fn build(self) -> Result<PluginRegistry> {
        let mut plugins = HashMap::with_capacity(self.plugins.len());
        for plugin in self.plugins {
            let format = plugin.support_type();
            if !format.is_known() {
                return Err(Error::InvalidRegistration(
                    "a plugin cannot read the Unknown format".to_string(),
                ));
            }
            if plugins.insert(format, plugin).is_some() {
                return Err(Error::DuplicatePlugin(format));
            }
        }
        Ok(PluginRegistry { plugins })
    }
}
