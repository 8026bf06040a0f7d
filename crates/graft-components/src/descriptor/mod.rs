//! JSON descriptor compiler service.
//!
//! Each unit is a JSON document naming a factory registered in a
//! [`FactoryTable`], an optional role declaration, and free-form settings
//! handed to the factory:
//!
//! ```json
//! {
//!   "factory": "static-text",
//!   "role": { "kind": "handler", "type": "app.Orders", "name": "orders",
//!             "patterns": ["/orders"] },
//!   "settings": { "body": "v1" }
//! }
//! ```
//!
//! Files without the `json` extension, hidden files and editor backups are
//! not units.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::component::Component;
use crate::error::ComponentError;
use crate::loader::{CompiledUnit, CompilerService};
use crate::role::RoleMetadata;

/// Builds a component instance from descriptor settings.
pub trait ComponentFactory: Send + Sync {
    /// Creates an instance.
    ///
    /// # Errors
    ///
    /// Returns a description of why the settings are unusable.
    fn create(&self, settings: &Value) -> Result<Arc<dyn Component>, String>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Component>, String> + Send + Sync,
{
    fn create(&self, settings: &Value) -> Result<Arc<dyn Component>, String> {
        self(settings)
    }
}

/// Factories addressable from descriptors, keyed by name.
#[derive(Clone, Default)]
pub struct FactoryTable {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl FactoryTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the factory called `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: impl ComponentFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder-style [`FactoryTable::register`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, factory: impl ComponentFactory + 'static) -> Self {
        self.register(name, factory);
        self
    }

    /// Looks up a factory.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ComponentFactory>> {
        self.factories.get(name)
    }

    /// Registered factory names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FactoryTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FactoryTable")
            .field("factories", &self.names())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    factory: String,
    #[serde(default)]
    role: Option<RoleMetadata>,
    #[serde(default)]
    settings: Value,
}

/// Compiler service reading JSON descriptors.
#[derive(Debug, Clone)]
pub struct DescriptorCompiler {
    factories: Arc<FactoryTable>,
}

impl DescriptorCompiler {
    /// Compiler resolving factories from `factories`.
    #[must_use]
    pub const fn new(factories: Arc<FactoryTable>) -> Self {
        Self { factories }
    }
}

fn compile_error(path: &Path, message: impl Into<String>) -> ComponentError {
    ComponentError::Compile {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

impl CompilerService for DescriptorCompiler {
    fn compile(&self, path: &Path) -> Result<CompiledUnit, ComponentError> {
        let text = fs::read_to_string(path).map_err(|err| compile_error(path, err.to_string()))?;
        let descriptor: Descriptor = serde_json::from_str(&text)
            .map_err(|err| compile_error(path, format!("malformed descriptor: {err}")))?;
        let factory = self.factories.get(&descriptor.factory).ok_or_else(|| {
            compile_error(path, format!("unknown factory '{}'", descriptor.factory))
        })?;
        let component = factory.create(&descriptor.settings).map_err(|message| {
            compile_error(
                path,
                format!("factory '{}' failed: {message}", descriptor.factory),
            )
        })?;
        Ok(CompiledUnit {
            component,
            metadata: descriptor.role,
            source: path.to_path_buf(),
        })
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        !name.starts_with('.')
            && !name.ends_with('~')
            && path
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
    }
}
