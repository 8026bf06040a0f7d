//! Loader and classifier adapter over the compiler service.
//!
//! The compiler service is external and swappable: it turns one source unit
//! into a live instance plus whatever role metadata the unit declares.
//! Compiling the same content twice yields equivalent units, so duplicate
//! change notifications are harmless.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::component::Component;
use crate::error::ComponentError;
use crate::role::RoleMetadata;

const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loader");

/// Output of compiling one source unit.
#[derive(Clone)]
pub struct CompiledUnit {
    /// Live instance.
    pub component: Arc<dyn Component>,
    /// Declared role, when the unit declares one.
    pub metadata: Option<RoleMetadata>,
    /// Source unit.
    pub source: PathBuf,
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CompiledUnit")
            .field("metadata", &self.metadata)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Turns a source unit into a [`CompiledUnit`].
pub trait CompilerService: Send + Sync {
    /// Compiles the unit at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Compile`] for malformed sources.
    fn compile(&self, path: &Path) -> Result<CompiledUnit, ComponentError>;

    /// Whether `path` looks like a unit this service compiles. Directory
    /// scans and change notifications skip everything else.
    fn accepts(&self, path: &Path) -> bool {
        let _ = path;
        true
    }
}

/// Returns the unit's declared role when the instance can fulfil it.
///
/// `None` means the unit is not a component: either it declares no role, or
/// the instance lacks the capability its declared role requires.
#[must_use]
pub fn classify(unit: &CompiledUnit) -> Option<&RoleMetadata> {
    let metadata = unit.metadata.as_ref()?;
    if metadata.kind().supported_by(unit.component.as_ref()) {
        Some(metadata)
    } else {
        debug!(
            target: LOADER_TARGET,
            source = %unit.source.display(),
            kind = %metadata.kind(),
            "instance lacks the capability of its declared role"
        );
        None
    }
}

/// Finds and compiles source units.
#[derive(Clone)]
pub struct ComponentLoader {
    compiler: Arc<dyn CompilerService>,
}

impl ComponentLoader {
    /// Loader backed by `compiler`.
    #[must_use]
    pub fn new(compiler: Arc<dyn CompilerService>) -> Self {
        Self { compiler }
    }

    /// Whether the compiler service handles `path`.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        self.compiler.accepts(path)
    }

    /// Compiles one unit.
    ///
    /// # Errors
    ///
    /// Propagates the compiler service's [`ComponentError`].
    pub fn load(&self, path: &Path) -> Result<CompiledUnit, ComponentError> {
        self.compiler.compile(path)
    }

    /// Lists every accepted file under `root`, sorted by path.
    ///
    /// Hidden files and ignore files are not treated as filters; the compiler
    /// service decides what counts as a unit. Unreadable entries below the
    /// root are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Discovery`] when `root` is not a directory.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ComponentError> {
        if !root.is_dir() {
            return Err(ComponentError::Discovery {
                root: root.to_path_buf(),
                message: String::from("not a directory"),
            });
        }

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(target: LOADER_TARGET, error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let path = entry.into_path();
            if self.accepts(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl fmt::Debug for ComponentLoader {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ComponentLoader").finish_non_exhaustive()
    }
}
