//! Loading extensions that declare and bootstrap patches.
//!
//! Extensions are loaded in order, once per manager. The first failure is
//! logged and aborts the whole sequence; patches already applied by earlier
//! extensions stay applied, since a partially applied layered override set
//! has no safe rollback.

use crate::discovery;
use crate::errors::PatchError;
use crate::host::{Host, TargetId};
use crate::registry::Registry;
use crate::stack::{self, PatchRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// A unit of host customization.
pub trait Extension {
    fn name(&self) -> &str;

    /// Declare and apply this extension's patches.
    fn load(&self, ctx: &mut LoadContext<'_>) -> Result<(), PatchError>;
}

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("invalid extension name: '{0}'")]
    InvalidName(String),

    #[error("error loading extension '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: PatchError,
    },
}

/// What an extension's load hook can reach.
pub struct LoadContext<'a> {
    pub host: &'a mut Host,
    pub registry: &'a mut Registry,
    applied: Vec<PatchRecord>,
}

impl<'a> LoadContext<'a> {
    pub fn new(host: &'a mut Host, registry: &'a mut Registry) -> Self {
        Self {
            host,
            registry,
            applied: Vec::new(),
        }
    }

    /// Find every patch declared in the module tree under `module` and apply
    /// it. Returns the number of patches applied.
    pub fn bootstrap(&mut self, module: TargetId) -> Result<usize, PatchError> {
        let patches = discovery::find(self.host, self.registry, &[module], true)?;
        for patch in &patches {
            self.apply(patch)?;
        }
        Ok(patches.len())
    }

    pub fn apply(&mut self, record: &PatchRecord) -> Result<(), PatchError> {
        stack::apply(self.host, record)?;
        self.applied.push(record.clone());
        Ok(())
    }

    /// Records applied through this context, in application order.
    pub fn applied(&self) -> &[PatchRecord] {
        &self.applied
    }

    pub fn into_applied(self) -> Vec<PatchRecord> {
        self.applied
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionStatus {
    pub patches_loaded: bool,
    pub extensions: Vec<String>,
    pub applied_patches: usize,
}

/// Loads a list of extensions at most once.
#[derive(Debug, Default)]
pub struct ExtensionManager {
    loaded: bool,
    extensions: Vec<String>,
    applied: Vec<PatchRecord>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every extension in order. Later calls are no-ops.
    pub fn load_all(
        &mut self,
        host: &mut Host,
        registry: &mut Registry,
        extensions: &[Box<dyn Extension>],
    ) -> Result<(), ExtensionError> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;

        for extension in extensions {
            let name = extension.name().trim();
            if name.is_empty() {
                error!("extension with an empty name");
                return Err(ExtensionError::InvalidName(extension.name().to_string()));
            }

            let mut ctx = LoadContext::new(host, registry);
            let result = extension.load(&mut ctx);
            // keep what was applied even on failure; nothing is rolled back
            self.applied.extend(ctx.into_applied());

            if let Err(source) = result {
                error!(extension = name, error = %source, "error loading extension");
                return Err(ExtensionError::Load {
                    name: name.to_string(),
                    source,
                });
            }
            info!(extension = name, "loaded extension");
            self.extensions.push(name.to_string());
        }
        Ok(())
    }

    /// Every record applied by loaded extensions, in application order.
    pub fn applied(&self) -> &[PatchRecord] {
        &self.applied
    }

    pub fn status(&self) -> ExtensionStatus {
        ExtensionStatus {
            patches_loaded: self.loaded,
            extensions: self.extensions.clone(),
            applied_patches: self.applied.len(),
        }
    }
}
