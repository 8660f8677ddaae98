//! Kapuchin: layered, reversible runtime patching of a host object model
//!
//! A host application is described as modules, types and instances holding
//! named members. Patches replace (or create) one member at a time and are
//! stacked per slot, so any number of overrides can be layered on the same
//! member and peeled off again in reverse order.
//!
//! # Architecture
//!
//! Every operation compiles down to a single primitive: a [`PatchRecord`]
//! applied through the [`stack`] module. Everything else produces records:
//! the [`builder`] turns a template's members into records, the [`registry`]
//! attaches declared records and overrides to candidates, [`discovery`]
//! collects declarations from module trees, and [`config`] reads them from
//! TOML patch sets.
//!
//! # Example
//!
//! ```
//! use kapuchin::{apply, get_original, revert, Host, PatchRecord, Value, DEFAULT_TAG};
//!
//! let mut host = Host::new();
//! let fan = host.define_type("Fan", None, &[])?;
//! host.set_slot(fan, "max_power", Value::Float(1.0))?;
//!
//! let record = PatchRecord::new(fan, "max_power", 0.8);
//! apply(&mut host, &record)?;
//! assert_eq!(host.slot(fan, "max_power")?, Some(&Value::Float(0.8)));
//! assert_eq!(get_original(&host, fan, "max_power", DEFAULT_TAG)?, Value::Float(1.0));
//!
//! revert(&mut host, &record)?;
//! assert_eq!(host.slot(fan, "max_power")?, Some(&Value::Float(1.0)));
//! # Ok::<(), kapuchin::PatchError>(())
//! ```

pub mod builder;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod extension;
pub mod host;
pub mod registry;
pub mod resolve;
pub mod stack;

// Re-exports
pub use builder::{build, default_filter, BuildOptions, MemberFilter, RESERVED_PREFIX};
pub use config::{
    apply_patch_set, build_host, load_from_path, load_from_str, load_model_from_path,
    revert_patch_set, snapshot, ApplicationError, ConfigError, HostModel, PatchResult,
    PatchSetConfig,
};
pub use discovery::{find, import_module};
pub use errors::{PatchError, Result, RevertReason};
pub use extension::{Extension, ExtensionError, ExtensionManager, ExtensionStatus, LoadContext};
pub use host::{Callable, Host, IdentityKey, TargetId, TargetKind, Value, WrapperKind};
pub use registry::{Annotation, FilterOverride, Overrides, RegistrationMetadata, Registry};
pub use resolve::{resolve, resolve_path};
pub use stack::{
    apply, apply_as, call_original, get_original, original_depth, revert, was_created,
    ApplyOutcome, PatchRecord, DEFAULT_TAG,
};
