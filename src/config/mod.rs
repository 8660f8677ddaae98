pub mod applicator;
pub mod loader;
pub mod model;
pub mod schema;

pub use applicator::{apply_patch_set, revert_patch_set, to_record, ApplicationError, PatchResult};
pub use loader::{
    load_from_path, load_from_str, load_model_from_path, load_model_from_str, ConfigError,
};
pub use model::{build_host, render_value, snapshot, snapshot_text, to_value};
pub use schema::{
    HostModel, Metadata, ModuleSpec, PatchDefinition, PatchSetConfig, TypeSpec, ValidationError,
    ValidationIssue, ValueSpec,
};
