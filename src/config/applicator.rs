//! Patch set applicator - applies and reverts field-level patch definitions
//!
//! Each definition is resolved against the host (destination path and value
//! references) and applied through the patch stack. Results are reported per
//! patch so one bad definition does not hide the outcome of the others.

use crate::config::model::to_value;
use crate::config::schema::{PatchDefinition, PatchSetConfig};
use crate::errors::PatchError;
use crate::host::{Host, Value};
use crate::stack::{self, ApplyOutcome, PatchRecord};
use std::fmt;

/// Result of applying a single patch definition
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// The member did not exist and was created
    Created { destination: String, member: String },
    /// An existing member was replaced; `depth` originals are now stacked
    Layered {
        destination: String,
        member: String,
        depth: usize,
    },
    /// The most recent apply on the member was undone
    Reverted { destination: String, member: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Created {
                destination,
                member,
            } => write!(f, "Created {destination}.{member}"),
            PatchResult::Layered {
                destination,
                member,
                depth,
            } => write!(f, "Replaced {destination}.{member} (layer {depth})"),
            PatchResult::Reverted {
                destination,
                member,
            } => write!(f, "Reverted {destination}.{member}"),
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// Destination path or value reference did not resolve
    Resolve { path: String, source: PatchError },
    /// The patch stack rejected the apply or revert
    Patch(PatchError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Resolve { path, source } => {
                write!(f, "cannot resolve '{}': {}", path, source)
            }
            ApplicationError::Patch(e) => write!(f, "patch error: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Resolve { source, .. } => Some(source),
            ApplicationError::Patch(e) => Some(e),
        }
    }
}

impl From<PatchError> for ApplicationError {
    fn from(e: PatchError) -> Self {
        ApplicationError::Patch(e)
    }
}

/// Turn a definition into a concrete record against `host`.
pub fn to_record(host: &Host, patch: &PatchDefinition) -> Result<PatchRecord, ApplicationError> {
    let destination = host
        .lookup_path(&patch.destination)
        .map_err(|source| ApplicationError::Resolve {
            path: patch.destination.clone(),
            source,
        })?;
    let value = to_value(host, &patch.value).map_err(|source| ApplicationError::Resolve {
        path: format!("{}.{}", patch.destination, patch.member),
        source,
    })?;

    let record = PatchRecord::new(destination, patch.member.clone(), value);
    Ok(match &patch.tag {
        Some(tag) => record.tagged(tag.clone()),
        None => record,
    })
}

/// Apply every patch of `config` in order.
///
/// # Returns
///
/// One `(patch id, result)` pair per definition
pub fn apply_patch_set(
    host: &mut Host,
    config: &PatchSetConfig,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    config
        .patches
        .iter()
        .map(|patch| (patch.id.clone(), apply_definition(host, patch)))
        .collect()
}

fn apply_definition(host: &mut Host, patch: &PatchDefinition) -> Result<PatchResult, ApplicationError> {
    let record = to_record(host, patch)?;
    let destination = patch.destination.clone();
    let member = patch.member.clone();
    Ok(match stack::apply(host, &record)? {
        ApplyOutcome::Created => PatchResult::Created {
            destination,
            member,
        },
        ApplyOutcome::Layered { depth } => PatchResult::Layered {
            destination,
            member,
            depth,
        },
    })
}

/// Revert every patch of `config`, last definition first.
pub fn revert_patch_set(
    host: &mut Host,
    config: &PatchSetConfig,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    config
        .patches
        .iter()
        .rev()
        .map(|patch| (patch.id.clone(), revert_definition(host, patch)))
        .collect()
}

fn revert_definition(host: &mut Host, patch: &PatchDefinition) -> Result<PatchResult, ApplicationError> {
    let destination = host
        .lookup_path(&patch.destination)
        .map_err(|source| ApplicationError::Resolve {
            path: patch.destination.clone(),
            source,
        })?;
    // the replacement value plays no part in a revert
    let record = PatchRecord::new(destination, patch.member.clone(), Value::None);
    stack::revert(host, &record)?;
    Ok(PatchResult::Reverted {
        destination: patch.destination.clone(),
        member: patch.member.clone(),
    })
}
