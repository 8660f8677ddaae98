use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A declarative set of field-level patches.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSetConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchSetConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(patch.id.clone()));
            }

            if patch.destination.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "destination",
                });
            } else if let Err(message) = check_path(&patch.destination) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message,
                });
            }

            if patch.member.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "member",
                });
            } else if patch.member.contains('.') {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: format!("member '{}' must be a single name", patch.member),
                });
            }

            if matches!(patch.tag.as_deref(), Some(tag) if tag.trim().is_empty()) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "tag must not be empty when given".to_string(),
                });
            }

            if let Err(message) = patch.value.check() {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message,
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    /// Dotted path of the target to patch, e.g. `klippy.extras.fan.Fan`.
    pub destination: String,
    pub member: String,
    pub value: ValueSpec,
    #[serde(default)]
    pub tag: Option<String>,
}

/// A member value as written in TOML.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ValueSpec {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ValueSpec>),
    /// `{ ref = "dotted.path" }` refers to another target.
    Ref {
        #[serde(rename = "ref")]
        target: String,
    },
}

impl ValueSpec {
    fn check(&self) -> Result<(), String> {
        match self {
            ValueSpec::Ref { target } => check_path(target),
            ValueSpec::List(items) => items.iter().try_for_each(ValueSpec::check),
            _ => Ok(()),
        }
    }
}

/// Layout of the host application the patch sets apply to.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct HostModel {
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModuleSpec {
    pub path: String,
    #[serde(default)]
    pub package: bool,
    #[serde(default)]
    pub members: BTreeMap<String, ValueSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TypeSpec {
    /// Dotted path; everything before the last segment names a module.
    pub path: String,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub members: BTreeMap<String, ValueSpec>,
}

impl HostModel {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        let module_paths = self.modules.iter().map(|m| (m.path.as_str(), "module"));
        let type_paths = self.types.iter().map(|t| (t.path.as_str(), "type"));
        for (path, kind) in module_paths.chain(type_paths) {
            if let Err(message) = check_path(path) {
                issues.push(ValidationIssue::InvalidModel {
                    path: path.to_string(),
                    message: format!("invalid {kind} path: {message}"),
                });
            } else if !seen.insert(path) {
                issues.push(ValidationIssue::InvalidModel {
                    path: path.to_string(),
                    message: format!("{kind} defined more than once"),
                });
            }
        }

        for ty in &self.types {
            if !ty.path.contains('.') {
                issues.push(ValidationIssue::InvalidModel {
                    path: ty.path.clone(),
                    message: "type path must start with its module".to_string(),
                });
            }
            for base in &ty.bases {
                if let Err(message) = check_path(base) {
                    issues.push(ValidationIssue::InvalidModel {
                        path: ty.path.clone(),
                        message: format!("invalid base '{base}': {message}"),
                    });
                }
            }
        }

        let members = self
            .modules
            .iter()
            .map(|m| (&m.path, &m.members))
            .chain(self.types.iter().map(|t| (&t.path, &t.members)));
        for (path, members) in members {
            for (name, value) in members {
                if let Err(message) = value.check() {
                    issues.push(ValidationIssue::InvalidModel {
                        path: format!("{path}.{name}"),
                        message,
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn check_path(path: &str) -> Result<(), String> {
    if path.split('.').any(|segment| segment.trim().is_empty()) {
        return Err(format!("'{path}' has an empty path segment"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
    DuplicateId(String),
    InvalidModel {
        path: String,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
            ValidationIssue::DuplicateId(id) => write!(f, "patch id '{id}' is used more than once"),
            ValidationIssue::InvalidModel { path, message } => {
                write!(f, "invalid host model entry '{path}': {message}")
            }
        }
    }
}
