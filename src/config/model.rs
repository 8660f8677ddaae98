//! Building a [`Host`] from a [`HostModel`] and rendering it back out.

use crate::config::schema::{HostModel, ValueSpec};
use crate::errors::PatchError;
use crate::host::{Host, TargetId, TargetKind, Value};
use std::collections::BTreeMap;

/// Resolve a [`ValueSpec`] against `host`; references must already exist.
pub fn to_value(host: &Host, spec: &ValueSpec) -> Result<Value, PatchError> {
    Ok(match spec {
        ValueSpec::Bool(v) => Value::Bool(*v),
        ValueSpec::Int(v) => Value::Int(*v),
        ValueSpec::Float(v) => Value::Float(*v),
        ValueSpec::Str(v) => Value::Str(v.clone()),
        ValueSpec::List(items) => Value::List(
            items
                .iter()
                .map(|item| to_value(host, item))
                .collect::<Result<_, _>>()?,
        ),
        ValueSpec::Ref { target } => Value::Target(host.lookup_path(target)?),
    })
}

/// Create the module, or reuse it when an earlier path already did.
fn ensure_module(host: &mut Host, path: &str, package: bool) -> Result<TargetId, PatchError> {
    let mut parent: Option<TargetId> = None;
    let segments: Vec<&str> = path.split('.').collect();

    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx + 1 == segments.len();
        let existing = match parent {
            None => host.root_module(segment),
            Some(parent) => host
                .slot(parent, segment)?
                .and_then(Value::as_target)
                .filter(|id| host.is_module(*id)),
        };

        let module = match existing {
            Some(module) => module,
            // intermediate modules are packages so they can hold children
            None => host.define_module(segment, parent, package || !is_last)?,
        };
        parent = Some(module);
    }

    parent.ok_or_else(|| PatchError::Argument(format!("empty module path '{path}'")))
}

/// Build a host from a validated model.
///
/// Modules are created first (parents on demand), then types in file order,
/// then member values, so `{ ref = ... }` may point at anything in the model.
pub fn build_host(model: &HostModel) -> Result<Host, PatchError> {
    let mut host = Host::new();

    let mut modules = Vec::with_capacity(model.modules.len());
    for spec in &model.modules {
        modules.push(ensure_module(&mut host, &spec.path, spec.package)?);
    }

    let mut types = Vec::with_capacity(model.types.len());
    for spec in &model.types {
        let (module_path, name) = spec
            .path
            .rsplit_once('.')
            .ok_or_else(|| PatchError::Argument(format!("type '{}' has no module", spec.path)))?;
        let module = ensure_module(&mut host, module_path, false)?;
        let bases = spec
            .bases
            .iter()
            .map(|base| host.lookup_path(base))
            .collect::<Result<Vec<_>, _>>()?;
        types.push(host.define_type(name, Some(module), &bases)?);
    }

    let module_members = modules.iter().zip(&model.modules).map(|(id, spec)| (*id, &spec.members));
    let type_members = types.iter().zip(&model.types).map(|(id, spec)| (*id, &spec.members));
    for (target, members) in module_members.chain(type_members) {
        for (name, spec) in members {
            let value = to_value(&host, spec)?;
            host.set_slot(target, name, value)?;
        }
    }

    Ok(host)
}

/// Render a value for display, naming targets by their qualified name.
pub fn render_value(host: &Host, value: &Value) -> String {
    match value {
        Value::None => "none".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format!("{v:?}"),
        Value::Str(v) => format!("{v:?}"),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|item| render_value(host, item)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Callable(callable) => {
            let name = host
                .function_name(callable.base_function())
                .unwrap_or("<unknown>");
            format!("<function {name}>")
        }
        Value::Target(id) => match host.kind(*id) {
            Ok(TargetKind::Module { .. }) => format!("<module {}>", host.describe(*id)),
            Ok(TargetKind::Type) => format!("<type {}>", host.describe(*id)),
            _ => format!("<{}>", host.describe(*id)),
        },
    }
}

/// Every module and type member as `qualified.name -> rendered value`.
///
/// Instances and the universal root types are left out.
pub fn snapshot(host: &Host) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for id in host.target_ids() {
        let listed = matches!(host.kind(id), Ok(TargetKind::Module { .. } | TargetKind::Type));
        if !listed || host.is_root_type(id) {
            continue;
        }
        let Ok(members) = host.members(id) else {
            continue;
        };
        let owner = host.describe(id);
        for (name, value) in members {
            out.insert(format!("{owner}.{name}"), render_value(host, value));
        }
    }
    out
}

/// Snapshot as one `name = value` line per member, for diffing.
pub fn snapshot_text(host: &Host) -> String {
    snapshot(host)
        .into_iter()
        .map(|(name, value)| format!("{name} = {value}\n"))
        .collect()
}
