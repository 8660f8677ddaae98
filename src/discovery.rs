//! Tree-wide discovery of declared patches.

use crate::errors::{PatchError, Result};
use crate::host::{Host, TargetId};
use crate::registry::Registry;
use crate::stack::PatchRecord;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Run a module's pending initializer, if it has not been imported yet.
///
/// Initializer failures are returned as [`PatchError::Import`] unless they
/// are already one, so the failing module is named in the error.
pub fn import_module(host: &mut Host, registry: &mut Registry, module: TargetId) -> Result<()> {
    let Some(init) = host.take_initializer(module) else {
        return Ok(());
    };
    info!(module = %host.describe(module), "importing module");
    init(host, registry, module).map_err(|e| match e {
        e @ PatchError::Import { .. } => e,
        e => PatchError::Import {
            module: host.describe(module),
            message: e.to_string(),
        },
    })
}

/// Modules visited from `root`, in visiting order.
///
/// The root comes first, then each package's children in name order,
/// breadth-first. Child packages are only visited (and descended into) when
/// `recursive` is set. Every visited module is imported.
pub fn walk_modules(
    host: &mut Host,
    registry: &mut Registry,
    root: TargetId,
    recursive: bool,
) -> Result<Vec<TargetId>> {
    import_module(host, registry, root)?;
    let mut visited = vec![root];

    let mut queue = VecDeque::from([root]);
    while let Some(package) = queue.pop_front() {
        if !host.is_package(package) {
            continue;
        }
        for child in host.child_modules(package)? {
            if host.is_package(child) {
                if !recursive {
                    continue;
                }
                import_module(host, registry, child)?;
                queue.push_back(child);
            } else {
                import_module(host, registry, child)?;
            }
            visited.push(child);
        }
    }
    Ok(visited)
}

/// Collect every patch declared against a top-level member of the module
/// trees rooted at `roots`.
pub fn find(
    host: &mut Host,
    registry: &mut Registry,
    roots: &[TargetId],
    recursive: bool,
) -> Result<Vec<PatchRecord>> {
    let mut out = Vec::new();
    for root in roots {
        for module in walk_modules(host, registry, *root, recursive)? {
            for (_, value) in host.members(module)? {
                if let Some(meta) = registry.get(value) {
                    out.extend(meta.patches.iter().cloned());
                }
            }
        }
    }
    debug!(roots = roots.len(), patches = out.len(), "discovered patches");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Value;

    #[test]
    fn test_walk_skips_child_packages_unless_recursive() {
        let mut host = Host::new();
        let mut registry = Registry::new();
        let root = host.define_module("patches", None, true).unwrap();
        let sub = host.define_module("sub", Some(root), true).unwrap();
        let leaf = host.define_module("leaf", Some(sub), false).unwrap();
        let alpha = host.define_module("alpha", Some(root), false).unwrap();

        let flat = walk_modules(&mut host, &mut registry, root, false).unwrap();
        assert_eq!(flat, vec![root, alpha]);

        let deep = walk_modules(&mut host, &mut registry, root, true).unwrap();
        assert_eq!(deep, vec![root, alpha, sub, leaf]);
    }

    #[test]
    fn test_lazy_module_runs_once() {
        let mut host = Host::new();
        let mut registry = Registry::new();
        let root = host.define_module("patches", None, true).unwrap();
        let counter = host.define_type("Counter", None, &[]).unwrap();
        let lazy = host
            .define_lazy_module("lazy", Some(root), false, move |host, _, _| {
                let runs = host.slot(counter, "runs")?.and_then(Value::as_i64).unwrap_or(0);
                host.set_slot(counter, "runs", Value::Int(runs + 1))?;
                Ok(())
            })
            .unwrap();

        assert!(!host.is_imported(lazy));
        walk_modules(&mut host, &mut registry, root, true).unwrap();
        walk_modules(&mut host, &mut registry, root, true).unwrap();
        assert!(host.is_imported(lazy));
        assert_eq!(host.slot(counter, "runs").unwrap(), Some(&Value::Int(1)));
    }

    #[test]
    fn test_failed_import_names_module() {
        let mut host = Host::new();
        let mut registry = Registry::new();
        let root = host
            .define_lazy_module("broken", None, false, |_, _, _| {
                Err(PatchError::Argument("bad config".to_string()))
            })
            .unwrap();
        let err = find(&mut host, &mut registry, &[root], true).unwrap_err();
        match err {
            PatchError::Import { module, message } => {
                assert_eq!(module, "broken");
                assert!(message.contains("bad config"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
