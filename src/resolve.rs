//! Raw member resolution.
//!
//! Reads go straight to the stored slot: computed properties are returned
//! as-is rather than evaluated. Types are searched along their cached
//! ancestor order, skipping the universal roots.

use crate::errors::{PatchError, Result};
use crate::host::{Host, TargetId, Value};
use std::collections::BTreeSet;

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Read the raw value of `name` on `target`.
pub fn resolve(host: &Host, target: TargetId, name: &str) -> Result<Value> {
    match lookup(host, target, name)? {
        Some((_, value)) => Ok(value.clone()),
        None => Err(not_found(host, target, name)),
    }
}

/// Like [`resolve`], but also reports which target held the definition.
pub fn lookup<'h>(
    host: &'h Host,
    target: TargetId,
    name: &str,
) -> Result<Option<(TargetId, &'h Value)>> {
    if !host.is_type(target) {
        return Ok(host.slot(target, name)?.map(|value| (target, value)));
    }

    for owner in search_order(host, target)? {
        if let Some(value) = host.slot(owner, name)? {
            return Ok(Some((owner, value)));
        }
    }
    Ok(None)
}

/// Ancestor order used for member lookup: most-derived first.
///
/// The universal roots are skipped when inherited, but a root searched
/// directly still sees its own members.
pub fn search_order(host: &Host, ty: TargetId) -> Result<Vec<TargetId>> {
    Ok(host
        .ancestors(ty)?
        .iter()
        .copied()
        .filter(|id| *id == ty || !host.is_root_type(*id))
        .collect())
}

pub(crate) fn not_found(host: &Host, target: TargetId, name: &str) -> PatchError {
    PatchError::NotFound {
        target: host.describe(target),
        member: name.to_string(),
        suggestion: suggest(host, target, name),
    }
}

fn visible_names(host: &Host, target: TargetId) -> BTreeSet<String> {
    let owners = if host.is_type(target) {
        search_order(host, target).unwrap_or_default()
    } else {
        vec![target]
    };

    let mut names = BTreeSet::new();
    for owner in owners {
        if let Ok(members) = host.members(owner) {
            names.extend(members.map(|(name, _)| name.to_string()));
        }
    }
    names
}

fn suggest(host: &Host, target: TargetId, name: &str) -> Option<String> {
    visible_names(host, target)
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(name, &candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate)
}

/// C3-merge the ancestor orders of `bases` into the order a new type
/// deriving from them would use (excluding the new type itself).
pub fn linearize(host: &Host, name: &str, bases: &[TargetId]) -> Result<Vec<TargetId>> {
    let mut sequences = bases
        .iter()
        .map(|base| host.ancestors(*base).map(<[TargetId]>::to_vec))
        .collect::<Result<Vec<_>>>()?;
    sequences.push(bases.to_vec());

    let mut merged = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Ok(merged);
        }

        let head = sequences
            .iter()
            .map(|seq| seq[0])
            .find(|candidate| sequences.iter().all(|seq| !seq[1..].contains(candidate)))
            .ok_or_else(|| PatchError::Linearization(name.to_string()))?;

        merged.push(head);
        for seq in &mut sequences {
            if seq[0] == head {
                seq.remove(0);
            }
        }
    }
}

/// Resolve a dotted path from a root module (or a universal root type).
pub fn resolve_path(host: &Host, path: &str) -> Result<TargetId> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();

    let mut current = match host.root_module(first) {
        Some(id) => id,
        None if first == "object" => host.object_type(),
        None if first == "type" => host.type_type(),
        None => {
            return Err(PatchError::NotFound {
                target: "<root>".to_string(),
                member: first.to_string(),
                suggestion: host
                    .root_modules()
                    .filter_map(|id| host.name(id).ok().map(str::to_string))
                    .map(|candidate| (strsim::jaro_winkler(first, &candidate), candidate))
                    .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
                    .max_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(_, candidate)| candidate),
            })
        }
    };

    for segment in segments {
        current = match resolve(host, current, segment)? {
            Value::Target(id) => id,
            other => {
                return Err(PatchError::WrongKind {
                    target: format!("{}.{} ({})", host.describe(current), segment, other.kind_name()),
                    expected: "target reference",
                })
            }
        };
    }
    Ok(current)
}
