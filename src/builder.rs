//! Bulk patch generation from a template's members.
//!
//! A template is any target whose members should be copied onto a
//! destination. Members are visited in sorted order and, when recursion is
//! enabled, nested types that already exist on the destination are patched
//! member-by-member instead of being replaced wholesale.

use crate::errors::Result;
use crate::host::{Host, TargetId, Value};
use crate::registry::{FilterOverride, Registry};
use crate::resolve;
use crate::stack::PatchRecord;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Names starting with this marker are private to the template.
pub const RESERVED_PREFIX: &str = "_";

pub type FilterFn = dyn Fn(&Host, &str, &Value) -> bool + Send + Sync;

/// Decides which template members become patches.
#[derive(Clone)]
pub struct MemberFilter(Option<Arc<FilterFn>>);

impl MemberFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Host, &str, &Value) -> bool + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    /// Accept every member.
    pub fn all() -> Self {
        Self(None)
    }

    pub fn accepts(&self, host: &Host, name: &str, value: &Value) -> bool {
        match &self.0 {
            Some(f) => f(host, name, value),
            None => true,
        }
    }
}

impl Default for MemberFilter {
    fn default() -> Self {
        Self::new(default_filter)
    }
}

impl fmt::Debug for MemberFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("MemberFilter(custom)"),
            None => f.write_str("MemberFilter(all)"),
        }
    }
}

/// Skip reserved names and module values.
pub fn default_filter(host: &Host, name: &str, value: &Value) -> bool {
    let is_module = value.as_target().is_some_and(|id| host.is_module(id));
    !(is_module || name.starts_with(RESERVED_PREFIX))
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Include members inherited from the template's ancestors.
    pub traverse_ancestors: bool,
    pub filter: MemberFilter,
    /// Descend into nested types that also exist on the destination.
    pub recursive: bool,
    /// Honor registration overrides and forced filters.
    pub use_registration_metadata: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            traverse_ancestors: true,
            filter: MemberFilter::default(),
            recursive: true,
            use_registration_metadata: true,
        }
    }
}

/// Own members of `target` in name order.
///
/// With `traverse_ancestors`, members of a type's ancestors (universal roots
/// excluded) are merged in and the most-derived definition of a name wins.
pub fn members(host: &Host, target: TargetId, traverse_ancestors: bool) -> Result<Vec<(String, Value)>> {
    let owners = if traverse_ancestors && host.is_type(target) {
        resolve::search_order(host, target)?
    } else {
        vec![target]
    };

    let mut merged = BTreeMap::new();
    for owner in owners.iter().rev() {
        for (name, value) in host.members(*owner)? {
            merged.insert(name.to_string(), value.clone());
        }
    }
    Ok(merged.into_iter().collect())
}

/// Generate one patch per accepted member of `template`, targeting
/// `destination`. Nothing is applied.
pub fn build(
    host: &Host,
    registry: &Registry,
    destination: TargetId,
    template: TargetId,
    options: &BuildOptions,
) -> Result<Vec<PatchRecord>> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([(destination, template)]);
    let mut expanded = HashSet::new();

    while let Some((destination, template)) = queue.pop_front() {
        // a type reachable from itself would otherwise expand forever
        if !expanded.insert((destination, template)) {
            trace!(
                destination = %host.describe(destination),
                template = %host.describe(template),
                "already expanded, skipped"
            );
            continue;
        }

        for (name, value) in members(host, template, options.traverse_ancestors)? {
            let meta = if options.use_registration_metadata {
                registry.get(&value)
            } else {
                None
            };

            let included = match meta.map(|m| m.filter).unwrap_or_default() {
                FilterOverride::Include => true,
                FilterOverride::Exclude => false,
                FilterOverride::Inherit => options.filter.accepts(host, &name, &value),
            };
            if !included {
                trace!(member = %name, "filtered out");
                continue;
            }

            let mut record = PatchRecord::new(destination, name, value);
            if let Some(meta) = meta {
                meta.overrides.apply_to(&mut record);
            }

            if options.recursive {
                if let Some(nested) = nested_pair(host, &record)? {
                    queue.push_back(nested);
                    continue;
                }
            }
            out.push(record);
        }
    }

    debug!(
        destination = %host.describe(destination),
        template = %host.describe(template),
        patches = out.len(),
        "built patch set"
    );
    Ok(out)
}

/// If `record` replaces a type with a type, the pair to descend into.
fn nested_pair(host: &Host, record: &PatchRecord) -> Result<Option<(TargetId, TargetId)>> {
    let Some(candidate) = record.replacement.as_target().filter(|id| host.is_type(*id)) else {
        return Ok(None);
    };
    let existing = resolve::lookup(host, record.destination, &record.name)?
        .and_then(|(_, value)| value.as_target())
        .filter(|id| host.is_type(*id));
    Ok(existing.map(|existing| (existing, candidate)))
}
