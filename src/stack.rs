//! Reversible member replacement with stacked originals.
//!
//! Every apply pushes one layer onto the slot's history and every revert pops
//! exactly one, so any sequence of N applies followed by N reverts returns the
//! slot to where it started. Layering over a slot another extension already
//! patched is not a conflict: the previous value is stored and stays reachable
//! through [`get_original`].

use crate::errors::{PatchError, Result, RevertReason};
use crate::host::{Host, TargetId, Value};
use crate::resolve;
use std::collections::HashMap;
use tracing::{debug, trace};

pub const DEFAULT_TAG: &str = "default";

/// Intent to replace `destination.name` with `replacement`.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "PatchRecord does nothing until apply() is called"]
pub struct PatchRecord {
    pub destination: TargetId,
    pub name: String,
    pub replacement: Value,
    pub tag: String,
}

impl PatchRecord {
    pub fn new(destination: TargetId, name: impl Into<String>, replacement: impl Into<Value>) -> Self {
        Self {
            destination,
            name: name.into(),
            replacement: replacement.into(),
            tag: DEFAULT_TAG.to_string(),
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// How an apply changed its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The member did not exist and was created.
    Created,
    /// An existing value was stored; `depth` originals are now stacked.
    Layered { depth: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Layer {
    /// The apply created the member; reverting it deletes the member.
    Created,
    /// The apply replaced `prior`, stored under `tag`.
    Replaced { prior: Value, tag: String },
}

type SlotKey = (TargetId, String);

/// Per-slot apply history, kept on the host next to the member tables.
#[derive(Debug, Default)]
pub struct SlotLedger {
    slots: HashMap<SlotKey, Vec<Layer>>,
}

impl SlotLedger {
    fn history(&self, target: TargetId, name: &str) -> Option<&Vec<Layer>> {
        self.slots.get(&(target, name.to_string()))
    }

    fn originals<'a>(&'a self, target: TargetId, name: &str) -> impl Iterator<Item = (&'a Value, &'a str)> {
        self.history(target, name)
            .into_iter()
            .flatten()
            .filter_map(|layer| match layer {
                Layer::Replaced { prior, tag } => Some((prior, tag.as_str())),
                Layer::Created => None,
            })
    }
}

/// Apply `record` under its own tag.
pub fn apply(host: &mut Host, record: &PatchRecord) -> Result<ApplyOutcome> {
    apply_as(host, record, &record.tag)
}

/// Apply `record`, storing any replaced value under `tag`.
///
/// The replacement is always written, even when the slot already holds
/// stacked originals from earlier applies.
pub fn apply_as(host: &mut Host, record: &PatchRecord, tag: &str) -> Result<ApplyOutcome> {
    let destination = record.destination;
    let name = record.name.as_str();

    let current = match resolve::resolve(host, destination, name) {
        Ok(value) => Some(value),
        Err(PatchError::NotFound { .. }) => None,
        Err(e) => return Err(e),
    };

    let key = (destination, name.to_string());
    let outcome = match current {
        None => {
            host.ledger.slots.entry(key).or_default().push(Layer::Created);
            ApplyOutcome::Created
        }
        Some(prior) => {
            let history = host.ledger.slots.entry(key).or_default();
            history.push(Layer::Replaced {
                prior,
                tag: tag.to_string(),
            });
            ApplyOutcome::Layered {
                depth: history
                    .iter()
                    .filter(|layer| matches!(layer, Layer::Replaced { .. }))
                    .count(),
            }
        }
    };

    host.set_slot(destination, name, record.replacement.clone())?;
    debug!(
        destination = %host.describe(destination),
        member = name,
        tag,
        ?outcome,
        "applied patch"
    );
    Ok(outcome)
}

/// Undo the most recent apply on the record's slot.
pub fn revert(host: &mut Host, record: &PatchRecord) -> Result<()> {
    let destination = record.destination;
    let name = record.name.as_str();
    let key = (destination, name.to_string());

    let layer = host
        .ledger
        .slots
        .get_mut(&key)
        .and_then(Vec::pop)
        .ok_or_else(|| PatchError::Revert {
            target: host.describe(destination),
            member: name.to_string(),
            reason: RevertReason::EmptyStack,
        })?;

    if host.ledger.slots.get(&key).is_some_and(Vec::is_empty) {
        host.ledger.slots.remove(&key);
    }

    match layer {
        Layer::Created => {
            host.remove_slot(destination, name)?;
            debug!(destination = %host.describe(destination), member = name, "reverted created member");
        }
        Layer::Replaced { prior, tag } => {
            host.set_slot(destination, name, prior)?;
            debug!(destination = %host.describe(destination), member = name, %tag, "restored original");
        }
    }
    Ok(())
}

/// Fetch the most recent original of `target.name` stored under `tag`.
///
/// Searching from the newest layer down lets an override reach a value
/// several layers below the current one.
pub fn get_original(host: &Host, target: TargetId, name: &str, tag: &str) -> Result<Value> {
    let revert_error = |reason| PatchError::Revert {
        target: host.describe(target),
        member: name.to_string(),
        reason,
    };

    let originals: Vec<(&Value, &str)> = host.ledger.originals(target, name).collect();
    if originals.is_empty() {
        return Err(revert_error(RevertReason::NoOriginal));
    }

    trace!(
        destination = %host.describe(target),
        member = name,
        tag,
        layers = originals.len(),
        "looking up original"
    );
    originals
        .into_iter()
        .rev()
        .find(|(_, stored_tag)| *stored_tag == tag)
        .map(|(value, _)| value.clone())
        .ok_or_else(|| revert_error(RevertReason::TagNotFound(tag.to_string())))
}

/// Call the default-tagged original of `class.name` on `receiver`.
pub fn call_original(
    host: &mut Host,
    class: TargetId,
    name: &str,
    receiver: TargetId,
    args: &[Value],
) -> Result<Value> {
    let original = get_original(host, class, name, DEFAULT_TAG)?;
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(Value::Target(receiver));
    full.extend_from_slice(args);
    host.call(&original, &full)
}

/// Number of originals currently stacked on a slot.
pub fn original_depth(host: &Host, target: TargetId, name: &str) -> usize {
    host.ledger.originals(target, name).count()
}

/// True while an apply that created the member is still in effect.
pub fn was_created(host: &Host, target: TargetId, name: &str) -> bool {
    host.ledger
        .history(target, name)
        .is_some_and(|history| history.contains(&Layer::Created))
}
