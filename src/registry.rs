//! Declarative patch registration.
//!
//! Modifiers and declarations attach to a candidate's unwrapped identity, so
//! a bound method, a property and the plain function behind them all share a
//! single [`RegistrationMetadata`] record. Records are created on first use
//! and never cleared.

use crate::builder::{self, BuildOptions};
use crate::errors::{PatchError, Result};
use crate::host::{Host, IdentityKey, TargetId, Value};
use crate::stack::PatchRecord;
use std::collections::HashMap;
use tracing::trace;

/// Forced inclusion decision for bulk patch generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOverride {
    Include,
    Exclude,
    /// Defer to the builder's filter function.
    #[default]
    Inherit,
}

/// Field overrides applied to generated patch records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub destination: Option<TargetId>,
    pub name: Option<String>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none() && self.name.is_none()
    }

    /// Redirect `record` according to the stored overrides.
    pub fn apply_to(&self, record: &mut PatchRecord) {
        if let Some(destination) = self.destination {
            record.destination = destination;
        }
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationMetadata {
    /// Fully formed patches declared against this identity.
    pub patches: Vec<PatchRecord>,
    pub overrides: Overrides,
    pub filter: FilterOverride,
}

/// Process-lifetime map from definition identity to its metadata.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<IdentityKey, RegistrationMetadata>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metadata recorded for the identity behind `candidate`, if any.
    pub fn get(&self, candidate: &Value) -> Option<&RegistrationMetadata> {
        candidate.identity().and_then(|key| self.get_by_key(key))
    }

    pub fn get_by_key(&self, key: IdentityKey) -> Option<&RegistrationMetadata> {
        self.records.get(&key)
    }

    fn entry(&mut self, candidate: &Value) -> Result<&mut RegistrationMetadata> {
        let key = candidate
            .identity()
            .ok_or(PatchError::NoIdentity(candidate.kind_name()))?;
        Ok(self.records.entry(key).or_insert_with(|| {
            trace!(?key, "creating registration metadata");
            RegistrationMetadata::default()
        }))
    }

    /// Start a chain of modifiers against `candidate`.
    ///
    /// ```
    /// use kapuchin::{FilterOverride, Host, Registry, Value};
    ///
    /// let mut host = Host::new();
    /// let mut registry = Registry::new();
    /// let apply_speed = host.define_function("apply_speed", |_, _| Ok(Value::None));
    ///
    /// registry
    ///     .annotate(&apply_speed.clone().into())?
    ///     .rename("_apply_speed")
    ///     .force_filter(FilterOverride::Include);
    ///
    /// let meta = registry.get(&apply_speed.into()).unwrap();
    /// assert_eq!(meta.overrides.name.as_deref(), Some("_apply_speed"));
    /// # Ok::<(), kapuchin::PatchError>(())
    /// ```
    pub fn annotate(&mut self, candidate: &Value) -> Result<Annotation<'_>> {
        Ok(Annotation {
            meta: self.entry(candidate)?,
        })
    }

    /// Rename the member a generated patch for `candidate` targets.
    pub fn rename(&mut self, candidate: &Value, name: impl Into<String>) -> Result<()> {
        self.annotate(candidate)?.rename(name);
        Ok(())
    }

    /// Redirect a generated patch for `candidate` to another destination.
    pub fn retarget(&mut self, candidate: &Value, destination: TargetId) -> Result<()> {
        self.annotate(candidate)?.retarget(destination);
        Ok(())
    }

    /// Force `candidate` in or out of bulk patch generation.
    pub fn force_filter(&mut self, candidate: &Value, filter: FilterOverride) -> Result<()> {
        self.annotate(candidate)?.force_filter(filter);
        Ok(())
    }

    /// Append already-resolved patches for discovery to pick up later.
    pub fn declare<I>(&mut self, candidate: &Value, records: I) -> Result<()>
    where
        I: IntoIterator<Item = PatchRecord>,
    {
        self.entry(candidate)?.patches.extend(records);
        Ok(())
    }

    /// Declare a single patch of `destination` with `candidate`.
    ///
    /// The member name defaults to the candidate's own base name.
    pub fn declare_patch(
        &mut self,
        host: &Host,
        destination: TargetId,
        name: Option<&str>,
        candidate: &Value,
    ) -> Result<PatchRecord> {
        let name = match name {
            Some(name) => name.to_string(),
            None => base_name(host, candidate)?,
        };
        let record = PatchRecord::new(destination, name, candidate.clone());
        self.declare(candidate, [record.clone()])?;
        Ok(record)
    }

    /// Declare one patch per member of `template`, generated with `options`,
    /// and record them against the template itself.
    pub fn declare_patches(
        &mut self,
        host: &Host,
        destination: TargetId,
        template: TargetId,
        options: &BuildOptions,
    ) -> Result<Vec<PatchRecord>> {
        let records = builder::build(host, self, destination, template, options)?;
        self.declare(&Value::Target(template), records.iter().cloned())?;
        Ok(records)
    }
}

/// Name a candidate is known by: its function name, or its target name.
pub fn base_name(host: &Host, candidate: &Value) -> Result<String> {
    match candidate {
        Value::Callable(callable) => Ok(host.function_name(callable.base_function())?.to_string()),
        Value::Target(id) => Ok(host.name(*id)?.to_string()),
        _ => Err(PatchError::Unnamed),
    }
}

/// Chainable modifier handle returned by [`Registry::annotate`].
pub struct Annotation<'r> {
    meta: &'r mut RegistrationMetadata,
}

impl Annotation<'_> {
    pub fn rename(self, name: impl Into<String>) -> Self {
        self.meta.overrides.name = Some(name.into());
        self
    }

    pub fn retarget(self, destination: TargetId) -> Self {
        self.meta.overrides.destination = Some(destination);
        self
    }

    pub fn force_filter(self, filter: FilterOverride) -> Self {
        self.meta.filter = filter;
        self
    }

    pub fn include(self) -> Self {
        self.force_filter(FilterOverride::Include)
    }

    pub fn exclude(self) -> Self {
        self.force_filter(FilterOverride::Exclude)
    }

    pub fn declare(self, record: PatchRecord) -> Self {
        self.meta.patches.push(record);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Callable;

    #[test]
    fn test_wrapper_forms_share_one_record() {
        let mut host = Host::new();
        let fan = host.define_type("Fan", None, &[]).unwrap();
        let mut registry = Registry::new();
        let getter = host.define_function("speed", |_, _| Ok(Value::Int(1)));

        let property = Value::Callable(Callable::property(getter.clone()));
        let bound = Value::Callable(getter.clone().bind(fan));
        registry.rename(&property, "current_speed").unwrap();
        registry.force_filter(&bound, FilterOverride::Exclude).unwrap();

        assert_eq!(registry.len(), 1);
        let meta = registry.get(&Value::Callable(getter)).unwrap();
        assert_eq!(meta.overrides.name.as_deref(), Some("current_speed"));
        assert_eq!(meta.filter, FilterOverride::Exclude);
    }

    #[test]
    fn test_plain_data_cannot_be_annotated() {
        let mut registry = Registry::new();
        let err = registry.rename(&Value::Int(4), "x").unwrap_err();
        assert_eq!(err, PatchError::NoIdentity("int"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_declare_patch_defaults_to_base_name() {
        let mut host = Host::new();
        let toolhead = host.define_type("ToolHead", None, &[]).unwrap();
        let mut registry = Registry::new();
        let cmd = host.define_function("cmd_RESET_VELOCITY_LIMIT", |_, _| Ok(Value::None));
        let candidate = Value::Callable(Callable::static_method(cmd));

        let record = registry
            .declare_patch(&host, toolhead, None, &candidate)
            .unwrap();
        assert_eq!(record.name, "cmd_RESET_VELOCITY_LIMIT");
        assert_eq!(registry.get(&candidate).unwrap().patches, vec![record]);

        let renamed = registry
            .declare_patch(&host, toolhead, Some("reset_velocity"), &candidate)
            .unwrap();
        assert_eq!(renamed.name, "reset_velocity");
        assert_eq!(registry.get(&candidate).unwrap().patches.len(), 2);
    }

    #[test]
    fn test_types_are_keyed_by_their_own_identity() {
        let mut host = Host::new();
        let base = host.define_type("Base", None, &[]).unwrap();
        let derived = host.define_type("Derived", None, &[base]).unwrap();
        let mut registry = Registry::new();
        registry
            .force_filter(&Value::Target(base), FilterOverride::Exclude)
            .unwrap();
        assert!(registry.get(&Value::Target(derived)).is_none());
    }

    #[test]
    fn test_overrides_redirect_record() {
        let mut host = Host::new();
        let a = host.define_type("A", None, &[]).unwrap();
        let b = host.define_type("B", None, &[]).unwrap();
        let overrides = Overrides {
            destination: Some(b),
            name: Some("renamed".to_string()),
        };
        let mut record = PatchRecord::new(a, "original", 1i64);
        overrides.apply_to(&mut record);
        assert_eq!(record.destination, b);
        assert_eq!(record.name, "renamed");
        assert!(!overrides.is_empty());
        assert!(Overrides::default().is_empty());
    }
}
