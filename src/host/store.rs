use super::value::{Callable, FunctionId, TargetId, Value, WrapperKind};
use crate::errors::{PatchError, Result};
use crate::registry::Registry;
use crate::resolve;
use crate::stack::SlotLedger;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Body of a native function. Receives the host so overrides can read
/// state and call through to the originals they replaced.
pub type NativeFn = Arc<dyn Fn(&mut Host, &[Value]) -> Result<Value> + Send + Sync>;

/// Deferred module body, run the first time the module is imported.
pub type ModuleInit = Arc<dyn Fn(&mut Host, &mut Registry, TargetId) -> Result<()> + Send + Sync>;

const OBJECT_TYPE: &str = "object";
const TYPE_TYPE: &str = "type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    Module { package: bool },
    Type,
    Instance { class: TargetId },
}

#[derive(Debug)]
struct TargetEntry {
    name: String,
    qualname: String,
    kind: TargetKind,
    /// Linearized ancestor order including the type itself (types only).
    ancestors: Vec<TargetId>,
    members: BTreeMap<String, Value>,
    /// Child modules by name (packages only).
    children: BTreeMap<String, TargetId>,
}

struct FunctionDef {
    name: String,
    body: NativeFn,
}

/// In-process object model that patches are applied to.
///
/// Member tables are plain maps; reading or writing them never runs any
/// accessor logic. All engine state (slot ledger, ancestor cache, pending
/// module initializers) lives here, so exclusive access to the host is
/// exclusive access to the engine.
pub struct Host {
    targets: Vec<TargetEntry>,
    functions: Vec<FunctionDef>,
    roots: BTreeMap<String, TargetId>,
    initializers: HashMap<TargetId, ModuleInit>,
    object: TargetId,
    type_: TargetId,
    pub(crate) ledger: SlotLedger,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("targets", &self.targets.len())
            .field("functions", &self.functions.len())
            .field("roots", &self.roots)
            .field("pending_imports", &self.initializers.len())
            .finish()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    pub fn new() -> Self {
        let object = TargetId(0);
        let type_ = TargetId(1);
        let root_type = |name: &str, ancestors: Vec<TargetId>| TargetEntry {
            name: name.to_string(),
            qualname: name.to_string(),
            kind: TargetKind::Type,
            ancestors,
            members: BTreeMap::new(),
            children: BTreeMap::new(),
        };

        Self {
            targets: vec![
                root_type(OBJECT_TYPE, vec![object]),
                root_type(TYPE_TYPE, vec![type_, object]),
            ],
            functions: Vec::new(),
            roots: BTreeMap::new(),
            initializers: HashMap::new(),
            object,
            type_,
            ledger: SlotLedger::default(),
        }
    }

    pub fn object_type(&self) -> TargetId {
        self.object
    }

    pub fn type_type(&self) -> TargetId {
        self.type_
    }

    /// True for the two universal roots every type ultimately derives from.
    pub fn is_root_type(&self, id: TargetId) -> bool {
        id == self.object || id == self.type_
    }

    fn entry(&self, id: TargetId) -> Result<&TargetEntry> {
        self.targets
            .get(id.0 as usize)
            .ok_or(PatchError::UnknownTarget(id))
    }

    fn entry_mut(&mut self, id: TargetId) -> Result<&mut TargetEntry> {
        self.targets
            .get_mut(id.0 as usize)
            .ok_or(PatchError::UnknownTarget(id))
    }

    fn next_id(&self) -> Result<TargetId> {
        u32::try_from(self.targets.len())
            .map(TargetId)
            .map_err(|_| PatchError::Argument("target table is full".to_string()))
    }

    fn qualify(&self, parent: Option<TargetId>, name: &str) -> Result<String> {
        Ok(match parent {
            Some(parent) => format!("{}.{}", self.entry(parent)?.qualname, name),
            None => name.to_string(),
        })
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('.') {
            return Err(PatchError::Argument(format!(
                "'{name}' is not a valid member name"
            )));
        }
        Ok(())
    }

    /// Define a module, optionally as a child of a package.
    ///
    /// A child module is also bound as a member of its parent, the way an
    /// imported submodule becomes an attribute of its package.
    pub fn define_module(
        &mut self,
        name: &str,
        parent: Option<TargetId>,
        package: bool,
    ) -> Result<TargetId> {
        Self::check_name(name)?;
        if let Some(parent) = parent {
            if !self.is_package(parent) {
                return Err(PatchError::WrongKind {
                    target: self.describe(parent),
                    expected: "package",
                });
            }
        }

        let id = self.next_id()?;
        let qualname = self.qualify(parent, name)?;
        self.targets.push(TargetEntry {
            name: name.to_string(),
            qualname,
            kind: TargetKind::Module { package },
            ancestors: Vec::new(),
            members: BTreeMap::new(),
            children: BTreeMap::new(),
        });

        match parent {
            Some(parent) => {
                let entry = self.entry_mut(parent)?;
                entry.children.insert(name.to_string(), id);
                entry.members.insert(name.to_string(), Value::Target(id));
            }
            None => {
                self.roots.insert(name.to_string(), id);
            }
        }
        Ok(id)
    }

    /// Define a module whose body runs on first import.
    pub fn define_lazy_module<F>(
        &mut self,
        name: &str,
        parent: Option<TargetId>,
        package: bool,
        init: F,
    ) -> Result<TargetId>
    where
        F: Fn(&mut Host, &mut Registry, TargetId) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.define_module(name, parent, package)?;
        self.initializers.insert(id, Arc::new(init));
        Ok(id)
    }

    /// Remove and return a pending module initializer; each runs at most once.
    pub(crate) fn take_initializer(&mut self, module: TargetId) -> Option<ModuleInit> {
        self.initializers.remove(&module)
    }

    pub fn is_imported(&self, module: TargetId) -> bool {
        !self.initializers.contains_key(&module)
    }

    /// Define a type. An empty base list derives from `object`.
    ///
    /// The linearized ancestor order is computed once here and cached for
    /// the lifetime of the host.
    pub fn define_type(
        &mut self,
        name: &str,
        module: Option<TargetId>,
        bases: &[TargetId],
    ) -> Result<TargetId> {
        Self::check_name(name)?;
        for base in bases {
            if !self.is_type(*base) {
                return Err(PatchError::WrongKind {
                    target: self.describe(*base),
                    expected: "type",
                });
            }
        }
        if let Some(module) = module {
            if !self.is_module(module) {
                return Err(PatchError::WrongKind {
                    target: self.describe(module),
                    expected: "module",
                });
            }
        }

        let bases = if bases.is_empty() {
            vec![self.object]
        } else {
            bases.to_vec()
        };
        let qualname = self.qualify(module, name)?;
        let merged = resolve::linearize(self, &qualname, &bases)?;

        let id = self.next_id()?;
        let mut ancestors = Vec::with_capacity(merged.len() + 1);
        ancestors.push(id);
        ancestors.extend(merged);

        self.targets.push(TargetEntry {
            name: name.to_string(),
            qualname,
            kind: TargetKind::Type,
            ancestors,
            members: BTreeMap::new(),
            children: BTreeMap::new(),
        });

        if let Some(module) = module {
            self.entry_mut(module)?
                .members
                .insert(name.to_string(), Value::Target(id));
        }
        Ok(id)
    }

    /// Create a bare instance of `class` without running any constructor.
    pub fn new_instance(&mut self, class: TargetId) -> Result<TargetId> {
        if !self.is_type(class) {
            return Err(PatchError::WrongKind {
                target: self.describe(class),
                expected: "type",
            });
        }
        let id = self.next_id()?;
        let class_entry = self.entry(class)?;
        let name = class_entry.name.clone();
        let qualname = format!("{}{}", class_entry.qualname, id);
        self.targets.push(TargetEntry {
            name,
            qualname,
            kind: TargetKind::Instance { class },
            ancestors: Vec::new(),
            members: BTreeMap::new(),
            children: BTreeMap::new(),
        });
        Ok(id)
    }

    /// Create an instance and run the class's `__init__`, if it has one.
    pub fn construct(&mut self, class: TargetId, args: &[Value]) -> Result<TargetId> {
        let instance = self.new_instance(class)?;
        match resolve::resolve(self, class, "__init__") {
            Ok(init) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Target(instance));
                full.extend_from_slice(args);
                self.call(&init, &full)?;
            }
            Err(PatchError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(instance)
    }

    /// Register a native function and return a plain callable for it.
    pub fn define_function<F>(&mut self, name: &str, body: F) -> Callable
    where
        F: Fn(&mut Host, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let id = FunctionId(self.functions.len());
        self.functions.push(FunctionDef {
            name: name.to_string(),
            body: Arc::new(body),
        });
        Callable::Plain(id)
    }

    pub fn function_name(&self, id: FunctionId) -> Result<&str> {
        self.functions
            .get(id.0)
            .map(|f| f.name.as_str())
            .ok_or(PatchError::UnknownFunction(id.0))
    }

    pub fn kind(&self, id: TargetId) -> Result<&TargetKind> {
        Ok(&self.entry(id)?.kind)
    }

    pub fn name(&self, id: TargetId) -> Result<&str> {
        Ok(&self.entry(id)?.name)
    }

    pub fn qualname(&self, id: TargetId) -> Result<&str> {
        Ok(&self.entry(id)?.qualname)
    }

    /// Human-readable name for messages; never fails.
    pub fn describe(&self, id: TargetId) -> String {
        self.entry(id)
            .map(|e| e.qualname.clone())
            .unwrap_or_else(|_| id.to_string())
    }

    pub fn is_type(&self, id: TargetId) -> bool {
        matches!(self.kind(id), Ok(TargetKind::Type))
    }

    pub fn is_module(&self, id: TargetId) -> bool {
        matches!(self.kind(id), Ok(TargetKind::Module { .. }))
    }

    pub fn is_package(&self, id: TargetId) -> bool {
        matches!(self.kind(id), Ok(TargetKind::Module { package: true }))
    }

    /// Linearized ancestor order of a type, most-derived first, itself included.
    pub fn ancestors(&self, id: TargetId) -> Result<&[TargetId]> {
        let entry = self.entry(id)?;
        match entry.kind {
            TargetKind::Type => Ok(&entry.ancestors),
            _ => Err(PatchError::WrongKind {
                target: entry.qualname.clone(),
                expected: "type",
            }),
        }
    }

    /// Raw stored value of a member, ignoring ancestors and accessors.
    pub fn slot(&self, id: TargetId, name: &str) -> Result<Option<&Value>> {
        Ok(self.entry(id)?.members.get(name))
    }

    pub fn set_slot(&mut self, id: TargetId, name: &str, value: Value) -> Result<Option<Value>> {
        Ok(self.entry_mut(id)?.members.insert(name.to_string(), value))
    }

    pub fn remove_slot(&mut self, id: TargetId, name: &str) -> Result<Option<Value>> {
        Ok(self.entry_mut(id)?.members.remove(name))
    }

    /// Own members in name order.
    pub fn members(&self, id: TargetId) -> Result<impl Iterator<Item = (&str, &Value)>> {
        Ok(self
            .entry(id)?
            .members
            .iter()
            .map(|(name, value)| (name.as_str(), value)))
    }

    /// Child modules of a package in name order; empty for anything else.
    pub fn child_modules(&self, id: TargetId) -> Result<Vec<TargetId>> {
        Ok(self.entry(id)?.children.values().copied().collect())
    }

    pub fn root_module(&self, name: &str) -> Option<TargetId> {
        self.roots.get(name).copied()
    }

    pub fn root_modules(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.roots.values().copied()
    }

    pub fn target_ids(&self) -> impl Iterator<Item = TargetId> {
        (0..self.targets.len() as u32).map(TargetId)
    }

    /// Resolve a dotted path such as `printer.fan.Fan`.
    pub fn lookup_path(&self, path: &str) -> Result<TargetId> {
        resolve::resolve_path(self, path)
    }

    /// Normal member access, as opposed to [`resolve::resolve`].
    ///
    /// On an instance, its own slot wins; otherwise the class's ancestors are
    /// searched, computed properties are evaluated and plain functions are
    /// bound to the instance.
    pub fn get_attribute(&mut self, target: TargetId, name: &str) -> Result<Value> {
        let class = match self.kind(target)? {
            TargetKind::Instance { class } => *class,
            _ => return resolve::resolve(self, target, name),
        };

        if let Some(value) = self.slot(target, name)? {
            return Ok(value.clone());
        }

        match resolve::resolve(self, class, name) {
            Ok(Value::Callable(callable)) => match callable {
                Callable::ComputedProperty { getter } => {
                    self.invoke(&getter, vec![Value::Target(target)])
                }
                Callable::ClassOrStatic {
                    kind: WrapperKind::Class,
                    function,
                } => Ok(Value::Callable((*function).bind(class))),
                Callable::ClassOrStatic {
                    kind: WrapperKind::Static,
                    function,
                } => Ok(Value::Callable(*function)),
                Callable::Plain(_) => Ok(Value::Callable(callable.bind(target))),
                bound @ Callable::BoundMethod { .. } => Ok(Value::Callable(bound)),
            },
            Ok(value) => Ok(value),
            Err(PatchError::NotFound { suggestion, .. }) => Err(PatchError::NotFound {
                target: self.describe(target),
                member: name.to_string(),
                suggestion,
            }),
            Err(e) => Err(e),
        }
    }

    /// Call a callable value with positional arguments.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        match callee {
            Value::Callable(callable) => self.invoke(callable, args.to_vec()),
            other => Err(PatchError::NotCallable(other.kind_name().to_string())),
        }
    }

    /// Look up `name` through [`Host::get_attribute`] and call it.
    pub fn call_method(&mut self, receiver: TargetId, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.get_attribute(receiver, name)?;
        match method {
            Value::Callable(_) => self.call(&method, args),
            _ => Err(PatchError::NotCallable(format!(
                "{}.{}",
                self.describe(receiver),
                name
            ))),
        }
    }

    fn invoke(&mut self, callable: &Callable, args: Vec<Value>) -> Result<Value> {
        match callable {
            Callable::Plain(id) => {
                let body = self
                    .functions
                    .get(id.0)
                    .map(|f| Arc::clone(&f.body))
                    .ok_or(PatchError::UnknownFunction(id.0))?;
                body(self, &args)
            }
            Callable::BoundMethod { function, receiver } => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Target(*receiver));
                full.extend(args);
                self.invoke(function, full)
            }
            Callable::ComputedProperty { getter } => self.invoke(getter, args),
            Callable::ClassOrStatic { function, .. } => self.invoke(function, args),
        }
    }
}

/// Fetch positional argument `index`, or fail with a readable error.
pub fn arg<'a>(args: &'a [Value], index: usize, what: &str) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| PatchError::Argument(format!("missing argument {index} ({what})")))
}

/// Fetch positional argument `index` as a target reference (`self`, usually).
pub fn target_arg(args: &[Value], index: usize) -> Result<TargetId> {
    arg(args, index, "target")?
        .as_target()
        .ok_or_else(|| PatchError::Argument(format!("argument {index} is not a target")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_has_root_types() {
        let host = Host::new();
        assert!(host.is_type(host.object_type()));
        assert!(host.is_root_type(host.type_type()));
        assert_eq!(host.name(host.object_type()).unwrap(), "object");
    }

    #[test]
    fn test_child_module_is_bound_on_parent() {
        let mut host = Host::new();
        let pkg = host.define_module("printer", None, true).unwrap();
        let child = host.define_module("fan", Some(pkg), false).unwrap();
        assert_eq!(host.qualname(child).unwrap(), "printer.fan");
        assert_eq!(host.slot(pkg, "fan").unwrap(), Some(&Value::Target(child)));
        assert_eq!(host.child_modules(pkg).unwrap(), vec![child]);
        assert_eq!(host.lookup_path("printer.fan").unwrap(), child);
    }

    #[test]
    fn test_child_of_plain_module_is_rejected() {
        let mut host = Host::new();
        let module = host.define_module("toolhead", None, false).unwrap();
        let err = host.define_module("sub", Some(module), false).unwrap_err();
        assert!(matches!(err, PatchError::WrongKind { expected: "package", .. }));
    }

    #[test]
    fn test_get_attribute_binds_and_evaluates() {
        let mut host = Host::new();
        let fan = host.define_type("Fan", None, &[]).unwrap();
        let speed = host.define_function("speed", |host, args| {
            let this = target_arg(args, 0)?;
            Ok(host.slot(this, "_speed")?.cloned().unwrap_or(Value::Int(0)))
        });
        host.set_slot(fan, "speed", Value::Callable(Callable::property(speed)))
            .unwrap();

        let instance = host.new_instance(fan).unwrap();
        host.set_slot(instance, "_speed", Value::Int(40)).unwrap();
        assert_eq!(host.get_attribute(instance, "speed").unwrap(), Value::Int(40));

        // the raw read hands back the property object itself
        assert!(matches!(
            resolve::resolve(&host, fan, "speed").unwrap(),
            Value::Callable(Callable::ComputedProperty { .. })
        ));
    }

    #[test]
    fn test_construct_runs_init() {
        let mut host = Host::new();
        let toolhead = host.define_type("ToolHead", None, &[]).unwrap();
        let init = host.define_function("__init__", |host, args| {
            let this = target_arg(args, 0)?;
            let velocity = arg(args, 1, "max_velocity")?.clone();
            host.set_slot(this, "max_velocity", velocity)?;
            Ok(Value::None)
        });
        host.set_slot(toolhead, "__init__", init.into()).unwrap();

        let instance = host.construct(toolhead, &[Value::Float(300.0)]).unwrap();
        assert_eq!(
            host.slot(instance, "max_velocity").unwrap(),
            Some(&Value::Float(300.0))
        );
    }

    #[test]
    fn test_call_rejects_plain_data() {
        let mut host = Host::new();
        let err = host.call(&Value::Int(3), &[]).unwrap_err();
        assert_eq!(err, PatchError::NotCallable("int".to_string()));
    }
}
