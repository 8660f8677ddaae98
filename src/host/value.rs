use std::fmt;

/// Opaque handle to a module, type or instance owned by a [`Host`](super::Host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a native function registered with a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub(crate) usize);

/// Which decorator-style wrapper a [`Callable::ClassOrStatic`] models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    Class,
    Static,
}

/// A callable member, possibly wrapped.
///
/// Every wrapper form carries the callable it wraps, so registration
/// metadata can be keyed on [`Callable::base_function`] regardless of how
/// the definition was reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Callable {
    Plain(FunctionId),
    BoundMethod {
        function: Box<Callable>,
        receiver: TargetId,
    },
    ComputedProperty {
        getter: Box<Callable>,
    },
    ClassOrStatic {
        kind: WrapperKind,
        function: Box<Callable>,
    },
}

impl Callable {
    pub fn bind(self, receiver: TargetId) -> Self {
        Callable::BoundMethod {
            function: Box::new(self),
            receiver,
        }
    }

    pub fn property(getter: Callable) -> Self {
        Callable::ComputedProperty {
            getter: Box::new(getter),
        }
    }

    pub fn class_method(function: Callable) -> Self {
        Callable::ClassOrStatic {
            kind: WrapperKind::Class,
            function: Box::new(function),
        }
    }

    pub fn static_method(function: Callable) -> Self {
        Callable::ClassOrStatic {
            kind: WrapperKind::Static,
            function: Box::new(function),
        }
    }

    /// Unwrap every layer down to the underlying function.
    pub fn base_function(&self) -> FunctionId {
        match self {
            Callable::Plain(id) => *id,
            Callable::BoundMethod { function, .. } => function.base_function(),
            Callable::ComputedProperty { getter } => getter.base_function(),
            Callable::ClassOrStatic { function, .. } => function.base_function(),
        }
    }
}

/// Stable key under which registration metadata is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Function(FunctionId),
    Target(TargetId),
}

/// Dynamic member value stored in a host's member tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Callable(Callable),
    Target(TargetId),
}

impl Value {
    /// Identity of the definition behind this value, if it has one.
    ///
    /// Plain data has no identity and cannot carry registration metadata.
    pub fn identity(&self) -> Option<IdentityKey> {
        match self {
            Value::Callable(callable) => Some(IdentityKey::Function(callable.base_function())),
            Value::Target(id) => Some(IdentityKey::Target(*id)),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<TargetId> {
        match self {
            Value::Target(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Callable(_) => "callable",
            Value::Target(_) => "target",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<TargetId> for Value {
    fn from(v: TargetId) -> Self {
        Value::Target(v)
    }
}

impl From<Callable> for Value {
    fn from(v: Callable) -> Self {
        Value::Callable(v)
    }
}
