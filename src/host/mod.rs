//! The object model patches are applied to.

pub mod store;
pub mod value;

pub use store::{arg, target_arg, Host, ModuleInit, NativeFn, TargetKind};
pub use value::{Callable, FunctionId, IdentityKey, TargetId, Value, WrapperKind};
