//! Host objects: values defined by the embedding application.
//!
//! A host type implements [`HostObject`] and opts into optional capabilities
//! by returning `Some(self)` from the matching accessor. The VM never probes
//! concrete types; a missing capability surfaces as
//! [`RuntimeError::Unsupported`](crate::vm::RuntimeError::Unsupported).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::{CompareOp, Value};
use crate::vm::{RuntimeError, Thread};

pub trait HostObject: fmt::Debug + Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn repr(&self) -> String {
        format!("<{}>", self.type_name())
    }

    fn truth(&self) -> bool {
        true
    }

    /// Makes the object immutable. Must be idempotent.
    fn freeze(&self) {}

    fn hash(&self) -> Result<u64> {
        Err(RuntimeError::Unhashable(self.type_name()).into())
    }

    fn as_any(&self) -> &dyn Any;

    fn len(&self) -> Option<usize> {
        None
    }

    fn as_attrs(&self) -> Option<&dyn HasAttrs> {
        None
    }

    fn as_set_field(&self) -> Option<&dyn HasSetField> {
        None
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        None
    }

    fn as_set_index(&self) -> Option<&dyn HasSetIndex> {
        None
    }

    fn as_iterable(&self) -> Option<&dyn Iterable> {
        None
    }

    fn as_callable(&self) -> Option<&dyn Callable> {
        None
    }

    fn as_comparable(&self) -> Option<&dyn Comparable> {
        None
    }
}

pub trait HasAttrs {
    /// `Ok(None)` means no such attribute.
    fn attr(&self, name: &str) -> Result<Option<Value>>;
    fn attr_names(&self) -> Vec<String>;
}

pub trait HasSetField {
    fn set_field(&self, name: &str, value: Value) -> Result<()>;
}

pub trait Indexable {
    fn get_index(&self, key: &Value) -> Result<Value>;
}

pub trait HasSetIndex {
    fn set_index(&self, key: &Value, value: Value) -> Result<()>;
}

pub trait Iterable {
    fn iterate(&self) -> Result<Box<dyn Iterator<Item = Value> + Send>>;
}

pub trait Callable {
    fn name(&self) -> &str;
    fn call(&self, thread: &mut Thread, args: &[Value], kwargs: &[(Arc<str>, Value)]) -> Result<Value>;
}

/// Ordering between two objects of the same host type. `other` always has
/// the same `type_name` as `self`.
pub trait Comparable {
    fn compare_same_type(&self, op: CompareOp, other: &dyn HostObject, depth: usize) -> Result<bool>;
}
