use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use indexmap::IndexMap;

use super::Value;
use crate::vm::RuntimeError;

// A panic while a lock is held cannot leave a Vec or IndexMap in a state
// that is unsafe to read, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Shared guard state of a mutable container.
#[derive(Debug, Default)]
struct Guard {
    frozen: AtomicBool,
    itercount: AtomicUsize,
}

impl Guard {
    fn check_mutable(&self, verb: &'static str, type_name: &'static str) -> Result<()> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(RuntimeError::Frozen { verb, type_name }.into());
        }
        if self.itercount.load(Ordering::Acquire) > 0 {
            return Err(RuntimeError::Iterating { verb, type_name }.into());
        }
        Ok(())
    }

    /// Returns true the first time only.
    fn freeze(&self) -> bool {
        !self.frozen.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
pub struct List {
    elems: RwLock<Vec<Value>>,
    guard: Guard,
}

impl List {
    pub fn new(elems: Vec<Value>) -> Self {
        Self {
            elems: RwLock::new(elems),
            guard: Guard::default(),
        }
    }

    pub fn len(&self) -> usize {
        read(&self.elems).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        read(&self.elems).get(i).cloned()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        read(&self.elems).clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.guard.frozen.load(Ordering::Acquire)
    }

    pub fn check_mutable(&self, verb: &'static str) -> Result<()> {
        self.guard.check_mutable(verb, "list")
    }

    pub fn append(&self, v: Value) -> Result<()> {
        self.mutate("append to", |elems| elems.push(v))
    }

    pub fn extend(&self, vs: Vec<Value>) -> Result<()> {
        self.mutate("extend", |elems| elems.extend(vs))
    }

    pub fn set(&self, i: usize, v: Value) -> Result<()> {
        self.mutate("assign to element of", |elems| elems[i] = v)
    }

    /// Runs `f` on the elements after the frozen and iteration checks.
    pub fn mutate<R>(&self, verb: &'static str, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        self.check_mutable(verb)?;
        Ok(f(&mut write(&self.elems)))
    }

    pub fn freeze(&self) {
        if self.guard.freeze() {
            self.to_vec().iter().for_each(Value::freeze);
        }
    }

    pub(super) fn iter_begin(&self) {
        self.guard.itercount.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn iter_end(&self) {
        self.guard.itercount.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Insertion-ordered hash table keyed by hashable values.
#[derive(Debug, Default)]
pub struct Dict {
    entries: RwLock<IndexMap<HashKey, Value>>,
    guard: Guard,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.guard.frozen.load(Ordering::Acquire)
    }

    pub fn check_mutable(&self, verb: &'static str) -> Result<()> {
        self.guard.check_mutable(verb, "dict")
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        let key = key.hash_key()?;
        Ok(read(&self.entries).get(&key).cloned())
    }

    pub fn contains_key(&self, key: &Value) -> Result<bool> {
        let key = key.hash_key()?;
        Ok(read(&self.entries).contains_key(&key))
    }

    /// Inserts or replaces; an existing key keeps its position.
    pub fn insert(&self, key: Value, value: Value) -> Result<Option<Value>> {
        let key = key.hash_key()?;
        self.check_mutable("insert into")?;
        Ok(write(&self.entries).insert(key, value))
    }

    pub fn remove(&self, key: &Value) -> Result<Option<Value>> {
        let key = key.hash_key()?;
        self.check_mutable("delete from")?;
        Ok(write(&self.entries).shift_remove(&key))
    }

    pub fn clear(&self) -> Result<()> {
        self.check_mutable("clear")?;
        write(&self.entries).clear();
        Ok(())
    }

    pub fn keys(&self) -> Vec<Value> {
        read(&self.entries).keys().map(|k| k.value.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        read(&self.entries).values().cloned().collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        read(&self.entries)
            .iter()
            .map(|(k, v)| (k.value.clone(), v.clone()))
            .collect()
    }

    pub(super) fn key_at(&self, i: usize) -> Option<Value> {
        read(&self.entries).get_index(i).map(|(k, _)| k.value.clone())
    }

    /// A new, unfrozen dict with the same entries.
    pub fn copy(&self) -> Dict {
        Dict {
            entries: RwLock::new(read(&self.entries).clone()),
            guard: Guard::default(),
        }
    }

    pub fn freeze(&self) {
        if self.guard.freeze() {
            for (k, v) in self.items() {
                k.freeze();
                v.freeze();
            }
        }
    }

    pub(super) fn iter_begin(&self) {
        self.guard.itercount.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn iter_end(&self) {
        self.guard.itercount.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FromIterator<(HashKey, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (HashKey, Value)>>(iter: T) -> Self {
        Dict {
            entries: RwLock::new(iter.into_iter().collect()),
            guard: Guard::default(),
        }
    }
}

/// A dict key: the value itself plus its normalized identity.
///
/// Numerically equal ints and floats share a key (`1 == 1.0`), so hashing and
/// equality both go through [`KeyNorm`].
#[derive(Debug, Clone)]
pub struct HashKey {
    norm: KeyNorm,
    value: Value,
}

impl HashKey {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for HashKey {}

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyNorm {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Tuple(Vec<KeyNorm>),
    Identity(usize),
    Host { hash: u64, id: usize },
}

fn float_norm(f: f64) -> KeyNorm {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return KeyNorm::Int(f as i64);
    }
    if f.is_nan() {
        return KeyNorm::Float(f64::NAN.to_bits());
    }
    KeyNorm::Float(f.to_bits())
}

impl Value {
    pub fn hash_key(&self) -> Result<HashKey> {
        Ok(HashKey {
            norm: self.key_norm()?,
            value: self.clone(),
        })
    }

    fn key_norm(&self) -> Result<KeyNorm> {
        Ok(match self {
            Value::None => KeyNorm::None,
            Value::Bool(b) => KeyNorm::Bool(*b),
            Value::Int(i) => KeyNorm::Int(*i),
            Value::Float(f) => float_norm(*f),
            Value::Str(s) => KeyNorm::Str(s.clone()),
            Value::Bytes(b) => KeyNorm::Bytes(b.clone()),
            Value::Tuple(t) => KeyNorm::Tuple(t.iter().map(Value::key_norm).collect::<Result<_>>()?),
            Value::Function(f) => KeyNorm::Identity(Arc::as_ptr(f) as usize),
            Value::Builtin(b) => KeyNorm::Identity(Arc::as_ptr(b) as usize),
            Value::Object(o) => KeyNorm::Host {
                hash: o.hash()?,
                id: Arc::as_ptr(o) as *const () as usize,
            },
            other => return Err(RuntimeError::Unhashable(other.type_name()).into()),
        })
    }
}

/// Heap cell holding a captured local, shared by the declaring frame and
/// every closure that captures it.
#[derive(Debug, Default)]
pub struct CellBox {
    value: RwLock<Option<Value>>,
    frozen: AtomicBool,
}

impl CellBox {
    pub fn new(value: Option<Value>) -> Self {
        Self {
            value: RwLock::new(value),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Option<Value> {
        read(&self.value).clone()
    }

    pub fn set(&self, value: Value) {
        *write(&self.value) = Some(value);
    }

    /// Freezes the current contents. The flag also stops recursion through
    /// a closure that captures itself.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel)
            && let Some(v) = self.get()
        {
            v.freeze();
        }
    }
}
