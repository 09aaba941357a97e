//! Indexing, slicing and attribute access: the fixed indirection the VM uses
//! for `x[i]`, `x[i] = v`, `x[lo:hi:step]`, `x.f` and `x.f = v`.

use anyhow::{Result, bail};

use super::{Range, Value, methods};
use crate::util::spell;
use crate::vm::{RuntimeError, did_you_mean};

/// Resolves a possibly negative index against `len`.
pub(super) fn checked_index(index: i64, len: usize, type_name: &'static str) -> Result<usize> {
    let i = if index < 0 { index + len as i64 } else { index };
    if i < 0 || i as usize >= len {
        if len == 0 {
            bail!(RuntimeError::IndexOfEmpty { index, type_name });
        }
        bail!(RuntimeError::IndexOutOfRange { index, len });
    }
    Ok(i as usize)
}

fn int_index(x: &Value, key: &Value) -> Result<i64> {
    match key {
        Value::Int(i) => Ok(*i),
        other => bail!("{} index: got {}, want int", x.type_name(), other.type_name()),
    }
}

impl Value {
    /// Number of elements, for values that have one. Strings count chars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(l) => Some(l.len()),
            Value::Tuple(t) => Some(t.len()),
            Value::Dict(d) => Some(d.len()),
            Value::Range(r) => Some(r.len()),
            Value::Object(o) => o.len(),
            _ => None,
        }
    }

    /// `self[key]`.
    pub fn index(&self, key: &Value) -> Result<Value> {
        match self {
            Value::List(l) => {
                let i = checked_index(int_index(self, key)?, l.len(), "list")?;
                l.get(i).ok_or_else(|| RuntimeError::IndexOutOfRange { index: i as i64, len: l.len() }.into())
            }
            Value::Tuple(t) => Ok(t[checked_index(int_index(self, key)?, t.len(), "tuple")?].clone()),
            Value::Str(s) => {
                let len = s.chars().count();
                let i = checked_index(int_index(self, key)?, len, "string")?;
                Ok(s.chars().nth(i).map(|c| Value::from(c.to_string())).unwrap_or_default())
            }
            Value::Bytes(b) => Ok(Value::Int(b[checked_index(int_index(self, key)?, b.len(), "bytes")?] as i64)),
            Value::Range(r) => Ok(Value::Int(r.at(checked_index(int_index(self, key)?, r.len(), "range")?))),
            Value::Dict(d) => d.get(key)?.ok_or_else(|| RuntimeError::KeyNotFound(key.repr()).into()),
            Value::Object(o) => match o.as_indexable() {
                Some(ix) => ix.get_index(key),
                None => Err(RuntimeError::Unsupported {
                    type_name: o.type_name(),
                    capability: "indexing",
                }
                .into()),
            },
            other => Err(RuntimeError::Unsupported {
                type_name: other.type_name(),
                capability: "indexing",
            }
            .into()),
        }
    }

    /// `self[key] = value`.
    pub fn set_index(&self, key: &Value, value: Value) -> Result<()> {
        match self {
            Value::List(l) => {
                let i = checked_index(int_index(self, key)?, l.len(), "list")?;
                l.set(i, value)
            }
            Value::Dict(d) => d.insert(key.clone(), value).map(drop),
            Value::Object(o) => match o.as_set_index() {
                Some(ix) => ix.set_index(key, value),
                None => Err(RuntimeError::Unsupported {
                    type_name: o.type_name(),
                    capability: "item assignment",
                }
                .into()),
            },
            other => Err(RuntimeError::Unsupported {
                type_name: other.type_name(),
                capability: "item assignment",
            }
            .into()),
        }
    }

    /// `self[lo:hi:step]`; absent bounds are `None`.
    pub fn slice(&self, lo: &Value, hi: &Value, step: &Value) -> Result<Value> {
        let len = match self {
            Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Bytes(_) | Value::Range(_) => {
                self.len().unwrap_or(0)
            }
            other => {
                return Err(RuntimeError::Unsupported {
                    type_name: other.type_name(),
                    capability: "slicing",
                }
                .into());
            }
        };
        let (start, end, step) = slice_bounds(len, lo, hi, step)?;
        let indices = || SliceIndices { next: start, end, step };
        Ok(match self {
            Value::List(l) => {
                let elems = l.to_vec();
                Value::new_list(indices().map(|i| elems[i].clone()).collect())
            }
            Value::Tuple(t) => Value::new_tuple(indices().map(|i| t[i].clone()).collect()),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Value::from(indices().map(|i| chars[i]).collect::<String>())
            }
            Value::Bytes(b) => Value::Bytes(indices().map(|i| b[i]).collect::<Vec<u8>>().into()),
            Value::Range(r) => Value::Range(Range {
                start: r.start.saturating_add(start.saturating_mul(r.step)),
                stop: r.start.saturating_add(end.saturating_mul(r.step)),
                step: r.step.saturating_mul(step),
            }),
            _ => unreachable!("checked above"),
        })
    }

    /// Whether the value has a field/method namespace at all.
    pub fn has_attrs(&self) -> bool {
        match self {
            Value::Str(_) | Value::List(_) | Value::Dict(_) => true,
            Value::Object(o) => o.as_attrs().is_some(),
            _ => false,
        }
    }

    /// `Ok(None)` when there is no such attribute.
    pub fn attr(&self, name: &str) -> Result<Option<Value>> {
        match self {
            Value::Object(o) => match o.as_attrs() {
                Some(attrs) => attrs.attr(name),
                None => Ok(None),
            },
            _ => Ok(methods::bind(self, name).map(Value::from)),
        }
    }

    pub fn attr_names(&self) -> Vec<String> {
        match self {
            Value::Object(o) => o.as_attrs().map(|a| a.attr_names()).unwrap_or_default(),
            _ => methods::names(self).iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `self.name`, failing with a spelling hint when absent.
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        if let Some(v) = self.attr(name)? {
            return Ok(v);
        }
        let names = self.attr_names();
        let hint = did_you_mean(spell::nearest(name, names.iter().map(String::as_str)));
        Err(RuntimeError::NoAttr {
            type_name: self.type_name(),
            name: name.to_string(),
            hint,
        }
        .into())
    }

    /// `self.name = value`.
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        match self {
            Value::Object(o) => match o.as_set_field() {
                Some(f) => f.set_field(name, value),
                None => bail!("can't assign to .{name} field of {}", o.type_name()),
            },
            other => bail!("can't assign to .{name} field of {}", other.type_name()),
        }
    }
}

/// Normalizes Python-style slice operands for a sequence of length `len`.
///
/// The result is `(start, end, step)` where iteration runs `start, start+step,
/// ...` while strictly before `end`.
fn slice_bounds(len: usize, lo: &Value, hi: &Value, step: &Value) -> Result<(i64, i64, i64)> {
    let n = len as i64;
    let step = match step {
        Value::None => 1,
        Value::Int(0) => bail!("zero is not a valid slice step"),
        Value::Int(s) => *s,
        other => bail!("invalid slice step: got {}, want int", other.type_name()),
    };
    let bound = |v: &Value, default: i64, min: i64, max: i64| -> Result<i64> {
        match v {
            Value::None => Ok(default),
            Value::Int(i) => {
                let i = if *i < 0 { i.saturating_add(n) } else { *i };
                Ok(i.clamp(min, max))
            }
            other => bail!("invalid slice index: got {}, want int", other.type_name()),
        }
    };
    if step > 0 {
        let start = bound(lo, 0, 0, n)?;
        let end = bound(hi, n, 0, n)?;
        Ok((start, end.max(start), step))
    } else {
        let start = bound(lo, n - 1, -1, n - 1)?;
        let end = bound(hi, -1, -1, n - 1)?;
        Ok((start.max(end), end, step))
    }
}

struct SliceIndices {
    next: i64,
    end: i64,
    step: i64,
}

impl Iterator for SliceIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let more = if self.step > 0 { self.next < self.end } else { self.next > self.end };
        if !more {
            return None;
        }
        let i = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(i as usize)
    }
}
