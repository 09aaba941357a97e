use std::sync::Arc;

use anyhow::Result;

use super::{Dict, List, Range, Value};
use crate::vm::RuntimeError;

/// A live iteration over a value.
///
/// While a list or dict iterator exists its container refuses mutation; the
/// guard is released on drop, so early exits and error unwinds are covered.
pub struct ValueIter(State);

enum State {
    List { list: Arc<List>, index: usize },
    Tuple { elems: Arc<[Value]>, index: usize },
    Dict { dict: Arc<Dict>, index: usize },
    Range { range: Range, index: usize, len: usize },
    Host(Box<dyn Iterator<Item = Value> + Send>),
}

impl Value {
    pub fn iterate(&self) -> Result<ValueIter> {
        let state = match self {
            Value::List(l) => {
                l.iter_begin();
                State::List { list: l.clone(), index: 0 }
            }
            Value::Tuple(t) => State::Tuple {
                elems: t.clone(),
                index: 0,
            },
            Value::Dict(d) => {
                d.iter_begin();
                State::Dict { dict: d.clone(), index: 0 }
            }
            Value::Range(r) => State::Range {
                range: *r,
                index: 0,
                len: r.len(),
            },
            Value::Object(o) => match o.as_iterable() {
                Some(it) => State::Host(it.iterate()?),
                None => return Err(RuntimeError::NotIterable(o.type_name()).into()),
            },
            other => return Err(RuntimeError::NotIterable(other.type_name()).into()),
        };
        Ok(ValueIter(state))
    }

    pub fn is_iterable(&self) -> bool {
        match self {
            Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Range(_) => true,
            Value::Object(o) => o.as_iterable().is_some(),
            _ => false,
        }
    }
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.0 {
            State::List { list, index } => {
                let v = list.get(*index)?;
                *index += 1;
                Some(v)
            }
            State::Tuple { elems, index } => {
                let v = elems.get(*index)?.clone();
                *index += 1;
                Some(v)
            }
            State::Dict { dict, index } => {
                let k = dict.key_at(*index)?;
                *index += 1;
                Some(k)
            }
            State::Range { range, index, len } => {
                if *index >= *len {
                    return None;
                }
                let v = range.at(*index);
                *index += 1;
                Some(Value::Int(v))
            }
            State::Host(it) => it.next(),
        }
    }
}

impl Drop for ValueIter {
    fn drop(&mut self) {
        match &self.0 {
            State::List { list, .. } => list.iter_end(),
            State::Dict { dict, .. } => dict.iter_end(),
            _ => {}
        }
    }
}
