//! Entry point for invoking any callable value, and parameter binding for
//! bytecode functions.

use std::sync::Arc;

use anyhow::Result;

use super::error::{EvalError, RuntimeError, did_you_mean};
use super::function::Function;
use super::thread::{Frame, Thread};
use crate::util::spell;
use crate::val::{Dict, Value};

/// Calls `callable` with the given arguments on `thread`.
///
/// A frame for the callee is live for the duration of the call. The first
/// error that reaches a call boundary is wrapped into an [`EvalError`]
/// carrying the call stack at that point; an error that already is one
/// passes through, so the backtrace always names the innermost failure.
pub fn call(thread: &mut Thread, callable: &Value, args: Vec<Value>, kwargs: Vec<(Arc<str>, Value)>) -> Result<Value> {
    match callable {
        Value::Function(_) | Value::Builtin(_) => {}
        Value::Object(o) if o.as_callable().is_some() => {}
        other => return Err(RuntimeError::NotCallable(other.type_name()).into()),
    }

    thread.stack.push(Frame {
        callable: callable.clone(),
        pc: 0,
    });
    let result = dispatch(thread, callable, args, kwargs).map_err(|err| {
        if err.downcast_ref::<EvalError>().is_some() {
            err
        } else {
            EvalError::new(err, thread.call_stack()).into()
        }
    });
    thread.stack.pop();
    result
}

fn dispatch(thread: &mut Thread, callable: &Value, args: Vec<Value>, kwargs: Vec<(Arc<str>, Value)>) -> Result<Value> {
    match callable {
        Value::Function(f) => {
            if !f.module().program().options.allow_recursion {
                check_recursion(thread, f)?;
            }
            f.call_internal(thread, args, kwargs)
        }
        Value::Builtin(b) => b.call(thread, &args, &kwargs),
        Value::Object(o) => match o.as_callable() {
            Some(c) => c.call(thread, &args, &kwargs),
            None => Err(RuntimeError::NotCallable(o.type_name()).into()),
        },
        other => Err(RuntimeError::NotCallable(other.type_name()).into()),
    }
}

/// Rejects a call to `f` when a frame of the same compiled function is
/// already live. The callee's own frame (the last one) is not considered.
fn check_recursion(thread: &Thread, f: &Function) -> Result<()> {
    let callers = &thread.stack[..thread.stack.len().saturating_sub(1)];
    let recursive = callers.iter().any(|frame| match &frame.callable {
        Value::Function(g) => Arc::ptr_eq(g.funcode(), f.funcode()),
        _ => false,
    });
    if recursive {
        return Err(RuntimeError::Recursion(f.name().to_string()).into());
    }
    Ok(())
}

impl Function {
    /// Binds arguments to parameter slots in `locals`.
    ///
    /// For `def f(p1, p2=d2, *args, k1, k2=d2k, **kwargs)` the defaults are
    /// `(d2, MANDATORY, d2k)`: positional arguments fill a prefix of the
    /// non-keyword-only parameters, any surplus goes to `*args`, keyword
    /// arguments fill any ordinary parameter by name or go to `**kwargs`,
    /// and defaults fill what is left. Unfilled parameters without a
    /// default are reported together.
    pub(crate) fn set_args(
        &self,
        locals: &mut [Option<Value>],
        args: Vec<Value>,
        kwargs: Vec<(Arc<str>, Value)>,
    ) -> Result<()> {
        let fc = self.funcode();
        if fc.num_params == 0 {
            let given = args.len() + kwargs.len();
            if given > 0 {
                return Err(RuntimeError::NoArguments {
                    name: self.name().to_string(),
                    given,
                }
                .into());
            }
            return Ok(());
        }

        // Ordinary parameters, without *args and **kwargs.
        let mut nparams = fc.num_params;
        let kwdict = if fc.has_kwargs {
            nparams -= 1;
            let dict = Arc::new(Dict::new());
            locals[nparams] = Some(Value::Dict(dict.clone()));
            Some(dict)
        } else {
            None
        };
        if fc.has_varargs {
            nparams -= 1;
        }
        let nonkwonly = nparams - fc.num_kwonly;
        let defaults = self.defaults();

        let given = args.len();
        if given > nonkwonly && !fc.has_varargs {
            return Err(RuntimeError::TooManyPositional {
                name: self.name().to_string(),
                want: nonkwonly,
                given,
                at_most: defaults.len() > fc.num_kwonly,
            }
            .into());
        }
        let n = given.min(nonkwonly);

        let mut args = args.into_iter();
        for (slot, arg) in locals.iter_mut().zip(args.by_ref().take(n)) {
            *slot = Some(arg);
        }
        if fc.has_varargs {
            locals[nparams] = Some(Value::new_tuple(args.collect()));
        }

        let params = &fc.locals[..nparams];
        for (k, v) in kwargs {
            if let Some(i) = params.iter().position(|p| *p.name == *k) {
                if locals[i].is_some() {
                    return Err(RuntimeError::DuplicateArgument {
                        name: self.name().to_string(),
                        param: k.to_string(),
                    }
                    .into());
                }
                locals[i] = Some(v);
                continue;
            }
            let Some(kwdict) = &kwdict else {
                let hint = did_you_mean(spell::nearest(&k, params.iter().map(|p| p.name.as_str())));
                return Err(RuntimeError::UnexpectedKeyword {
                    name: self.name().to_string(),
                    keyword: k.to_string(),
                    hint,
                }
                .into());
            };
            if kwdict.insert(Value::Str(k.clone()), v)?.is_some() {
                return Err(RuntimeError::DuplicateArgument {
                    name: self.name().to_string(),
                    param: k.to_string(),
                }
                .into());
            }
        }

        if n < nparams || fc.num_kwonly > 0 {
            // Index of the first parameter with a default.
            let first_default = nparams - defaults.len();
            let mut missing = Vec::new();
            for i in n..nparams {
                if locals[i].is_some() {
                    continue;
                }
                match i.checked_sub(first_default).map(|d| &defaults[d]) {
                    None | Some(Value::Mandatory) => missing.push(params[i].name.clone()),
                    Some(dflt) => locals[i] = Some(dflt.clone()),
                }
            }
            if !missing.is_empty() {
                return Err(RuntimeError::MissingArguments {
                    name: self.name().to_string(),
                    params: missing,
                }
                .into());
            }
        }
        Ok(())
    }
}
