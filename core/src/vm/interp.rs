//! The bytecode dispatch loop.

use std::sync::Arc;

use anyhow::{Result, bail};

use super::error::{RuntimeError, did_you_mean};
use super::function::Function;
use super::opcode::Opcode;
use super::program::decode_insn;
use super::thread::Thread;
use crate::universe;
use crate::util::spell;
use crate::val::{CellBox, CompareOp, Value, ValueIter, compare};

#[inline]
fn pop(stack: &mut Vec<Value>) -> Value {
    stack.pop().expect("operand stack underflow")
}

#[inline]
fn pop2(stack: &mut Vec<Value>) -> (Value, Value) {
    let y = pop(stack);
    let x = pop(stack);
    (x, y)
}

fn top_n(stack: &mut Vec<Value>, n: usize) -> Vec<Value> {
    let at = stack.len().checked_sub(n).expect("operand stack underflow");
    stack.split_off(at)
}

fn binary(op: Opcode, x: &Value, y: &Value) -> Result<Value> {
    match op {
        Opcode::Plus => x + y,
        Opcode::Minus => x - y,
        Opcode::Star => x * y,
        Opcode::Slash => x / y,
        Opcode::SlashSlash => x.floor_div(y),
        Opcode::Percent => x % y,
        Opcode::Amp => x & y,
        Opcode::Pipe => x | y,
        Opcode::Circumflex => x ^ y,
        Opcode::LtLt => x << y,
        Opcode::GtGt => x >> y,
        _ => unreachable!("{op} is not a binary operator"),
    }
}

fn compare_op(op: Opcode) -> CompareOp {
    match op {
        Opcode::Lt => CompareOp::Lt,
        Opcode::Gt => CompareOp::Gt,
        Opcode::Ge => CompareOp::Ge,
        Opcode::Le => CompareOp::Le,
        Opcode::Eql => CompareOp::Eq,
        Opcode::Neq => CompareOp::Ne,
        _ => unreachable!("{op} is not a comparison"),
    }
}

fn as_cell(v: &Option<Value>) -> &Arc<CellBox> {
    match v {
        Some(Value::Cell(c)) => c,
        _ => panic!("internal error: cell slot holds a plain value"),
    }
}

impl Function {
    /// Binds the arguments and runs the function body to completion.
    pub(crate) fn call_internal(
        self: &Arc<Self>,
        thread: &mut Thread,
        args: Vec<Value>,
        kwargs: Vec<(Arc<str>, Value)>,
    ) -> Result<Value> {
        let fc = self.funcode().clone();
        let module = self.module().clone();
        let program = module.program().clone();

        let mut locals: Vec<Option<Value>> = vec![None; fc.locals.len()];
        self.set_args(&mut locals, args, kwargs)?;
        for &i in &fc.cells {
            locals[i] = Some(Value::Cell(Arc::new(CellBox::new(locals[i].take()))));
        }

        let code = fc.code.as_slice();
        let mut stack: Vec<Value> = Vec::with_capacity(fc.max_stack);
        let mut iters: Vec<ValueIter> = Vec::new();
        let depth = thread.stack.len() - 1;
        let mut pc = 0usize;

        loop {
            thread.steps += 1;
            if thread.steps >= thread.max_steps {
                thread.step_limit_reached();
            }
            if let Some(reason) = thread.cancel_reason() {
                return Err(RuntimeError::Cancelled(reason.to_string()).into());
            }

            thread.stack[depth].pc = pc as u32;
            let (op, arg, next) = decode_insn(code, pc)?;
            pc = next;

            match op {
                Opcode::Nop => {}

                Opcode::Dup => {
                    let x = stack.last().expect("operand stack underflow").clone();
                    stack.push(x);
                }
                Opcode::Dup2 => {
                    let n = stack.len();
                    let (x, y) = (stack[n - 2].clone(), stack[n - 1].clone());
                    stack.push(x);
                    stack.push(y);
                }
                Opcode::Pop => {
                    pop(&mut stack);
                }
                Opcode::Exch => {
                    let n = stack.len();
                    stack.swap(n - 2, n - 1);
                }

                Opcode::Lt | Opcode::Gt | Opcode::Ge | Opcode::Le | Opcode::Eql | Opcode::Neq => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(Value::Bool(compare(compare_op(op), &x, &y)?));
                }

                Opcode::Plus
                | Opcode::Minus
                | Opcode::Star
                | Opcode::Slash
                | Opcode::SlashSlash
                | Opcode::Percent
                | Opcode::Amp
                | Opcode::Pipe
                | Opcode::Circumflex
                | Opcode::LtLt
                | Opcode::GtGt => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(binary(op, &x, &y)?);
                }

                Opcode::InplaceAdd => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(x.inplace_add(&y)?);
                }
                Opcode::InplacePipe => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(x.inplace_pipe(&y)?);
                }

                Opcode::In => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(Value::Bool(y.contains(&x)?));
                }

                Opcode::Uplus => {
                    let x = pop(&mut stack);
                    stack.push(x.pos()?);
                }
                Opcode::Uminus => {
                    let x = pop(&mut stack);
                    stack.push(x.neg()?);
                }
                Opcode::Tilde => {
                    let x = pop(&mut stack);
                    stack.push(x.invert()?);
                }
                Opcode::Not => {
                    let x = pop(&mut stack);
                    stack.push(Value::Bool(!x.truth()));
                }

                Opcode::None => stack.push(Value::None),
                Opcode::True => stack.push(Value::Bool(true)),
                Opcode::False => stack.push(Value::Bool(false)),
                Opcode::Mandatory => stack.push(Value::Mandatory),

                Opcode::Jmp => pc = arg as usize,
                Opcode::Cjmp => {
                    if pop(&mut stack).truth() {
                        pc = arg as usize;
                    }
                }

                Opcode::IterPush => {
                    let x = pop(&mut stack);
                    iters.push(x.iterate()?);
                }
                Opcode::IterJmp => {
                    let iter = iters.last_mut().expect("iterator stack underflow");
                    match iter.next() {
                        Some(elem) => stack.push(elem),
                        None => pc = arg as usize,
                    }
                }
                Opcode::IterPop => {
                    iters.pop();
                }

                Opcode::Return => return Ok(pop(&mut stack)),

                Opcode::SetIndex => {
                    let z = pop(&mut stack);
                    let (x, y) = pop2(&mut stack);
                    x.set_index(&y, z)?;
                }
                Opcode::Index => {
                    let (x, y) = pop2(&mut stack);
                    stack.push(x.index(&y)?);
                }
                Opcode::Attr => {
                    let x = pop(&mut stack);
                    stack.push(x.get_attr(&program.names[arg as usize])?);
                }
                Opcode::SetField => {
                    let (x, y) = pop2(&mut stack);
                    x.set_field(&program.names[arg as usize], y)?;
                }

                Opcode::MakeDict => stack.push(Value::new_dict()),
                Opcode::SetDict | Opcode::SetDictUniq => {
                    let v = pop(&mut stack);
                    let (dict, k) = pop2(&mut stack);
                    let dict = match dict {
                        Value::Dict(dict) => dict,
                        other => panic!("internal error: SETDICT on {}", other.type_name()),
                    };
                    let repr = (op == Opcode::SetDictUniq).then(|| k.repr());
                    if dict.insert(k, v)?.is_some()
                        && let Some(repr) = repr
                    {
                        return Err(RuntimeError::DuplicateKey(repr).into());
                    }
                }
                Opcode::Append => {
                    let (list, elem) = pop2(&mut stack);
                    let list = match list {
                        Value::List(list) => list,
                        other => panic!("internal error: APPEND on {}", other.type_name()),
                    };
                    list.append(elem)?;
                }

                Opcode::Slice => {
                    let step = pop(&mut stack);
                    let (lo, hi) = pop2(&mut stack);
                    let x = pop(&mut stack);
                    stack.push(x.slice(&lo, &hi, &step)?);
                }

                Opcode::Unpack => {
                    let n = arg as usize;
                    let x = pop(&mut stack);
                    let iter = match x.iterate() {
                        Ok(iter) => iter,
                        Err(_) => return Err(RuntimeError::NotUnpackable(x.type_name()).into()),
                    };
                    let elems: Vec<Value> = iter.collect();
                    if elems.len() > n {
                        return Err(RuntimeError::TooManyValues { got: elems.len(), want: n }.into());
                    }
                    if elems.len() < n {
                        return Err(RuntimeError::TooFewValues { got: elems.len(), want: n }.into());
                    }
                    // First element on top.
                    stack.extend(elems.into_iter().rev());
                }

                Opcode::Constant => stack.push(module.constant(arg as usize).clone()),
                Opcode::MakeTuple => {
                    let elems = top_n(&mut stack, arg as usize);
                    stack.push(Value::new_tuple(elems));
                }
                Opcode::MakeList => {
                    let elems = top_n(&mut stack, arg as usize);
                    stack.push(Value::new_list(elems));
                }
                Opcode::MakeFunc => {
                    let funcode = program.functions[arg as usize].clone();
                    let Value::Tuple(tuple) = pop(&mut stack) else {
                        panic!("internal error: MAKEFUNC operand is not a tuple");
                    };
                    let n = tuple.len() - funcode.freevars.len();
                    let defaults = tuple[..n].to_vec();
                    let freevars = tuple[n..]
                        .iter()
                        .map(|v| match v {
                            Value::Cell(c) => c.clone(),
                            other => panic!("internal error: captured {} is not a cell", other.type_name()),
                        })
                        .collect();
                    let f = Function::new(funcode, module.clone(), defaults, freevars);
                    stack.push(Value::Function(Arc::new(f)));
                }

                Opcode::Load => {
                    let n = arg as usize;
                    let Value::Str(name) = pop(&mut stack) else {
                        panic!("internal error: LOAD module name is not a string");
                    };
                    let dict = match thread.load(&name) {
                        None => return Err(RuntimeError::LoadUnsupported.into()),
                        Some(Err(err)) => {
                            return Err(RuntimeError::Load {
                                module: name.to_string(),
                                message: err.to_string(),
                            }
                            .into());
                        }
                        Some(Ok(dict)) => dict,
                    };
                    let len = stack.len();
                    for i in 0..n {
                        let slot = &mut stack[len - 1 - i];
                        let from = slot.as_str().expect("LOAD operand is a string").to_string();
                        let Some(v) = dict.get(&from) else {
                            let hint = did_you_mean(spell::nearest(&from, dict.keys().map(String::as_str)));
                            return Err(RuntimeError::LoadName {
                                name: from,
                                module: name.to_string(),
                                hint,
                            }
                            .into());
                        };
                        *slot = v.clone();
                    }
                }

                Opcode::SetLocal => locals[arg as usize] = Some(pop(&mut stack)),
                Opcode::SetLocalCell => as_cell(&locals[arg as usize]).set(pop(&mut stack)),
                Opcode::SetGlobal => module.set_global(arg as usize, pop(&mut stack)),

                Opcode::Local => match &locals[arg as usize] {
                    Some(v) => stack.push(v.clone()),
                    None => return Err(RuntimeError::UnboundLocal(fc.locals[arg as usize].name.clone()).into()),
                },
                Opcode::LocalCell => match as_cell(&locals[arg as usize]).get() {
                    Some(v) => stack.push(v),
                    None => return Err(RuntimeError::UnboundLocal(fc.locals[arg as usize].name.clone()).into()),
                },
                Opcode::Free => stack.push(Value::Cell(self.freevar(arg as usize).clone())),
                Opcode::FreeCell => match self.freevar(arg as usize).get() {
                    Some(v) => stack.push(v),
                    None => {
                        return Err(RuntimeError::UnboundLocal(fc.freevars[arg as usize].name.clone()).into());
                    }
                },
                Opcode::Global => match module.global(arg as usize) {
                    Some(v) => stack.push(v),
                    None => {
                        return Err(RuntimeError::UnboundGlobal(program.globals[arg as usize].name.clone()).into());
                    }
                },
                Opcode::Predeclared => {
                    let name = &program.names[arg as usize];
                    match module.predeclared().get(name) {
                        Some(v) => stack.push(v.clone()),
                        None => bail!("internal error: predeclared variable {name} is uninitialized"),
                    }
                }
                Opcode::Universal => {
                    let name = &program.names[arg as usize];
                    match universe::lookup(name) {
                        Some(v) => stack.push(v),
                        None => bail!("internal error: universal variable {name} is uninitialized"),
                    }
                }

                Opcode::Call | Opcode::CallVar | Opcode::CallKw | Opcode::CallVarKw => {
                    let has_kwargs = matches!(op, Opcode::CallKw | Opcode::CallVarKw);
                    let has_varargs = matches!(op, Opcode::CallVar | Opcode::CallVarKw);
                    let kwargs_value = has_kwargs.then(|| pop(&mut stack));
                    let args_value = has_varargs.then(|| pop(&mut stack));

                    let named = top_n(&mut stack, 2 * (arg & 0xff) as usize);
                    let mut kwargs: Vec<(Arc<str>, Value)> = named
                        .chunks_exact(2)
                        .map(|pair| match &pair[0] {
                            Value::Str(k) => (k.clone(), pair[1].clone()),
                            other => panic!("internal error: keyword name is {}", other.type_name()),
                        })
                        .collect();
                    if let Some(extra) = kwargs_value {
                        let Value::Dict(dict) = &extra else {
                            return Err(RuntimeError::KwargsNotMapping(extra.type_name()).into());
                        };
                        for (k, v) in dict.items() {
                            let Value::Str(k) = k else {
                                return Err(RuntimeError::KeywordNotString(k.type_name()).into());
                            };
                            kwargs.push((k, v));
                        }
                    }

                    let mut positional = top_n(&mut stack, (arg >> 8) as usize);
                    if let Some(extra) = args_value {
                        let Ok(iter) = extra.iterate() else {
                            return Err(RuntimeError::ArgsNotIterable(extra.type_name()).into());
                        };
                        positional.extend(iter);
                    }

                    let callee = pop(&mut stack);
                    let result = super::call::call(thread, &callee, positional, kwargs)?;
                    stack.push(result);
                }
            }
        }
    }
}
