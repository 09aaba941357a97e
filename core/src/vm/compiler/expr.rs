use super::builder::{BlockId, FunctionBuilder};
use super::const_eval::{Summand, fold_sum};
use super::driver::Body;
use crate::ast::{Arg, BinaryOp, Clause, Comprehension, ComprehensionBody, Expr, Ident, Literal, Param, UnaryOp};
use crate::resolve::{FunctionId, Scope};
use crate::token::Position;
use crate::vm::opcode::Opcode;
use crate::vm::program::Constant;

impl FunctionBuilder<'_, '_> {
    /// Emits code that pushes the value of `e`.
    pub(super) fn expr(&mut self, e: &Expr) {
        match e {
            Expr::Paren { x, .. } => self.expr(x),

            Expr::Ident(id) => self.lookup(id),

            Expr::Literal { value, .. } => self.literal(value),

            Expr::List { elems, .. } => {
                self.exprs(elems);
                self.emit1(Opcode::MakeList, elems.len() as u32);
            }

            Expr::Tuple { elems, .. } => self.tuple(elems),

            Expr::Dict { entries, .. } => {
                self.emit(Opcode::MakeDict);
                for entry in entries {
                    self.emit(Opcode::Dup);
                    self.expr(&entry.key);
                    self.expr(&entry.value);
                    self.set_pos(entry.colon);
                    self.emit(Opcode::SetDictUniq);
                }
            }

            Expr::Unary { op, x, pos } => {
                self.expr(x);
                self.set_pos(*pos);
                self.emit(match op {
                    UnaryOp::Plus => Opcode::Uplus,
                    UnaryOp::Minus => Opcode::Uminus,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Tilde => Opcode::Tilde,
                });
            }

            Expr::Binary { op: BinaryOp::Or, x, y, .. } => {
                // x or y  =>  if x then x else y
                let done = self.new_block();
                let rhs = self.new_block();
                self.expr(x);
                self.emit(Opcode::Dup);
                self.condjump(Opcode::Cjmp, done, rhs);
                self.short_circuit_rhs(rhs, y, done);
            }

            Expr::Binary { op: BinaryOp::And, x, y, .. } => {
                // x and y  =>  if x then y else x
                let done = self.new_block();
                let rhs = self.new_block();
                self.expr(x);
                self.emit(Opcode::Dup);
                self.condjump(Opcode::Cjmp, rhs, done);
                self.short_circuit_rhs(rhs, y, done);
            }

            Expr::Binary { op: BinaryOp::Plus, .. } => self.plus(e),

            Expr::Binary { op, x, y, op_pos } => {
                self.expr(x);
                self.expr(y);
                self.binop(*op_pos, *op);
            }

            Expr::Dot { x, name, dot } => {
                self.expr(x);
                let name = self.pcomp.name(name);
                self.set_pos(*dot);
                self.emit1(Opcode::Attr, name);
            }

            Expr::Index { x, y, lbrack } => {
                self.expr(x);
                self.expr(y);
                self.set_pos(*lbrack);
                self.emit(Opcode::Index);
            }

            Expr::Slice {
                x,
                lo,
                hi,
                step,
                lbrack,
            } => {
                self.set_pos(*lbrack);
                self.expr(x);
                for part in [lo, hi, step] {
                    match part {
                        Some(e) => self.expr(e),
                        None => self.emit(Opcode::None),
                    }
                }
                self.emit(Opcode::Slice);
            }

            Expr::Call { func, args, lparen } => {
                self.expr(func);
                let (op, arg) = self.args(args);
                self.set_pos(*lparen);
                self.emit1(op, arg);
            }

            Expr::Comprehension(comp) => {
                if comp.is_dict() {
                    self.emit(Opcode::MakeDict);
                } else {
                    self.emit1(Opcode::MakeList, 0);
                }
                self.comprehension(comp, &comp.clauses);
            }

            Expr::CondExpr {
                cond, then, otherwise, ..
            } => self.branch(cond, |b| b.expr(then), |b| b.expr(otherwise)),

            Expr::Lambda(lambda) => {
                self.function(lambda.function.get(), &lambda.params, "", Body::Expr(&lambda.body));
            }
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.expr(e);
        }
    }

    fn tuple(&mut self, elems: &[Expr]) {
        self.exprs(elems);
        self.emit1(Opcode::MakeTuple, elems.len() as u32);
    }

    fn literal(&mut self, lit: &Literal) {
        let index = match lit {
            Literal::Int(i) => self.pcomp.constant(Constant::Int(*i)),
            Literal::Float(f) => self.pcomp.constant(Constant::Float(*f)),
            Literal::Str(s) => self.pcomp.constant_str(s),
            Literal::Bytes(b) => self.pcomp.constant(Constant::Bytes(b.clone())),
        };
        self.emit1(Opcode::Constant, index);
    }

    /// Right operand of `and`/`or`: drop the duplicated left value and
    /// evaluate `y` instead.
    fn short_circuit_rhs(&mut self, rhs: BlockId, y: &Expr, done: BlockId) {
        self.set_block(rhs);
        self.emit(Opcode::Pop);
        self.expr(y);
        self.jump(done);
        self.set_block(done);
    }

    /// An n-ary sum, with adjacent literal operands folded together.
    fn plus(&mut self, e: &Expr) {
        for term in fold_sum(e) {
            match term.summand {
                Summand::Expr(x) => self.expr(x),
                Summand::Str(s) => self.string(&s),
                Summand::Bytes(b) => {
                    let index = self.pcomp.constant(Constant::Bytes(b));
                    self.emit1(Opcode::Constant, index);
                }
                Summand::List(elems) => {
                    for x in &elems {
                        self.expr(x);
                    }
                    self.emit1(Opcode::MakeList, elems.len() as u32);
                }
                Summand::Tuple(elems) => {
                    for x in &elems {
                        self.expr(x);
                    }
                    self.emit1(Opcode::MakeTuple, elems.len() as u32);
                }
            }
            if let Some(pos) = term.plus_pos {
                self.set_pos(pos);
                self.emit(Opcode::Plus);
            }
        }
    }

    /// Emits the strict binary operator `op` applied to the top two values.
    pub(super) fn binop(&mut self, pos: Position, op: BinaryOp) {
        self.set_pos(pos);
        let opcode = match op {
            BinaryOp::Plus => Opcode::Plus,
            BinaryOp::Minus => Opcode::Minus,
            BinaryOp::Star => Opcode::Star,
            BinaryOp::Slash => Opcode::Slash,
            BinaryOp::SlashSlash => Opcode::SlashSlash,
            BinaryOp::Percent => Opcode::Percent,
            BinaryOp::Amp => Opcode::Amp,
            BinaryOp::Pipe => Opcode::Pipe,
            BinaryOp::Caret => Opcode::Circumflex,
            BinaryOp::LtLt => Opcode::LtLt,
            BinaryOp::GtGt => Opcode::GtGt,
            BinaryOp::In => Opcode::In,
            BinaryOp::NotIn => {
                self.emit(Opcode::In);
                Opcode::Not
            }
            BinaryOp::Eq => Opcode::Eql,
            BinaryOp::Ne => Opcode::Neq,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::And | BinaryOp::Or => {
                panic!("internal compiler error: {} is not a strict operator", op.as_str())
            }
        };
        self.emit(opcode);
    }

    /// Jumps to `t` if `cond` is true and to `f` otherwise, without
    /// materializing boolean results of `not`, `and` and `or`.
    pub(super) fn ifelse(&mut self, cond: &Expr, t: BlockId, f: BlockId) {
        match cond.unparen() {
            Expr::Unary { op: UnaryOp::Not, x, .. } => self.ifelse(x, f, t),
            Expr::Binary { op: BinaryOp::And, x, y, .. } => {
                self.expr(x);
                let rhs = self.new_block();
                self.condjump(Opcode::Cjmp, rhs, f);
                self.set_block(rhs);
                self.ifelse(y, t, f);
            }
            Expr::Binary { op: BinaryOp::Or, x, y, .. } => {
                self.expr(x);
                let rhs = self.new_block();
                self.condjump(Opcode::Cjmp, t, rhs);
                self.set_block(rhs);
                self.ifelse(y, t, f);
            }
            Expr::Binary {
                op: BinaryOp::NotIn,
                x,
                y,
                op_pos,
            } => {
                self.expr(x);
                self.expr(y);
                self.binop(*op_pos, BinaryOp::In);
                self.condjump(Opcode::Cjmp, f, t);
            }
            cond => {
                self.expr(cond);
                self.condjump(Opcode::Cjmp, t, f);
            }
        }
    }

    /// Pushes the callee's arguments; returns the call opcode and its operand.
    fn args(&mut self, args: &[Arg]) -> (Opcode, u32) {
        let mut positional = 0u32;
        let mut named = 0u32;
        let mut varargs = None;
        let mut kwargs = None;
        for arg in args {
            match arg {
                Arg::Positional(e) => {
                    self.expr(e);
                    positional += 1;
                }
                Arg::Named { name, value, .. } => {
                    self.string(name);
                    self.expr(value);
                    named += 1;
                }
                Arg::Star { value, .. } => varargs = Some(value),
                Arg::StarStar { value, .. } => kwargs = Some(value),
            }
        }

        // *args and **kwargs are evaluated after every named argument.
        if let Some(e) = varargs {
            self.expr(e);
        }
        if let Some(e) = kwargs {
            self.expr(e);
        }

        assert!(
            positional < 256 && named < 256,
            "internal compiler error: too many arguments in call"
        );
        let op = match (varargs.is_some(), kwargs.is_some()) {
            (false, false) => Opcode::Call,
            (true, false) => Opcode::CallVar,
            (false, true) => Opcode::CallKw,
            (true, true) => Opcode::CallVarKw,
        };
        (op, (positional << 8) | named)
    }

    /// Emits the clauses of a comprehension whose accumulator is on top of
    /// the stack.
    fn comprehension(&mut self, comp: &Comprehension, clauses: &[Clause]) {
        let Some((clause, rest)) = clauses.split_first() else {
            self.emit(Opcode::Dup);
            match &comp.body {
                ComprehensionBody::Entry(entry) => {
                    self.expr(&entry.key);
                    self.expr(&entry.value);
                    self.set_pos(entry.colon);
                    self.emit(Opcode::SetDict);
                }
                ComprehensionBody::Elem(e) => {
                    self.expr(e);
                    self.emit(Opcode::Append);
                }
            }
            return;
        };

        match clause {
            Clause::If { cond, .. } => self.branch(cond, |b| b.comprehension(comp, rest), |_| {}),
            Clause::For { vars, iterable, pos } => {
                self.for_loop(vars, iterable, *pos, false, |b| b.comprehension(comp, rest));
            }
        }
    }

    /// Creates a function value for a `def` or `lambda`.
    ///
    /// The defaults (with `MANDATORY` for keyword-only parameters that have
    /// none) and the captured cells are packed into one tuple that
    /// `MAKEFUNC` splits again.
    pub(super) fn function(&mut self, id: Option<FunctionId>, params: &[Param], doc: &str, body: Body<'_>) {
        let resolution = self.pcomp.resolution;
        let info = resolution.function(id.expect("internal compiler error: unresolved function"));
        self.set_pos(info.pos);

        let mut ndefaults = 0;
        let mut seen_star = false;
        for param in params {
            match param {
                Param::Optional { default, .. } => {
                    self.expr(default);
                    ndefaults += 1;
                }
                Param::Star { .. } | Param::StarStar { .. } => seen_star = true,
                Param::Required(_) if seen_star => {
                    self.emit(Opcode::Mandatory);
                    ndefaults += 1;
                }
                Param::Required(_) => {}
            }
        }

        // The cells themselves, not their contents.
        for &fv in &info.freevars {
            let binding = resolution.binding(fv);
            match binding.scope {
                Scope::Free => self.emit1(Opcode::Free, binding.index as u32),
                Scope::Cell => self.emit1(Opcode::Local, binding.index as u32),
                scope => panic!("internal compiler error: {scope} variable {} captured", binding.name),
            }
        }
        self.emit1(Opcode::MakeTuple, (ndefaults + info.freevars.len()) as u32);

        let funcode = self.pcomp.compile_function(info, doc, body);
        let index = self.pcomp.add_function(funcode);
        self.emit1(Opcode::MakeFunc, index);
    }

    /// Pushes the value of a variable.
    pub(super) fn lookup(&mut self, id: &Ident) {
        let resolution = self.pcomp.resolution;
        let binding = resolution.binding_of(id);
        if binding.scope != Scope::Universal {
            self.set_pos(id.pos);
        }
        let index = binding.index as u32;
        match binding.scope {
            Scope::Local => self.emit1(Opcode::Local, index),
            Scope::Free => self.emit1(Opcode::FreeCell, index),
            Scope::Cell => self.emit1(Opcode::LocalCell, index),
            Scope::Global => self.emit1(Opcode::Global, index),
            Scope::Predeclared => {
                let name = self.pcomp.name(&id.name);
                self.emit1(Opcode::Predeclared, name);
            }
            Scope::Universal => {
                let name = self.pcomp.name(&id.name);
                self.emit1(Opcode::Universal, name);
            }
            Scope::Undefined => panic!("internal compiler error: {}: undefined name {}", id.pos, id.name),
        }
    }

    /// Pops the top of the stack into a variable.
    pub(super) fn set(&mut self, id: &Ident) {
        let resolution = self.pcomp.resolution;
        let binding = resolution.binding_of(id);
        let index = binding.index as u32;
        match binding.scope {
            Scope::Local => self.emit1(Opcode::SetLocal, index),
            Scope::Cell => self.emit1(Opcode::SetLocalCell, index),
            Scope::Global => self.emit1(Opcode::SetGlobal, index),
            scope => panic!("internal compiler error: cannot assign to {scope} variable {}", id.name),
        }
    }
}
