use super::builder::{FunctionBuilder, Loop};
use super::driver::Body;
use crate::ast::{BinaryOp, BranchKind, Expr, Ident, Load, Stmt, doc_string};
use crate::token::Position;
use crate::vm::opcode::Opcode;
use crate::vm::program::NameBinding;

impl FunctionBuilder<'_, '_> {
    pub(super) fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                // A bare literal (typically a doc string) has no effect.
                if !matches!(e, Expr::Literal { .. }) {
                    self.expr(e);
                    self.emit(Opcode::Pop);
                }
            }

            Stmt::Branch { kind, .. } => {
                let target = match kind {
                    BranchKind::Pass => return,
                    BranchKind::Break => self.innermost_loop().break_to,
                    BranchKind::Continue => self.innermost_loop().continue_to,
                };
                self.jump(target);
                let dead = self.new_block();
                self.set_block(dead);
            }

            Stmt::If {
                cond, then, otherwise, ..
            } => self.branch(cond, |b| b.stmts(then), |b| b.stmts(otherwise)),

            Stmt::Assign {
                op: None,
                lhs,
                rhs,
                op_pos,
            } => {
                self.expr(rhs);
                self.assign(*op_pos, lhs);
            }

            Stmt::Assign {
                op: Some(op),
                lhs,
                rhs,
                op_pos,
            } => self.augmented_assign(*op, lhs, rhs, *op_pos),

            Stmt::Def(def) => {
                self.function(
                    def.function.get(),
                    &def.params,
                    doc_string(&def.body).unwrap_or(""),
                    Body::Stmts(&def.body),
                );
                self.set(&def.name);
            }

            Stmt::For {
                vars,
                iterable,
                body,
                pos,
            } => self.for_loop(vars, iterable, *pos, true, |b| b.stmts(body)),

            Stmt::While { cond, body, .. } => {
                let head = self.new_block();
                let body_block = self.new_block();
                let done = self.new_block();

                self.jump(head);
                self.set_block(head);
                self.ifelse(cond, body_block, done);

                self.set_block(body_block);
                self.loops.push(Loop {
                    break_to: done,
                    continue_to: head,
                });
                self.stmts(body);
                self.loops.pop();
                self.jump(head);

                self.set_block(done);
            }

            Stmt::Return { result, pos } => {
                match result {
                    Some(e) => self.expr(e),
                    None => self.emit(Opcode::None),
                }
                self.set_pos(*pos);
                self.emit_return();
            }

            Stmt::Load(load) => self.load(load),
        }
    }

    fn innermost_loop(&self) -> Loop {
        *self
            .loops
            .last()
            .expect("internal compiler error: break or continue outside a loop")
    }

    /// Two-way branch on `cond`, shared by `if` statements, conditional
    /// expressions and comprehension filters. Both arms continue at the
    /// same join block.
    pub(super) fn branch(
        &mut self,
        cond: &Expr,
        then: impl FnOnce(&mut Self),
        otherwise: impl FnOnce(&mut Self),
    ) {
        let t = self.new_block();
        let f = self.new_block();
        let done = self.new_block();

        self.ifelse(cond, t, f);

        self.set_block(t);
        then(self);
        self.jump(done);

        self.set_block(f);
        otherwise(self);
        self.jump(done);

        self.set_block(done);
    }

    /// Iterates `iterable`, assigning each element to `vars` and running
    /// `body`. Shared by `for` statements and comprehension clauses; only
    /// statements are targets of `break` and `continue`.
    pub(super) fn for_loop(
        &mut self,
        vars: &Expr,
        iterable: &Expr,
        pos: Position,
        breakable: bool,
        body: impl FnOnce(&mut Self),
    ) {
        let head = self.new_block();
        let body_block = self.new_block();
        let tail = self.new_block();

        self.expr(iterable);
        self.set_pos(pos);
        self.emit(Opcode::IterPush);
        self.jump(head);

        self.set_block(head);
        self.condjump(Opcode::IterJmp, tail, body_block);

        self.set_block(body_block);
        self.assign(pos, vars);
        if breakable {
            self.loops.push(Loop {
                break_to: tail,
                continue_to: head,
            });
        }
        body(self);
        if breakable {
            self.loops.pop();
        }
        self.jump(head);

        self.set_block(tail);
        self.emit(Opcode::IterPop);
    }

    /// Stores the value on top of the stack into `lhs`.
    pub(super) fn assign(&mut self, pos: Position, lhs: &Expr) {
        match lhs {
            Expr::Paren { x, .. } => self.assign(pos, x),
            Expr::Ident(id) => self.set(id),
            Expr::Tuple { elems, .. } | Expr::List { elems, .. } => {
                self.set_pos(pos);
                self.emit1(Opcode::Unpack, elems.len() as u32);
                for elem in elems {
                    self.assign(pos, elem);
                }
            }
            Expr::Index { x, y, lbrack } => {
                // stack: value
                self.expr(x);
                self.emit(Opcode::Exch);
                self.expr(y);
                self.emit(Opcode::Exch);
                self.set_pos(*lbrack);
                self.emit(Opcode::SetIndex);
            }
            Expr::Dot { x, name, dot } => {
                self.expr(x);
                self.emit(Opcode::Exch);
                let name = self.pcomp.name(name);
                self.set_pos(*dot);
                self.emit1(Opcode::SetField, name);
            }
            other => panic!("internal compiler error: cannot assign to {other:?}"),
        }
    }

    /// `lhs op= rhs`. The operand address is evaluated once.
    fn augmented_assign(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, op_pos: Position) {
        enum Target<'e> {
            Ident(&'e Ident),
            Index(Position),
            Field(u32, Position),
        }

        let lhs = lhs.unparen();
        let target = match lhs {
            Expr::Ident(id) => {
                self.lookup(id);
                Target::Ident(id)
            }
            Expr::Index { x, y, lbrack } => {
                self.expr(x);
                self.expr(y);
                self.emit(Opcode::Dup2);
                self.set_pos(*lbrack);
                self.emit(Opcode::Index);
                Target::Index(*lbrack)
            }
            Expr::Dot { x, name, dot } => {
                self.expr(x);
                self.emit(Opcode::Dup);
                let name = self.pcomp.name(name);
                self.set_pos(*dot);
                self.emit1(Opcode::Attr, name);
                Target::Field(name, *dot)
            }
            other => panic!("internal compiler error: cannot update {other:?}"),
        };

        self.expr(rhs);
        // x += y and x |= y update x in place when it is a list or dict.
        match op {
            BinaryOp::Plus => {
                self.set_pos(op_pos);
                self.emit(Opcode::InplaceAdd);
            }
            BinaryOp::Pipe => {
                self.set_pos(op_pos);
                self.emit(Opcode::InplacePipe);
            }
            _ => self.binop(op_pos, op),
        }

        match target {
            Target::Ident(id) => self.set(id),
            Target::Index(lbrack) => {
                self.set_pos(lbrack);
                self.emit(Opcode::SetIndex);
            }
            Target::Field(name, dot) => {
                self.set_pos(dot);
                self.emit1(Opcode::SetField, name);
            }
        }
    }

    fn load(&mut self, load: &Load) {
        for from in &load.from {
            self.string(&from.name);
        }
        self.pcomp.loads.push(NameBinding {
            name: load.module.clone(),
            pos: load.module_pos,
        });
        self.string(&load.module);
        self.set_pos(load.pos);
        self.emit1(Opcode::Load, load.from.len() as u32);
        for to in load.to.iter().rev() {
            self.set(to);
        }
    }
}
