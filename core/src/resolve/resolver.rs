use tracing::trace;

use crate::ast::{Arg, Clause, ComprehensionBody, Expr, File, Ident, Param, Stmt};
use crate::options::FileOptions;
use crate::resolve::{Binding, BindingId, FunctionId, FunctionInfo, ResolveError, ResolveErrors, Resolution, Scope};
use crate::token::Position;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::util::spell;

/// Compiler-imposed limit on positional or keyword arguments in one call.
const MAX_CALL_ARGS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockId(usize);

const FILE_BLOCK: BlockId = BlockId(0);

/// A read of `id` from lexical block `env`, not yet resolved.
#[derive(Clone, Copy)]
struct Use<'a> {
    id: &'a Ident,
    env: BlockId,
}

struct Block<'a> {
    parent: Option<BlockId>,
    /// Set for function bodies; `None` for the file block and comprehensions.
    function: Option<FunctionId>,
    bindings: FastHashMap<String, BindingId>,
    children: Vec<BlockId>,
    /// Pending uses, only kept on container blocks (functions and the file).
    uses: Vec<Use<'a>>,
}

impl Block<'_> {
    fn new(parent: Option<BlockId>, function: Option<FunctionId>) -> Self {
        Self {
            parent,
            function,
            bindings: fast_hash_map_new(),
            children: Vec::new(),
            uses: Vec::new(),
        }
    }
}

/// Predicate over names, supplied by the embedder.
pub type NamePredicate<'e> = &'e dyn Fn(&str) -> bool;

/// Resolves every identifier in `file`, filling in each [`Ident::binding`]
/// and each def/lambda `function` slot.
///
/// All errors are collected; the result is `Err` if there was at least one.
pub fn resolve_file(
    file: &File,
    options: FileOptions,
    is_predeclared: NamePredicate<'_>,
    is_universal: NamePredicate<'_>,
) -> Result<Resolution, ResolveErrors> {
    Resolver::new(options, None, is_predeclared, is_universal).run(&file.stmts)
}

/// Like [`resolve_file`], but names for which `is_global` holds are treated as
/// globals defined by an earlier chunk of the same interactive session.
pub fn resolve_repl_chunk(
    file: &File,
    options: FileOptions,
    is_global: NamePredicate<'_>,
    is_predeclared: NamePredicate<'_>,
    is_universal: NamePredicate<'_>,
) -> Result<Resolution, ResolveErrors> {
    Resolver::new(options, Some(is_global), is_predeclared, is_universal).run(&file.stmts)
}

struct Resolver<'a, 'e> {
    options: FileOptions,
    blocks: Vec<Block<'a>>,
    env: BlockId,

    bindings: Vec<Binding>,
    functions: Vec<FunctionInfo>,
    globals: FastHashMap<String, BindingId>,
    /// Memoized predeclared and universal bindings.
    predeclared: FastHashMap<String, BindingId>,
    module_locals: Vec<BindingId>,
    module_globals: Vec<BindingId>,

    is_global: Option<NamePredicate<'e>>,
    is_predeclared: NamePredicate<'e>,
    is_universal: NamePredicate<'e>,

    loops: usize,
    ifstmts: usize,
    errors: Vec<ResolveError>,
}

impl<'a, 'e> Resolver<'a, 'e> {
    fn new(
        options: FileOptions,
        is_global: Option<NamePredicate<'e>>,
        is_predeclared: NamePredicate<'e>,
        is_universal: NamePredicate<'e>,
    ) -> Self {
        Self {
            options,
            blocks: vec![Block::new(None, None)],
            env: FILE_BLOCK,
            bindings: Vec::new(),
            functions: Vec::new(),
            globals: fast_hash_map_new(),
            predeclared: fast_hash_map_new(),
            module_locals: Vec::new(),
            module_globals: Vec::new(),
            is_global,
            is_predeclared,
            is_universal,
            loops: 0,
            ifstmts: 0,
            errors: Vec::new(),
        }
    }

    fn run(mut self, stmts: &'a [Stmt]) -> Result<Resolution, ResolveErrors> {
        self.stmts(stmts);
        self.resolve_local_uses(FILE_BLOCK);
        // Function bodies may refer to globals declared later in the file,
        // so non-local uses are only resolved once the whole file is seen.
        self.resolve_non_local_uses(FILE_BLOCK);

        if !self.errors.is_empty() {
            self.errors.sort_by_key(|e| e.pos);
            return Err(ResolveErrors(self.errors));
        }
        Ok(Resolution {
            bindings: self.bindings,
            functions: self.functions,
            module_locals: self.module_locals,
            module_globals: self.module_globals,
        })
    }

    fn errorf(&mut self, pos: Position, msg: impl Into<String>) {
        self.errors.push(ResolveError { pos, msg: msg.into() });
    }

    fn new_binding(&mut self, scope: Scope, index: usize, name: &str, first: Option<Position>) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            scope,
            index,
            name: name.to_string(),
            first,
        });
        id
    }

    fn push(&mut self, function: Option<FunctionId>) {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block::new(Some(self.env), function));
        self.blocks[self.env.0].children.push(id);
        self.env = id;
    }

    fn pop(&mut self) {
        self.env = self.blocks[self.env.0]
            .parent
            .expect("internal resolver error: popped the file block");
    }

    /// Innermost enclosing function block, or the file block.
    fn container(&self) -> BlockId {
        let mut b = self.env;
        loop {
            let block = &self.blocks[b.0];
            if block.function.is_some() || b == FILE_BLOCK {
                return b;
            }
            b = block.parent.expect("comprehension block has a parent");
        }
    }

    fn in_function(&self) -> bool {
        self.blocks[self.container().0].function.is_some()
    }

    /// Binds `id` in the current block. Returns whether it was already bound.
    fn bind(&mut self, id: &'a Ident) -> bool {
        if self.env != FILE_BLOCK {
            return self.bind_local(id);
        }
        let existing = self.blocks[FILE_BLOCK.0]
            .bindings
            .get(&id.name)
            .or_else(|| self.globals.get(&id.name))
            .copied();
        let bid = match existing {
            Some(bid) => {
                if !self.options.allow_global_reassign {
                    let prev = &self.bindings[bid.0 as usize];
                    let msg = format!(
                        "cannot reassign {} {} declared at {}",
                        prev.scope,
                        id.name,
                        prev.first.unwrap_or_default()
                    );
                    self.errorf(id.pos, msg);
                }
                bid
            }
            None => {
                let bid = self.new_binding(Scope::Global, self.module_globals.len(), &id.name, Some(id.pos));
                self.globals.insert(id.name.clone(), bid);
                self.module_globals.push(bid);
                bid
            }
        };
        id.binding.set(Some(bid));
        existing.is_some()
    }

    /// Binds `id` as a local of the innermost container, visible in the
    /// current lexical block. Returns whether the block already bound it.
    fn bind_local(&mut self, id: &'a Ident) -> bool {
        let existed = self.blocks[self.env.0].bindings.contains_key(&id.name);
        if !existed {
            let function = self.blocks[self.container().0].function;
            let index = match function {
                Some(f) => self.functions[f.0 as usize].locals.len(),
                None => self.module_locals.len(),
            };
            let bid = self.new_binding(Scope::Local, index, &id.name, Some(id.pos));
            self.blocks[self.env.0].bindings.insert(id.name.clone(), bid);
            match function {
                Some(f) => self.functions[f.0 as usize].locals.push(bid),
                None => self.module_locals.push(bid),
            }
        }
        self.use_ident(id);
        existed
    }

    fn use_ident(&mut self, id: &'a Ident) {
        let u = Use { id, env: self.env };
        // Interactive chunks may rebind globals, so toplevel references
        // resolve against whatever is bound right now.
        if self.options.allow_global_reassign && self.env == FILE_BLOCK {
            self.use_toplevel(u);
            return;
        }
        let c = self.container();
        self.blocks[c.0].uses.push(u);
    }

    fn stmts(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Expr(x) => self.expr(x),
            Stmt::Branch { kind, pos } => {
                if self.loops == 0 && *kind != crate::ast::BranchKind::Pass {
                    self.errorf(*pos, format!("{} not in a loop", kind.as_str()));
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
                pos,
            } => {
                if !self.options.allow_global_reassign && !self.in_function() {
                    self.errorf(*pos, "if statement not within a function");
                }
                self.expr(cond);
                self.ifstmts += 1;
                self.stmts(then);
                self.stmts(otherwise);
                self.ifstmts -= 1;
            }
            Stmt::Assign { op, lhs, rhs, .. } => {
                self.expr(rhs);
                self.assign(lhs, op.is_some());
            }
            Stmt::Def(def) => {
                self.bind(&def.name);
                let f = self.function(&def.name.name, def.pos, &def.params);
                def.function.set(Some(f));
                self.function_body(f, &def.params, FunctionBody::Stmts(&def.body));
            }
            Stmt::For {
                vars,
                iterable,
                body,
                pos,
            } => {
                if !self.options.allow_global_reassign && !self.in_function() {
                    self.errorf(*pos, "for loop not within a function");
                }
                self.expr(iterable);
                self.assign(vars, false);
                self.loops += 1;
                self.stmts(body);
                self.loops -= 1;
            }
            Stmt::While { cond, body, pos } => {
                if !self.options.allow_global_reassign && !self.in_function() {
                    self.errorf(*pos, "while loop not within a function");
                }
                self.expr(cond);
                self.loops += 1;
                self.stmts(body);
                self.loops -= 1;
            }
            Stmt::Return { result, pos } => {
                if !self.in_function() {
                    self.errorf(*pos, "return statement not within a function");
                }
                if let Some(result) = result {
                    self.expr(result);
                }
            }
            Stmt::Load(load) => {
                if self.in_function() {
                    self.errorf(load.pos, "load statement within a function");
                } else if self.loops > 0 {
                    self.errorf(load.pos, "load statement within a loop");
                } else if self.ifstmts > 0 {
                    self.errorf(load.pos, "load statement within a conditional");
                }
                for (from, to) in load.from.iter().zip(&load.to) {
                    if from.name.is_empty() {
                        self.errorf(from.pos, "load: empty identifier");
                        continue;
                    }
                    if from.name.starts_with('_') {
                        self.errorf(
                            from.pos,
                            format!("load: names with leading underscores are not exported: {}", from.name),
                        );
                    }
                    if self.options.load_binds_globally {
                        self.bind(to);
                    } else if self.bind_local(to) && !self.options.allow_global_reassign {
                        self.errorf(to.pos, format!("cannot reassign top-level {}", to.name));
                    }
                }
            }
        }
    }

    fn assign(&mut self, lhs: &'a Expr, is_augmented: bool) {
        match lhs {
            Expr::Ident(id) => {
                self.bind(id);
            }
            Expr::Index { x, y, .. } => {
                self.expr(x);
                self.expr(y);
            }
            Expr::Dot { x, .. } => self.expr(x),
            Expr::Tuple { elems, pos } | Expr::List { elems, pos } => {
                if is_augmented {
                    let kind = if matches!(lhs, Expr::Tuple { .. }) { "tuple" } else { "list" };
                    self.errorf(*pos, format!("can't use {kind} expression in augmented assignment"));
                }
                for elem in elems {
                    self.assign(elem, is_augmented);
                }
            }
            Expr::Paren { x, .. } => self.assign(x, is_augmented),
            other => {
                let shape = match other {
                    Expr::Literal { .. } => "literal",
                    Expr::Dict { .. } => "dict expression",
                    Expr::Unary { .. } => "unary expression",
                    Expr::Binary { .. } => "binary expression",
                    Expr::Slice { .. } => "slice expression",
                    Expr::Call { .. } => "function call",
                    Expr::Comprehension(_) => "comprehension",
                    Expr::CondExpr { .. } => "conditional expression",
                    Expr::Lambda(_) => "lambda expression",
                    _ => "expression",
                };
                self.errorf(other.pos(), format!("can't assign to {shape}"));
            }
        }
    }

    fn expr(&mut self, e: &'a Expr) {
        match e {
            Expr::Ident(id) => self.use_ident(id),
            Expr::Literal { .. } => {}
            Expr::List { elems, .. } | Expr::Tuple { elems, .. } => {
                for x in elems {
                    self.expr(x);
                }
            }
            Expr::Dict { entries, .. } => {
                for entry in entries {
                    self.expr(&entry.key);
                    self.expr(&entry.value);
                }
            }
            Expr::Unary { x, .. } | Expr::Dot { x, .. } | Expr::Paren { x, .. } => self.expr(x),
            Expr::Binary { x, y, .. } | Expr::Index { x, y, .. } => {
                self.expr(x);
                self.expr(y);
            }
            Expr::Slice { x, lo, hi, step, .. } => {
                self.expr(x);
                for part in [lo, hi, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            Expr::CondExpr {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.expr(cond);
                self.expr(then);
                self.expr(otherwise);
            }
            Expr::Call { func, args, lparen } => {
                self.expr(func);
                self.call_args(args, *lparen);
            }
            Expr::Comprehension(comp) => {
                // The operand of the first `for` is evaluated in the outer
                // block: `[x for x in x]` reads the outer x.
                let mut clauses = comp.clauses.iter();
                if let Some(Clause::For { iterable, .. }) = comp.clauses.first() {
                    self.expr(iterable);
                    clauses.next();
                }
                self.push(None);
                if let Some(Clause::For { vars, .. }) = comp.clauses.first() {
                    self.assign(vars, false);
                }
                for clause in clauses {
                    match clause {
                        Clause::If { cond, .. } => self.expr(cond),
                        Clause::For { vars, iterable, .. } => {
                            self.assign(vars, false);
                            self.expr(iterable);
                        }
                    }
                }
                match &comp.body {
                    ComprehensionBody::Elem(x) => self.expr(x),
                    ComprehensionBody::Entry(entry) => {
                        self.expr(&entry.key);
                        self.expr(&entry.value);
                    }
                }
                self.pop();
            }
            Expr::Lambda(lambda) => {
                let f = self.function("lambda", lambda.pos, &lambda.params);
                lambda.function.set(Some(f));
                self.function_body(f, &lambda.params, FunctionBody::Expr(&lambda.body));
            }
        }
    }

    fn call_args(&mut self, args: &'a [Arg], lparen: Position) {
        let mut seen_varargs = false;
        let mut seen_kwargs = false;
        let mut seen_names: Vec<&str> = Vec::new();
        let (mut positional, mut named) = (0usize, 0usize);
        for arg in args {
            let pos = arg.pos();
            match arg {
                Arg::StarStar { value, .. } => {
                    if seen_kwargs {
                        self.errorf(pos, "multiple **kwargs not allowed");
                    }
                    seen_kwargs = true;
                    self.expr(value);
                }
                Arg::Star { value, .. } => {
                    if seen_kwargs {
                        self.errorf(pos, "*args may not follow **kwargs");
                    } else if seen_varargs {
                        self.errorf(pos, "multiple *args not allowed");
                    }
                    seen_varargs = true;
                    self.expr(value);
                }
                Arg::Named { name, value, .. } => {
                    named += 1;
                    // Keyword arguments may follow *args: f(a, *b, c=1).
                    if seen_kwargs {
                        self.errorf(pos, "keyword argument may not follow **kwargs");
                    }
                    if seen_names.contains(&name.as_str()) {
                        self.errorf(pos, format!("keyword argument {name:?} is repeated"));
                    } else {
                        seen_names.push(name);
                    }
                    self.expr(value);
                }
                Arg::Positional(value) => {
                    positional += 1;
                    if seen_varargs {
                        self.errorf(pos, "positional argument may not follow *args");
                    } else if seen_kwargs {
                        self.errorf(pos, "positional argument may not follow **kwargs");
                    } else if !seen_names.is_empty() {
                        self.errorf(pos, "positional argument may not follow named");
                    }
                    self.expr(value);
                }
            }
        }
        if positional >= MAX_CALL_ARGS {
            self.errorf(
                lparen,
                format!("{positional} positional arguments in call, limit is {}", MAX_CALL_ARGS - 1),
            );
        }
        if named >= MAX_CALL_ARGS {
            self.errorf(
                lparen,
                format!("{named} keyword arguments in call, limit is {}", MAX_CALL_ARGS - 1),
            );
        }
    }

    /// Allocates the FunctionInfo and resolves default values, which are
    /// evaluated in the enclosing environment.
    fn function(&mut self, name: &str, pos: Position, params: &'a [Param]) -> FunctionId {
        for param in params {
            if let Param::Optional { default, .. } = param {
                self.expr(default);
            }
        }
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionInfo {
            pos,
            name: name.to_string(),
            ..Default::default()
        });
        id
    }

    fn function_body(&mut self, f: FunctionId, params: &'a [Param], body: FunctionBody<'a>) {
        let saved = (self.loops, self.ifstmts);
        (self.loops, self.ifstmts) = (0, 0);
        self.push(Some(f));

        let mut star: Option<(Position, Option<&'a Ident>)> = None;
        let mut star_star: Option<&'a Ident> = None;
        let mut seen_optional = false;
        let mut num_kwonly = 0;
        for param in params {
            match param {
                Param::Required(id) => {
                    if let Some(kw) = star_star {
                        self.errorf(id.pos, format!("required parameter may not follow **{}", kw.name));
                    } else if star.is_some() {
                        num_kwonly += 1;
                    } else if seen_optional {
                        self.errorf(id.pos, "required parameter may not follow optional");
                    }
                    if self.bind(id) {
                        self.errorf(id.pos, format!("duplicate parameter: {}", id.name));
                    }
                }
                Param::Optional { name, .. } => {
                    if let Some(kw) = star_star {
                        self.errorf(name.pos, format!("optional parameter may not follow **{}", kw.name));
                    } else if star.is_some() {
                        num_kwonly += 1;
                    }
                    if self.bind(name) {
                        self.errorf(name.pos, format!("duplicate parameter: {}", name.name));
                    }
                    seen_optional = true;
                }
                Param::Star { pos, name } => {
                    if let Some(kw) = star_star {
                        self.errorf(*pos, format!("* parameter may not follow **{}", kw.name));
                    } else if star.is_some() {
                        self.errorf(*pos, "multiple * parameters not allowed");
                    } else {
                        star = Some((*pos, name.as_ref()));
                    }
                }
                Param::StarStar { pos, name } => {
                    if star_star.is_some() {
                        self.errorf(*pos, "multiple ** parameters not allowed");
                    }
                    star_star = Some(name);
                }
            }
        }

        // *args and **kwargs are bound last so the ordinary parameters
        // occupy a contiguous prefix of the locals.
        let mut has_varargs = false;
        if let Some((pos, name)) = star {
            match name {
                Some(id) => {
                    if self.bind(id) {
                        self.errorf(id.pos, format!("duplicate parameter: {}", id.name));
                    }
                    has_varargs = true;
                }
                None if num_kwonly == 0 => {
                    self.errorf(pos, "bare * must be followed by keyword-only parameters");
                }
                None => {}
            }
        }
        let has_kwargs = star_star.is_some();
        if let Some(id) = star_star {
            if self.bind(id) {
                self.errorf(id.pos, format!("duplicate parameter: {}", id.name));
            }
        }

        let num_params = params
            .iter()
            .filter(|p| !matches!(p, Param::Star { name: None, .. }))
            .count();
        let info = &mut self.functions[f.0 as usize];
        info.num_params = num_params;
        info.num_kwonly = num_kwonly;
        info.has_varargs = has_varargs;
        info.has_kwargs = has_kwargs;

        match body {
            FunctionBody::Stmts(stmts) => self.stmts(stmts),
            FunctionBody::Expr(e) => self.expr(e),
        }

        // Uses of this function's own locals are settled now; the rest
        // wait for the end of the file.
        self.resolve_local_uses(self.env);
        self.pop();
        (self.loops, self.ifstmts) = saved;
    }

    fn lookup_local(&self, u: Use<'a>) -> Option<BindingId> {
        let mut env = Some(u.env);
        while let Some(b) = env {
            let block = &self.blocks[b.0];
            if let Some(&bid) = block.bindings.get(&u.id.name) {
                debug_assert_ne!(self.bindings[bid.0 as usize].scope, Scope::Free);
                return Some(bid);
            }
            if block.function.is_some() {
                break;
            }
            env = block.parent;
        }
        None
    }

    fn resolve_local_uses(&mut self, b: BlockId) {
        let uses = std::mem::take(&mut self.blocks[b.0].uses);
        let mut unresolved = Vec::new();
        for u in uses {
            match self.lookup_local(u) {
                Some(bid) if matches!(self.bindings[bid.0 as usize].scope, Scope::Local | Scope::Cell) => {
                    u.id.binding.set(Some(bid));
                }
                _ => unresolved.push(u),
            }
        }
        self.blocks[b.0].uses = unresolved;
    }

    fn resolve_non_local_uses(&mut self, b: BlockId) {
        // Inner blocks first, so their freevars are known before the
        // enclosing function's cells are read.
        let children = self.blocks[b.0].children.clone();
        for child in children {
            self.resolve_non_local_uses(child);
        }
        let uses = std::mem::take(&mut self.blocks[b.0].uses);
        for u in uses {
            let bid = self.lookup_lexical(u, u.env);
            u.id.binding.set(Some(bid));
        }
    }

    fn lookup_lexical(&mut self, u: Use<'a>, env: BlockId) -> BindingId {
        if env == FILE_BLOCK {
            return self.use_toplevel(u);
        }
        if let Some(&bid) = self.blocks[env.0].bindings.get(&u.id.name) {
            return bid;
        }
        let parent = self.blocks[env.0].parent.expect("non-file block has a parent");
        let mut bid = self.lookup_lexical(u, parent);
        if let Some(f) = self.blocks[env.0].function {
            let outer = &mut self.bindings[bid.0 as usize];
            if matches!(outer.scope, Scope::Local | Scope::Free | Scope::Cell) {
                // Captured from an enclosing function: the outer local
                // becomes a cell and this function gets a free variable.
                if outer.scope == Scope::Local {
                    trace!(name = %outer.name, "promoting local to cell");
                    outer.scope = Scope::Cell;
                }
                let (name, first) = (outer.name.clone(), outer.first);
                let index = self.functions[f.0 as usize].freevars.len();
                self.functions[f.0 as usize].freevars.push(bid);
                bid = self.new_binding(Scope::Free, index, &name, first);
            }
        }
        // Memoize, so each free variable is added once per function.
        self.blocks[env.0].bindings.insert(u.id.name.clone(), bid);
        bid
    }

    /// Resolves a name at file level: load-bound locals, then globals, then
    /// earlier REPL chunks, predeclared names and finally universal ones.
    fn use_toplevel(&mut self, u: Use<'a>) -> BindingId {
        let id = u.id;
        let name = id.name.as_str();
        let bid = if let Some(&bid) = self.blocks[FILE_BLOCK.0].bindings.get(name) {
            bid
        } else if let Some(&bid) = self.globals.get(name) {
            bid
        } else if self.is_global.is_some_and(|is_global| is_global(name)) {
            let bid = self.new_binding(Scope::Global, self.module_globals.len(), name, Some(id.pos));
            self.globals.insert(name.to_string(), bid);
            self.module_globals.push(bid);
            bid
        } else if let Some(&bid) = self.predeclared.get(name) {
            bid
        } else if (self.is_predeclared)(name) {
            let bid = self.new_binding(Scope::Predeclared, 0, name, None);
            self.predeclared.insert(name.to_string(), bid);
            bid
        } else if (self.is_universal)(name) {
            let bid = self.new_binding(Scope::Universal, 0, name, None);
            self.predeclared.insert(name.to_string(), bid);
            bid
        } else {
            let hint = self
                .spellcheck(u)
                .map(|n| format!(" (did you mean {n}?)"))
                .unwrap_or_default();
            self.errorf(id.pos, format!("undefined: {name}{hint}"));
            self.new_binding(Scope::Undefined, 0, name, None)
        };
        id.binding.set(Some(bid));
        bid
    }

    fn spellcheck(&self, u: Use<'a>) -> Option<String> {
        let mut names: Vec<&str> = Vec::new();
        let mut env = Some(u.env);
        while let Some(b) = env {
            names.extend(self.blocks[b.0].bindings.keys().map(String::as_str));
            env = self.blocks[b.0].parent;
        }
        names.extend(self.globals.keys().map(String::as_str));
        names.extend(self.predeclared.keys().map(String::as_str));
        names.sort_unstable();
        names.dedup();
        spell::nearest(&u.id.name, names).map(str::to_string)
    }
}

enum FunctionBody<'a> {
    Stmts(&'a [Stmt]),
    /// Lambda body; behaves like `return expr`.
    Expr(&'a Expr),
}
