use std::sync::Arc;

use super::builder::FunctionBuilder;
use crate::ast::{Expr, File, Stmt};
use crate::options::FileOptions;
use crate::resolve::{FunctionInfo, Resolution};
use crate::token::Position;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::vm::program::{Constant, Funcode, NameBinding, Program};

/// Name of the synthetic function holding a file's toplevel statements.
pub const TOPLEVEL_NAME: &str = "<toplevel>";

#[derive(Debug, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    Float(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<&Constant> for ConstKey {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Int(i) => ConstKey::Int(*i),
            Constant::Float(f) => ConstKey::Float(f.to_bits()),
            Constant::Str(s) => ConstKey::Str(s.clone()),
            Constant::Bytes(b) => ConstKey::Bytes(b.clone()),
        }
    }
}

/// Program-wide state shared by the builders of every function in a file:
/// the interned name and constant pools and the list of nested functions.
pub(crate) struct ProgramBuilder<'r> {
    pub(super) resolution: &'r Resolution,
    names: Vec<String>,
    name_index: FastHashMap<String, u32>,
    constants: Vec<Constant>,
    constant_index: FastHashMap<ConstKey, u32>,
    functions: Vec<Arc<Funcode>>,
    pub(super) loads: Vec<NameBinding>,
}

impl<'r> ProgramBuilder<'r> {
    fn new(resolution: &'r Resolution) -> Self {
        Self {
            resolution,
            names: Vec::new(),
            name_index: fast_hash_map_new(),
            constants: Vec::new(),
            constant_index: fast_hash_map_new(),
            functions: Vec::new(),
            loads: Vec::new(),
        }
    }

    pub(super) fn name(&mut self, name: &str) -> u32 {
        if let Some(&i) = self.name_index.get(name) {
            return i;
        }
        let i = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), i);
        i
    }

    pub(super) fn constant(&mut self, c: Constant) -> u32 {
        let key = ConstKey::from(&c);
        if let Some(&i) = self.constant_index.get(&key) {
            return i;
        }
        let i = self.constants.len() as u32;
        self.constants.push(c);
        self.constant_index.insert(key, i);
        i
    }

    pub(super) fn constant_str(&mut self, s: &str) -> u32 {
        self.constant(Constant::Str(s.to_string()))
    }

    pub(super) fn add_function(&mut self, fc: Funcode) -> u32 {
        self.functions.push(Arc::new(fc));
        (self.functions.len() - 1) as u32
    }

    /// Compiles a `def` or `lambda` described by `info`.
    pub(super) fn compile_function(&mut self, info: &FunctionInfo, doc: &str, body: Body<'_>) -> Funcode {
        let mut fc = Funcode::new(info.name.clone(), doc.to_string(), info.pos);
        fc.num_params = info.num_params;
        fc.num_kwonly = info.num_kwonly;
        fc.has_varargs = info.has_varargs;
        fc.has_kwargs = info.has_kwargs;

        let mut b = FunctionBuilder::new(self, fc, &info.locals, &info.freevars);
        match body {
            Body::Stmts(stmts) => b.stmts(stmts),
            Body::Expr(e) => {
                b.expr(e);
                b.emit_return();
            }
        }
        b.finish()
    }
}

/// Source of a function body.
#[derive(Clone, Copy)]
pub(super) enum Body<'a> {
    Stmts(&'a [Stmt]),
    /// Lambda body; its value is returned.
    Expr(&'a Expr),
}

/// Compiles a resolved file.
pub fn compile_file(file: &File, resolution: &Resolution, options: FileOptions) -> Program {
    compile(file, resolution, options, false)
}

/// Like [`compile_file`], but when the last statement is an expression its
/// value becomes the result of the toplevel code instead of being discarded.
/// Used for interactive chunks.
pub fn compile_chunk(file: &File, resolution: &Resolution, options: FileOptions) -> Program {
    compile(file, resolution, options, true)
}

fn compile(file: &File, resolution: &Resolution, options: FileOptions, keep_last_value: bool) -> Program {
    let mut pcomp = ProgramBuilder::new(resolution);
    let fc = Funcode::new(TOPLEVEL_NAME.to_string(), String::new(), Position::start());

    let mut b = FunctionBuilder::new(&mut pcomp, fc, &resolution.module_locals, &[]);
    match (keep_last_value, file.stmts.split_last()) {
        (true, Some((Stmt::Expr(last), init))) => {
            b.stmts(init);
            b.expr(last);
            b.emit_return();
        }
        _ => b.stmts(&file.stmts),
    }
    let toplevel = b.finish();

    let globals = resolution
        .module_globals
        .iter()
        .map(|&id| {
            let binding = resolution.binding(id);
            NameBinding {
                name: binding.name.clone(),
                pos: binding.first.unwrap_or_default(),
            }
        })
        .collect();

    Program {
        filename: file.name.clone(),
        options,
        loads: pcomp.loads,
        names: pcomp.names,
        constants: pcomp.constants,
        functions: pcomp.functions,
        globals,
        toplevel: Arc::new(toplevel),
    }
}
