//! Compiled programs: per-function bytecode plus the shared pools.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Result, bail};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::opcode::Opcode;
use crate::options::FileOptions;
use crate::token::Position;
use crate::val::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Str(s) => Value::str(s),
            Constant::Bytes(b) => Value::Bytes(b.as_slice().into()),
        }
    }
}

/// A name and the position where it is bound or referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameBinding {
    pub name: String,
    pub pos: Position,
}

/// Bytecode and metadata of one function (or the module toplevel).
#[derive(Debug, Serialize, Deserialize)]
pub struct Funcode {
    pub name: String,
    pub doc: String,
    pub pos: Position,
    pub code: Vec<u8>,
    /// Delta-encoded pc to source position table; see [`LineTableWriter`].
    pub pclinetab: Vec<u16>,
    /// Parameters first, then other locals.
    pub locals: Vec<NameBinding>,
    /// Indices into `locals` of the variables that live in cells.
    pub cells: Vec<usize>,
    pub freevars: Vec<NameBinding>,
    pub max_stack: usize,
    pub num_params: usize,
    pub num_kwonly: usize,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    #[serde(skip)]
    positions: OnceCell<Vec<(u32, Position)>>,
}

impl Funcode {
    pub(crate) fn new(name: String, doc: String, pos: Position) -> Self {
        Self {
            name,
            doc,
            pos,
            code: Vec::new(),
            pclinetab: Vec::new(),
            locals: Vec::new(),
            cells: Vec::new(),
            freevars: Vec::new(),
            max_stack: 0,
            num_params: 0,
            num_kwonly: 0,
            has_varargs: false,
            has_kwargs: false,
            positions: OnceCell::new(),
        }
    }

    /// Source position of the instruction at `pc`.
    pub fn position(&self, pc: u32) -> Position {
        let rows = self.positions.get_or_init(|| decode_line_table(&self.pclinetab, self.pos));
        let i = rows.partition_point(|&(row_pc, _)| row_pc <= pc);
        if i == 0 { self.pos } else { rows[i - 1].1 }
    }

    /// Replays every reachable path through the code and returns the
    /// maximum operand stack depth, failing on underflow, on a depth
    /// mismatch at a join point, or on malformed instructions.
    pub fn check_stack(&self) -> Result<usize> {
        let mut depth_at: Vec<Option<i32>> = vec![None; self.code.len() + 1];
        let mut work = vec![(0usize, 0i32)];
        let mut max = 0i32;
        while let Some((pc, depth)) = work.pop() {
            if pc >= self.code.len() {
                bail!("{}: control falls off the end of the code", self.name);
            }
            match depth_at[pc] {
                Some(d) if d == depth => continue,
                Some(d) => bail!("{}: stack depth mismatch at pc {pc}: {d} vs {depth}", self.name),
                None => depth_at[pc] = Some(depth),
            }
            let (op, arg, next) = decode_insn(&self.code, pc)?;
            let after = depth + op.effect(arg);
            if after < 0 {
                bail!("{}: stack underflow at pc {pc} ({op})", self.name);
            }
            max = max.max(after);
            match op {
                Opcode::Return => {}
                Opcode::Jmp => work.push((arg as usize, after)),
                Opcode::Cjmp => {
                    work.push((arg as usize, after));
                    work.push((next, after));
                }
                Opcode::IterJmp => {
                    max = max.max(after + 1);
                    work.push((arg as usize, after));
                    work.push((next, after + 1));
                }
                _ => work.push((next, after)),
            }
        }
        Ok(max as usize)
    }

    /// Human-readable listing of the instructions.
    pub fn disassemble(&self, program: &Program) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "function {} ({}:{}):", self.name, program.filename, self.pos);
        let _ = writeln!(
            out,
            "  params={} kwonly={} varargs={} kwargs={} max_stack={}",
            self.num_params, self.num_kwonly, self.has_varargs, self.has_kwargs, self.max_stack
        );
        let mut pc = 0;
        while pc < self.code.len() {
            let Ok((op, arg, next)) = decode_insn(&self.code, pc) else {
                let _ = writeln!(out, "  {pc:4}\t<invalid {:#04x}>", self.code[pc]);
                break;
            };
            if op == Opcode::Nop {
                // jump padding
                pc = next;
                continue;
            }
            if !op.has_arg() {
                let _ = writeln!(out, "  {pc:4}\t{op}");
            } else {
                let comment = self.describe_arg(program, op, arg);
                if comment.is_empty() {
                    let _ = writeln!(out, "  {pc:4}\t{op} {arg}");
                } else {
                    let _ = writeln!(out, "  {pc:4}\t{op} {arg}\t; {comment}");
                }
            }
            pc = next;
        }
        out
    }

    fn describe_arg(&self, program: &Program, op: Opcode, arg: u32) -> String {
        let i = arg as usize;
        let name = |v: Option<&String>| v.cloned().unwrap_or_else(|| "?".to_string());
        match op {
            Opcode::Constant => program
                .constants
                .get(i)
                .map(|c| c.to_value().repr())
                .unwrap_or_else(|| "?".to_string()),
            Opcode::Local | Opcode::SetLocal | Opcode::LocalCell | Opcode::SetLocalCell => {
                name(self.locals.get(i).map(|b| &b.name))
            }
            Opcode::Free | Opcode::FreeCell => name(self.freevars.get(i).map(|b| &b.name)),
            Opcode::Global | Opcode::SetGlobal => name(program.globals.get(i).map(|b| &b.name)),
            Opcode::Attr | Opcode::SetField | Opcode::Predeclared | Opcode::Universal => {
                name(program.names.get(i))
            }
            Opcode::MakeFunc => name(program.functions.get(i).map(|f| &f.name)),
            Opcode::Call | Opcode::CallVar | Opcode::CallKw | Opcode::CallVarKw => {
                format!("positional={} named={}", arg >> 8, arg & 0xff)
            }
            _ => String::new(),
        }
    }
}

impl Opcode {
    /// Stack effect of this instruction with operand `arg`. `ITERJMP` is
    /// given for its jump edge; the fall-through edge pushes one more.
    pub fn effect(self, arg: u32) -> i32 {
        let arg = arg as i32;
        match self {
            Opcode::IterJmp => 0,
            Opcode::MakeTuple | Opcode::MakeList => 1 - arg,
            Opcode::Unpack => arg - 1,
            Opcode::Call => -(2 * (arg & 0xff) + (arg >> 8)),
            Opcode::CallVar | Opcode::CallKw => -(2 * (arg & 0xff) + (arg >> 8)) - 1,
            Opcode::CallVarKw => -(2 * (arg & 0xff) + (arg >> 8)) - 2,
            op => op.stack_effect(),
        }
    }
}

/// Decodes the instruction at `pc`: opcode, operand (zero if none) and the
/// pc of the next instruction.
pub fn decode_insn(code: &[u8], pc: usize) -> Result<(Opcode, u32, usize)> {
    let Some(op) = Opcode::from_byte(code[pc]) else {
        bail!("invalid opcode {:#04x} at pc {pc}", code[pc]);
    };
    let mut next = pc + 1;
    let mut arg = 0u32;
    if op.has_arg() {
        let mut shift = 0;
        loop {
            let Some(&b) = code.get(next) else {
                bail!("truncated operand at pc {pc}");
            };
            next += 1;
            if shift >= 32 {
                bail!("operand too long at pc {pc}");
            }
            arg |= u32::from(b & 0x7f) << shift;
            if b < 0x80 {
                break;
            }
            shift += 7;
        }
    }
    Ok((op, arg, next))
}

/// Appends little-endian base-128 `x` to `code`.
pub(crate) fn encode_varint(code: &mut Vec<u8>, mut x: u32) {
    while x >= 0x80 {
        code.push(0x80 | (x & 0x7f) as u8);
        x >>= 7;
    }
    code.push(x as u8);
}

/// Length in bytes of the varint encoding of `x`.
pub(crate) fn varint_len(mut x: u32) -> usize {
    let mut n = 1;
    while x >= 0x80 {
        n += 1;
        x >>= 7;
    }
    n
}

/// Builds the position table as instructions are emitted.
///
/// Each row is a 16-bit record `Δpc:4 | Δline:5 | Δcol:6 | incomplete:1`,
/// relative to the previous row (starting at pc 0 and the function's own
/// position). Deltas that do not fit are clipped and the record is marked
/// incomplete; further records continue from the clipped state until the
/// target row is reached.
#[derive(Debug)]
pub(crate) struct LineTableWriter {
    pc: u32,
    line: i32,
    col: i32,
    table: Vec<u16>,
}

fn clip(x: i32, min: i32, max: i32) -> (i32, bool) {
    if x < min {
        (min, false)
    } else if x > max {
        (max, false)
    } else {
        (x, true)
    }
}

impl LineTableWriter {
    pub(crate) fn new(start: Position) -> Self {
        Self {
            pc: 0,
            line: start.line as i32,
            col: start.column as i32,
            table: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, pc: u32, pos: Position) {
        loop {
            let mut incomplete = 0u16;

            let mut dpc = pc - self.pc;
            if dpc > 0x0f {
                dpc = 0x0f;
                incomplete = 1;
            }
            self.pc += dpc;

            let (dline, ok) = clip(pos.line as i32 - self.line, -0x10, 0x0f);
            if !ok {
                incomplete = 1;
            }
            self.line += dline;

            let (dcol, ok) = clip(pos.column as i32 - self.col, -0x20, 0x1f);
            if !ok {
                incomplete = 1;
            }
            self.col += dcol;

            let entry = (dpc as u16) << 12 | ((dline as u16) & 0x1f) << 7 | ((dcol as u16) & 0x3f) << 1 | incomplete;
            self.table.push(entry);
            if incomplete == 0 {
                break;
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<u16> {
        self.table
    }
}

/// Expands the table into `(pc, position)` rows sorted by pc.
pub(crate) fn decode_line_table(table: &[u16], start: Position) -> Vec<(u32, Position)> {
    let mut rows = Vec::new();
    let (mut pc, mut line, mut col) = (0u32, start.line as i32, start.column as i32);
    for &x in table {
        pc += u32::from(x >> 12);
        line += i32::from(((x as i16) << 4) >> 11);
        col += i32::from(((x as i16) << 9) >> 10);
        if x & 1 == 0 {
            rows.push((pc, Position::new(line.max(0) as u32, col.max(0) as u32)));
        }
    }
    rows
}

/// Everything compiled from one source file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Program {
    pub filename: String,
    pub options: FileOptions,
    /// Modules named by `load` statements, in order.
    pub loads: Vec<NameBinding>,
    /// Attribute, predeclared and universal names referenced by the code.
    pub names: Vec<String>,
    pub constants: Vec<Constant>,
    /// Nested functions; `MAKEFUNC i` refers to `functions[i]`.
    pub functions: Vec<Arc<Funcode>>,
    pub globals: Vec<NameBinding>,
    pub toplevel: Arc<Funcode>,
}

impl Program {
    /// Names of the modules this program loads.
    pub fn load_names(&self) -> impl Iterator<Item = &str> {
        self.loads.iter().map(|l| l.name.as_str())
    }

    /// Toplevel followed by nested functions in compilation order.
    pub fn funcodes(&self) -> impl Iterator<Item = &Arc<Funcode>> {
        std::iter::once(&self.toplevel).chain(self.functions.iter())
    }

    pub fn disassemble(&self) -> String {
        self.funcodes().map(|fc| fc.disassemble(self)).collect::<Vec<_>>().join("\n")
    }
}
