use tracing::debug;

use super::driver::ProgramBuilder;
use crate::resolve::{BindingId, Scope};
use crate::token::Position;
use crate::vm::opcode::Opcode;
use crate::vm::program::{Funcode, LineTableWriter, NameBinding, encode_varint, varint_len};

/// Width of a patched jump operand: varint plus NOP padding.
const JUMP_OPERAND_LEN: usize = 4;

/// Index of a basic block in [`FunctionBuilder`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BlockId(usize);

#[derive(Debug, Clone, Copy)]
struct Insn {
    op: Opcode,
    arg: u32,
    pos: Option<Position>,
}

/// A basic block.
///
/// If the last instruction is `RETURN`, both successors are `None`. If it is
/// `CJMP` or `ITERJMP`, `cjmp` is the taken edge and `jmp` the fall-through.
/// Otherwise `jmp` is the only successor.
#[derive(Debug, Default)]
struct Block {
    insns: Vec<Insn>,
    jmp: Option<BlockId>,
    cjmp: Option<BlockId>,
    initial_stack: Option<i32>,
    /// Position in the linear order, once placed.
    index: Option<usize>,
    addr: u32,
}

/// Targets of `break` and `continue` in the innermost loop.
#[derive(Debug, Clone, Copy)]
pub(super) struct Loop {
    pub(super) break_to: BlockId,
    pub(super) continue_to: BlockId,
}

/// Compiles one function body into a control-flow graph, then lays the graph
/// out as bytecode.
pub(crate) struct FunctionBuilder<'a, 'r> {
    pub(super) pcomp: &'a mut ProgramBuilder<'r>,
    blocks: Vec<Block>,
    current: BlockId,
    /// Position attached to the next emitted instruction.
    pos: Option<Position>,
    pub(super) loops: Vec<Loop>,
    funcode: Funcode,
}

/// Running state of the layout pass.
#[derive(Default)]
struct Layout {
    pc: u32,
    order: Vec<BlockId>,
    max_stack: i32,
}

impl<'a, 'r> FunctionBuilder<'a, 'r> {
    pub(super) fn new(
        pcomp: &'a mut ProgramBuilder<'r>,
        mut funcode: Funcode,
        locals: &[BindingId],
        freevars: &[BindingId],
    ) -> Self {
        let resolution = pcomp.resolution;
        let describe = |&id: &BindingId| {
            let b = resolution.binding(id);
            NameBinding {
                name: b.name.clone(),
                pos: b.first.unwrap_or_default(),
            }
        };
        funcode.locals = locals.iter().map(describe).collect();
        funcode.freevars = freevars.iter().map(describe).collect();
        funcode.cells = locals
            .iter()
            .enumerate()
            .filter(|&(_, &id)| resolution.binding(id).scope == Scope::Cell)
            .map(|(i, _)| i)
            .collect();

        Self {
            pcomp,
            blocks: vec![Block::default()],
            current: BlockId(0),
            pos: None,
            loops: Vec::new(),
            funcode,
        }
    }

    pub(super) fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId(self.blocks.len() - 1)
    }

    /// Makes `b` the block that receives emitted instructions.
    pub(super) fn set_block(&mut self, b: BlockId) {
        self.current = b;
    }

    pub(super) fn set_pos(&mut self, pos: Position) {
        self.pos = Some(pos);
    }

    pub(super) fn emit(&mut self, op: Opcode) {
        assert!(!op.has_arg(), "internal compiler error: {op} needs an operand");
        self.push_insn(op, 0);
    }

    pub(super) fn emit1(&mut self, op: Opcode, arg: u32) {
        assert!(op.has_arg(), "internal compiler error: {op} takes no operand");
        self.push_insn(op, arg);
    }

    fn push_insn(&mut self, op: Opcode, arg: u32) {
        let pos = self.pos.take();
        self.blocks[self.current.0].insns.push(Insn { op, arg, pos });
    }

    /// Emits `RETURN`. Anything emitted afterwards lands in an unreachable block.
    pub(super) fn emit_return(&mut self) {
        self.emit(Opcode::Return);
        let dead = self.new_block();
        self.set_block(dead);
    }

    /// Ends the current block with an unconditional edge to `b`. Nothing may
    /// be emitted until the next [`set_block`](Self::set_block).
    pub(super) fn jump(&mut self, b: BlockId) {
        assert_ne!(b, self.current, "internal compiler error: self-jump");
        self.blocks[self.current.0].jmp = Some(b);
    }

    /// Ends the current block with `op` (`CJMP` or `ITERJMP`): control goes
    /// to `t` when the jump is taken and to `f` otherwise.
    pub(super) fn condjump(&mut self, op: Opcode, t: BlockId, f: BlockId) {
        assert!(
            matches!(op, Opcode::Cjmp | Opcode::IterJmp),
            "internal compiler error: {op} is not a conditional jump"
        );
        self.emit1(op, 0); // patched during layout
        self.blocks[self.current.0].cjmp = Some(t);
        self.jump(f);
    }

    /// Interns a string constant and pushes it.
    pub(super) fn string(&mut self, s: &str) {
        let index = self.pcomp.constant_str(s);
        self.emit1(Opcode::Constant, index);
    }

    /// Terminates the body, lays out the blocks and encodes the function.
    ///
    /// Panics if the graph is inconsistent; the resolver rejects every
    /// program that could cause that, so it indicates a compiler bug.
    pub(super) fn finish(mut self) -> Funcode {
        self.emit(Opcode::None);
        self.emit(Opcode::Return);

        let mut layout = Layout::default();
        self.set_initial_stack(BlockId(0), 0);
        self.visit(BlockId(0), &mut layout);
        self.funcode.max_stack = layout.max_stack as usize;
        self.generate(&layout);

        debug!(
            name = %self.funcode.name,
            code_len = self.funcode.code.len(),
            max_stack = self.funcode.max_stack,
            "compiled function"
        );
        self.funcode
    }

    fn set_initial_stack(&mut self, b: BlockId, depth: i32) {
        let block = &mut self.blocks[b.0];
        match block.initial_stack {
            None => block.initial_stack = Some(depth),
            Some(d) if d == depth => {}
            Some(d) => panic!(
                "internal compiler error: {}: stack depth mismatch at block {}: {d} vs {depth}",
                self.funcode.name, b.0
            ),
        }
    }

    /// Skips over empty blocks, which only ever forward to their `jmp`.
    fn thread(&self, mut b: BlockId) -> BlockId {
        while self.blocks[b.0].insns.is_empty() {
            b = self.blocks[b.0]
                .jmp
                .expect("internal compiler error: empty block without successor");
        }
        b
    }

    /// Places `b` and everything reachable from it, depth first, preferring
    /// the fall-through successor so it needs no explicit jump.
    fn visit(&mut self, b: BlockId, layout: &mut Layout) {
        if self.blocks[b.0].index.is_some() {
            return;
        }
        let index = layout.order.len();
        layout.order.push(b);
        let block = &mut self.blocks[b.0];
        block.index = Some(index);
        block.addr = layout.pc;

        let mut stack = block.initial_stack.expect("block reached without a stack depth");
        let mut iterjmp = 0;
        for insn in &block.insns {
            layout.pc += 1;
            if insn.op.has_arg() {
                layout.pc += match insn.op {
                    Opcode::Cjmp | Opcode::IterJmp => JUMP_OPERAND_LEN as u32,
                    _ => varint_len(insn.arg) as u32,
                };
            }
            if insn.op == Opcode::IterJmp {
                iterjmp = 1;
            }
            stack += insn.op.effect(insn.arg);
            if stack < 0 {
                panic!("internal compiler error: {}: stack underflow at pc {}", self.funcode.name, layout.pc);
            }
            layout.max_stack = layout.max_stack.max(stack + iterjmp);
        }

        if let Some(jmp) = self.blocks[b.0].jmp {
            let jmp = self.thread(jmp);
            self.blocks[b.0].jmp = Some(jmp);
            self.set_initial_stack(jmp, stack + iterjmp);
            if self.blocks[jmp.0].index.is_none() {
                self.visit(jmp, layout);
            } else {
                // backward JMP
                layout.pc += 1 + JUMP_OPERAND_LEN as u32;
            }
        }

        if let Some(cjmp) = self.blocks[b.0].cjmp {
            let cjmp = self.thread(cjmp);
            self.blocks[b.0].cjmp = Some(cjmp);
            self.set_initial_stack(cjmp, stack);
            self.visit(cjmp, layout);
            let addr = self.blocks[cjmp.0].addr;
            let last = self.blocks[b.0]
                .insns
                .last_mut()
                .expect("conditional block has a jump instruction");
            last.arg = addr;
        }
    }

    fn generate(&mut self, layout: &Layout) {
        let mut code = Vec::with_capacity(layout.pc as usize);
        let mut lines = LineTableWriter::new(self.funcode.pos);

        for &b in &layout.order {
            let block = &self.blocks[b.0];
            for insn in &block.insns {
                if let Some(pos) = insn.pos {
                    lines.add(code.len() as u32, pos);
                }
                code.push(insn.op as u8);
                if insn.op.has_arg() {
                    match insn.op {
                        Opcode::Cjmp | Opcode::IterJmp => encode_padded(&mut code, insn.arg),
                        _ => encode_varint(&mut code, insn.arg),
                    }
                }
            }
            if let Some(jmp) = block.jmp {
                let target = &self.blocks[jmp.0];
                if target.index != block.index.map(|i| i + 1) {
                    code.push(Opcode::Jmp as u8);
                    encode_padded(&mut code, target.addr);
                }
            }
        }

        assert_eq!(
            code.len(),
            layout.pc as usize,
            "internal compiler error: {}: wrong code length",
            self.funcode.name
        );
        self.funcode.code = code;
        self.funcode.pclinetab = lines.finish();
    }
}

/// Encodes a jump address in exactly [`JUMP_OPERAND_LEN`] bytes.
fn encode_padded(code: &mut Vec<u8>, addr: u32) {
    let end = code.len() + JUMP_OPERAND_LEN;
    encode_varint(code, addr);
    assert!(code.len() <= end, "internal compiler error: jump address {addr} too large");
    code.resize(end, Opcode::Nop as u8);
}
