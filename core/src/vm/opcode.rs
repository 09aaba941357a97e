//! Instruction set.
//!
//! Every instruction is one opcode byte; opcodes at or above [`Opcode::Jmp`]
//! are followed by a varint operand. Changing this file (or the operand and
//! line-table encodings) requires bumping [`BYTECODE_VERSION`].

use strum::{Display, FromRepr};

/// Version stamp of the instruction set and encoding.
pub const BYTECODE_VERSION: u16 = 1;

/// Sentinel for "varies with the operand" in [`Opcode::stack_effect`].
pub const VARIABLE_STACK_EFFECT: i32 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, Display)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,

    // stack operations
    Dup,
    Dup2,
    Pop,
    Exch,

    // binary comparisons
    Lt,
    Gt,
    Ge,
    Le,
    Eql,
    Neq,

    // binary arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Amp,
    Pipe,
    Circumflex,
    LtLt,
    GtGt,

    In,

    // unary operators
    Uplus,
    Uminus,
    Tilde,

    None,
    True,
    False,
    Mandatory,

    IterPush,
    IterPop,
    Not,
    Return,
    SetIndex,
    Index,
    SetDict,
    SetDictUniq,
    Append,
    Slice,
    #[strum(serialize = "INPLACE_ADD")]
    InplaceAdd,
    #[strum(serialize = "INPLACE_PIPE")]
    InplacePipe,
    MakeDict,

    // --- opcodes with an operand must go below this line ---
    Jmp,
    Cjmp,
    IterJmp,
    Constant,
    MakeTuple,
    MakeList,
    MakeFunc,
    Load,
    SetLocal,
    SetGlobal,
    Local,
    Free,
    FreeCell,
    LocalCell,
    SetLocalCell,
    Global,
    Predeclared,
    Universal,
    Attr,
    SetField,
    Unpack,

    // n>>8 is #positional args and n&0xff is #named args (pairs).
    Call,
    #[strum(serialize = "CALL_VAR")]
    CallVar,
    #[strum(serialize = "CALL_KW")]
    CallKw,
    #[strum(serialize = "CALL_VAR_KW")]
    CallVarKw,
}

impl Opcode {
    pub const OPCODE_ARG_MIN: Opcode = Opcode::Jmp;
    pub const OPCODE_MAX: Opcode = Opcode::CallVarKw;

    #[inline]
    pub fn from_byte(b: u8) -> Option<Opcode> {
        Opcode::from_repr(b)
    }

    #[inline]
    pub fn has_arg(self) -> bool {
        self >= Opcode::OPCODE_ARG_MIN
    }

    /// Net change in operand stack depth, or [`VARIABLE_STACK_EFFECT`].
    pub fn stack_effect(self) -> i32 {
        use Opcode::*;
        match self {
            Nop | Exch | Uplus | Uminus | Tilde | Not | Attr | IterPop | Jmp | MakeFunc => 0,
            Dup | None | True | False | Mandatory | Constant | MakeDict | Local | Free | FreeCell | LocalCell
            | Global | Predeclared | Universal => 1,
            Dup2 => 2,
            Pop | Lt | Gt | Ge | Le | Eql | Neq | Plus | Minus | Star | Slash | SlashSlash | Percent | Amp
            | Pipe | Circumflex | LtLt | GtGt | In | IterPush | Return | Index | InplaceAdd | InplacePipe
            | Cjmp | Load | SetLocal | SetGlobal | SetLocalCell => -1,
            Append | SetField => -2,
            SetIndex | SetDict | SetDictUniq | Slice => -3,
            IterJmp | MakeTuple | MakeList | Unpack | Call | CallVar | CallKw | CallVarKw => VARIABLE_STACK_EFFECT,
        }
    }
}
