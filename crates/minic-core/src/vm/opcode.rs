// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Instruction set definitions.

use std::fmt;

use super::Word;

/// Operation codes for the VM.
///
/// Opcodes are stored in the text segment as plain words; an opcode that
/// takes an operand is followed by exactly one operand word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Operand-carrying instructions
    /// ax = bp - operand
    Lea,
    /// ax = operand
    Imm,
    /// pc = operand
    Jmp,
    /// Push the return address, then pc = operand
    Call,
    /// Jump if ax is zero
    Jz,
    /// Jump if ax is non-zero
    Jnz,
    /// Open a frame with `operand` local slots
    Ent,
    /// Drop `operand` stack words
    Adj,

    // Frame and memory
    /// Close the current frame and return
    Lev,
    /// ax = memory[ax]
    Li,
    /// memory[ax] = pop
    Si,
    /// Push ax
    Push,

    // Binary operators: left operand popped, right operand in ax
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Bitwise and
    And,
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less than or equal
    Le,
    /// Greater than or equal
    Ge,
    /// Add
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Remainder
    Mod,

    /// Placeholder written where a back-patch is still pending
    Plac,

    // System-call traps; the operand is the argument count
    /// open(path, flags)
    Open,
    /// read(fd, buf, count)
    Read,
    /// close(fd)
    Close,
    /// printf(format, ...)
    Printf,
    /// malloc(words)
    Malloc,
    /// free(ptr)
    Free,
    /// memset(ptr, value, count)
    Memset,
    /// memcmp(a, b, count)
    Memcmp,

    /// Halt; ax is the program result
    Exit,
}

impl OpCode {
    /// Every opcode, indexed by its word encoding.
    pub const ALL: [OpCode; 36] = [
        OpCode::Lea,
        OpCode::Imm,
        OpCode::Jmp,
        OpCode::Call,
        OpCode::Jz,
        OpCode::Jnz,
        OpCode::Ent,
        OpCode::Adj,
        OpCode::Lev,
        OpCode::Li,
        OpCode::Si,
        OpCode::Push,
        OpCode::Or,
        OpCode::Xor,
        OpCode::And,
        OpCode::Eq,
        OpCode::Ne,
        OpCode::Lt,
        OpCode::Gt,
        OpCode::Le,
        OpCode::Ge,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Plac,
        OpCode::Open,
        OpCode::Read,
        OpCode::Close,
        OpCode::Printf,
        OpCode::Malloc,
        OpCode::Free,
        OpCode::Memset,
        OpCode::Memcmp,
        OpCode::Exit,
    ];

    /// The word this opcode is encoded as.
    pub fn word(self) -> Word {
        self as u8 as Word
    }

    /// Decodes a word, if it is an opcode.
    pub fn from_word(word: Word) -> Option<Self> {
        usize::try_from(word)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }

    /// True if an operand word follows this opcode.
    pub fn has_operand(self) -> bool {
        self <= OpCode::Adj || self.is_system_call()
    }

    /// True for the host-level trap instructions.
    pub fn is_system_call(self) -> bool {
        (OpCode::Open..=OpCode::Memcmp).contains(&self)
    }

    /// The assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Lea => "LEA",
            OpCode::Imm => "IMM",
            OpCode::Jmp => "JMP",
            OpCode::Call => "CALL",
            OpCode::Jz => "JZ",
            OpCode::Jnz => "JNZ",
            OpCode::Ent => "ENT",
            OpCode::Adj => "ADJ",
            OpCode::Lev => "LEV",
            OpCode::Li => "LI",
            OpCode::Si => "SI",
            OpCode::Push => "PUSH",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::And => "AND",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Gt => "GT",
            OpCode::Le => "LE",
            OpCode::Ge => "GE",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Plac => "PLAC",
            OpCode::Open => "OPEN",
            OpCode::Read => "READ",
            OpCode::Close => "CLOSE",
            OpCode::Printf => "PRINTF",
            OpCode::Malloc => "MALLOC",
            OpCode::Free => "FREE",
            OpCode::Memset => "MEMSET",
            OpCode::Memcmp => "MEMCMP",
            OpCode::Exit => "EXIT",
        }
    }
}

impl PartialOrd for OpCode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpCode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A built-in function implemented by a trap instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemCall {
    /// Name visible to source programs
    pub name: &'static str,
    /// Trap instruction
    pub opcode: OpCode,
    /// Fixed argument count, `None` for variadic calls
    pub arity: Option<usize>,
}

/// The system calls pre-declared for every program.
pub const SYSTEM_CALLS: [SystemCall; 8] = [
    SystemCall { name: "open", opcode: OpCode::Open, arity: Some(2) },
    SystemCall { name: "read", opcode: OpCode::Read, arity: Some(3) },
    SystemCall { name: "close", opcode: OpCode::Close, arity: Some(1) },
    SystemCall { name: "printf", opcode: OpCode::Printf, arity: None },
    SystemCall { name: "malloc", opcode: OpCode::Malloc, arity: Some(1) },
    SystemCall { name: "free", opcode: OpCode::Free, arity: Some(1) },
    SystemCall { name: "memset", opcode: OpCode::Memset, arity: Some(3) },
    SystemCall { name: "memcmp", opcode: OpCode::Memcmp, arity: Some(3) },
];

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional operand
    pub operand: Option<Word>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Word) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }

    /// Decodes the instruction at the start of `words`, returning it together
    /// with the number of words it occupies.
    pub fn decode(words: &[Word]) -> Option<(Self, usize)> {
        let opcode = OpCode::from_word(*words.first()?)?;
        if opcode.has_operand() {
            let operand = *words.get(1)?;
            Some((Self::with_operand(opcode, operand), 2))
        } else {
            Some((Self::simple(opcode), 1))
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(operand) => write!(f, "{:<6} {}", self.opcode.mnemonic(), operand),
            None => f.write_str(self.opcode.mnemonic()),
        }
    }
}
