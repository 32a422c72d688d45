// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for compilation and execution.

use std::fmt;

use thiserror::Error;

use crate::vm::{Segment, Status, Word};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A 1-based line/column location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line number, starting at 1
    pub line: usize,
    /// Column number (in characters), starting at 1
    pub column: usize,
}

impl Position {
    /// Computes the position of a byte offset inside `source`.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every failure the compiler or the virtual machine can report.
///
/// All errors are fatal: the first one aborts the current compilation or run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A `/*` comment was never closed.
    #[error("{position}: unterminated block comment")]
    UnterminatedComment {
        /// Where the comment starts
        position: Position,
    },

    /// No token class matched, or the parser expected a different token.
    #[error("{position}: unexpected symbol `{found}`, expected {expected}")]
    UnexpectedSymbol {
        /// Text of the offending token or character
        found: String,
        /// Description of the expected token class
        expected: String,
        /// Location of the offending token
        position: Position,
    },

    /// The same name was declared twice in one scope.
    #[error("{position}: `{name}` is already declared in this scope")]
    DuplicateDeclaration {
        /// The redeclared name
        name: String,
        /// Location of the second declaration
        position: Position,
    },

    /// An identifier is not declared in any active scope.
    #[error("{position}: `{name}` is not defined")]
    UndefinedName {
        /// The unresolved name
        name: String,
        /// Location of the use
        position: Position,
    },

    /// A call passed the wrong number of arguments.
    #[error("{position}: `{name}` takes {expected} argument(s), {found} given")]
    ArgumentCount {
        /// Callee name
        name: String,
        /// Declared parameter count
        expected: usize,
        /// Arguments supplied
        found: usize,
        /// Location of the call
        position: Position,
    },

    /// A memory segment has no room left.
    #[error("{segment} segment is full")]
    SegmentFull {
        /// The exhausted segment
        segment: Segment,
    },

    /// The requested pool cannot hold all segments.
    #[error("memory pool of {words} words is too small")]
    PoolTooSmall {
        /// Requested pool size
        words: usize,
    },

    /// Load, store, fetch or jump outside the permitted region.
    #[error("invalid memory access at address {address} (pc = {pc})")]
    InvalidMemoryAccess {
        /// The faulting address
        address: Word,
        /// Address of the faulting instruction
        pc: usize,
    },

    /// `DIV` or `MOD` with a zero right operand.
    #[error("division by zero (pc = {pc})")]
    DivisionByZero {
        /// Address of the faulting instruction
        pc: usize,
    },

    /// The fetched word is not an opcode.
    #[error("unknown opcode {opcode} (pc = {pc})")]
    UnknownOpcode {
        /// The fetched word
        opcode: Word,
        /// Address of the faulting instruction
        pc: usize,
    },

    /// A placeholder marker was executed, so a back-patch was missed.
    #[error("executed an unpatched placeholder (pc = {pc})")]
    UnpatchedPlaceholder {
        /// Address of the placeholder
        pc: usize,
    },

    /// The call stack ran into the heap segment.
    #[error("stack overflow (pc = {pc})")]
    StackOverflow {
        /// Address of the faulting instruction
        pc: usize,
    },

    /// The configured instruction budget was used up.
    #[error("execution exceeded {limit} cycles")]
    CycleLimitExceeded {
        /// The configured limit
        limit: u64,
    },

    /// The machine cannot perform `operation` in its current state.
    #[error("cannot {operation} while the machine is {state}")]
    InvalidState {
        /// Current machine state
        state: Status,
        /// The refused operation
        operation: &'static str,
    },
}
