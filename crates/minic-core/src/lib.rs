// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # minic-core
//!
//! A single-pass compiler for a small C-like language and the stack virtual
//! machine that runs its output.
//!
//! ## Overview
//!
//! - Lexer driven by an ordered table of token classes
//! - Scoped symbol table
//! - Recursive-descent parser that emits bytecode while it parses
//! - Word-addressed virtual machine with text, data, heap and stack segments
//!   and a handful of host system calls
//!
//! ## Quick Start
//!
//! ```rust
//! use minic_core::Engine;
//!
//! let mut engine = Engine::new()?;
//! let result = engine.eval("int main() { return 2 + 3 * 4; }")?;
//! assert_eq!(result, 14);
//! # Ok::<(), minic_core::Error>(())
//! ```

#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod vm;

pub use ast::SyntaxNode;
pub use compiler::{Program, Symbol, SymbolClass, compile};
pub use error::{Error, Position, Result};
pub use vm::{DEFAULT_POOL_SIZE, OpCode, Status, VirtualMachine, Word};

use std::io::Write;

/// Owns one virtual machine and runs programs on it.
///
/// Every compilation starts from an empty text and data segment, so programs
/// compiled by the same engine do not see each other.
#[derive(Debug)]
pub struct Engine {
    vm: VirtualMachine,
    trace: bool,
}

impl Engine {
    /// Creates an engine with the default pool size.
    pub fn new() -> Result<Self> {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    /// Creates an engine whose machine has `pool_size` words.
    pub fn with_pool_size(pool_size: usize) -> Result<Self> {
        Ok(Self {
            vm: VirtualMachine::new(pool_size)?,
            trace: false,
        })
    }

    /// Redirects program output.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.vm.set_output(output);
        self
    }

    /// Enables per-instruction tracing.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Limits the number of instructions a run may execute.
    pub fn set_max_cycles(&mut self, limit: Option<u64>) {
        self.vm.set_max_cycles(limit);
    }

    /// Discards whatever the machine holds and compiles `source` into it.
    pub fn compile(&mut self, source: &str) -> Result<Program> {
        self.vm.clear();
        compile(source, &mut self.vm)
    }

    /// Runs a program compiled by this engine from fresh registers.
    pub fn run(&mut self, program: &Program) -> Result<Word> {
        self.vm.reset();
        self.vm.run_from(program.entry, self.trace)
    }

    /// Compiles and runs `source`, returning what `main` returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use minic_core::Engine;
    /// let mut engine = Engine::new()?;
    /// let source = "int fact(int n) { if (n < 2) return 1; return n * fact(n - 1); }
    ///               int main() { return fact(5); }";
    /// assert_eq!(engine.eval(source)?, 120);
    /// # Ok::<(), minic_core::Error>(())
    /// ```
    pub fn eval(&mut self, source: &str) -> Result<Word> {
        let program = self.compile(source)?;
        self.run(&program)
    }

    /// The underlying machine.
    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new().unwrap();
        assert_eq!(engine.vm().status(), Status::Idle);
        assert_eq!(engine.vm().layout().pool_size(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_engine_pool_too_small() {
        assert!(matches!(
            Engine::with_pool_size(4),
            Err(Error::PoolTooSmall { words: 4 })
        ));
    }

    #[test]
    fn test_eval_arithmetic() {
        let mut engine = Engine::new().unwrap();
        assert_eq!(engine.eval("int main() { return 2 + 3 * 4; }").unwrap(), 14);
    }

    #[test]
    fn test_eval_twice_is_independent() {
        let mut engine = Engine::new().unwrap();
        assert_eq!(engine.eval("int g = 5; int main() { return g; }").unwrap(), 5);
        assert_eq!(engine.eval("int main() { return 9; }").unwrap(), 9);
        assert_eq!(engine.vm().status(), Status::Halted);
    }

    #[test]
    fn test_run_compiled_program_again() {
        let mut engine = Engine::new().unwrap();
        let program = engine.compile("int main() { return 3; }").unwrap();
        assert_eq!(engine.run(&program).unwrap(), 3);
        assert_eq!(engine.run(&program).unwrap(), 3);
    }

    #[test]
    fn test_compile_error_surfaces() {
        let mut engine = Engine::new().unwrap();
        assert!(matches!(
            engine.eval("int main() { return y; }"),
            Err(Error::UndefinedName { .. })
        ));
    }
}
