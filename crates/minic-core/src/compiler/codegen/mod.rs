// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-pass code generation.
//!
//! The `Compiler` parses by recursive descent and writes instructions into
//! the virtual machine's text segment as it goes; there is no separate tree
//! walk. Forward references (jump targets, frame sizes, calls to prototypes)
//! are emitted as placeholders and back-patched once the target is known.
//!
//! Start-up code is threaded through the text segment: compilation opens
//! with `JMP <pending>`, every global initializer patches the pending jump to
//! itself and ends with a new pending jump, and the last one is patched to
//! `CALL main; EXIT`.

mod expressions;
mod scope;
mod statements;

#[cfg(test)]
mod tests;

pub use scope::{BUILTIN_LEVEL, DataType, GLOBAL_LEVEL, ScopeId, Symbol, SymbolClass, SymbolTable};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{Rule, SyntaxNode, TreeBuilder};
use crate::error::{Error, Position, Result};
use crate::lexer::{Scanner, Token, TokenKind};
use crate::vm::{OpCode, SYSTEM_CALLS, VirtualMachine, Word};

/// The result of compiling one source text.
#[derive(Debug, Clone)]
pub struct Program {
    /// Address of the start-up jump; run from here
    pub entry: usize,
    /// Every declared symbol, built-ins included, in declaration order
    pub symbols: Vec<Symbol>,
    /// Syntax tree recorded during parsing
    pub tree: SyntaxNode,
}

/// A placeholder word in the text segment waiting for its value.
#[must_use = "a placeholder must be patched before the program runs"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite(usize);

impl PatchSite {
    /// Text address of the placeholder.
    pub fn address(self) -> usize {
        self.0
    }
}

/// Local slot bookkeeping for the function being compiled.
#[derive(Debug, Default)]
struct Frame {
    /// Highest slot in use in the current block
    next_slot: Word,
    /// Highest slot used anywhere in the function
    max_slots: Word,
}

impl Frame {
    fn allocate(&mut self) -> Word {
        self.next_slot += 1;
        self.max_slots = self.max_slots.max(self.next_slot);
        self.next_slot
    }
}

/// Compiles source text straight into a virtual machine.
pub struct Compiler<'src, 'vm> {
    source: &'src str,
    scanner: Scanner<'src>,
    /// One-token lookahead
    current: Token,
    vm: &'vm mut VirtualMachine,
    symbols: SymbolTable,
    tree: TreeBuilder,
    /// Pending jump at the end of the start-up chain
    startup: PatchSite,
    entry: usize,
    /// `None` outside function bodies
    frame: Option<Frame>,
    /// Calls to prototypes, patched when the body is compiled
    pending_calls: FxHashMap<String, Vec<PatchSite>>,
}

/// Compiles `source` into `vm`, returning the entry point, the symbol table
/// and the syntax tree.
pub fn compile(source: &str, vm: &mut VirtualMachine) -> Result<Program> {
    Compiler::new(source, vm)?.compile()
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    /// Creates a compiler with the built-ins declared and the start-up jump
    /// emitted.
    pub fn new(source: &'src str, vm: &'vm mut VirtualMachine) -> Result<Self> {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token()?;

        let mut symbols = SymbolTable::new();
        for call in SYSTEM_CALLS {
            symbols.declare(
                Symbol::new(call.name, SymbolClass::SystemCall, DataType::Int, call.opcode.word())
                    .with_params(call.arity),
            )?;
        }
        symbols.enter_scope();

        let entry = vm.add_instruction(OpCode::Jmp)?;
        let startup = PatchSite(vm.add_placeholder()?);

        Ok(Self {
            source,
            scanner,
            current,
            vm,
            symbols,
            tree: TreeBuilder::new(),
            startup,
            entry,
            frame: None,
            pending_calls: FxHashMap::default(),
        })
    }

    /// Compiles every top-level declaration and closes the start-up chain.
    pub fn compile(mut self) -> Result<Program> {
        while self.current.kind != TokenKind::Eof {
            self.global_declaration()?;
        }

        if let Some(prototype) = self.symbols.iter().find(|s| s.class == SymbolClass::Function && !s.defined) {
            return Err(Error::UndefinedName {
                name: prototype.name.clone(),
                position: prototype.position,
            });
        }

        let position = self.position();
        let main = self.symbols.resolve("main", position)?.clone();
        if main.class != SymbolClass::Function {
            return Err(Error::UndefinedName {
                name: main.name,
                position,
            });
        }
        if main.params != Some(0) {
            return Err(Error::ArgumentCount {
                name: main.name,
                expected: 0,
                found: main.params.unwrap_or_default(),
                position: main.position,
            });
        }

        self.patch_here(self.startup)?;
        self.emit_with(OpCode::Call, main.value)?;
        self.emit(OpCode::Exit)?;

        debug!(
            entry = self.entry,
            text = self.vm.text_len(),
            data = self.vm.data_len(),
            symbols = self.symbols.len(),
            "compilation finished"
        );

        Ok(Program {
            entry: self.entry,
            symbols: self.symbols.into_symbols(),
            tree: self.tree.finish(),
        })
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn global_declaration(&mut self) -> Result<()> {
        if self.current.kind == TokenKind::Enum {
            return self.enum_declaration();
        }

        self.tree.open(Rule::GlobalDeclaration);
        let data_type = self.expect_type()?;
        loop {
            let (name, position) = self.expect_identifier()?;
            if self.check(&TokenKind::LeftParen) {
                self.tree.retag(Rule::FunctionDeclaration);
                self.function(data_type, name, position)?;
                self.tree.close();
                return Ok(());
            }

            let address = self.vm.allocate_global_word(0)?;
            self.symbols.declare(
                Symbol::new(name, SymbolClass::Variable, data_type, address as Word).at(position),
            )?;
            if self.check(&TokenKind::Assign) {
                self.advance()?;
                self.global_initializer(address)?;
            }

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.expect(TokenKind::Semicolon)?;
        self.tree.close();
        Ok(())
    }

    /// Appends `address = <expr>` to the start-up chain.
    fn global_initializer(&mut self, address: usize) -> Result<()> {
        self.patch_here(self.startup)?;
        self.expression()?;
        self.emit(OpCode::Push)?;
        self.emit_with(OpCode::Imm, address as Word)?;
        self.emit(OpCode::Si)?;
        self.startup = self.emit_jump(OpCode::Jmp)?;
        Ok(())
    }

    fn enum_declaration(&mut self) -> Result<()> {
        self.tree.open(Rule::EnumDeclaration);
        self.expect(TokenKind::Enum)?;
        if matches!(self.current.kind, TokenKind::Identifier(_)) {
            // The tag names nothing usable
            self.advance()?;
        }
        self.expect(TokenKind::LeftBrace)?;

        let mut value: Word = 0;
        while !self.check(&TokenKind::RightBrace) {
            let (name, position) = self.expect_identifier()?;
            if self.check(&TokenKind::Assign) {
                self.advance()?;
                value = self.constant()?;
            }
            self.symbols.declare(
                Symbol::new(name, SymbolClass::Constant, DataType::Int, value).at(position),
            )?;
            value = value.wrapping_add(1);

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }

        self.expect(TokenKind::RightBrace)?;
        self.expect(TokenKind::Semicolon)?;
        self.tree.close();
        Ok(())
    }

    /// An integer or character literal, optionally negated.
    fn constant(&mut self) -> Result<Word> {
        let negative = self.check(&TokenKind::Minus);
        if negative {
            self.advance()?;
        }
        let value = match self.current.kind {
            TokenKind::Number(value) | TokenKind::Char(value) => value,
            _ => return Err(self.unexpected("a constant")),
        };
        self.advance()?;
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    fn function(&mut self, return_type: DataType, name: String, position: Position) -> Result<()> {
        let params = self.parameters()?;
        let arity = params.len();

        if self.check(&TokenKind::Semicolon) {
            self.advance()?;
            self.symbols.declare(
                Symbol::new(name, SymbolClass::Function, return_type, 0)
                    .with_params(Some(arity))
                    .at(position)
                    .prototype(),
            )?;
            return Ok(());
        }

        let entry = self.vm.text_len() as Word;
        self.bind_function(return_type, &name, arity, entry, position)?;

        self.symbols.enter_scope();
        for (index, (data_type, param, param_position)) in params.into_iter().enumerate() {
            let offset = index as Word - (arity as Word + 1);
            self.symbols.declare(
                Symbol::new(param, SymbolClass::Variable, data_type, offset).at(param_position),
            )?;
        }

        self.frame = Some(Frame::default());
        self.emit(OpCode::Ent)?;
        let frame_size = self.placeholder()?;

        // The body shares the parameter scope
        self.tree.open(Rule::Block);
        self.expect(TokenKind::LeftBrace)?;
        self.block_contents()?;
        self.expect(TokenKind::RightBrace)?;
        self.tree.close();

        self.emit(OpCode::Lev)?;
        let locals = self.frame.take().map(|frame| frame.max_slots).unwrap_or_default();
        self.patch(frame_size, locals)?;
        self.symbols.leave_scope();

        debug!(%name, entry, params = arity, locals, "compiled function");
        Ok(())
    }

    /// Declares a function that has a body, or binds an earlier prototype to
    /// it and patches the calls already made.
    fn bind_function(
        &mut self,
        return_type: DataType,
        name: &str,
        arity: usize,
        entry: Word,
        position: Position,
    ) -> Result<()> {
        let prototype = self
            .symbols
            .lookup(name)
            .filter(|s| s.level == GLOBAL_LEVEL && s.class == SymbolClass::Function && !s.defined)
            .map(|s| s.params);

        match prototype {
            Some(declared) => {
                if declared != Some(arity) {
                    return Err(Error::ArgumentCount {
                        name: name.to_string(),
                        expected: declared.unwrap_or_default(),
                        found: arity,
                        position,
                    });
                }
                self.symbols.define_function(name, entry);
                for site in self.pending_calls.remove(name).unwrap_or_default() {
                    self.patch(site, entry)?;
                }
            }
            None => {
                self.symbols.declare(
                    Symbol::new(name, SymbolClass::Function, return_type, entry)
                        .with_params(Some(arity))
                        .at(position),
                )?;
            }
        }
        Ok(())
    }

    /// `( [type name {, type name}] )` or `( void )`.
    fn parameters(&mut self) -> Result<Vec<(DataType, String, Position)>> {
        self.tree.open(Rule::Parameters);
        self.expect(TokenKind::LeftParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let data_type = self.expect_type()?;
                if data_type == DataType::Void && params.is_empty() && self.check(&TokenKind::RightParen) {
                    break;
                }
                let (name, position) = self.expect_identifier()?;
                params.push((data_type, name, position));
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }

        self.expect(TokenKind::RightParen)?;
        self.tree.close();
        Ok(params)
    }

    /// `type name [= expr] {, name [= expr]} ;` inside a function.
    fn local_declaration(&mut self) -> Result<()> {
        self.tree.open(Rule::LocalDeclaration);
        let data_type = self.expect_type()?;
        loop {
            let (name, position) = self.expect_identifier()?;
            let slot = self.frame.get_or_insert_with(Frame::default).allocate();
            let symbol = self
                .symbols
                .declare(Symbol::new(name, SymbolClass::Variable, data_type, slot).at(position))?
                .clone();

            if self.check(&TokenKind::Assign) {
                self.advance()?;
                self.expression()?;
                self.emit(OpCode::Push)?;
                self.emit_address(&symbol)?;
                self.emit(OpCode::Si)?;
            }

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.expect(TokenKind::Semicolon)?;
        self.tree.close();
        Ok(())
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn emit(&mut self, opcode: OpCode) -> Result<usize> {
        self.vm.add_instruction(opcode)
    }

    fn emit_with(&mut self, opcode: OpCode, operand: Word) -> Result<usize> {
        let address = self.vm.add_instruction(opcode)?;
        self.vm.add_operand(operand)?;
        Ok(address)
    }

    /// Emits a jump whose target is not known yet.
    fn emit_jump(&mut self, opcode: OpCode) -> Result<PatchSite> {
        self.emit(opcode)?;
        self.placeholder()
    }

    fn placeholder(&mut self) -> Result<PatchSite> {
        self.vm.add_placeholder().map(PatchSite)
    }

    fn patch(&mut self, site: PatchSite, value: Word) -> Result<()> {
        self.vm.patch(site.address(), value)
    }

    /// Points `site` at the next instruction to be emitted.
    fn patch_here(&mut self, site: PatchSite) -> Result<()> {
        let here = self.vm.text_len() as Word;
        self.patch(site, here)
    }

    /// Loads the address of a variable into the accumulator.
    fn emit_address(&mut self, symbol: &Symbol) -> Result<()> {
        if symbol.is_local() {
            self.emit_with(OpCode::Lea, symbol.value)?;
        } else {
            self.emit_with(OpCode::Imm, symbol.value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Consumes the current token and records it in the tree.
    fn advance(&mut self) -> Result<Token> {
        let token = self.advance_untracked()?;
        self.tree.terminal(token.text(self.source));
        Ok(token)
    }

    /// Consumes the current token without recording it; the caller records
    /// it once it knows which rule it belongs to.
    fn advance_untracked(&mut self) -> Result<Token> {
        let next = self.scanner.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            self.advance()
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Position)> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let position = self.position();
                self.advance()?;
                Ok((name, position))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_type(&mut self) -> Result<DataType> {
        let data_type = DataType::from_token(&self.current.kind)
            .ok_or_else(|| self.unexpected("a type"))?;
        self.advance()?;
        Ok(data_type)
    }

    fn position(&self) -> Position {
        Position::locate(self.source, self.current.span.start)
    }

    fn position_of(&self, token: &Token) -> Position {
        Position::locate(self.source, token.span.start)
    }

    fn unexpected(&self, expected: impl Into<String>) -> Error {
        let found = match self.current.kind {
            TokenKind::Eof => TokenKind::Eof.to_string(),
            _ => self.current.text(self.source).to_string(),
        };
        Error::UnexpectedSymbol {
            found,
            expected: expected.into(),
            position: self.position(),
        }
    }
}
