// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression compilation.
//!
//! Binary operators are parsed with a table-driven precedence cascade. Every
//! level is a left-associative loop: the left operand is in `ax`, `PUSH`
//! saves it, the right operand is computed into `ax` and the operator
//! combines the two.

use super::{Compiler, Symbol, SymbolClass};
use crate::ast::Rule;
use crate::error::{Error, Position, Result};
use crate::lexer::{Token, TokenKind};
use crate::vm::{OpCode, Word};

/// Binary precedence levels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Precedence::LogicalOr => Precedence::LogicalAnd,
            Precedence::LogicalAnd => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Relational,
            Precedence::Relational => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative | Precedence::Unary => Precedence::Unary,
        }
    }

    fn rule(self) -> Rule {
        match self {
            Precedence::LogicalOr => Rule::LogicalOr,
            Precedence::LogicalAnd => Rule::LogicalAnd,
            Precedence::BitOr => Rule::BitOr,
            Precedence::BitXor => Rule::BitXor,
            Precedence::BitAnd => Rule::BitAnd,
            Precedence::Equality => Rule::Equality,
            Precedence::Relational => Rule::Relational,
            Precedence::Additive => Rule::Additive,
            Precedence::Multiplicative => Rule::Multiplicative,
            Precedence::Unary => Rule::Unary,
        }
    }

    /// The opcode `kind` compiles to at this level, if it is one of the
    /// level's operators. The logical levels yield their short-circuit jump.
    fn operator(self, kind: &TokenKind) -> Option<OpCode> {
        let opcode = match (self, kind) {
            (Precedence::LogicalOr, TokenKind::PipePipe) => OpCode::Jnz,
            (Precedence::LogicalAnd, TokenKind::AmpersandAmpersand) => OpCode::Jz,
            (Precedence::BitOr, TokenKind::Pipe) => OpCode::Or,
            (Precedence::BitXor, TokenKind::Caret) => OpCode::Xor,
            (Precedence::BitAnd, TokenKind::Ampersand) => OpCode::And,
            (Precedence::Equality, TokenKind::EqualEqual) => OpCode::Eq,
            (Precedence::Equality, TokenKind::NotEqual) => OpCode::Ne,
            (Precedence::Relational, TokenKind::LessThan) => OpCode::Lt,
            (Precedence::Relational, TokenKind::GreaterThan) => OpCode::Gt,
            (Precedence::Relational, TokenKind::LessThanEqual) => OpCode::Le,
            (Precedence::Relational, TokenKind::GreaterThanEqual) => OpCode::Ge,
            (Precedence::Additive, TokenKind::Plus) => OpCode::Add,
            (Precedence::Additive, TokenKind::Minus) => OpCode::Sub,
            (Precedence::Multiplicative, TokenKind::Star) => OpCode::Mul,
            (Precedence::Multiplicative, TokenKind::Slash) => OpCode::Div,
            (Precedence::Multiplicative, TokenKind::Percent) => OpCode::Mod,
            _ => return None,
        };
        Some(opcode)
    }

    fn is_logical(self) -> bool {
        matches!(self, Precedence::LogicalOr | Precedence::LogicalAnd)
    }
}

impl Compiler<'_, '_> {
    /// Compiles an expression; its value ends up in `ax`.
    pub(super) fn expression(&mut self) -> Result<()> {
        self.expression_with_head(None)
    }

    /// Compiles an expression whose first token, an identifier, has already
    /// been consumed by the statement parser.
    pub(super) fn expression_with_head(&mut self, head: Option<Token>) -> Result<()> {
        let mut head = head;
        self.binary(Precedence::LogicalOr, &mut head)
    }

    fn binary(&mut self, level: Precedence, head: &mut Option<Token>) -> Result<()> {
        if level == Precedence::Unary {
            return self.unary(head);
        }

        self.tree.open(level.rule());
        self.binary(level.next(), head)?;

        while let Some(opcode) = level.operator(&self.current.kind) {
            self.advance()?;
            if level.is_logical() {
                // Skip the right operand when the left one decides; both
                // paths meet at the 0/1 normalization
                let decided = self.emit_jump(opcode)?;
                self.binary(level.next(), &mut None)?;
                self.patch_here(decided)?;
                self.emit(OpCode::Push)?;
                self.emit_with(OpCode::Imm, 0)?;
                self.emit(OpCode::Ne)?;
            } else {
                self.emit(OpCode::Push)?;
                self.binary(level.next(), &mut None)?;
                self.emit(opcode)?;
            }
        }

        self.tree.close();
        Ok(())
    }

    fn unary(&mut self, head: &mut Option<Token>) -> Result<()> {
        if let Some(token) = head.take() {
            return self.identifier(token);
        }

        self.tree.open(Rule::Unary);
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                self.emit_with(OpCode::Imm, 0)?;
                self.emit(OpCode::Push)?;
                self.unary(&mut None)?;
                self.emit(OpCode::Sub)?;
            }
            TokenKind::Plus => {
                self.advance()?;
                self.unary(&mut None)?;
            }
            TokenKind::Bang => {
                self.advance()?;
                self.unary(&mut None)?;
                self.emit(OpCode::Push)?;
                self.emit_with(OpCode::Imm, 0)?;
                self.emit(OpCode::Eq)?;
            }
            TokenKind::Tilde => {
                self.advance()?;
                self.unary(&mut None)?;
                self.emit(OpCode::Push)?;
                self.emit_with(OpCode::Imm, -1)?;
                self.emit(OpCode::Xor)?;
            }
            TokenKind::Star => {
                self.advance()?;
                self.unary(&mut None)?;
                self.emit(OpCode::Li)?;
            }
            TokenKind::Ampersand => {
                self.advance()?;
                self.address_of()?;
            }
            TokenKind::Sizeof => {
                self.advance()?;
                self.expect(TokenKind::LeftParen)?;
                self.expect_type()?;
                self.expect(TokenKind::RightParen)?;
                // Every type is one word
                self.emit_with(OpCode::Imm, 1)?;
            }
            _ => self.primary()?,
        }
        self.tree.close();
        Ok(())
    }

    fn address_of(&mut self) -> Result<()> {
        let position = self.position();
        let (name, _) = self.expect_identifier()?;
        let symbol = self.symbols.resolve(&name, position)?.clone();
        if symbol.class != SymbolClass::Variable {
            return Err(Error::UnexpectedSymbol {
                found: name,
                expected: "a variable".into(),
                position,
            });
        }
        self.emit_address(&symbol)
    }

    fn primary(&mut self) -> Result<()> {
        match &self.current.kind {
            TokenKind::Number(value) | TokenKind::Char(value) => {
                let value = *value;
                self.advance()?;
                self.emit_with(OpCode::Imm, value)?;
            }
            TokenKind::Str(text) => {
                let address = self.vm.allocate_string(text)?;
                self.advance()?;
                self.emit_with(OpCode::Imm, address as Word)?;
            }
            TokenKind::LeftParen => {
                self.advance()?;
                self.expression()?;
                self.expect(TokenKind::RightParen)?;
            }
            TokenKind::Identifier(_) => {
                let token = self.advance_untracked()?;
                self.identifier(token)?;
            }
            _ => return Err(self.unexpected("an expression")),
        }
        Ok(())
    }

    /// A name used as a value: variable load, constant, or call.
    fn identifier(&mut self, token: Token) -> Result<()> {
        let position = self.position_of(&token);
        let text = token.text(self.source);
        let TokenKind::Identifier(name) = token.kind else {
            return Err(self.unexpected("identifier"));
        };
        let symbol = self.symbols.resolve(&name, position)?.clone();

        match symbol.class {
            SymbolClass::Variable => {
                self.tree.terminal(text);
                self.emit_address(&symbol)?;
                self.emit(OpCode::Li)?;
            }
            SymbolClass::Constant => {
                self.tree.terminal(text);
                self.emit_with(OpCode::Imm, symbol.value)?;
            }
            SymbolClass::Function | SymbolClass::SystemCall => {
                self.tree.open(Rule::Call);
                self.tree.terminal(text);
                self.call(&symbol, position)?;
                self.tree.close();
            }
        }
        Ok(())
    }

    /// `( args )` after a callable name. Arguments are pushed left to right.
    fn call(&mut self, callee: &Symbol, position: Position) -> Result<()> {
        self.expect(TokenKind::LeftParen)?;
        let mut argc = 0usize;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression()?;
                self.emit(OpCode::Push)?;
                argc += 1;
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightParen)?;

        if let Some(expected) = callee.params.filter(|expected| *expected != argc) {
            return Err(Error::ArgumentCount {
                name: callee.name.clone(),
                expected,
                found: argc,
                position,
            });
        }

        if callee.class == SymbolClass::SystemCall {
            let trap = OpCode::from_word(callee.value)
                .filter(|opcode| opcode.is_system_call())
                .ok_or_else(|| Error::UndefinedName {
                    name: callee.name.clone(),
                    position,
                })?;
            self.emit_with(trap, argc as Word)?;
            return Ok(());
        }

        // A prototype's address is not known yet; patch the call later
        let current = self.symbols.lookup(&callee.name).filter(|s| s.defined).map(|s| s.value);
        match current {
            Some(entry) => {
                self.emit_with(OpCode::Call, entry)?;
            }
            None => {
                self.emit(OpCode::Call)?;
                let site = self.placeholder()?;
                self.pending_calls
                    .entry(callee.name.clone())
                    .or_default()
                    .push(site);
            }
        }
        if argc > 0 {
            self.emit_with(OpCode::Adj, argc as Word)?;
        }
        Ok(())
    }
}
