// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement compilation.

use super::{Compiler, SymbolClass};
use crate::ast::Rule;
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};
use crate::vm::{OpCode, Word};

impl Compiler<'_, '_> {
    /// Declarations first, then statements, up to the closing brace.
    pub(super) fn block_contents(&mut self) -> Result<()> {
        while self.current.kind.is_type() {
            self.local_declaration()?;
        }
        while !self.check(&TokenKind::RightBrace) {
            self.statement()?;
        }
        Ok(())
    }

    pub(super) fn statement(&mut self) -> Result<()> {
        match self.current.kind {
            TokenKind::LeftBrace => self.block(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(())
            }
            TokenKind::Identifier(_) => {
                // One identifier of lookahead decides between an assignment
                // and an expression that starts with a name
                let head = self.advance_untracked()?;
                if self.check(&TokenKind::Assign) {
                    self.assignment(head)
                } else {
                    self.expression_statement(Some(head))
                }
            }
            _ => self.expression_statement(None),
        }
    }

    /// A nested block with its own scope. Its frame slots are free again once
    /// the block closes.
    fn block(&mut self) -> Result<()> {
        self.tree.open(Rule::Block);
        self.expect(TokenKind::LeftBrace)?;
        self.symbols.enter_scope();
        let saved = self.frame.as_ref().map(|frame| frame.next_slot);

        self.block_contents()?;

        self.expect(TokenKind::RightBrace)?;
        self.symbols.leave_scope();
        if let (Some(frame), Some(saved)) = (self.frame.as_mut(), saved) {
            frame.next_slot = saved;
        }
        self.tree.close();
        Ok(())
    }

    fn if_statement(&mut self) -> Result<()> {
        self.tree.open(Rule::IfStatement);
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LeftParen)?;
        self.expression()?;
        self.expect(TokenKind::RightParen)?;

        let skip_then = self.emit_jump(OpCode::Jz)?;
        self.statement()?;

        if self.check(&TokenKind::Else) {
            self.advance()?;
            let skip_else = self.emit_jump(OpCode::Jmp)?;
            self.patch_here(skip_then)?;
            self.statement()?;
            self.patch_here(skip_else)?;
        } else {
            self.patch_here(skip_then)?;
        }

        self.tree.close();
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        self.tree.open(Rule::WhileStatement);
        let loop_start = self.vm.text_len() as Word;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LeftParen)?;
        self.expression()?;
        self.expect(TokenKind::RightParen)?;

        let exit = self.emit_jump(OpCode::Jz)?;
        self.statement()?;
        self.emit_with(OpCode::Jmp, loop_start)?;
        self.patch_here(exit)?;

        self.tree.close();
        Ok(())
    }

    fn return_statement(&mut self) -> Result<()> {
        self.tree.open(Rule::ReturnStatement);
        self.expect(TokenKind::Return)?;
        if !self.check(&TokenKind::Semicolon) {
            self.expression()?;
        }
        self.expect(TokenKind::Semicolon)?;
        self.emit(OpCode::Lev)?;
        self.tree.close();
        Ok(())
    }

    /// `name = expr ;`. The value is computed first, then stored through the
    /// variable's address.
    fn assignment(&mut self, target: Token) -> Result<()> {
        self.tree.open(Rule::Assignment);
        self.tree.terminal(target.text(self.source));

        let position = self.position_of(&target);
        let TokenKind::Identifier(name) = target.kind else {
            return Err(self.unexpected("identifier"));
        };
        let symbol = self.symbols.resolve(&name, position)?.clone();
        if symbol.class != SymbolClass::Variable {
            return Err(Error::UnexpectedSymbol {
                found: name,
                expected: "an assignable variable".into(),
                position,
            });
        }

        self.expect(TokenKind::Assign)?;
        self.expression()?;
        self.expect(TokenKind::Semicolon)?;

        self.emit(OpCode::Push)?;
        self.emit_address(&symbol)?;
        self.emit(OpCode::Si)?;
        self.tree.close();
        Ok(())
    }

    fn expression_statement(&mut self, head: Option<Token>) -> Result<()> {
        self.tree.open(Rule::ExpressionStatement);
        self.expression_with_head(head)?;
        self.expect(TokenKind::Semicolon)?;
        self.tree.close();
        Ok(())
    }
}
