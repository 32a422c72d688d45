// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scanner that produces tokens from source text.

use super::classes::token_classes;
use super::{Span, Token, TokenKind};
use crate::error::{Error, Position, Result};

/// A scanner that tokenizes source code on demand.
///
/// The cursor only moves forward; once a token has been handed out it cannot
/// be produced again.
pub struct Scanner<'a> {
    source: &'a str,
    cursor: usize,
    finished: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            finished: false,
        }
    }

    /// The source text being scanned.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the next token from the source, or an `Eof` token once the
    /// input is exhausted.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let start = self.cursor;
        let rest = &self.source[start..];
        if rest.is_empty() {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        }

        for class in token_classes() {
            let Some(len) = class.match_len(rest) else {
                continue;
            };
            let text = &rest[..len];
            let kind = class.build(text).ok_or_else(|| Error::UnexpectedSymbol {
                found: text.to_string(),
                expected: format!("a valid {}", class.name),
                position: self.locate(start),
            })?;
            self.cursor += len;
            return Ok(Token::new(kind, Span::new(start, self.cursor)));
        }

        let found = rest.chars().next().map(String::from).unwrap_or_default();
        Err(Error::UnexpectedSymbol {
            found,
            expected: "a token".into(),
            position: self.locate(start),
        })
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            let rest = &self.source[self.cursor..];
            let trimmed = rest.trim_start();
            self.cursor += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                // Line comment runs to the newline or the end of input
                self.cursor += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                match trimmed[2..].find("*/") {
                    Some(end) => self.cursor += end + 4,
                    None => {
                        return Err(Error::UnterminatedComment {
                            position: self.locate(self.cursor),
                        });
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn locate(&self, offset: usize) -> Position {
        Position::locate(self.source, offset)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) if token.kind == TokenKind::Eof => {
                self.finished = true;
                None
            }
            Ok(token) => Some(Ok(token)),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Materializes the whole token stream of `source`, without the trailing
/// `Eof`. Used for diagnostic dumps.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Scanner::new(source).collect()
}
