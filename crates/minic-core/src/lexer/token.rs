// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Token definitions for the lexer.

use std::fmt;

use crate::vm::Word;

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The exact source text the token was scanned from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

/// The different kinds of tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    /// Integer literal (decimal or hex)
    Number(Word),
    /// Character literal, holding the character code
    Char(Word),
    /// String literal with escapes resolved
    Str(String),

    /// Identifier
    Identifier(String),

    // Keywords
    Int,
    CharType,
    Void,
    Float,
    If,
    Else,
    While,
    Return,
    Sizeof,
    Enum,

    // Operators
    /// =
    Assign,
    /// ||
    PipePipe,
    /// &&
    AmpersandAmpersand,
    /// |
    Pipe,
    /// ^
    Caret,
    /// &
    Ampersand,
    /// ==
    EqualEqual,
    /// !=
    NotEqual,
    /// <
    LessThan,
    /// >
    GreaterThan,
    /// <=
    LessThanEqual,
    /// >=
    GreaterThanEqual,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// !
    Bang,
    /// ~
    Tilde,

    // Punctuation
    /// (
    LeftParen,
    /// )
    RightParen,
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// ;
    Semicolon,
    /// ,
    Comma,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Returns true if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::CharType
                | TokenKind::Void
                | TokenKind::Float
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Sizeof
                | TokenKind::Enum
        )
    }

    /// Returns true if this token names a data type.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            TokenKind::Int | TokenKind::CharType | TokenKind::Void | TokenKind::Float
        )
    }

    /// Returns true if this token is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, TokenKind::Number(_) | TokenKind::Char(_) | TokenKind::Str(_))
    }

    /// Maps a word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "int" => TokenKind::Int,
            "char" => TokenKind::CharType,
            "void" => TokenKind::Void,
            "float" => TokenKind::Float,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "sizeof" => TokenKind::Sizeof,
            "enum" => TokenKind::Enum,
            _ => return None,
        })
    }

    /// Maps operator or punctuation text to its token.
    pub fn symbol(text: &str) -> Option<Self> {
        Some(match text {
            "||" => TokenKind::PipePipe,
            "&&" => TokenKind::AmpersandAmpersand,
            "==" => TokenKind::EqualEqual,
            "!=" => TokenKind::NotEqual,
            "<=" => TokenKind::LessThanEqual,
            ">=" => TokenKind::GreaterThanEqual,
            "=" => TokenKind::Assign,
            "|" => TokenKind::Pipe,
            "^" => TokenKind::Caret,
            "&" => TokenKind::Ampersand,
            "<" => TokenKind::LessThan,
            ">" => TokenKind::GreaterThan,
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "%" => TokenKind::Percent,
            "!" => TokenKind::Bang,
            "~" => TokenKind::Tilde,
            "(" => TokenKind::LeftParen,
            ")" => TokenKind::RightParen,
            "{" => TokenKind::LeftBrace,
            "}" => TokenKind::RightBrace,
            "[" => TokenKind::LeftBracket,
            "]" => TokenKind::RightBracket,
            ";" => TokenKind::Semicolon,
            "," => TokenKind::Comma,
            _ => return None,
        })
    }

    /// A short description of the token class, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(_) => "number".into(),
            TokenKind::Char(_) => "character literal".into(),
            TokenKind::Str(_) => "string literal".into(),
            TokenKind::Identifier(_) => "identifier".into(),
            TokenKind::Eof => "end of input".into(),
            other => format!("`{}`", other),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Number(n) => return write!(f, "{}", n),
            TokenKind::Char(c) => return write!(f, "'{}'", char_display(*c)),
            TokenKind::Str(s) => return write!(f, "{:?}", s),
            TokenKind::Identifier(name) => return f.write_str(name),
            TokenKind::Int => "int",
            TokenKind::CharType => "char",
            TokenKind::Void => "void",
            TokenKind::Float => "float",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Return => "return",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Enum => "enum",
            TokenKind::Assign => "=",
            TokenKind::PipePipe => "||",
            TokenKind::AmpersandAmpersand => "&&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Ampersand => "&",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::LessThan => "<",
            TokenKind::GreaterThan => ">",
            TokenKind::LessThanEqual => "<=",
            TokenKind::GreaterThanEqual => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Eof => "<eof>",
        };
        f.write_str(text)
    }
}

fn char_display(code: Word) -> String {
    match u8::try_from(code) {
        Ok(b'\n') => "\\n".into(),
        Ok(b'\t') => "\\t".into(),
        Ok(0) => "\\0".into(),
        Ok(byte) => (byte as char).to_string(),
        Err(_) => format!("\\u{{{:x}}}", code),
    }
}
