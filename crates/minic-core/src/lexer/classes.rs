// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The ordered table of token classes.
//!
//! Each class pairs a pattern anchored at the scanner cursor with a
//! constructor that turns the matched text into a [`TokenKind`]. The scanner
//! tries the classes in table order and the first match wins, so literals and
//! keywords are listed before identifiers, and two-character operators before
//! their one-character prefixes.
//!
//! | Class | Examples |
//! |-------|----------|
//! | `number` | `42`, `0x1F` |
//! | `character literal` | `'a'`, `'\n'` |
//! | `string literal` | `"hello\n"` |
//! | `keyword` | `int`, `while` (not `integer`) |
//! | `identifier` | `main`, `_tmp1` |
//! | `operator` | `==`, `&&`, `<=` |
//! | `symbol` | `+`, `{`, `;` |

use std::sync::LazyLock;

use regex::Regex;

use super::TokenKind;
use crate::vm::Word;

/// One entry of the token class table.
pub struct TokenClass {
    /// Human-readable class name, used in diagnostics
    pub name: &'static str,
    regex: Regex,
    build: fn(&str) -> Option<TokenKind>,
}

impl TokenClass {
    fn new(name: &'static str, pattern: &str, build: fn(&str) -> Option<TokenKind>) -> Self {
        let regex = Regex::new(pattern).expect("token class patterns are valid");
        Self { name, regex, build }
    }

    /// Returns the length of the text this class matches at the start of
    /// `input`, if any.
    pub fn match_len(&self, input: &str) -> Option<usize> {
        self.regex.find(input).map(|m| m.end())
    }

    /// Builds the token for text this class matched. `None` means the text has
    /// the right shape but an invalid value (bad escape, number overflow).
    pub fn build(&self, text: &str) -> Option<TokenKind> {
        (self.build)(text)
    }
}

static TOKEN_CLASSES: LazyLock<Vec<TokenClass>> = LazyLock::new(|| {
    vec![
        TokenClass::new("number", r"^(?:0[xX][0-9a-fA-F]+|[0-9]+)", build_number),
        TokenClass::new("character literal", r"^'(?:\\.|[^'\\\n])*'", build_char),
        TokenClass::new("string literal", r#"^"(?:\\.|[^"\\\n])*""#, build_string),
        TokenClass::new(
            "keyword",
            r"^(?:int|char|void|float|if|else|while|return|sizeof|enum)\b",
            TokenKind::keyword,
        ),
        TokenClass::new("identifier", r"^[A-Za-z_][A-Za-z0-9_]*", |text| {
            Some(TokenKind::Identifier(text.to_string()))
        }),
        TokenClass::new("operator", r"^(?:\|\||&&|==|!=|<=|>=)", TokenKind::symbol),
        TokenClass::new("symbol", r"^[=|^&<>+\-*/%!~(){}\[\];,]", TokenKind::symbol),
    ]
});

/// The token classes in priority order.
pub fn token_classes() -> &'static [TokenClass] {
    &TOKEN_CLASSES
}

fn build_number(text: &str) -> Option<TokenKind> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => Word::from_str_radix(hex, 16).ok()?,
        None => text.parse::<Word>().ok()?,
    };
    Some(TokenKind::Number(value))
}

fn build_char(text: &str) -> Option<TokenKind> {
    let inner = unescape(&text[1..text.len() - 1])?;
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(TokenKind::Char(ch as Word)),
        _ => None,
    }
}

fn build_string(text: &str) -> Option<TokenKind> {
    unescape(&text[1..text.len() - 1]).map(TokenKind::Str)
}

/// Resolves backslash escapes; `None` on an unknown escape.
fn unescape(raw: &str) -> Option<String> {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            value.push(ch);
            continue;
        }
        value.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            _ => return None,
        });
    }
    Some(value)
}
