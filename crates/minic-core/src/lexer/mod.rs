// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lexical analysis (tokenization) for minic source code.
//!
//! The lexer transforms source text into a stream of tokens that the
//! compiler consumes one at a time.
//!
//! ## Structure
//!
//! - `scanner.rs` - `Scanner`, which skips whitespace and comments and
//!   produces tokens on demand
//! - `token.rs` - `Token` and `TokenKind` definitions
//! - `classes` - the ordered token class table the scanner matches against
//!
//! ## Usage
//!
//! ```rust
//! use minic_core::lexer::{Scanner, TokenKind};
//!
//! let mut scanner = Scanner::new("int x = 42;");
//!
//! loop {
//!     let token = scanner.next_token().expect("valid input");
//!     if matches!(token.kind, TokenKind::Eof) {
//!         break;
//!     }
//!     println!("{:?}", token.kind);
//! }
//! ```

mod scanner;
mod token;

pub mod classes;

pub use scanner::{Scanner, tokenize};
pub use token::{Span, Token, TokenKind};
