// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler from minic source to virtual machine bytecode.
//!
//! # Module Structure
//!
//! - `codegen`: single-pass parser and code generator
//!   - `codegen::scope`: scoped symbol table

pub mod codegen;

pub use codegen::{
    BUILTIN_LEVEL, Compiler, DataType, GLOBAL_LEVEL, PatchSite, Program, ScopeId, Symbol,
    SymbolClass, SymbolTable, compile,
};
