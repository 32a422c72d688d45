// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scoped symbol table used for name resolution during compilation.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{Error, Position, Result};
use crate::lexer::TokenKind;
use crate::vm::Word;

/// Identifies one lexical scope. Ids are never reused.
pub type ScopeId = usize;

/// Level of the built-in scope.
pub const BUILTIN_LEVEL: usize = 0;
/// Level of top-level declarations.
pub const GLOBAL_LEVEL: usize = 1;

/// What a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    /// Built-in implemented by a trap instruction
    SystemCall,
    /// User function
    Function,
    /// Global or local variable
    Variable,
    /// Enumerator
    Constant,
}

impl fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolClass::SystemCall => "syscall",
            SymbolClass::Function => "function",
            SymbolClass::Variable => "variable",
            SymbolClass::Constant => "constant",
        })
    }
}

/// Declared type of a symbol. Every type occupies one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Void,
    Int,
    Float,
    Char,
}

impl DataType {
    /// Maps a type keyword to its data type.
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Void => Some(DataType::Void),
            TokenKind::Int => Some(DataType::Int),
            TokenKind::Float => Some(DataType::Float),
            TokenKind::CharType => Some(DataType::Char),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Void => "void",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Char => "char",
        })
    }
}

/// A declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The name as written
    pub name: String,
    /// What the name refers to
    pub class: SymbolClass,
    /// Declared type
    pub data_type: DataType,
    /// Nesting level: 0 built-in, 1 global, 2+ local
    pub level: usize,
    /// Scope the symbol was declared in
    pub scope: ScopeId,
    /// Trap opcode, entry address, data address, frame offset or constant
    /// value depending on `class` and `level`
    pub value: Word,
    /// Parameter count for callables; `None` means variadic
    pub params: Option<usize>,
    /// False for a function prototype whose body has not been compiled
    pub defined: bool,
    /// Where the symbol was declared
    pub position: Position,
}

impl Symbol {
    /// Creates a symbol; `level` and `scope` are filled in by
    /// [`SymbolTable::declare`].
    pub fn new(name: impl Into<String>, class: SymbolClass, data_type: DataType, value: Word) -> Self {
        Self {
            name: name.into(),
            class,
            data_type,
            level: 0,
            scope: 0,
            value,
            params: None,
            defined: true,
            position: Position::default(),
        }
    }

    /// Sets the parameter count.
    pub fn with_params(mut self, params: Option<usize>) -> Self {
        self.params = params;
        self
    }

    /// Sets the declaration position.
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Marks a function symbol as a prototype.
    pub fn prototype(mut self) -> Self {
        self.defined = false;
        self
    }

    /// True for variables in a function frame.
    pub fn is_local(&self) -> bool {
        self.level > GLOBAL_LEVEL
    }
}

/// The symbol table: a stack of active scopes over a flat map keyed by
/// `(name, scope)`.
///
/// Symbols stay in the table after their scope closes so the whole
/// declaration history can be listed.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: FxHashMap<(String, ScopeId), usize>,
    /// Active scopes, outermost first
    scopes: Vec<ScopeId>,
    last_scope: ScopeId,
}

impl SymbolTable {
    /// Creates a table with only the built-in scope (id 0, level 0) open.
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            index: FxHashMap::default(),
            scopes: vec![0],
            last_scope: 0,
        }
    }

    /// Opens a nested scope and returns its id.
    pub fn enter_scope(&mut self) -> ScopeId {
        self.last_scope += 1;
        self.scopes.push(self.last_scope);
        self.last_scope
    }

    /// Closes the innermost scope.
    ///
    /// # Panics
    ///
    /// Panics when called on the built-in scope.
    pub fn leave_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot leave the built-in scope");
        self.scopes.pop();
    }

    /// Nesting level of the innermost scope.
    pub fn level(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Id of the innermost scope.
    pub fn current_scope(&self) -> ScopeId {
        self.scopes.last().copied().unwrap_or_default()
    }

    /// Adds a symbol to the innermost scope.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<&Symbol> {
        let scope = self.current_scope();
        let key = (symbol.name.clone(), scope);
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateDeclaration {
                name: symbol.name,
                position: symbol.position,
            });
        }
        symbol.level = self.level();
        symbol.scope = scope;
        let slot = self.symbols.len();
        self.symbols.push(symbol);
        self.index.insert(key, slot);
        Ok(&self.symbols[slot])
    }

    /// Finds the innermost active declaration of `name`.
    pub fn resolve(&self, name: &str, position: Position) -> Result<&Symbol> {
        self.lookup(name).ok_or_else(|| Error::UndefinedName {
            name: name.to_string(),
            position,
        })
    }

    /// Like [`resolve`](Self::resolve) without the error.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut key = (name.to_string(), 0);
        self.scopes.iter().rev().find_map(|scope| {
            key.1 = *scope;
            self.index.get(&key).map(|slot| &self.symbols[*slot])
        })
    }

    /// Binds the function `name` declared in the innermost scope to its entry
    /// address. Returns the updated symbol, or `None` if there is no such
    /// function.
    pub fn define_function(&mut self, name: &str, entry: Word) -> Option<&Symbol> {
        let slot = *self.index.get(&(name.to_string(), self.current_scope()))?;
        let symbol = &mut self.symbols[slot];
        if symbol.class != SymbolClass::Function {
            return None;
        }
        symbol.value = entry;
        symbol.defined = true;
        Some(symbol)
    }

    /// Every symbol ever declared, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Number of symbols ever declared.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Consumes the table, returning all symbols in declaration order.
    pub fn into_symbols(self) -> Vec<Symbol> {
        self.symbols
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
