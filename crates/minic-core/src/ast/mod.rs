// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Syntax tree recorded while the compiler parses.
//!
//! The tree is a by-product of single-pass compilation: it is never walked to
//! generate code, only kept for inspection. Each grammar rule the compiler
//! enters becomes a [`SyntaxNode::Rule`] and each consumed token becomes a
//! [`SyntaxNode::Terminal`] holding its source text.
//!
//! Expression rules that end up with a single child are replaced by that
//! child, so `return x;` does not nest ten precedence levels around `x`.
//!
//! The serde representation maps every rule to a one-entry object and every
//! terminal to a string:
//!
//! ```json
//! {"program": [{"global_declaration": ["int", "x", ";"]}]}
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Grammar rules that appear in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Program,
    GlobalDeclaration,
    EnumDeclaration,
    FunctionDeclaration,
    Parameters,
    Block,
    LocalDeclaration,
    IfStatement,
    WhileStatement,
    ReturnStatement,
    ExpressionStatement,
    Assignment,
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
    Call,
}

impl Rule {
    /// The key used when serializing.
    pub fn name(self) -> &'static str {
        match self {
            Rule::Program => "program",
            Rule::GlobalDeclaration => "global_declaration",
            Rule::EnumDeclaration => "enum_declaration",
            Rule::FunctionDeclaration => "function_declaration",
            Rule::Parameters => "parameters",
            Rule::Block => "block",
            Rule::LocalDeclaration => "local_declaration",
            Rule::IfStatement => "if_statement",
            Rule::WhileStatement => "while_statement",
            Rule::ReturnStatement => "return_statement",
            Rule::ExpressionStatement => "expression_statement",
            Rule::Assignment => "assignment",
            Rule::LogicalOr => "logical_or",
            Rule::LogicalAnd => "logical_and",
            Rule::BitOr => "bit_or",
            Rule::BitXor => "bit_xor",
            Rule::BitAnd => "bit_and",
            Rule::Equality => "equality",
            Rule::Relational => "relational",
            Rule::Additive => "additive",
            Rule::Multiplicative => "multiplicative",
            Rule::Unary => "unary",
            Rule::Call => "call",
        }
    }

    /// Expression levels that vanish when they wrap a single child.
    fn is_transparent(self) -> bool {
        matches!(
            self,
            Rule::LogicalOr
                | Rule::LogicalAnd
                | Rule::BitOr
                | Rule::BitXor
                | Rule::BitAnd
                | Rule::Equality
                | Rule::Relational
                | Rule::Additive
                | Rule::Multiplicative
                | Rule::Unary
        )
    }
}

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxNode {
    /// A grammar rule and what it matched
    Rule {
        /// The rule
        rule: Rule,
        /// Sub-rules and tokens in source order
        children: Vec<SyntaxNode>,
    },
    /// A consumed token's source text
    Terminal(String),
}

impl SyntaxNode {
    /// The rule of a rule node.
    pub fn rule(&self) -> Option<Rule> {
        match self {
            SyntaxNode::Rule { rule, .. } => Some(*rule),
            SyntaxNode::Terminal(_) => None,
        }
    }

    /// Children of a rule node; empty for terminals.
    pub fn children(&self) -> &[SyntaxNode] {
        match self {
            SyntaxNode::Rule { children, .. } => children,
            SyntaxNode::Terminal(_) => &[],
        }
    }

    /// All terminals below this node, left to right.
    pub fn terminals(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terminals(&mut out);
        out
    }

    fn collect_terminals<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SyntaxNode::Terminal(text) => out.push(text),
            SyntaxNode::Rule { children, .. } => {
                for child in children {
                    child.collect_terminals(out);
                }
            }
        }
    }
}

impl Serialize for SyntaxNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SyntaxNode::Terminal(text) => serializer.serialize_str(text),
            SyntaxNode::Rule { rule, children } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(rule.name(), children)?;
                map.end()
            }
        }
    }
}

/// Builds a [`SyntaxNode`] tree from open/close events.
#[derive(Debug)]
pub struct TreeBuilder {
    /// Open rules, outermost first; the root program rule is always present
    open: Vec<(Rule, Vec<SyntaxNode>)>,
}

impl TreeBuilder {
    /// Starts a tree rooted at [`Rule::Program`].
    pub fn new() -> Self {
        Self {
            open: vec![(Rule::Program, Vec::new())],
        }
    }

    /// Opens a rule node under the innermost open node.
    pub fn open(&mut self, rule: Rule) {
        self.open.push((rule, Vec::new()));
    }

    /// Changes the rule of the innermost open node.
    pub fn retag(&mut self, rule: Rule) {
        if let Some(node) = self.open.last_mut() {
            node.0 = rule;
        }
    }

    /// Closes the innermost open node. The root is never closed here.
    pub fn close(&mut self) {
        if self.open.len() < 2 {
            return;
        }
        if let Some((rule, mut children)) = self.open.pop() {
            let node = if rule.is_transparent() && children.len() == 1 {
                children.remove(0)
            } else {
                SyntaxNode::Rule { rule, children }
            };
            self.push(node);
        }
    }

    /// Records a consumed token.
    pub fn terminal(&mut self, text: impl Into<String>) {
        self.push(SyntaxNode::Terminal(text.into()));
    }

    fn push(&mut self, node: SyntaxNode) {
        if let Some((_, children)) = self.open.last_mut() {
            children.push(node);
        }
    }

    /// Closes every open node and returns the root.
    pub fn finish(mut self) -> SyntaxNode {
        while self.open.len() > 1 {
            self.close();
        }
        let (rule, children) = self
            .open
            .pop()
            .unwrap_or((Rule::Program, Vec::new()));
        SyntaxNode::Rule { rule, children }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
