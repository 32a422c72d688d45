// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command line arguments for minic.

use clap::Parser;
use std::path::PathBuf;

/// minic - compile and run programs in a small C-like language
#[derive(Parser, Debug, Default)]
#[command(name = "minic")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source file to compile and run
    pub file: Option<PathBuf>,

    /// Compile and run source text
    #[arg(short, long, value_name = "SOURCE", conflicts_with = "file")]
    pub eval: Option<String>,

    /// Print the token stream
    #[arg(long)]
    pub tokens: bool,

    /// Write the syntax tree as JSON (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    pub ast: Option<PathBuf>,

    /// Print the symbol table
    #[arg(long)]
    pub symbols: bool,

    /// Print the compiled text segment
    #[arg(long)]
    pub disasm: bool,

    /// Trace every executed instruction
    #[arg(short, long)]
    pub trace: bool,

    /// Memory pool size in words
    #[arg(long, value_name = "WORDS")]
    pub pool_size: Option<usize>,

    /// Abort after N executed instructions
    #[arg(long, value_name = "N")]
    pub max_cycles: Option<u64>,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// True when a program should be compiled rather than the REPL started.
    pub fn has_program(&self) -> bool {
        self.file.is_some() || self.eval.is_some()
    }
}
