// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! minic - a compiler and virtual machine for a small C-like language
//!
//! This is the main entry point for the minic CLI/REPL.
//!
//! ## Features
//!
//! - Interactive REPL with syntax highlighting and history
//! - Token, syntax tree, symbol table and disassembly dumps
//! - Per-instruction tracing

mod cli;
mod config;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use minic_core::lexer::tokenize;
use minic_core::{Engine, Position, Program, Word};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            config.apply(&cli);
            config
        }
        Err(e) => {
            print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);

    if !cli.has_program() {
        return run_repl(&config);
    }

    match run_program(&cli, &config) {
        // The low byte of the result, as a C program's exit status
        Ok(result) => ExitCode::from(result as u8),
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Installs the tracing subscriber. `RUST_LOG` wins over the configured
/// level but not over `--trace`.
fn init_logging(config: &Config) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(config.log_filter(env.as_deref()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Start the interactive REPL
fn run_repl(config: &Config) -> ExitCode {
    match repl::Repl::new(config) {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                eprintln!("{}: {:?}", "REPL Error".red().bold(), e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(
                "{}: Failed to initialize REPL: {:?}",
                "Error".red().bold(),
                e
            );
            ExitCode::FAILURE
        }
    }
}

/// Compiles and runs the file or `--eval` source, printing whatever dumps
/// were asked for along the way.
fn run_program(cli: &Cli, config: &Config) -> Result<Word> {
    let source = match (&cli.eval, &cli.file) {
        (Some(source), _) => source.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("no program given"),
    };

    if cli.tokens {
        print_tokens(&source)?;
    }

    let mut engine = Engine::with_pool_size(config.pool_size)?;
    engine.set_trace(config.trace);
    engine.set_max_cycles(config.max_cycles);

    let program = engine.compile(&source)?;

    if let Some(path) = &cli.ast {
        write_tree(&program, path)?;
    }
    if cli.symbols {
        print_symbols(&program);
    }
    if cli.disasm {
        print_disassembly(&engine);
    }

    Ok(engine.run(&program)?)
}

fn print_tokens(source: &str) -> Result<()> {
    for token in tokenize(source)? {
        let position = Position::locate(source, token.span.start);
        println!(
            "{:>8}  {:<20} {}",
            position.to_string().dimmed(),
            token.kind.describe().cyan(),
            token.text(source)
        );
    }
    Ok(())
}

fn write_tree(program: &Program, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&program.tree)?;
    if path == Path::new("-") {
        println!("{json}");
    } else {
        std::fs::write(path, json)
            .with_context(|| format!("failed to write syntax tree to {}", path.display()))?;
    }
    Ok(())
}

fn print_symbols(program: &Program) {
    println!(
        "{}",
        format!(
            "{:<16} {:>5} {:>5}  {:<9} {:<5} {:>8}",
            "NAME", "SCOPE", "LEVEL", "CLASS", "TYPE", "VALUE"
        )
        .white()
        .bold()
    );
    for symbol in &program.symbols {
        println!(
            "{:<16} {:>5} {:>5}  {:<9} {:<5} {:>8}",
            symbol.name.green(),
            symbol.scope,
            symbol.level,
            symbol.class.to_string(),
            symbol.data_type.to_string(),
            symbol.value.yellow()
        );
    }
}

fn print_disassembly(engine: &Engine) {
    for (address, instruction) in engine.vm().disassemble() {
        println!("{:>6}: {}", address.dimmed(), instruction);
    }
}

/// Print a formatted error message with its context chain.
fn print_error(error: &anyhow::Error) {
    eprintln!("{}: {:#}", "Error".red().bold(), error);
}
