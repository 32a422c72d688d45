// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for minic.
//!
//! Lines starting with a type keyword or `enum` are kept as top-level
//! declarations. Any other line is an expression, compiled as the return
//! value of a generated `main` that follows the kept declarations.

use minic_core::lexer::{Scanner, TokenKind, tokenize};
use minic_core::vm::SYSTEM_CALLS;
use minic_core::{Engine, Position, Program, SymbolClass, Word};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config as EditorConfig, Editor, Helper};
use std::borrow::Cow;
use std::path::PathBuf;

use crate::config::Config;

/// REPL configuration constants
const MAX_HISTORY_SIZE: usize = 1000;

/// Language keywords, highlighted and completed
const KEYWORDS: &[&str] = &[
    "char", "else", "enum", "float", "if", "int", "return", "sizeof", "void", "while",
];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Reset,
    Decls,
    Tokens,
    Symbols,
    Load,
    Version,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "reset" => Some((ReplCommand::Reset, arg)),
            "decls" => Some((ReplCommand::Decls, arg)),
            "tokens" => Some((ReplCommand::Tokens, arg)),
            "symbols" | "sym" => Some((ReplCommand::Symbols, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".reset", "Forget all declarations"),
            (".decls", "List the kept declarations"),
            (".tokens <src>", "Print the tokens of a snippet"),
            (".symbols", "Print the symbols of the last program"),
            (".load <file>", "Compile and run a source file"),
            (".version", "Show version information"),
        ]
    }
}

/// Helper struct for rustyline that provides completion, hints, and validation
#[derive(Default)]
struct MinicHelper {
    /// Keywords, built-ins and commands for completion
    words: Vec<String>,
}

impl MinicHelper {
    fn new() -> Self {
        let words = KEYWORDS
            .iter()
            .copied()
            .chain(SYSTEM_CALLS.iter().map(|call| call.name))
            .chain(ReplCommand::all_commands().iter().map(|(cmd, _)| {
                cmd.split_whitespace().next().unwrap_or_default()
            }))
            .map(String::from)
            .collect();

        Self { words }
    }

    fn candidates<'a>(&'a self, word: &'a str) -> impl Iterator<Item = &'a String> {
        self.words.iter().filter(move |w| w.starts_with(word))
    }
}

/// Start of the word that ends at `pos`.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl Completer for MinicHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = &line[word_start(line, pos)..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .candidates(word)
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for MinicHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line, pos)..];
        if word.len() < 2 {
            return None;
        }

        self.candidates(word)
            .find(|w| w.len() > word.len())
            .map(|w| w[word.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for MinicHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();

        for c in line.chars() {
            if c.is_alphanumeric() || c == '_' {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            let colored = match c {
                '(' | ')' | '[' | ']' | '{' | '}' => c.to_string().yellow().to_string(),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '&' | '|' | '^' | '~' => {
                    c.to_string().cyan().to_string()
                }
                '"' | '\'' => c.to_string().green().to_string(),
                '.' if line.starts_with('.') => c.to_string().magenta().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if SYSTEM_CALLS.iter().any(|call| call.name == word) {
        word.cyan().to_string()
    } else if word.chars().all(|c| c.is_ascii_hexdigit() || c == 'x' || c == 'X')
        && word.starts_with(|c: char| c.is_ascii_digit())
    {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for MinicHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();

        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }

        // A trailing operator or separator expects more input
        let trimmed = input.trim_end();
        if trimmed.ends_with(['\\', '+', '-', '*', '/', '=', ',', '(', '{', '&', '|']) {
            return Ok(ValidationResult::Incomplete);
        }

        Ok(ValidationResult::Valid(None))
    }
}

/// Check if brackets, braces, and parentheses are balanced
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_literal = None;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if c == '\\' && in_literal.is_some() {
            escape_next = true;
            continue;
        }

        match in_literal {
            Some(quote) if c == quote => in_literal = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => in_literal = Some(c),
                '(' => stack.push(')'),
                '[' => stack.push(']'),
                '{' => stack.push('}'),
                ')' | ']' | '}' => {
                    if stack.pop() != Some(c) {
                        // Let the compiler report the mismatch
                        return true;
                    }
                }
                _ => {}
            },
        }
    }

    stack.is_empty() && in_literal.is_none()
}

impl Helper for MinicHelper {}

/// What the REPL has accumulated: declarations and the engine that runs
/// snippets against them.
pub struct Session {
    engine: Engine,
    declarations: Vec<String>,
    last_program: Option<Program>,
}

impl Session {
    /// Creates a session whose engine follows `config`.
    pub fn new(config: &Config) -> minic_core::Result<Self> {
        let mut engine = Engine::with_pool_size(config.pool_size)?;
        engine.set_trace(config.trace);
        engine.set_max_cycles(config.max_cycles);
        Ok(Self {
            engine,
            declarations: Vec::new(),
            last_program: None,
        })
    }

    /// True when `input` starts a top-level declaration.
    pub fn is_declaration(input: &str) -> bool {
        Scanner::new(input)
            .next_token()
            .is_ok_and(|token| token.kind.is_type() || token.kind == TokenKind::Enum)
    }

    /// Keeps `input` as a declaration if the program still compiles with it.
    pub fn declare(&mut self, input: &str) -> minic_core::Result<()> {
        let mut candidate = self.declarations.join("\n");
        candidate.push('\n');
        candidate.push_str(input);
        candidate.push_str("\nint main() { return 0; }");

        let program = self.engine.compile(&candidate)?;
        self.last_program = Some(program);
        self.declarations.push(input.to_string());
        Ok(())
    }

    /// Evaluates an expression after the kept declarations.
    pub fn evaluate(&mut self, input: &str) -> minic_core::Result<Word> {
        let source = self.source_for(input);
        let program = self.engine.compile(&source)?;
        let result = self.engine.run(&program);
        self.last_program = Some(program);
        result
    }

    /// Compiles and runs a complete program.
    pub fn run_source(&mut self, source: &str) -> minic_core::Result<Word> {
        let program = self.engine.compile(source)?;
        let result = self.engine.run(&program);
        self.last_program = Some(program);
        result
    }

    /// The full program text used to evaluate `expression`.
    pub fn source_for(&self, expression: &str) -> String {
        let expression = expression.trim().trim_end_matches(';');
        let mut source = self.declarations.join("\n");
        source.push_str(&format!("\nint main() {{ return {expression}; }}"));
        source
    }

    pub fn declarations(&self) -> &[String] {
        &self.declarations
    }

    pub fn reset(&mut self) {
        self.declarations.clear();
        self.last_program = None;
    }

    pub fn last_program(&self) -> Option<&Program> {
        self.last_program.as_ref()
    }
}

/// The interactive REPL for minic
pub struct Repl {
    session: Session,
    editor: Editor<MinicHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let editor_config = EditorConfig::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(MinicHelper::new()));

        let history_path = config.history_path();
        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            session: Session::new(config)?,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "minic>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.handle_input(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);

        println!();
        println!("{}", "Goodbye!".bright_cyan());
        Ok(())
    }

    fn print_banner(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!();
        println!(
            "  {} {} {}",
            "minic".bright_cyan().bold(),
            "v".dimmed(),
            version.bright_yellow()
        );
        println!(
            "  {}",
            "Declarations are kept; expressions are evaluated.".dimmed()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn handle_input(&mut self, input: &str) {
        if Session::is_declaration(input) {
            match self.session.declare(input) {
                Ok(()) => println!("{}", "ok".dimmed()),
                Err(e) => print_error(&e),
            }
        } else {
            match self.session.evaluate(input) {
                Ok(value) => println!("{}", value.yellow()),
                Err(e) => print_error(&e),
            }
        }
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Reset => {
                self.session.reset();
                println!("{}", "declarations cleared".dimmed());
            }
            ReplCommand::Decls => {
                for declaration in self.session.declarations() {
                    println!("{}", declaration);
                }
            }
            ReplCommand::Tokens => match arg {
                Some(source) => print_tokens(source),
                None => missing_argument(".tokens", "requires source text"),
            },
            ReplCommand::Symbols => match self.session.last_program() {
                Some(program) => print_symbols(program),
                None => println!("{}", "nothing compiled yet".dimmed()),
            },
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(path),
                None => missing_argument(".load", "requires a file path"),
            },
            ReplCommand::Version => {
                println!("{}: {}", "minic".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
            }
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
    }

    fn load_file(&mut self, path: &str) {
        match std::fs::read_to_string(path) {
            Ok(source) => match self.session.run_source(&source) {
                Ok(value) => println!("{}", value.yellow()),
                Err(e) => print_error(&e),
            },
            Err(e) => eprintln!("{}: {}: {}", "Error".red().bold(), path.cyan(), e),
        }
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn missing_argument(command: &str, message: &str) {
    eprintln!(
        "{}: {} {}",
        "Error".red().bold(),
        command.cyan(),
        message.dimmed()
    );
}

fn print_tokens(source: &str) {
    match tokenize(source) {
        Ok(tokens) => {
            for token in tokens {
                let position = Position::locate(source, token.span.start);
                println!(
                    "  {}  {} {}",
                    position.to_string().dimmed(),
                    token.kind.describe().cyan(),
                    token.text(source)
                );
            }
        }
        Err(e) => print_error(&e),
    }
}

/// Prints the user's symbols; built-ins are left out.
fn print_symbols(program: &Program) {
    for symbol in program.symbols.iter().filter(|s| s.class != SymbolClass::SystemCall) {
        println!(
            "  {:<16} {:<9} {:<5} scope {} level {} value {}",
            symbol.name.green(),
            symbol.class.to_string(),
            symbol.data_type.to_string(),
            symbol.scope,
            symbol.level,
            symbol.value.yellow()
        );
    }
}

/// Print a formatted error message
fn print_error(error: &minic_core::Error) {
    let error_str = error.to_string();

    // Positions come first; color the message after them
    match error_str.split_once(": ") {
        Some((location, message)) if location.contains(':') => {
            eprintln!("{} {}", format!("{location}:").dimmed(), message.red().bold());
        }
        _ => eprintln!("{}", error_str.red()),
    }
}
