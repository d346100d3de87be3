//! Rev Language Library
//!
//! Statically typed scripting language with nullable, union and
//! error-union types: lexer, parser, static analyzer and tree-walking
//! interpreter.

pub mod analyzer;
pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod scope;
pub mod types;
pub mod util;

pub use analyzer::{Analysis, Analyzer, analyze};
pub use ast::Span;
pub use error::{CompileError, Result};
pub use interp::{Interpreter, InterpreterConfig, RuntimeError, Value};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    });
}

/// Tokenize and parse a source string
pub fn parse_source(source: &str) -> Result<ast::Program> {
    let tokens = lexer::tokenize(source)?;
    parser::parse(source, tokens)
}
