//! Rev CLI

use clap::Parser;
use rev::error::{CompileError, report_diagnostic, report_error, report_fault};
use rev::interp::{Interpreter, InterpreterConfig};
use rev::repl::Repl;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rev", version, about = "Rev - statically typed scripting language")]
struct Cli {
    /// Source file to run; starts the REPL when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Only run static analysis
    #[arg(long = "static-analyse")]
    static_analyse: bool,

    /// Tokenize and dump tokens (debug)
    #[arg(long)]
    print_tokens: bool,

    /// Parse and dump the AST as JSON (debug)
    #[arg(long)]
    print_ast: bool,

    /// Nested calls allowed before a stack overflow fault
    #[arg(long, default_value_t = InterpreterConfig::default().max_call_depth)]
    max_call_depth: usize,
}

fn main() {
    rev::init_tracing();
    let cli = Cli::parse();
    let config = InterpreterConfig {
        max_call_depth: cli.max_call_depth,
        ..InterpreterConfig::default()
    };

    let Some(path) = cli.file.as_deref() else {
        if cli.static_analyse || cli.print_tokens || cli.print_ast {
            eprintln!("Error: --static-analyse, --print-tokens and --print-ast require --file");
            std::process::exit(2);
        }
        if let Err(e) = Repl::new(config).and_then(|mut repl| repl.run()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    };

    match run_file(path, &cli, config) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a script, returning the process exit status
fn run_file(path: &Path, cli: &Cli, config: InterpreterConfig) -> Result<i32, Box<dyn std::error::Error>> {
    let filename = path.display().to_string();
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            report_error(&filename, "", &CompileError::from(err))?;
            return Ok(1);
        }
    };

    let tokens = match rev::lexer::tokenize(&source) {
        Ok(tokens) => tokens,
        Err(err) => {
            report_error(&filename, &source, &err)?;
            return Ok(1);
        }
    };
    if cli.print_tokens {
        for (tok, span) in &tokens {
            println!("{:?} @ {}..{}", tok, span.start, span.end);
        }
        return Ok(0);
    }

    let program = match rev::parser::parse(&source, tokens) {
        Ok(program) => program,
        Err(err) => {
            report_error(&filename, &source, &err)?;
            return Ok(1);
        }
    };
    if cli.print_ast {
        println!("{}", serde_json::to_string_pretty(&program)?);
        return Ok(0);
    }

    let analysis = rev::analyze(&program);
    for diag in &analysis.diagnostics {
        report_diagnostic(&filename, &source, diag)?;
    }
    if analysis.has_errors() {
        return Ok(1);
    }
    if cli.static_analyse {
        println!("✓ {filename} passed static analysis");
        return Ok(0);
    }

    let mut interpreter = Interpreter::new(config);
    match interpreter.run(&program, &analysis) {
        Ok(_) => Ok(0),
        Err(fault) => {
            report_fault(&filename, &source, &fault)?;
            Ok(fault.exit_code())
        }
    }
}
