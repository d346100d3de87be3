//! REPL (Read-Eval-Print Loop) for Rev

use crate::analyzer::Analyzer;
use crate::error::{CompileError, Diagnostic, report_diagnostic, report_error, report_fault};
use crate::interp::{Interpreter, InterpreterConfig, RuntimeError, Value};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::types::Type;
use crate::util::open_delimiters;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "... ";
const HISTORY_FILE: &str = ".rev_history";
const SOURCE_NAME: &str = "<repl>";

/// Why a REPL input produced no value
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// Static analysis rejected the input (warnings included)
    #[error("input rejected with {} diagnostic(s)", .0.len())]
    Rejected(Vec<Diagnostic>),

    #[error("{0}")]
    Fault(#[from] RuntimeError),
}

/// Result of an accepted input
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Value of a trailing expression statement, if it has one
    pub value: Option<Value>,
    pub warnings: Vec<Diagnostic>,
}

/// Persistent top-level environment shared by successive inputs.
///
/// Each input is parsed, analyzed against the bindings accepted so far,
/// then executed. An input that fails at any stage leaves the top level as
/// it was before the input.
pub struct Session {
    analyzer: Analyzer,
    interpreter: Interpreter,
    /// First node id for the next input; ids stay unique across inputs
    next_id: u32,
}

impl Session {
    pub fn new(config: InterpreterConfig) -> Self {
        Self::from_interpreter(Interpreter::new(config))
    }

    /// Session whose `print` output goes to `out`
    pub fn with_output(config: InterpreterConfig, out: Box<dyn Write>) -> Self {
        Self::from_interpreter(Interpreter::with_output(config, out))
    }

    fn from_interpreter(interpreter: Interpreter) -> Self {
        Session {
            analyzer: Analyzer::new(),
            interpreter,
            next_id: 0,
        }
    }

    /// Parse, analyze and run one input
    pub fn eval(&mut self, source: &str) -> Result<Evaluation, ReplError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(source, &tokens).with_first_id(self.next_id);
        let program = parser.parse_program()?;
        self.next_id = parser.next_id();

        let checkpoint = self.analyzer.checkpoint();
        let analysis = self.analyzer.analyze_input(&program);
        if analysis.has_errors() {
            return Err(ReplError::Rejected(analysis.diagnostics));
        }

        match self.interpreter.run_input(&program, &analysis) {
            Ok(value) => Ok(Evaluation {
                value: (value != Value::Void).then_some(value),
                warnings: analysis.diagnostics,
            }),
            Err(fault) => {
                self.analyzer.restore(checkpoint);
                Err(ReplError::Fault(fault))
            }
        }
    }

    /// Top-level bindings with their types and current values
    pub fn globals(&self) -> Vec<(String, Type, Value)> {
        self.interpreter.globals()
    }
}

/// Interactive line editor around a [`Session`]
pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL
    pub fn new(config: InterpreterConfig) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            session: Session::new(config),
            history_path,
        };

        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("Rev REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() { PROMPT } else { CONTINUATION_PROMPT };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    if buffer.is_empty() {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if trimmed.starts_with(':') {
                            let _ = self.editor.add_history_entry(trimmed);
                            if self.handle_command(trimmed) {
                                break;
                            }
                            continue;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');
                    // Keep reading until braces and parentheses balance
                    if open_delimiters(&buffer) > 0 {
                        continue;
                    }

                    let input = std::mem::take(&mut buffer);
                    let _ = self.editor.add_history_entry(input.trim_end());
                    self.eval_input(&input);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    buffer.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Handle REPL commands (starting with :)
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => {
                println!("Goodbye!");
                true
            }
            ":help" | ":h" | ":?" => {
                self.print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            ":env" => {
                for (name, ty, value) in self.session.globals() {
                    println!("{name}: {ty} = {value}");
                }
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    /// Print help message
    fn print_help(&self) {
        println!("Rev REPL Commands:");
        println!("  :help, :h, :?   Show this help");
        println!("  :quit, :q       Exit the REPL");
        println!("  :clear          Clear the screen");
        println!("  :env            List top-level bindings");
        println!();
        println!("You can enter:");
        println!("  - Declarations: var x = 10, const name: string = \"rev\"");
        println!("  - Expressions: x + 5, if x > 3 {{ 1 }} else {{ 2 }}");
        println!("  - Functions: fn add(a: int, b: int): int {{ return a + b }}");
        println!("  - Error sets: error ParseError {{ Empty, Invalid }}");
        println!();
        println!("Input spanning several lines is read until braces balance.");
    }

    fn eval_input(&mut self, input: &str) {
        let reported = match self.session.eval(input) {
            Ok(evaluation) => {
                if let Some(value) = evaluation.value {
                    println!("{value}");
                }
                evaluation
                    .warnings
                    .iter()
                    .try_for_each(|d| report_diagnostic(SOURCE_NAME, input, d))
            }
            Err(ReplError::Compile(err)) => report_error(SOURCE_NAME, input, &err),
            Err(ReplError::Rejected(diagnostics)) => diagnostics
                .iter()
                .try_for_each(|d| report_diagnostic(SOURCE_NAME, input, d)),
            Err(ReplError::Fault(fault)) => report_fault(SOURCE_NAME, input, &fault),
        };
        if let Err(err) = reported {
            eprintln!("Error: {err}");
        }
    }
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use crate::interp::{ErrorKind, SharedBuffer};

    fn session() -> (Session, SharedBuffer) {
        let out = SharedBuffer::new();
        let session = Session::with_output(InterpreterConfig::default(), Box::new(out.clone()));
        (session, out)
    }

    fn value_of(session: &mut Session, source: &str) -> Option<Value> {
        session.eval(source).expect("input should be accepted").value
    }

    #[test]
    fn test_binding_persists_between_inputs() {
        let (mut s, _) = session();
        assert_eq!(value_of(&mut s, "var x = 10"), None);
        assert_eq!(value_of(&mut s, "x + 5"), Some(Value::Int(15)));
    }

    #[test]
    fn test_function_declared_in_earlier_input() {
        let (mut s, _) = session();
        value_of(&mut s, "fn double(n: int): int {\n    return n * 2\n}");
        assert_eq!(value_of(&mut s, "double(21)"), Some(Value::Int(42)));
    }

    #[test]
    fn test_print_writes_to_sink() {
        let (mut s, out) = session();
        assert_eq!(value_of(&mut s, "var a: int|string = 5\nprint(a)"), None);
        assert_eq!(out.contents(), "5\n");
    }

    #[test]
    fn test_rejected_input_reports_diagnostics() {
        let (mut s, _) = session();
        match s.eval("var a: int? = null\nvar b = a + 1") {
            Err(ReplError::Rejected(diags)) => {
                assert_eq!(diags.len(), 1);
                assert_eq!(diags[0].kind, DiagnosticKind::NullableUnguarded);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        // Nothing from the rejected input is visible afterwards
        assert!(matches!(s.eval("a"), Err(ReplError::Rejected(_))));
    }

    #[test]
    fn test_fault_rolls_back_top_level() {
        let (mut s, out) = session();
        value_of(&mut s, "var x = 1");
        match s.eval("x = 2\nvar y = 5\nprint(y)\nvar z = 1 / 0") {
            Err(ReplError::Fault(fault)) => assert_eq!(fault.kind, ErrorKind::DivisionByZero),
            other => panic!("expected fault, got {other:?}"),
        }
        // Output already written stays; bindings do not
        assert_eq!(out.contents(), "5\n");
        assert_eq!(value_of(&mut s, "x"), Some(Value::Int(1)));
        assert!(matches!(s.eval("y"), Err(ReplError::Rejected(_))));
    }

    #[test]
    fn test_rollback_keeps_closure_environments_alive() {
        let config = InterpreterConfig {
            gc_threshold: 1,
            ..InterpreterConfig::default()
        };
        let mut s = Session::with_output(config, Box::new(SharedBuffer::new()));
        value_of(
            &mut s,
            "fn make(n: int): fn(): int {\n    return fn(): int {\n        return n\n    }\n}\nvar f = make(1)",
        );
        match s.eval("f = make(2)\nvar g = make(3)\nvar h = make(4)\nvar k = make(5)\nvar z = 1 / 0") {
            Err(ReplError::Fault(fault)) => assert_eq!(fault.kind, ErrorKind::DivisionByZero),
            other => panic!("expected fault, got {other:?}"),
        }
        assert_eq!(value_of(&mut s, "f()"), Some(Value::Int(1)));
    }

    #[test]
    fn test_session_continues_after_errors() {
        let (mut s, _) = session();
        assert!(matches!(s.eval("var = 1"), Err(ReplError::Compile(_))));
        assert!(matches!(s.eval("1 / 0"), Err(ReplError::Fault(_))));
        assert_eq!(value_of(&mut s, "1 + 1"), Some(Value::Int(2)));
    }

    #[test]
    fn test_warnings_do_not_block_input() {
        let (mut s, _) = session();
        let evaluation = s
            .eval("fn f(): int {\n    return 1\n    print(2)\n}\nf()")
            .expect("warnings only");
        assert_eq!(evaluation.value, Some(Value::Int(1)));
        assert_eq!(evaluation.warnings.len(), 1);
    }

    #[test]
    fn test_globals_listing() {
        let (mut s, _) = session();
        value_of(&mut s, "var b: float = 3\nconst a = \"hi\"");
        let listing: Vec<String> = s
            .globals()
            .into_iter()
            .map(|(name, ty, value)| format!("{name}: {ty} = {value}"))
            .collect();
        assert_eq!(listing, vec!["a: string = hi", "b: float = 3.0"]);
    }

    #[test]
    fn test_dirs_home_returns_some() {
        assert!(dirs_home().is_some());
    }

    #[test]
    fn test_constants() {
        assert_eq!(PROMPT, "> ");
        assert_eq!(HISTORY_FILE, ".rev_history");
    }
}
