//! Tree-walking interpreter
//!
//! Runs programs that passed analysis. Values carry no static type; the
//! analyzer's [`TypeTable`](crate::types::TypeTable) tells the evaluator
//! where int-to-float widening applies.

mod env;
mod error;
mod eval;
mod value;

pub use env::{AssignError, FrameArena, FrameId};
pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::{Flow, Interpreter, InterpreterConfig, RunState, SharedBuffer};
pub use value::{Closure, Value};
