//! Expression AST and evaluator.

pub mod ast;
pub mod eval;
pub mod functions;

pub use ast::{BinaryOp, Expr, ProbeKind, UnaryOp};
pub use eval::{EvalContext, EvalError, Evaluated, Value};
