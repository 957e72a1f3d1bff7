//! Expression evaluation.
//!
//! Evaluation substitutes what it can and returns a smaller residual
//! expression when free names remain; that residual path is how deferred
//! parameters (`.param x = {y+1}` with `y` bound elsewhere) and
//! simulation-time probes are modeled. Only genuine failures (division by
//! zero, bad arity, unknown function) are errors.

use std::collections::HashMap;

use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::functions;
use crate::units::Scale;

/// A fully evaluated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Real(f64),
    Complex(Complex64),
}

impl Value {
    /// Real part; the imaginary part of a complex value is dropped.
    pub fn real(self) -> f64 {
        match self {
            Value::Real(x) => x,
            Value::Complex(c) => c.re,
        }
    }

    pub fn complex(self) -> Complex64 {
        match self {
            Value::Real(x) => Complex64::new(x, 0.0),
            Value::Complex(c) => c,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Value::Real(x) => x == 0.0,
            Value::Complex(c) => c.norm_sqr() == 0.0,
        }
    }

    fn into_expr(self) -> Expr {
        match self {
            Value::Real(x) => Expr::number(x),
            Value::Complex(c) => Expr::Complex(c),
        }
    }
}

/// Evaluation failure.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("function {function} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
}

/// Result of one evaluation: a value, or what is left of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Value(Value),
    Residual(Expr),
}

impl Evaluated {
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Evaluated::Value(v) => Some(*v),
            Evaluated::Residual(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        self.as_value().map(Value::real)
    }

    fn into_expr(self) -> Expr {
        match self {
            Evaluated::Value(v) => v.into_expr(),
            Evaluated::Residual(e) => e,
        }
    }
}

/// Name bindings plus the random source for `gauss`-family functions.
#[derive(Debug)]
pub struct EvalContext {
    bindings: HashMap<String, f64>,
    rng: StdRng,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Bindings are looked up case-insensitively; keys are folded here.
    pub fn with_bindings(bindings: impl IntoIterator<Item = (String, f64)>) -> Self {
        let mut ctx = Self::new();
        for (name, value) in bindings {
            ctx.bind(&name, value);
        }
        ctx
    }

    /// Use a deterministic random source.
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn bind(&mut self, name: &str, value: f64) {
        self.bindings.insert(name.to_ascii_lowercase(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<f64> {
        self.bindings.get(&name.to_ascii_lowercase()).copied()
    }

    /// Evaluate an expression against this context.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Evaluated, EvalError> {
        match expr {
            Expr::Number { value, scale } => Ok(Evaluated::Value(Value::Real(
                value * scale.map_or(1.0, Scale::multiplier),
            ))),
            Expr::Complex(c) => Ok(Evaluated::Value(Value::Complex(*c))),
            Expr::Variable(name) => match self.lookup(name).or_else(|| named_constant(name)) {
                Some(v) => Ok(Evaluated::Value(Value::Real(v))),
                None => Ok(Evaluated::Residual(expr.clone())),
            },
            // Probes never self-evaluate.
            Expr::Probe { .. } | Expr::TableFile(_) | Expr::Poly { .. } => {
                Ok(Evaluated::Residual(expr.clone()))
            }
            Expr::Unary { op, operand } => {
                let inner = self.evaluate(operand)?;
                match inner {
                    Evaluated::Value(v) => Ok(Evaluated::Value(apply_unary(*op, v))),
                    Evaluated::Residual(e) => {
                        Ok(Evaluated::Residual(Expr::unary(*op, e)))
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                // Both sides are evaluated regardless of operator; SPICE
                // expressions have no side effects and `&&`/`||` are not
                // required to short-circuit.
                let left = self.evaluate(lhs)?;
                let right = self.evaluate(rhs)?;
                match (left, right) {
                    (Evaluated::Value(l), Evaluated::Value(r)) => {
                        Ok(Evaluated::Value(apply_binary(*op, l, r)?))
                    }
                    (left, right) => Ok(Evaluated::Residual(Expr::binary(
                        *op,
                        left.into_expr(),
                        right.into_expr(),
                    ))),
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => match self.evaluate(cond)? {
                Evaluated::Value(c) => {
                    if c.is_zero() {
                        self.evaluate(else_expr)
                    } else {
                        self.evaluate(then_expr)
                    }
                }
                Evaluated::Residual(cond) => {
                    let then_expr = self.evaluate(then_expr)?.into_expr();
                    let else_expr = self.evaluate(else_expr)?.into_expr();
                    Ok(Evaluated::Residual(Expr::Ternary {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    }))
                }
            },
            Expr::Call { name, args } => {
                let lname = name.to_ascii_lowercase();
                if let Some((min, max)) = functions::arity(&lname)
                    && (args.len() < min || args.len() > max)
                {
                    return Err(EvalError::ArityMismatch {
                        function: lname,
                        expected: min,
                        got: args.len(),
                    });
                }
                let mut values = Vec::with_capacity(args.len());
                let mut residual = functions::is_deferred(&lname);
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    let evaluated = self.evaluate(arg)?;
                    if evaluated.as_value().is_none() {
                        residual = true;
                    }
                    parts.push(evaluated);
                }
                if residual {
                    return Ok(Evaluated::Residual(Expr::call(
                        lname,
                        parts.into_iter().map(Evaluated::into_expr).collect(),
                    )));
                }
                for part in &parts {
                    values.push(part.as_value().expect("no residual parts here"));
                }
                let result = functions::apply(&lname, &values, &mut self.rng)?;
                Ok(Evaluated::Value(result))
            }
            Expr::Table { input, points } => match self.evaluate(input)? {
                Evaluated::Value(v) => {
                    Ok(Evaluated::Value(Value::Real(interpolate(points, v.real()))))
                }
                Evaluated::Residual(input) => Ok(Evaluated::Residual(Expr::Table {
                    input: Box::new(input),
                    points: points.clone(),
                })),
            },
            Expr::List(items) => {
                let parts: Vec<Expr> = items
                    .iter()
                    .map(|item| self.evaluate(item).map(Evaluated::into_expr))
                    .collect::<Result<_, _>>()?;
                Ok(Evaluated::Residual(Expr::List(parts)))
            }
        }
    }

    /// Evaluate and require a real number.
    pub fn evaluate_real(&mut self, expr: &Expr) -> Result<Option<f64>, EvalError> {
        Ok(self.evaluate(expr)?.as_real())
    }
}

fn named_constant(name: &str) -> Option<f64> {
    match name.to_ascii_lowercase().as_str() {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn apply_unary(op: UnaryOp, v: Value) -> Value {
    match op {
        UnaryOp::Neg => match v {
            Value::Real(x) => Value::Real(-x),
            Value::Complex(c) => Value::Complex(-c),
        },
        UnaryOp::Not => Value::Real(if v.is_zero() { 1.0 } else { 0.0 }),
        UnaryOp::BitNot => Value::Real(!(v.real() as i64) as f64),
    }
}

fn apply_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    // Comparisons and logic yield 1/0; SPICE has no boolean values.
    let bool_result = |b: bool| Value::Real(if b { 1.0 } else { 0.0 });

    if let (Value::Real(a), Value::Real(b)) = (l, r) {
        let v = match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a / b
            }
            Mod => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                a % b
            }
            IntDiv => {
                if b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                (a / b).trunc()
            }
            Pow => a.powf(b),
            Lt => return Ok(bool_result(a < b)),
            Le => return Ok(bool_result(a <= b)),
            Gt => return Ok(bool_result(a > b)),
            Ge => return Ok(bool_result(a >= b)),
            Eq => return Ok(bool_result(a == b)),
            Ne => return Ok(bool_result(a != b)),
            And => return Ok(bool_result(a != 0.0 && b != 0.0)),
            Or => return Ok(bool_result(a != 0.0 || b != 0.0)),
        };
        return Ok(Value::Real(v));
    }

    let (a, b) = (l.complex(), r.complex());
    let v = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => {
            if b.norm_sqr() == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        Pow => a.powc(b),
        Eq => return Ok(bool_result(a == b)),
        Ne => return Ok(bool_result(a != b)),
        // Remaining comparisons fall back to real parts.
        Lt => return Ok(bool_result(a.re < b.re)),
        Le => return Ok(bool_result(a.re <= b.re)),
        Gt => return Ok(bool_result(a.re > b.re)),
        Ge => return Ok(bool_result(a.re >= b.re)),
        And => return Ok(bool_result(!l.is_zero() && !r.is_zero())),
        Or => return Ok(bool_result(!l.is_zero() || !r.is_zero())),
        Mod | IntDiv => return Err(EvalError::DivisionByZero),
    };
    Ok(Value::Complex(v))
}

/// Piecewise-linear interpolation over sorted `(x, y)` points, clamped at
/// both ends.
fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    match points {
        [] => 0.0,
        [(_, y)] => *y,
        _ => {
            if x <= points[0].0 {
                return points[0].1;
            }
            for pair in points.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                if x <= x1 {
                    if x1 == x0 {
                        return y1;
                    }
                    return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
                }
            }
            points[points.len() - 1].1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::ProbeKind;

    fn ctx() -> EvalContext {
        EvalContext::new().seeded(1)
    }

    fn eval(expr: &Expr) -> Evaluated {
        ctx().evaluate(expr).unwrap()
    }

    #[test]
    fn test_scale_applied_at_evaluation() {
        let e = Expr::Number {
            value: 1.5,
            scale: Some(Scale::Kilo),
        };
        assert_eq!(eval(&e).as_real(), Some(1500.0));
    }

    #[test]
    fn test_comparison_yields_one_zero() {
        let e = Expr::binary(BinaryOp::Lt, Expr::number(1.0), Expr::number(2.0));
        assert_eq!(eval(&e).as_real(), Some(1.0));
        let e = Expr::binary(BinaryOp::Ge, Expr::number(1.0), Expr::number(2.0));
        assert_eq!(eval(&e).as_real(), Some(0.0));
    }

    #[test]
    fn test_division_by_zero() {
        let e = Expr::binary(BinaryOp::Div, Expr::number(1.0), Expr::number(0.0));
        assert_eq!(ctx().evaluate(&e), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_unknown_variable_is_residual() {
        let e = Expr::binary(BinaryOp::Add, Expr::variable("y"), Expr::number(1.0));
        match eval(&e) {
            Evaluated::Residual(r) => assert_eq!(r.to_string(), "y + 1"),
            Evaluated::Value(_) => panic!("expected residual"),
        }
    }

    #[test]
    fn test_partial_substitution() {
        let mut ctx = EvalContext::with_bindings([("a".to_string(), 2.0)]);
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::variable("a"),
            Expr::binary(BinaryOp::Add, Expr::variable("b"), Expr::number(1.0)),
        );
        match ctx.evaluate(&e).unwrap() {
            Evaluated::Residual(r) => assert_eq!(r.to_string(), "2 * (b + 1)"),
            Evaluated::Value(_) => panic!("expected residual"),
        }
    }

    #[test]
    fn test_probe_stays_symbolic() {
        let e = Expr::Probe {
            kind: ProbeKind::Voltage,
            targets: vec!["out".into()],
        };
        assert!(matches!(eval(&e), Evaluated::Residual(_)));
    }

    #[test]
    fn test_ternary_selects_branch() {
        let e = Expr::Ternary {
            cond: Box::new(Expr::number(1.0)),
            then_expr: Box::new(Expr::number(10.0)),
            else_expr: Box::new(Expr::variable("unbound")),
        };
        assert_eq!(eval(&e).as_real(), Some(10.0));
    }

    #[test]
    fn test_named_constants() {
        let e = Expr::binary(BinaryOp::Mul, Expr::number(2.0), Expr::variable("pi"));
        let v = eval(&e).as_real().unwrap();
        assert!((v - std::f64::consts::TAU).abs() < 1e-12);
    }

    #[test]
    fn test_bindings_case_insensitive() {
        let mut ctx = EvalContext::with_bindings([("R_Val".to_string(), 1000.0)]);
        let e = Expr::variable("r_val");
        assert_eq!(ctx.evaluate(&e).unwrap().as_real(), Some(1000.0));
    }

    #[test]
    fn test_table_interpolation() {
        let e = Expr::Table {
            input: Box::new(Expr::number(1.5)),
            points: vec![(0.0, 0.0), (1.0, 10.0), (2.0, 20.0)],
        };
        assert_eq!(eval(&e).as_real(), Some(15.0));

        // Clamped outside the table.
        let e = Expr::Table {
            input: Box::new(Expr::number(5.0)),
            points: vec![(0.0, 0.0), (1.0, 10.0)],
        };
        assert_eq!(eval(&e).as_real(), Some(10.0));
    }

    #[test]
    fn test_deferred_functions_stay_residual() {
        let e = Expr::call("ddt", vec![Expr::number(3.0)]);
        assert!(matches!(eval(&e), Evaluated::Residual(_)));
    }

    #[test]
    fn test_call_arity_checked() {
        let e = Expr::call("atan2", vec![Expr::number(1.0)]);
        assert!(matches!(
            ctx().evaluate(&e),
            Err(EvalError::ArityMismatch { .. })
        ));
    }
}
