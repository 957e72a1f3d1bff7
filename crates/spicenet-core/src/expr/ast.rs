//! Expression AST.
//!
//! Nodes are immutable trees owned parent-to-child. `Display` renders the
//! SPICE surface syntax, which is what the serializer emits for residual
//! (not fully evaluated) expressions.

use std::fmt;

use num_complex::Complex64;

use crate::units::{Scale, format_number};

/// Unary operators, in SPICE expression syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

/// Binary operators, in SPICE expression syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `\` integer division
    IntDiv,
    /// `**` / `^`
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::IntDiv => "\\",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength, higher binds tighter. Used only for rendering
    /// with minimal parentheses.
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::IntDiv => 5,
            BinaryOp::Pow => 6,
        }
    }
}

/// Probe target kind: `v(...)` or `i(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Voltage,
    Current,
}

impl ProbeKind {
    pub fn letter(self) -> char {
        match self {
            ProbeKind::Voltage => 'v',
            ProbeKind::Current => 'i',
        }
    }
}

/// A SPICE expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal with a pending scale multiplier (`1.5k` keeps
    /// value 1.5 and scale kilo until evaluation).
    Number { value: f64, scale: Option<Scale> },
    /// Complex literal, produced by evaluation, never by parsing.
    Complex(Complex64),
    /// Named parameter or node reference.
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `cond ? then : else`, right-associative.
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `v(node)`, `v(a,b)`, `i(vsource)` — resolved only by the simulator.
    Probe {
        kind: ProbeKind,
        targets: Vec<String>,
    },
    /// `table {expr} = (x1,y1) (x2,y2) ...`
    Table {
        input: Box<Expr>,
        points: Vec<(f64, f64)>,
    },
    /// `tablefile(path)`
    TableFile(String),
    /// `poly(n) ctrl... coeff...`
    Poly {
        degree: usize,
        controllers: Vec<Expr>,
        coefficients: Vec<f64>,
    },
    /// `[a b c]` space-separated vector value.
    List(Vec<Expr>),
}

impl Expr {
    pub fn number(value: f64) -> Expr {
        Expr::Number { value, scale: None }
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::Variable(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn voltage_probe(targets: Vec<String>) -> Expr {
        Expr::Probe {
            kind: ProbeKind::Voltage,
            targets,
        }
    }

    pub fn current_probe(target: impl Into<String>) -> Expr {
        Expr::Probe {
            kind: ProbeKind::Current,
            targets: vec![target.into()],
        }
    }

    /// The literal value if this is a plain (possibly negated) number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number { value, scale } => {
                Some(value * scale.map_or(1.0, Scale::multiplier))
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.as_number().map(|v| -v),
            _ => None,
        }
    }

    /// True if any `v()`/`i()` probe occurs in the tree.
    pub fn has_probe(&self) -> bool {
        match self {
            Expr::Probe { .. } => true,
            Expr::Number { .. } | Expr::Complex(_) | Expr::Variable(_) | Expr::TableFile(_) => {
                false
            }
            Expr::Unary { operand, .. } => operand.has_probe(),
            Expr::Binary { lhs, rhs, .. } => lhs.has_probe() || rhs.has_probe(),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => cond.has_probe() || then_expr.has_probe() || else_expr.has_probe(),
            Expr::Call { args, .. } | Expr::List(args) => args.iter().any(Expr::has_probe),
            Expr::Table { input, .. } => input.has_probe(),
            Expr::Poly { controllers, .. } => controllers.iter().any(Expr::has_probe),
        }
    }

    /// Collect free variable names, in first-occurrence order.
    pub fn free_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Expr::Variable(name) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
            Expr::Number { .. } | Expr::Complex(_) | Expr::Probe { .. } | Expr::TableFile(_) => {}
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.collect_variables(names);
                then_expr.collect_variables(names);
                else_expr.collect_variables(names);
            }
            Expr::Call { args, .. } | Expr::List(args) => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
            Expr::Table { input, .. } => input.collect_variables(names),
            Expr::Poly { controllers, .. } => {
                for c in controllers {
                    c.collect_variables(names);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Ternary { .. } => 0,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { .. } => 7,
            _ => 8,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        if self.precedence() < parent {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { value, scale } => {
                write!(f, "{}", format_number(*value))?;
                if let Some(scale) = scale {
                    write!(f, "{}", scale)?;
                }
                Ok(())
            }
            Expr::Complex(c) => write!(f, "{}+{}j", format_number(c.re), format_number(c.im)),
            Expr::Variable(name) => f.write_str(name),
            Expr::Unary { op, operand } => {
                f.write_str(op.symbol())?;
                operand.fmt_operand(f, 7)
            }
            Expr::Binary { op, lhs, rhs } => {
                lhs.fmt_operand(f, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                // Same-precedence right operands reparse left-associatively,
                // so they need explicit parentheses (except for `**`).
                let right_level = match op {
                    BinaryOp::Pow => op.precedence(),
                    _ => op.precedence() + 1,
                };
                rhs.fmt_operand(f, right_level)
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.fmt_operand(f, 1)?;
                write!(f, " ? {} : {}", then_expr, else_expr)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Probe { kind, targets } => {
                write!(f, "{}({})", kind.letter(), targets.join(","))
            }
            Expr::Table { input, points } => {
                write!(f, "table {{{}}} =", input)?;
                for (x, y) in points {
                    write!(f, " ({},{})", format_number(*x), format_number(*y))?;
                }
                Ok(())
            }
            Expr::TableFile(path) => write!(f, "tablefile({})", path),
            Expr::Poly {
                degree,
                controllers,
                coefficients,
            } => {
                write!(f, "poly({})", degree)?;
                for c in controllers {
                    write!(f, " {}", c)?;
                }
                for c in coefficients {
                    write!(f, " {}", format_number(*c))?;
                }
                Ok(())
            }
            Expr::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_literal_with_scale() {
        let e = Expr::Number {
            value: 1.5,
            scale: Some(Scale::Kilo),
        };
        assert_eq!(e.to_string(), "1.5k");
    }

    #[test]
    fn test_display_minimal_parens() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::number(2.0), Expr::number(3.0)),
            Expr::number(4.0),
        );
        assert_eq!(e.to_string(), "(2 + 3) * 4");

        let e = Expr::binary(
            BinaryOp::Add,
            Expr::number(2.0),
            Expr::binary(BinaryOp::Mul, Expr::number(3.0), Expr::number(4.0)),
        );
        assert_eq!(e.to_string(), "2 + 3 * 4");
    }

    #[test]
    fn test_display_subtraction_right_parens() {
        // a - (b - c) must keep its parentheses.
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::variable("a"),
            Expr::binary(BinaryOp::Sub, Expr::variable("b"), Expr::variable("c")),
        );
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_display_probe() {
        assert_eq!(
            Expr::voltage_probe(vec!["out".into(), "0".into()]).to_string(),
            "v(out,0)"
        );
        assert_eq!(Expr::current_probe("v1").to_string(), "i(v1)");
    }

    #[test]
    fn test_free_variables() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::variable("x"),
            Expr::binary(BinaryOp::Mul, Expr::variable("y"), Expr::variable("x")),
        );
        assert_eq!(e.free_variables(), vec!["x".to_string(), "y".to_string()]);
    }
}
