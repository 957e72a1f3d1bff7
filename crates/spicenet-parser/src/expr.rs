//! Expression grammar.
//!
//! Recursive descent over the token stream, one function per precedence
//! level, lowest binding first: ternary, `||`, `&&`, relational,
//! additive, multiplicative, power, unary. All binary operators are
//! left-associative; `**`/`^` is right-associative, so `2**3**2` is 512.
//! `( )`, `{ }`, and `' '` all group identically; `{ }` and `' '` are the
//! SPICE spellings for behavioral and legacy expression values.

use spicenet_core::expr::{BinaryOp, Expr, ProbeKind, UnaryOp};

use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Parse a complete expression; every token must be consumed.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr> {
    let mut parser = ExprParser::new(tokens);
    let expr = parser.parse_one()?;
    if parser.pos < tokens.len() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

/// Convenience for tests and callers holding raw text.
pub fn parse_expression_str(text: &str) -> Result<Expr> {
    parse_expression(&crate::lexer::tokenize_str(text)?)
}

/// Expression parser over a token slice; the netlist grammar embeds one
/// mid-card and reads back how far it got.
pub struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Index of the first unconsumed token.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Parse one expression at the lowest precedence level.
    pub fn parse_one(&mut self) -> Result<Expr> {
        self.parse_ternary()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.pos.line)
            .unwrap_or(0)
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match self.peek() {
            Some(token) => format!("'{}'", token.text),
            None => "end of line".to_string(),
        };
        Error::Parse {
            line: self.line(),
            message: format!("expected {}, found {}", expected, found),
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_ternary()?;
        self.expect(TokenKind::Colon, "':'")?;
        let else_expr = self.parse_ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        while self.eat(TokenKind::AndAnd) {
            let right = self.parse_relational()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Less) => BinaryOp::Lt,
                Some(TokenKind::LessEqual) => BinaryOp::Le,
                Some(TokenKind::Greater) => BinaryOp::Gt,
                Some(TokenKind::GreaterEqual) => BinaryOp::Ge,
                Some(TokenKind::EqualEqual) => BinaryOp::Eq,
                Some(TokenKind::NotEqual) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                Some(TokenKind::Backslash) => BinaryOp::IntDiv,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_power()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;
        if matches!(self.kind(), Some(TokenKind::Power | TokenKind::Caret)) {
            self.pos += 1;
            let exponent = self.parse_power()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.kind() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::unary(UnaryOp::Neg, self.parse_unary()?))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            Some(TokenKind::Bang) => {
                self.pos += 1;
                Ok(Expr::unary(UnaryOp::Not, self.parse_unary()?))
            }
            Some(TokenKind::Tilde) => {
                self.pos += 1;
                Ok(Expr::unary(UnaryOp::BitNot, self.parse_unary()?))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.kind() {
            Some(TokenKind::Number) => {
                let token = self.advance().expect("peeked");
                Ok(Expr::Number {
                    value: token.value.expect("number token carries a value"),
                    scale: token.scale,
                })
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            Some(TokenKind::LBrace) => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.expect(TokenKind::RBrace, "'}'")?;
                Ok(inner)
            }
            Some(TokenKind::Quote) => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.expect(TokenKind::Quote, "closing quote")?;
                Ok(inner)
            }
            Some(TokenKind::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.kind() != Some(TokenKind::RBracket) {
                    if self.peek().is_none() {
                        return Err(self.unexpected("']'"));
                    }
                    items.push(self.parse_ternary()?);
                }
                self.pos += 1;
                Ok(Expr::List(items))
            }
            Some(TokenKind::Id) => self.parse_identifier(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_identifier(&mut self) -> Result<Expr> {
        let token = self.advance().expect("peeked").clone();
        let name = token.text.to_ascii_lowercase();

        if self.kind() != Some(TokenKind::LParen) {
            // `table {expr} = ...` has no parenthesis after the keyword.
            if name == "table" && self.kind() == Some(TokenKind::LBrace) {
                return self.parse_table();
            }
            return Ok(Expr::Variable(name));
        }
        self.pos += 1; // '('

        match name.as_str() {
            "v" => {
                let mut targets = vec![self.parse_probe_target()?];
                if self.eat(TokenKind::Comma) {
                    targets.push(self.parse_probe_target()?);
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Probe {
                    kind: ProbeKind::Voltage,
                    targets,
                })
            }
            "i" => {
                let target = self.parse_probe_target()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Probe {
                    kind: ProbeKind::Current,
                    targets: vec![target],
                })
            }
            "tablefile" => {
                let path = self.parse_path_until_rparen()?;
                Ok(Expr::TableFile(path))
            }
            "poly" => self.parse_poly(),
            _ => {
                // Plain call; arguments may be comma- or space-separated
                // (legacy waveform forms use bare spaces).
                let mut args = Vec::new();
                while self.kind() != Some(TokenKind::RParen) {
                    if self.peek().is_none() {
                        return Err(self.unexpected("')'"));
                    }
                    args.push(self.parse_ternary()?);
                    self.eat(TokenKind::Comma);
                }
                self.pos += 1;
                Ok(Expr::Call { name, args })
            }
        }
    }

    fn parse_probe_target(&mut self) -> Result<String> {
        match self.kind() {
            Some(TokenKind::Id | TokenKind::Number) => {
                Ok(self.advance().expect("peeked").text.to_ascii_lowercase())
            }
            _ => Err(self.unexpected("node or device name")),
        }
    }

    fn parse_path_until_rparen(&mut self) -> Result<String> {
        let mut path = String::new();
        loop {
            match self.kind() {
                Some(TokenKind::RParen) => {
                    self.pos += 1;
                    if path.is_empty() {
                        return Err(self.unexpected("file path"));
                    }
                    return Ok(path);
                }
                Some(_) => path.push_str(&self.advance().expect("peeked").text),
                None => return Err(self.unexpected("')'")),
            }
        }
    }

    /// `table {expr} = (x1,y1) (x2,y2) ...`
    fn parse_table(&mut self) -> Result<Expr> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let input = self.parse_ternary()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        self.expect(TokenKind::Assign, "'='")?;

        let mut points = Vec::new();
        while self.eat(TokenKind::LParen) {
            let x = self.parse_signed_number()?;
            self.eat(TokenKind::Comma);
            let y = self.parse_signed_number()?;
            self.expect(TokenKind::RParen, "')'")?;
            points.push((x, y));
        }
        if points.is_empty() {
            return Err(self.unexpected("'(x,y)' point"));
        }
        Ok(Expr::Table {
            input: Box::new(input),
            points,
        })
    }

    /// `poly(n) ctrl... coeff...` — the trailing run of plain numbers is
    /// the coefficient list, everything between `(n)` and that run
    /// controls.
    fn parse_poly(&mut self) -> Result<Expr> {
        let degree = match self.kind() {
            Some(TokenKind::Number) => {
                let v = self.advance().expect("peeked").value.expect("number");
                v as usize
            }
            _ => return Err(self.unexpected("polynomial degree")),
        };
        self.expect(TokenKind::RParen, "')'")?;

        let mut operands = Vec::new();
        loop {
            match self.kind() {
                // A bare `(n1,n2)` pair is a differential voltage control.
                Some(TokenKind::LParen) => {
                    self.pos += 1;
                    let mut targets = vec![self.parse_probe_target()?];
                    if self.eat(TokenKind::Comma) {
                        targets.push(self.parse_probe_target()?);
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    operands.push(Expr::Probe {
                        kind: ProbeKind::Voltage,
                        targets,
                    });
                }
                _ if self.starts_primary() => operands.push(self.parse_unary()?),
                _ => break,
            }
        }

        let split = operands
            .iter()
            .rposition(|e| e.as_number().is_none())
            .map_or(0, |i| i + 1);
        let coefficients: Vec<f64> = operands
            .split_off(split)
            .iter()
            .map(|e| e.as_number().expect("trailing run is numeric"))
            .collect();
        if coefficients.is_empty() {
            return Err(self.unexpected("polynomial coefficients"));
        }
        Ok(Expr::Poly {
            degree,
            controllers: operands,
            coefficients,
        })
    }

    fn starts_primary(&self) -> bool {
        matches!(
            self.kind(),
            Some(
                TokenKind::Number
                    | TokenKind::Id
                    | TokenKind::LParen
                    | TokenKind::LBrace
                    | TokenKind::Minus
                    | TokenKind::Plus
            )
        )
    }

    /// A possibly negated numeric literal, scale applied.
    fn parse_signed_number(&mut self) -> Result<f64> {
        let negative = self.eat(TokenKind::Minus);
        match self.kind() {
            Some(TokenKind::Number) => {
                let v = self
                    .advance()
                    .expect("peeked")
                    .scaled_value()
                    .expect("number");
                Ok(if negative { -v } else { v })
            }
            _ => Err(self.unexpected("number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use spicenet_core::EvalContext;

    use super::*;

    fn eval(text: &str) -> f64 {
        let expr = parse_expression_str(text).unwrap();
        EvalContext::new()
            .evaluate(&expr)
            .unwrap()
            .as_real()
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 * 3 % 4"), 2.0);
        assert_eq!(eval("7 \\ 2"), 3.0);
    }

    #[test]
    fn test_power_right_associative() {
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("2 ^ 10"), 1024.0);
    }

    #[test]
    fn test_unary_binds_tighter_than_power() {
        assert_eq!(eval("-2 ** 2"), 4.0);
        assert_eq!(eval("-(2 ** 2)"), -4.0);
    }

    #[test]
    fn test_scale_literal_equivalence() {
        assert_eq!(eval("1.5k"), 1500.0);
        assert_eq!(eval("1500"), 1500.0);
        assert_eq!(eval("1.5e3"), 1500.0);
    }

    #[test]
    fn test_relational_and_logic() {
        assert_eq!(eval("1 < 2"), 1.0);
        assert_eq!(eval("1 > 2"), 0.0);
        assert_eq!(eval("1 < 2 && 3 >= 3"), 1.0);
        assert_eq!(eval("0 || 1"), 1.0);
        assert_eq!(eval("!0"), 1.0);
        assert_eq!(eval("1 == 1 != 0"), 1.0);
    }

    #[test]
    fn test_ternary_right_associative() {
        // a ? b : c ? d : e groups as a ? b : (c ? d : e)
        assert_eq!(eval("0 ? 1 : 0 ? 2 : 3"), 3.0);
        assert_eq!(eval("1 ? 1 : 0 ? 2 : 3"), 1.0);
    }

    #[test]
    fn test_grouping_forms_are_equivalent() {
        assert_eq!(eval("{2 + 3} * 4"), 20.0);
        assert_eq!(eval("'2 + 3' * 4"), 20.0);
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(eval("max(1, 5, 3)"), 5.0);
        assert_eq!(eval("limit(10, 0, 5)"), 5.0);
        assert!((eval("sqrt(2) ** 2") - 2.0).abs() < 1e-12);
        assert_eq!(eval("if(1 < 2, 10, 20)"), 10.0);
    }

    #[test]
    fn test_space_separated_call_args() {
        let expr = parse_expression_str("pulse(0 1 0 1n 1n 5u 10u)").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "pulse");
                assert_eq!(args.len(), 7);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_probes() {
        let expr = parse_expression_str("v(out) * 2 + i(v1)").unwrap();
        assert!(expr.has_probe());
        let expr = parse_expression_str("v(1, 2)").unwrap();
        assert_eq!(
            expr,
            Expr::Probe {
                kind: ProbeKind::Voltage,
                targets: vec!["1".into(), "2".into()],
            }
        );
    }

    #[test]
    fn test_table() {
        let expr = parse_expression_str("table {v(in)} = (0,0) (1,10) (2,20)").unwrap();
        match expr {
            Expr::Table { input, points } => {
                assert!(input.has_probe());
                assert_eq!(points, vec![(0.0, 0.0), (1.0, 10.0), (2.0, 20.0)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_poly() {
        let expr = parse_expression_str("poly(1) v(3, 0) 0 1m").unwrap();
        match expr {
            Expr::Poly {
                degree,
                controllers,
                coefficients,
            } => {
                assert_eq!(degree, 1);
                assert_eq!(controllers.len(), 1);
                assert_eq!(coefficients, vec![0.0, 1e-3]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_poly_node_pair_form() {
        let expr = parse_expression_str("poly(1) (1,2) 0 1m").unwrap();
        match expr {
            Expr::Poly {
                controllers,
                coefficients,
                ..
            } => {
                assert_eq!(
                    controllers,
                    vec![Expr::Probe {
                        kind: ProbeKind::Voltage,
                        targets: vec!["1".into(), "2".into()],
                    }]
                );
                assert_eq!(coefficients, vec![0.0, 1e-3]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_tablefile() {
        let expr = parse_expression_str("tablefile(data/diode.txt)").unwrap();
        assert_eq!(expr, Expr::TableFile("data/diode.txt".into()));
    }

    #[test]
    fn test_number_with_unit_word() {
        assert_eq!(eval("10Volts"), 10.0);
    }

    #[test]
    fn test_error_reports_position() {
        let err = parse_expression_str("2 + * 3").unwrap_err();
        match err {
            Error::Parse { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("expected expression"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_expression_str("1 + 2 )").is_err());
    }
}
