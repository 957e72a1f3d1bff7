//! Element card parsing (R, C, L, D, Q, M, J, V, I, E, F, G, H, B, S, W,
//! X, K, T).
//!
//! The first letter of the card selects the device kind; the kind fixes
//! how many node tokens to read before values begin. Values that are
//! brace/quote groups, `poly(...)`, `table`, or `key={expr}` forms route
//! through the expression grammar.

use indexmap::IndexMap;
use spicenet_core::DeviceKind;
use spicenet_core::expr::Expr;

use crate::error::{Error, Result};
use crate::expr::ExprParser;
use crate::lexer::{Token, TokenKind};

use super::types::ElementCard;

pub(crate) fn parse_element_card(tokens: &[Token], line: usize) -> Result<ElementCard> {
    let name = tokens[0].text.clone();
    let prefix = name.chars().next().expect("identifier is non-empty");
    let kind = DeviceKind::from_prefix(prefix).ok_or_else(|| Error::Parse {
        line,
        message: format!("unknown element prefix '{}' in '{}'", prefix, name),
    })?;

    let mut card = CardParser {
        tokens,
        pos: 1,
        line,
    };

    let mut nodes = Vec::new();
    match kind {
        DeviceKind::SubcircuitInstance => {
            // Nodes run up to the trailing subcircuit name.
            let bare = card.bare_run();
            if bare < 2 {
                return Err(Error::Parse {
                    line,
                    message: format!("subcircuit instance '{}' needs nodes and a name", name),
                });
            }
            for _ in 0..bare - 1 {
                nodes.push(card.expect_node()?);
            }
        }
        DeviceKind::Vcvs | DeviceKind::Vccs => {
            nodes.push(card.expect_node()?);
            nodes.push(card.expect_node()?);
            // Four-port linear form; otherwise poly/value/table follows.
            if card.bare_run() >= 2 {
                nodes.push(card.expect_node()?);
                nodes.push(card.expect_node()?);
            }
        }
        DeviceKind::Switch => {
            // S with both control nodes has at least n+ n- c+ c- model.
            let count = if card.bare_run() >= 5 { 4 } else { 2 };
            for _ in 0..count {
                nodes.push(card.expect_node()?);
            }
        }
        _ => {
            for _ in 0..kind.min_nodes() {
                nodes.push(card.expect_node()?);
            }
        }
    }

    let (positionals, keywords) = card.parse_values(kind)?;

    Ok(ElementCard {
        kind,
        name,
        nodes,
        positionals,
        keywords,
        line,
    })
}

struct CardParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> CardParser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    /// Length of the run of bare words (nodes, names, plain numbers)
    /// starting at the cursor. A name followed by `=` or `(`, a
    /// `params:` marker, or any grouping token ends the run.
    fn bare_run(&self) -> usize {
        let mut n = 0;
        loop {
            let Some(token) = self.peek_at(n) else {
                break;
            };
            match token.kind {
                TokenKind::Number => n += 1,
                TokenKind::Id => {
                    match self.peek_at(n + 1).map(|t| t.kind) {
                        Some(TokenKind::Assign | TokenKind::LParen) => break,
                        Some(TokenKind::Colon) if token.is_id("params") => break,
                        _ => n += 1,
                    }
                }
                _ => break,
            }
        }
        n
    }

    fn expect_node(&mut self) -> Result<String> {
        match self.peek() {
            Some(token) if matches!(token.kind, TokenKind::Id | TokenKind::Number) => {
                let text = token.text.to_ascii_lowercase();
                self.pos += 1;
                Ok(text)
            }
            found => Err(Error::Parse {
                line: self.line,
                message: format!(
                    "expected node name, found {}",
                    found.map_or("end of line".to_string(), |t| format!("'{}'", t.text))
                ),
            }),
        }
    }

    fn parse_value(&mut self) -> Result<Expr> {
        let mut sub = ExprParser::new(&self.tokens[self.pos..]);
        let expr = sub.parse_one()?;
        self.pos += sub.pos();
        Ok(expr)
    }

    /// Remaining card tokens: positionals interleaved with `key=value`
    /// pairs; a `params:` marker (subcircuit instances) is skipped and
    /// the pairs after it land in the same keyword map.
    fn parse_values(
        &mut self,
        kind: DeviceKind,
    ) -> Result<(Vec<Expr>, IndexMap<String, Expr>)> {
        let mut positionals = Vec::new();
        let mut keywords = IndexMap::new();

        while let Some(token) = self.peek() {
            if token.is_id("params") && self.peek_at(1).map(|t| t.kind) == Some(TokenKind::Colon)
            {
                self.pos += 2;
                continue;
            }
            if token.kind == TokenKind::Id
                && self.peek_at(1).map(|t| t.kind) == Some(TokenKind::Assign)
            {
                let key = token.text.to_ascii_lowercase();
                self.pos += 2;
                let value = self.parse_value()?;
                keywords.insert(key, value);
                continue;
            }
            // Source keywords stay bare words even when a parameter of
            // the same name is in scope.
            if matches!(
                kind,
                DeviceKind::VoltageSource | DeviceKind::CurrentSource
            ) && (token.is_id("dc") || token.is_id("ac"))
            {
                positionals.push(Expr::Variable(token.text.to_ascii_lowercase()));
                self.pos += 1;
                continue;
            }
            positionals.push(self.parse_value()?);
        }

        Ok((positionals, keywords))
    }
}
