//! SPICE netlist lexer.
//!
//! Lexing happens in two stages. [`logical_lines`] joins physical lines
//! (`+` continuation) and strips comments (`*` lines, `;`/`$` trailers);
//! [`tokenize`] then turns one logical line into a flat token stream.
//! Numeric literals capture their scale letter and trailing unit word
//! separately so `100nF` lexes as 100 nano with unit word "F".

use spicenet_core::units::{Scale, split_suffix};

use crate::error::{Error, Result};

/// Token kinds. Multi-character operators are single tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier (element name, node, keyword).
    Id,
    /// Numeric literal; the numeric value, scale, and unit word are on
    /// the token.
    Number,
    /// Double-quoted string.
    Str,
    /// Dot command; token text is the command name without the dot.
    DotCommand,
    Plus,
    Minus,
    Star,
    /// `**`
    Power,
    Slash,
    Percent,
    Backslash,
    Caret,
    Bang,
    Tilde,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,
    Question,
    Colon,
    /// `=`
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    /// `'` quote-expression delimiter.
    Quote,
    At,
}

/// Source position of a token within the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

/// A lexed token. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Numeric part of a `Number` token, before scaling.
    pub value: Option<f64>,
    pub scale: Option<Scale>,
    /// Trailing unit word of a `Number` token, recorded but ignored.
    pub unit: Option<String>,
    pub pos: SourcePos,
}

impl Token {
    fn simple(kind: TokenKind, text: &str, pos: SourcePos) -> Self {
        Token {
            kind,
            text: text.to_string(),
            value: None,
            scale: None,
            unit: None,
            pos,
        }
    }

    /// The token's numeric value with its scale applied.
    pub fn scaled_value(&self) -> Option<f64> {
        let value = self.value?;
        Some(value * self.scale.map_or(1.0, Scale::multiplier))
    }

    pub fn is_id(&self, word: &str) -> bool {
        self.kind == TokenKind::Id && self.text.eq_ignore_ascii_case(word)
    }
}

/// One continuation-joined netlist line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    pub text: String,
    /// Physical line number where the logical line starts (1-based).
    pub line: usize,
}

/// Join physical lines into logical lines.
///
/// A line starting with `+` continues the previous logical line with a
/// single separating space. Whole-line comments (`*`) vanish, including
/// between a line and its continuation. `;` and `$` start end-of-line
/// comments.
pub fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let mut lines: Vec<LogicalLine> = Vec::new();
    let mut current: Option<usize> = None;

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        if let Some(rest) = raw.strip_prefix('+') {
            if let Some(slot) = current
                && let Some(text) = strip_comment(rest)
            {
                let joined = &mut lines[slot].text;
                if !joined.is_empty() {
                    joined.push(' ');
                }
                joined.push_str(text.trim());
            }
            continue;
        }
        let trimmed = raw.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            // Comments do not break an in-progress continuation chain.
            continue;
        }
        let Some(text) = strip_comment(trimmed) else {
            continue;
        };
        lines.push(LogicalLine {
            text: text.trim().to_string(),
            line: number,
        });
        current = Some(lines.len() - 1);
    }

    lines.retain(|l| !l.text.is_empty());
    lines
}

/// Remove a `;` or `$` end-of-line comment. Returns `None` if nothing is
/// left.
fn strip_comment(text: &str) -> Option<&str> {
    let cut = text
        .find(';')
        .into_iter()
        .chain(text.find('$'))
        .min()
        .unwrap_or(text.len());
    let text = text[..cut].trim_end();
    if text.is_empty() { None } else { Some(text) }
}

/// Tokenize one logical line.
pub fn tokenize(line: &LogicalLine) -> Result<Vec<Token>> {
    Lexer::new(&line.text, line.line).run()
}

/// Tokenize a bare string as line 1; convenient for expressions.
pub fn tokenize_str(text: &str) -> Result<Vec<Token>> {
    Lexer::new(text, 1).run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            line,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c == b' ' || c == b'\t' {
                self.pos += 1;
                continue;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn here(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.pos + 1,
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        use TokenKind::*;

        let pos = self.here();
        let c = self.peek().expect("next_token called at end of input");

        // Two-character operators first.
        let two: Option<(TokenKind, &str)> = match (c, self.peek_at(1)) {
            (b'*', Some(b'*')) => Some((Power, "**")),
            (b'&', Some(b'&')) => Some((AndAnd, "&&")),
            (b'|', Some(b'|')) => Some((OrOr, "||")),
            (b'<', Some(b'=')) => Some((LessEqual, "<=")),
            (b'>', Some(b'=')) => Some((GreaterEqual, ">=")),
            (b'=', Some(b'=')) => Some((EqualEqual, "==")),
            (b'!', Some(b'=')) => Some((NotEqual, "!=")),
            _ => None,
        };
        if let Some((kind, text)) = two {
            self.pos += 2;
            return Ok(Token::simple(kind, text, pos));
        }

        let single: Option<(TokenKind, &str)> = match c {
            b'+' => Some((Plus, "+")),
            b'-' => Some((Minus, "-")),
            b'*' => Some((Star, "*")),
            b'/' => Some((Slash, "/")),
            b'%' => Some((Percent, "%")),
            b'\\' => Some((Backslash, "\\")),
            b'^' => Some((Caret, "^")),
            b'!' => Some((Bang, "!")),
            b'~' => Some((Tilde, "~")),
            b'&' => Some((Amp, "&")),
            b'|' => Some((Pipe, "|")),
            b'<' => Some((Less, "<")),
            b'>' => Some((Greater, ">")),
            b'?' => Some((Question, "?")),
            b':' => Some((Colon, ":")),
            b'=' => Some((Assign, "=")),
            b'(' => Some((LParen, "(")),
            b')' => Some((RParen, ")")),
            b'[' => Some((LBracket, "[")),
            b']' => Some((RBracket, "]")),
            b'{' => Some((LBrace, "{")),
            b'}' => Some((RBrace, "}")),
            b',' => Some((Comma, ",")),
            b'\'' => Some((Quote, "'")),
            b'@' => Some((At, "@")),
            _ => None,
        };
        if let Some((kind, text)) = single {
            self.pos += 1;
            return Ok(Token::simple(kind, text, pos));
        }

        match c {
            b'.' => {
                match self.peek_at(1) {
                    Some(n) if n.is_ascii_alphabetic() => self.read_dot_command(pos),
                    Some(n) if n.is_ascii_digit() => self.read_number(pos),
                    _ => Err(Error::Lex {
                        line: pos.line,
                        column: pos.column,
                        character: '.',
                    }),
                }
            }
            b'"' => self.read_string(pos),
            c if c.is_ascii_digit() => self.read_number(pos),
            c if c.is_ascii_alphabetic() || c == b'_' => Ok(self.read_identifier(pos)),
            other => Err(Error::Lex {
                line: pos.line,
                column: pos.column,
                character: other as char,
            }),
        }
    }

    fn read_dot_command(&mut self, pos: SourcePos) -> Result<Token> {
        self.pos += 1; // dot
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("ascii")
            .to_ascii_lowercase();
        Ok(Token::simple(TokenKind::DotCommand, &text, pos))
    }

    fn read_identifier(&mut self, pos: SourcePos) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("ascii");
        Token::simple(TokenKind::Id, text, pos)
    }

    fn read_string(&mut self, pos: SourcePos) -> Result<Token> {
        self.pos += 1; // opening quote
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'"' {
                let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("utf8");
                self.pos += 1;
                return Ok(Token::simple(TokenKind::Str, text, pos));
            }
            self.pos += 1;
        }
        Err(Error::Lex {
            line: pos.line,
            column: pos.column,
            character: '"',
        })
    }

    /// `digits[.digits][exponent][scale-letter][unit-word]`
    fn read_number(&mut self, pos: SourcePos) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        // Exponent. Only consume the 'e' if digits follow, so `1e` leaves
        // the letter to the suffix ("1 exa-somethings" is not a thing).
        if let Some(b'e' | b'E') = self.peek() {
            let mut after = 1;
            if let Some(b'+' | b'-') = self.peek_at(1) {
                after = 2;
            }
            if self.peek_at(after).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += after;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let number_text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("ascii");
        let value: f64 = number_text.parse().map_err(|_| Error::Lex {
            line: pos.line,
            column: pos.column,
            character: number_text.chars().next().unwrap_or('?'),
        })?;

        // Scale letter plus arbitrary trailing unit word.
        let suffix_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let letters = std::str::from_utf8(&self.bytes[suffix_start..self.pos]).expect("ascii");
        let (scale, unit) = split_suffix(letters);

        Ok(Token {
            kind: TokenKind::Number,
            text: std::str::from_utf8(&self.bytes[start..self.pos])
                .expect("ascii")
                .to_string(),
            value: Some(value),
            scale,
            unit: (!unit.is_empty()).then(|| unit.to_string()),
            pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize_str(text).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_resistor_line() {
        let tokens = tokenize_str("R1 1 2 1k").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].kind, TokenKind::Id);
        assert_eq!(tokens[0].text, "R1");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[3].scaled_value(), Some(1000.0));
        assert_eq!(tokens[3].scale, Some(Scale::Kilo));
    }

    #[test]
    fn test_number_with_unit_word() {
        let tokens = tokenize_str("10Volts 100nF").unwrap();
        assert_eq!(tokens[0].value, Some(10.0));
        assert_eq!(tokens[0].scale, None);
        assert_eq!(tokens[0].unit.as_deref(), Some("Volts"));
        assert_eq!(tokens[1].scaled_value(), Some(100e-9));
        assert_eq!(tokens[1].unit.as_deref(), Some("F"));
    }

    #[test]
    fn test_leading_dot_number() {
        let tokens = tokenize_str(".5 .tran").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].value, Some(0.5));
        assert_eq!(tokens[1].kind, TokenKind::DotCommand);
        assert_eq!(tokens[1].text, "tran");
    }

    #[test]
    fn test_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a ** b ^ c && d || e <= >= == != < > ? : = ! ~ \\ %"),
            vec![
                Id, Power, Id, Caret, Id, AndAnd, Id, OrOr, Id, LessEqual, GreaterEqual,
                EqualEqual, NotEqual, Less, Greater, Question, Colon, Assign, Bang, Tilde,
                Backslash, Percent
            ]
        );
    }

    #[test]
    fn test_brackets_and_braces() {
        use TokenKind::*;
        assert_eq!(
            kinds("{x} (y) [z] 'w' @,"),
            vec![
                LBrace, Id, RBrace, LParen, Id, RParen, LBracket, Id, RBracket, Quote, Id,
                Quote, At, Comma
            ]
        );
    }

    #[test]
    fn test_illegal_character() {
        let err = tokenize_str("R1 1 0 1k \u{7f}").unwrap_err();
        match err {
            Error::Lex {
                line, character, ..
            } => {
                assert_eq!(line, 1);
                assert_eq!(character, '\u{7f}');
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_logical_lines_continuation() {
        let source = "Title line\nR1 1\n+ 2 1k\nC1 2 0 1u\n";
        let lines = logical_lines(source);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].text, "R1 1 2 1k");
        assert_eq!(lines[1].line, 2);
    }

    #[test]
    fn test_logical_lines_comment_between_continuation() {
        let source = "R1 1\n* interleaved comment\n+ 2 1k\n";
        let lines = logical_lines(source);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "R1 1 2 1k");
    }

    #[test]
    fn test_end_of_line_comments() {
        let lines = logical_lines("R1 1 0 1k ; load\nC1 1 0 1u $ bypass\n");
        assert_eq!(lines[0].text, "R1 1 0 1k");
        assert_eq!(lines[1].text, "C1 1 0 1u");
    }

    #[test]
    fn test_scientific_notation() {
        let tokens = tokenize_str("1e-12 2.5e3 1.e2").unwrap();
        assert_eq!(tokens[0].value, Some(1e-12));
        assert_eq!(tokens[1].value, Some(2500.0));
        assert_eq!(tokens[2].value, Some(100.0));
    }

    #[test]
    fn test_string_literal() {
        let tokens = tokenize_str("\"sub dir/file.lib\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "sub dir/file.lib");
    }
}
