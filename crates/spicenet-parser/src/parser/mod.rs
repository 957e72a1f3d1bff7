//! SPICE netlist parser.
//!
//! A state machine over logical lines: the first token of each line
//! selects the production (dot-command or element card). `.subckt` and
//! `.lib` blocks push an explicit scope stack; the stack must be empty at
//! end of input.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ScopeKind};
use crate::lexer::{self, LogicalLine, Token, TokenKind};

mod commands;
mod elements;
pub mod types;

pub use types::{
    AnalysisCard, DataTable, ElementCard, ModelCard, ScopeDef, Statement, StatementTree,
};

/// Parse a netlist source string.
///
/// The first line is the title unless it is a dot-command; a later
/// `.title` line overrides it.
pub fn parse(source: &str) -> Result<StatementTree> {
    Parser::new(None, 0).run(source, true)
}

/// Parse a netlist file; `.include` paths resolve relative to it.
pub fn parse_file(path: impl AsRef<Path>) -> Result<StatementTree> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Parser::new(path.parent().map(Path::to_path_buf), 0).run(&source, true)
}

/// Parse an included file: no implicit title line.
pub(crate) fn parse_fragment(path: &Path, depth: usize) -> Result<StatementTree> {
    let source = std::fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Parser::new(path.parent().map(Path::to_path_buf), depth).run(&source, false)
}

const MAX_INCLUDE_DEPTH: usize = 16;

struct Frame {
    kind: ScopeKind,
    def: ScopeDef,
    models: HashSet<String>,
    subcircuits: HashSet<String>,
}

pub(crate) struct Parser {
    lines: Vec<LogicalLine>,
    index: usize,
    base_dir: Option<PathBuf>,
    include_depth: usize,
    frames: Vec<Frame>,
    statements: Vec<Statement>,
    title: Option<String>,
    // Names declared at top level, for `.include` collision checks.
    models: HashSet<String>,
    subcircuits: HashSet<String>,
}

impl Parser {
    fn new(base_dir: Option<PathBuf>, include_depth: usize) -> Self {
        Self {
            lines: Vec::new(),
            index: 0,
            base_dir,
            include_depth,
            frames: Vec::new(),
            statements: Vec::new(),
            title: None,
            models: HashSet::new(),
            subcircuits: HashSet::new(),
        }
    }

    fn run(mut self, source: &str, first_line_is_title: bool) -> Result<StatementTree> {
        self.lines = lexer::logical_lines(source);
        self.index = 0;

        if first_line_is_title
            && let Some(first) = self.lines.first()
            && !first.text.starts_with('.')
        {
            self.title = Some(first.text.clone());
            self.index = 1;
        }

        while let Some(line) = self.next_line() {
            // Title and file-path commands keep the raw text: titles are
            // arbitrary prose and paths do not tokenize.
            if let Some(rest) = strip_command(&line, "title") {
                self.title = Some(rest.to_string());
                continue;
            }
            if let Some(rest) = strip_command(&line, "include") {
                commands::parse_include(&mut self, rest, line.line)?;
                continue;
            }
            if let Some(rest) = strip_command(&line, "lib") {
                commands::parse_lib(&mut self, rest, line.line)?;
                continue;
            }
            if let Some(rest) = strip_command(&line, "endl") {
                self.close_scope(ScopeKind::Library, word(rest), line.line)?;
                continue;
            }

            let tokens = lexer::tokenize(&line)?;
            let Some(first) = tokens.first() else {
                continue;
            };
            match first.kind {
                TokenKind::DotCommand => {
                    let command = first.text.clone();
                    if command == "end" {
                        self.append(Statement::End);
                        break;
                    }
                    commands::parse_dot(&mut self, &command, &tokens[1..], line.line)?;
                }
                TokenKind::Id => {
                    let card = elements::parse_element_card(&tokens, line.line)?;
                    self.append(Statement::Element(card));
                }
                _ => {
                    return Err(Error::Parse {
                        line: line.line,
                        message: format!("expected element or dot-command, found '{}'", first.text),
                    });
                }
            }
        }

        if let Some(frame) = self.frames.last() {
            return Err(Error::UnclosedScope {
                kind: frame.kind,
                line: frame.def.line,
            });
        }

        Ok(StatementTree {
            title: self.title,
            statements: self.statements,
        })
    }

    fn next_line(&mut self) -> Option<LogicalLine> {
        let line = self.lines.get(self.index).cloned();
        if line.is_some() {
            self.index += 1;
        }
        line
    }

    /// Pull the next logical line without dispatching it; used by `.data`.
    pub(crate) fn take_raw_line(&mut self) -> Option<LogicalLine> {
        self.next_line()
    }

    pub(crate) fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub(crate) fn include_depth(&self) -> usize {
        self.include_depth
    }

    pub(crate) fn append(&mut self, statement: Statement) {
        match &statement {
            Statement::Model(card) => {
                self.note_model(card.name.clone());
            }
            Statement::SubCircuit(def) => {
                self.note_subcircuit(def.name.clone());
            }
            _ => {}
        }
        match self.frames.last_mut() {
            Some(frame) => frame.def.body.push(statement),
            None => self.statements.push(statement),
        }
    }

    /// Record a model name in the current scope; false if already taken.
    pub(crate) fn note_model(&mut self, name: String) -> bool {
        let name = name.to_ascii_lowercase();
        match self.frames.last_mut() {
            Some(frame) => frame.models.insert(name),
            None => self.models.insert(name),
        }
    }

    pub(crate) fn note_subcircuit(&mut self, name: String) -> bool {
        let name = name.to_ascii_lowercase();
        match self.frames.last_mut() {
            Some(frame) => frame.subcircuits.insert(name),
            None => self.subcircuits.insert(name),
        }
    }

    pub(crate) fn open_scope(&mut self, kind: ScopeKind, def: ScopeDef) {
        self.frames.push(Frame {
            kind,
            def,
            models: HashSet::new(),
            subcircuits: HashSet::new(),
        });
    }

    pub(crate) fn close_scope(
        &mut self,
        kind: ScopeKind,
        name: Option<&str>,
        line: usize,
    ) -> Result<()> {
        let Some(frame) = self.frames.pop() else {
            return Err(Error::Parse {
                line,
                message: format!("{} close without an open block", kind),
            });
        };
        if frame.kind != kind {
            return Err(Error::Parse {
                line,
                message: format!("cannot close {} block with {} end", frame.kind, kind),
            });
        }
        if let Some(name) = name
            && !frame.def.name.eq_ignore_ascii_case(name)
        {
            return Err(Error::MismatchedScopeName {
                line,
                expected: frame.def.name.clone(),
                found: name.to_ascii_lowercase(),
            });
        }
        let statement = match kind {
            ScopeKind::Subcircuit => Statement::SubCircuit(frame.def),
            ScopeKind::Library => Statement::LibraryDef(frame.def),
        };
        self.append(statement);
        Ok(())
    }
}

/// If the line is the given dot-command, return the raw text after it.
fn strip_command<'a>(line: &'a LogicalLine, command: &str) -> Option<&'a str> {
    let text = &line.text;
    if !text.starts_with('.') || text.len() < command.len() + 1 {
        return None;
    }
    let (head, rest) = text.split_at(command.len() + 1);
    if !head[1..].eq_ignore_ascii_case(command) {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest.trim())
}

fn word(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

/// Collect `key=value` pairs (value is a full expression) and bare flags
/// starting at `tokens[pos]`.
pub(crate) fn parse_pairs(
    tokens: &[Token],
    mut pos: usize,
    line: usize,
) -> Result<Vec<(String, Option<spicenet_core::Expr>)>> {
    let mut pairs = Vec::new();
    while pos < tokens.len() {
        let token = &tokens[pos];
        if token.kind != TokenKind::Id {
            return Err(Error::Parse {
                line,
                message: format!("expected parameter name, found '{}'", token.text),
            });
        }
        let key = token.text.to_ascii_lowercase();
        pos += 1;
        if tokens.get(pos).map(|t| t.kind) == Some(TokenKind::Assign) {
            pos += 1;
            let mut sub = crate::expr::ExprParser::new(&tokens[pos..]);
            let value = sub.parse_one()?;
            pos += sub.pos();
            pairs.push((key, Some(value)));
        } else {
            pairs.push((key, None));
        }
    }
    Ok(pairs)
}
