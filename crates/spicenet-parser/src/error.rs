//! Error types for spicenet-parser.

use std::path::PathBuf;

use thiserror::Error;

/// What kind of scope a `.subckt`/`.lib` block opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Subcircuit,
    Library,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Subcircuit => f.write_str(".subckt"),
            ScopeKind::Library => f.write_str(".lib"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("illegal character '{character}' at line {line}, column {column}")]
    Lex {
        line: usize,
        column: usize,
        character: char,
    },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{kind} block opened at line {line} is never closed")]
    UnclosedScope { kind: ScopeKind, line: usize },

    #[error("scope close at line {line} names '{found}', expected '{expected}'")]
    MismatchedScopeName {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("duplicate definition of '{name}' included from {path}")]
    DuplicateDefinition { name: String, path: PathBuf },

    #[error("include of {path} at line {line} failed: {source}")]
    Include {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("error in library file {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Build-phase errors.
    #[error("unresolved subcircuit: {name}")]
    UnresolvedSubcircuit { name: String },

    #[error("unresolved model: {name}")]
    UnresolvedModel { name: String },

    #[error("duplicate name: {name}")]
    DuplicateName { name: String },

    #[error("subcircuit {name} instantiates itself")]
    RecursiveSubcircuit { name: String },

    #[error(transparent)]
    Eval(#[from] spicenet_core::EvalError),

    #[error(transparent)]
    Circuit(#[from] spicenet_core::circuit::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a nested parse error with the included path and the line of
    /// the `.include` directive.
    pub fn included_from(self, path: impl Into<PathBuf>, line: usize) -> Error {
        Error::Include {
            path: path.into(),
            line,
            source: Box::new(self),
        }
    }

    /// Wrap an error from reading or parsing a library file.
    pub fn in_library(self, path: impl Into<PathBuf>) -> Error {
        Error::Library {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
