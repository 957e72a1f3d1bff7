//! Statement AST: one node per netlist card or directive.
//!
//! This tree is the parser's output and the builder's input; it is
//! discarded once the resolved `Circuit` exists.

use std::path::PathBuf;

use indexmap::IndexMap;
use spicenet_core::DeviceKind;
use spicenet_core::expr::Expr;

/// An element card (`R1 1 2 1k`, `X1 a b vdiv params: r=2k`).
#[derive(Debug, Clone)]
pub struct ElementCard {
    pub kind: DeviceKind,
    /// Full element name with its prefix letter, as written.
    pub name: String,
    pub nodes: Vec<String>,
    pub positionals: Vec<Expr>,
    pub keywords: IndexMap<String, Expr>,
    pub line: usize,
}

/// A `.model` card. A parameter with no value is a flag (`off`).
#[derive(Debug, Clone)]
pub struct ModelCard {
    pub name: String,
    pub model_type: String,
    pub parameters: IndexMap<String, Option<Expr>>,
    pub line: usize,
}

/// A `.subckt ... .ends` block (or the body of a `.lib ... .endl`
/// definition); the recursive heart of the statement model.
#[derive(Debug, Clone)]
pub struct ScopeDef {
    pub name: String,
    pub nodes: Vec<String>,
    /// `params:` defaults from the header.
    pub defaults: IndexMap<String, Expr>,
    pub body: Vec<Statement>,
    pub line: usize,
}

/// A `.data ... .enddata` table.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub name: String,
    pub columns: IndexMap<String, Vec<f64>>,
}

/// An analysis or other pass-through directive (`.op`, `.dc`, `.tran`,
/// `.save`, ...).
#[derive(Debug, Clone)]
pub struct AnalysisCard {
    pub kind: String,
    pub args: Vec<Expr>,
    pub keywords: IndexMap<String, Expr>,
    pub line: usize,
}

/// One parsed netlist statement. Titles are not statements; the parser
/// lifts them onto the [`StatementTree`].
#[derive(Debug, Clone)]
pub enum Statement {
    Element(ElementCard),
    Model(ModelCard),
    /// `.param` bindings, in declaration order.
    Param(IndexMap<String, Expr>),
    SubCircuit(ScopeDef),
    /// `.lib entry ... .endl` definition block.
    LibraryDef(ScopeDef),
    /// `.lib path entry` call form.
    LibraryCall { path: PathBuf, entry: String },
    /// `.include path`, with the file's statements parsed eagerly.
    Include {
        path: PathBuf,
        contents: Vec<Statement>,
    },
    Data(DataTable),
    Global(Vec<String>),
    Options(IndexMap<String, Option<Expr>>),
    InitialCondition(Vec<(String, f64)>),
    NodeSet(Vec<(String, f64)>),
    Analysis(AnalysisCard),
    End,
}

/// A parsed netlist: optional title plus top-level statements.
#[derive(Debug, Clone, Default)]
pub struct StatementTree {
    pub title: Option<String>,
    pub statements: Vec<Statement>,
}

impl StatementTree {
    /// Iterate top-level subcircuit definitions.
    pub fn subcircuits(&self) -> impl Iterator<Item = &ScopeDef> {
        self.statements.iter().filter_map(|s| match s {
            Statement::SubCircuit(def) => Some(def),
            _ => None,
        })
    }

    /// Iterate top-level model cards.
    pub fn models(&self) -> impl Iterator<Item = &ModelCard> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Model(card) => Some(card),
            _ => None,
        })
    }
}
