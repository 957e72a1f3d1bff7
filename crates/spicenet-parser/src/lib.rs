//! SPICE netlist and expression parser for Spicenet.
//!
//! Source text flows lexer → grammar → statement tree → builder →
//! [`spicenet_core::Circuit`]; the core crate's serializer turns the
//! result back into canonical netlist text.
//!
//! # Example
//!
//! ```
//! let tree = spicenet_parser::parse(r#"
//! Voltage Divider
//! V1 1 0 DC 10
//! R1 1 2 1k
//! R2 2 0 1k
//! .end
//! "#.trim_start()).unwrap();
//!
//! let circuit = spicenet_parser::build(&tree).unwrap();
//! assert_eq!(circuit.elements().count(), 3);
//! ```

pub mod error;
pub mod expr;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod translate;

pub use error::{Error, Result, ScopeKind};
pub use expr::{parse_expression, parse_expression_str};
pub use library::SpiceLibrary;
pub use parser::{Statement, StatementTree, parse, parse_file};
pub use translate::{Builder, build};
