//! Core circuit model for Spicenet.
//!
//! This crate owns the pieces that survive parsing: the expression AST and
//! its evaluator, SPICE engineering-unit handling, node names, the resolved
//! [`Circuit`] object graph, and the canonical serializer back to netlist
//! text.
//!
//! # Example
//!
//! ```
//! use spicenet_core::circuit::{Circuit, DeviceKind, Element, ParamValue};
//!
//! let mut circuit = Circuit::new("Divider");
//! let r1 = Element::new(DeviceKind::Resistor, "R1", vec!["1".into(), "2".into()])
//!     .with_value(ParamValue::Number(1000.0));
//! circuit.scope.add_element(r1).unwrap();
//!
//! assert!(circuit.to_spice().contains("r1 1 2 1k"));
//! ```

pub mod circuit;
pub mod expr;
pub mod node;
pub mod serialize;
pub mod units;

pub use circuit::{Circuit, DeviceKind, DeviceModel, Element, ParamValue, Scope, SubCircuit};
pub use expr::{EvalContext, EvalError, Evaluated, Expr};
pub use node::NodeName;
pub use units::Scale;
