//! Canonical SPICE rendering of a resolved circuit.
//!
//! The output is the wire format handed to the simulator: names
//! lower-cased, keyword parameters as `key=value` with no surrounding
//! spaces, numeric values with their canonical scale suffix, scopes
//! rendered parameters first, then models, then nested subcircuit
//! definitions, then elements.

use std::fmt::Write;

use crate::circuit::{Analysis, Circuit, DeviceModel, Element, ParamValue, Scope, SubCircuit};
use crate::units::format_number;

/// Render a complete netlist, terminated by `.end`.
pub fn render(circuit: &Circuit) -> String {
    let mut out = String::new();

    let mut title_lines = circuit.title.lines();
    let first = title_lines.next().unwrap_or("");
    if first.is_empty() {
        out.push_str(".title\n");
    } else {
        let _ = writeln!(out, ".title {}", first);
    }
    for extra in title_lines {
        let _ = writeln!(out, "* {}", extra);
    }

    for node in &circuit.global_nodes {
        let _ = writeln!(out, ".global {}", node);
    }

    write_scope(&mut out, &circuit.scope);

    if !circuit.options.is_empty() {
        out.push_str(".options");
        for (key, value) in &circuit.options {
            push_pair(&mut out, key, value);
        }
        out.push('\n');
    }
    if !circuit.initial_conditions.is_empty() {
        out.push_str(".ic");
        for ic in &circuit.initial_conditions {
            let _ = write!(out, " v({})={}", ic.node, format_number(ic.voltage));
        }
        out.push('\n');
    }
    if !circuit.node_sets.is_empty() {
        out.push_str(".nodeset");
        for ic in &circuit.node_sets {
            let _ = write!(out, " v({})={}", ic.node, format_number(ic.voltage));
        }
        out.push('\n');
    }
    for (name, columns) in &circuit.data_tables {
        write_data_table(&mut out, name, columns);
    }
    for analysis in &circuit.analyses {
        write_analysis(&mut out, analysis);
    }

    out.push_str(".end\n");
    out
}

fn write_scope(out: &mut String, scope: &Scope) {
    for (name, value) in &scope.parameters {
        let _ = writeln!(out, ".param {}={}", name, value.render());
    }
    for model in scope.models.values() {
        write_model(out, model);
    }
    for subcircuit in scope.subcircuits.values() {
        write_subcircuit(out, subcircuit);
    }
    for element in scope.elements.values() {
        let _ = writeln!(out, "{}", element_line(element));
    }
}

fn write_model(out: &mut String, model: &DeviceModel) {
    let _ = write!(out, ".model {} {}", model.name, model.model_type);
    if !model.parameters.is_empty() {
        out.push_str(" (");
        for (i, (key, value)) in model.parameters.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match value {
                ParamValue::Flag => out.push_str(key),
                _ => {
                    let _ = write!(out, "{}={}", key, value.render());
                }
            }
        }
        out.push(')');
    }
    out.push('\n');
}

fn write_subcircuit(out: &mut String, subcircuit: &SubCircuit) {
    let _ = write!(out, ".subckt {}", subcircuit.name);
    for node in &subcircuit.external_nodes {
        let _ = write!(out, " {}", node);
    }
    if !subcircuit.defaults.is_empty() {
        out.push_str(" params:");
        for (key, value) in &subcircuit.defaults {
            push_pair(out, key, value);
        }
    }
    out.push('\n');
    write_scope(out, &subcircuit.scope);
    let _ = writeln!(out, ".ends {}", subcircuit.name);
}

fn write_data_table(
    out: &mut String,
    name: &str,
    columns: &indexmap::IndexMap<String, Vec<f64>>,
) {
    let _ = write!(out, ".data {}", name);
    for column in columns.keys() {
        let _ = write!(out, " {}", column);
    }
    out.push('\n');
    let rows = columns.values().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        let mut first = true;
        for values in columns.values() {
            if !first {
                out.push(' ');
            }
            first = false;
            let _ = write!(
                out,
                "{}",
                format_number(values.get(row).copied().unwrap_or(0.0))
            );
        }
        out.push('\n');
    }
    out.push_str(".enddata\n");
}

fn write_analysis(out: &mut String, analysis: &Analysis) {
    let _ = write!(out, ".{}", analysis.kind);
    for arg in &analysis.args {
        let _ = write!(out, " {}", arg.render());
    }
    for (key, value) in &analysis.parameters {
        push_pair(out, key, value);
    }
    out.push('\n');
}

fn push_pair(out: &mut String, key: &str, value: &ParamValue) {
    match value {
        ParamValue::Flag => {
            let _ = write!(out, " {}", key);
        }
        _ => {
            let _ = write!(out, " {}={}", key, value.render());
        }
    }
}

/// One element card on a single line.
pub fn element_line(element: &Element) -> String {
    let mut line = element.name.clone();
    for node in &element.nodes {
        let _ = write!(line, " {}", node);
    }
    for value in &element.positionals {
        let _ = write!(line, " {}", value.render());
    }
    for (key, value) in &element.parameters {
        push_pair(&mut line, key, value);
    }
    line
}

impl Circuit {
    /// The canonical netlist text for this circuit.
    pub fn to_spice(&self) -> String {
        render(self)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::circuit::{DeviceKind, Element, ParamValue};
    use crate::expr::{BinaryOp, Expr};

    fn divider() -> Circuit {
        let mut circuit = Circuit::new("Divider");
        let v1 = Element::new(
            DeviceKind::VoltageSource,
            "V1",
            vec!["1".into(), "0".into()],
        )
        .with_value(ParamValue::Text("dc".into()))
        .with_value(ParamValue::Number(10.0));
        let r1 = Element::new(DeviceKind::Resistor, "R1", vec!["1".into(), "2".into()])
            .with_value(ParamValue::Number(1000.0));
        let r2 = Element::new(DeviceKind::Resistor, "R2", vec!["2".into(), "0".into()])
            .with_value(ParamValue::Number(1000.0));
        circuit.scope.add_element(v1).unwrap();
        circuit.scope.add_element(r1).unwrap();
        circuit.scope.add_element(r2).unwrap();
        circuit
    }

    #[test]
    fn test_render_divider() {
        let text = divider().to_spice();
        assert_eq!(
            text,
            ".title Divider\n\
             v1 1 0 dc 10\n\
             r1 1 2 1k\n\
             r2 2 0 1k\n\
             .end\n"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let circuit = divider();
        assert_eq!(circuit.to_spice(), circuit.to_spice());
    }

    #[test]
    fn test_render_param_expression() {
        let mut circuit = Circuit::new("t");
        circuit.scope.set_parameter("r_val", ParamValue::Number(1e3));
        circuit.scope.set_parameter(
            "r2_val",
            ParamValue::Expr(Expr::binary(
                BinaryOp::Mul,
                Expr::variable("r_val"),
                Expr::number(2.0),
            )),
        );
        let text = circuit.to_spice();
        assert!(text.contains(".param r_val=1k\n"));
        assert!(text.contains(".param r2_val={r_val * 2}\n"));
    }

    #[test]
    fn test_render_model_and_subcircuit_order() {
        let mut circuit = Circuit::new("t");
        let mut model = DeviceModel::new("DMOD", "D");
        model
            .parameters
            .insert("is".into(), ParamValue::Number(1e-12));
        circuit.scope.add_model(model).unwrap();

        let mut sub =
            crate::circuit::SubCircuit::new("vdiv", vec!["in".into(), "out".into()]).unwrap();
        sub.defaults.insert("r".into(), ParamValue::Number(1e3));
        let r1 = Element::new(DeviceKind::Resistor, "R1", vec!["in".into(), "out".into()])
            .with_value(ParamValue::Expr(Expr::variable("r")));
        sub.scope.add_element(r1).unwrap();
        circuit.scope.add_subcircuit(sub).unwrap();

        let d1 = Element::new(DeviceKind::Diode, "D1", vec!["1".into(), "0".into()])
            .with_value(ParamValue::Text("dmod".into()));
        circuit.scope.add_element(d1).unwrap();

        let text = circuit.to_spice();
        let model_at = text.find(".model dmod d (is=1p)").unwrap();
        let subckt_at = text.find(".subckt vdiv in out params: r=1k").unwrap();
        let element_at = text.find("d1 1 0 dmod").unwrap();
        assert!(model_at < subckt_at && subckt_at < element_at);
        assert!(text.contains("r1 in out {r}\n.ends vdiv\n"));
    }

    #[test]
    fn test_render_analysis_and_ic() {
        let mut circuit = divider();
        circuit.initial_conditions.push(crate::circuit::InitialCondition {
            node: "2".into(),
            voltage: 2.5,
        });
        let mut tran = Analysis::new("tran");
        tran.args.push(ParamValue::Number(1e-6));
        tran.args.push(ParamValue::Number(5e-3));
        circuit.analyses.push(tran);
        let text = circuit.to_spice();
        assert!(text.contains(".ic v(2)=2.5\n"));
        assert!(text.contains(".tran 1u 5m\n"));
        assert!(text.ends_with(".end\n"));
    }
}
