//! End-to-end properties: parse → build → render → parse → build.

use std::io::Write;
use std::path::Path;

use spicenet_core::circuit::{Circuit, ParamValue};
use spicenet_parser::{Builder, Error, SpiceLibrary, build, parse, parse_file};

fn build_source(source: &str) -> Circuit {
    build(&parse(source).unwrap()).unwrap()
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

/// Two circuits agree on element names, node lists, and parameter
/// values.
fn assert_same_circuit(a: &Circuit, b: &Circuit) {
    let a_names: Vec<&String> = a.scope.elements.keys().collect();
    let b_names: Vec<&String> = b.scope.elements.keys().collect();
    assert_eq!(a_names, b_names);
    for (name, element) in &a.scope.elements {
        let other = b.element(name).unwrap();
        assert_eq!(element.nodes, other.nodes, "nodes of {}", name);
        assert_eq!(
            element.positionals.len(),
            other.positionals.len(),
            "positionals of {}",
            name
        );
        for (x, y) in element.positionals.iter().zip(&other.positionals) {
            match (x.as_number(), y.as_number()) {
                (Some(x), Some(y)) => assert!((x - y).abs() <= x.abs() * 1e-12),
                _ => assert_eq!(x.render(), y.render()),
            }
        }
        let keys: Vec<&String> = element.parameters.keys().collect();
        let other_keys: Vec<&String> = other.parameters.keys().collect();
        assert_eq!(keys, other_keys, "parameters of {}", name);
    }
    assert_eq!(a.scope.parameters.keys().len(), b.scope.parameters.keys().len());
}

#[test]
fn divider_builds_and_renders_byte_stable() {
    let source = ".title Divider\nV1 1 0 DC 10\nR1 1 2 1k\nR2 2 0 1k\n.end\n";
    let circuit = build_source(source);

    let rendered = circuit.to_spice();
    assert_eq!(
        rendered,
        ".title Divider\nv1 1 0 dc 10\nr1 1 2 1k\nr2 2 0 1k\n.end\n"
    );

    // Once canonical, rendering is a fixpoint.
    let again = build_source(&rendered);
    assert_eq!(again.to_spice(), rendered);
    assert_same_circuit(&circuit, &again);
}

#[test]
fn round_trip_with_models_subcircuits_and_analyses() {
    let source = "\
.title Amp Test
.param gain=20 rload={gain*50}
.model dmod d (is=1e-12 n=2)
.subckt vdiv in out params: r=1k
R1 in out {r}
R2 out 0 {r}
.ends vdiv
V1 in 0 DC 5
X1 in mid vdiv params: r=2k
D1 mid out dmod
R9 out 0 {rload}
B1 ctl 0 V=V(mid)*2
.options reltol=1e-4
.ic v(mid)=2.5
.op
.tran 1u 1m
.end
";
    let circuit = build_source(source);
    let rendered = circuit.to_spice();
    let again = build_source(&rendered);
    assert_same_circuit(&circuit, &again);
    assert_eq!(again.to_spice(), rendered);

    assert_eq!(circuit.scope.parameters["rload"].as_number(), Some(1000.0));
    assert_eq!(circuit.analyses.len(), 2);
    assert_eq!(circuit.initial_conditions.len(), 1);
}

#[test]
fn controlled_sources_round_trip_as_behavioral() {
    let source = "t\nV1 1 0 10\nE1 3 0 1 2 2.0\nG1 4 0 1 2 1m\nF1 5 0 V1 3\nH1 6 0 V1 100\n.end\n";
    let circuit = build_source(source);
    let rendered = circuit.to_spice();
    assert!(rendered.contains("e1 3 0 v={2 * v(1,2)}"));
    assert!(rendered.contains("g1 4 0 i={0.001 * v(1,2)}"));
    assert!(rendered.contains("f1 5 0 i={3 * i(v1)}"));
    assert!(rendered.contains("h1 6 0 v={100 * i(v1)}"));

    let again = build_source(&rendered);
    assert_same_circuit(&circuit, &again);
    assert_eq!(again.to_spice(), rendered);
}

#[test]
fn scale_literals_flow_through_the_pipeline() {
    let a = build_source("t\nR1 1 0 1.5k\n.end\n");
    let b = build_source("t\nR1 1 0 1500\n.end\n");
    let c = build_source("t\nR1 1 0 1.5e3\n.end\n");
    for circuit in [&a, &b, &c] {
        assert_eq!(
            circuit.element("r1").unwrap().positionals[0].as_number(),
            Some(1500.0)
        );
    }
    assert_eq!(a.to_spice(), b.to_spice());
    assert_eq!(b.to_spice(), c.to_spice());
}

#[test]
fn include_merges_definitions() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "models.lib",
        ".model dmod d (is=4.35n)\n.subckt vdiv in out\nR1 in out 1k\nR2 out 0 1k\n.ends\n",
    );
    write_file(
        dir.path(),
        "top.cir",
        ".title Top\n.include models.lib\nD1 1 0 dmod\nX1 1 2 vdiv\n.end\n",
    );

    let tree = parse_file(dir.path().join("top.cir")).unwrap();
    let circuit = build(&tree).unwrap();
    assert!(circuit.model("dmod").is_some());
    assert!(circuit.subcircuit("vdiv").is_some());
    assert_eq!(circuit.elements().count(), 2);
}

#[test]
fn include_duplicate_definition_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "models.lib", ".model dmod d (is=1p)\n");
    write_file(
        dir.path(),
        "top.cir",
        ".title Top\n.model dmod d (is=2p)\n.include models.lib\nD1 1 0 dmod\n.end\n",
    );

    let err = parse_file(dir.path().join("top.cir")).unwrap_err();
    match err {
        Error::DuplicateDefinition { name, .. } => assert_eq!(name, "dmod"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn include_missing_file_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "top.cir",
        ".title Top\n.include nowhere.lib\n.end\n",
    );
    let err = parse_file(dir.path().join("top.cir")).unwrap_err();
    match err {
        Error::Include { path, line, source } => {
            assert!(path.ends_with("nowhere.lib"));
            assert_eq!(line, 2);
            assert!(matches!(*source, Error::Io { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn nested_include_error_carries_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inner.lib", "R1 1\n");
    write_file(dir.path(), "outer.lib", ".include inner.lib\n");
    write_file(
        dir.path(),
        "top.cir",
        ".title Top\n.include outer.lib\n.end\n",
    );
    let err = parse_file(dir.path().join("top.cir")).unwrap_err();
    match err {
        Error::Include { path, source, .. } => {
            assert!(path.ends_with("outer.lib"));
            assert!(matches!(*source, Error::Include { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn library_resolves_missing_subcircuit_and_model() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "parts.lib",
        ".subckt opamp inp inn out\nR1 inp inn 1meg\nB1 out 0 V=V(inp,inn)*100k\n.ends opamp\n.model d1n4148 d (is=4.35n)\n",
    );
    let library = SpiceLibrary::new(dir.path()).unwrap();

    let source = "t\nX1 a b c opamp\nD1 a 0 d1n4148\n.end\n";
    let tree = parse(source).unwrap();

    // Without the library, both references are hard errors.
    assert!(matches!(
        build(&tree),
        Err(Error::UnresolvedSubcircuit { name }) if name == "opamp"
    ));

    let circuit = Builder::new().library(&library).build(&tree).unwrap();
    assert!(circuit.subcircuit("opamp").is_some());
    assert!(circuit.model("d1n4148").is_some());

    // The loaded definitions render, so the output is self-contained.
    let rendered = circuit.to_spice();
    let again = build_source(&rendered);
    assert_same_circuit(&circuit, &again);
}

#[test]
fn lib_call_pulls_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "corners.lib",
        ".lib fast\n.model nfast nmos (vto=0.4)\n.endl fast\n.lib slow\n.model nslow nmos (vto=0.7)\n.endl slow\n",
    );
    let path = dir.path().join("corners.lib");
    let source = format!(
        ".title Corners\n.lib {} fast\nM1 d g 0 0 nfast\n.end\n",
        path.display()
    );
    let circuit = build_source(&source);
    assert!(circuit.model("nfast").is_some());
    assert!(circuit.model("nslow").is_none());
}

#[test]
fn subcircuit_render_preserves_nesting() {
    let source = "\
.title Nested
.subckt outer a b
.subckt inner c d
C1 c d 1u
.ends inner
X1 a b inner
.ends outer
X1 1 2 outer
.end
";
    let circuit = build_source(source);
    let rendered = circuit.to_spice();
    let inner_at = rendered.find(".subckt inner c d").unwrap();
    let outer_at = rendered.find(".subckt outer a b").unwrap();
    let outer_end = rendered.find(".ends outer").unwrap();
    assert!(outer_at < inner_at && inner_at < outer_end);

    let again = build_source(&rendered);
    assert_eq!(again.to_spice(), rendered);
}

#[test]
fn residual_parameters_render_in_braces() {
    let circuit = build_source("t\n.param x={y+1}\nR1 1 0 1k\n.end\n");
    let rendered = circuit.to_spice();
    assert!(rendered.contains(".param x={y + 1}"));
    // And the braces survive another pass.
    let again = build_source(&rendered);
    match &again.scope.parameters["x"] {
        ParamValue::Expr(e) => assert_eq!(e.to_string(), "y + 1"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn data_table_round_trips() {
    let source = "t\nR1 1 0 1k\n.data points vin vout\n0 0\n1 0.5\n2 1\n.enddata\n.end\n";
    let circuit = build_source(source);
    assert_eq!(circuit.data_tables["points"]["vin"], vec![0.0, 1.0, 2.0]);

    let rendered = circuit.to_spice();
    let again = build_source(&rendered);
    assert_eq!(
        again.data_tables["points"]["vout"],
        vec![0.0, 0.5, 1.0]
    );
}

#[test]
fn ground_alias_canonicalizes_before_render() {
    let tree = parse("t\nR1 in vss 1k\nR2 vss out 2k\n.end\n").unwrap();
    let circuit = Builder::new().ground("vss").build(&tree).unwrap();
    let rendered = circuit.to_spice();
    assert!(rendered.contains("r1 in 0 1k"));
    assert!(rendered.contains("r2 0 out 2k"));
}
