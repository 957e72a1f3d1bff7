//! Resolver/builder: statement tree to resolved [`Circuit`].
//!
//! Two passes per scope. Pass 1 registers every `.param`, `.model`, and
//! `.subckt` declaration, so references may appear textually before their
//! definitions. Pass 2 builds elements and resolves names by searching
//! the current scope, then the enclosing scope chain, then the attached
//! library. The scope chain is an arena of integer-indexed contexts (a
//! child stores its parent's index), so lookup walks indices rather than
//! back-references.
//!
//! Controlled sources (`E`/`F`/`G`/`H`) are rewritten here to behavioral
//! `B` form: a linear gain becomes `gain * v(cp,cn)` or `gain * i(src)`,
//! `poly`/`value` forms stay symbolic.

use std::collections::HashMap;

use indexmap::IndexMap;
use spicenet_core::circuit::{
    Analysis, Circuit, DeviceKind, DeviceModel, Element, InitialCondition, ParamValue, Scope,
    SubCircuit,
};
use spicenet_core::expr::{BinaryOp, Evaluated, Expr};
use spicenet_core::{EvalContext, NodeName};

use crate::error::{Error, Result};
use crate::library::SpiceLibrary;
use crate::parser::types::{
    AnalysisCard, ElementCard, ModelCard, ScopeDef, Statement, StatementTree,
};

/// Source waveform keywords on V/I cards; these are function-shaped but
/// never evaluate.
const WAVEFORMS: &[&str] = &["pulse", "sin", "pwl", "exp", "sffm", "am"];

/// Build a circuit with default options (ground alias `0`, no library).
pub fn build(tree: &StatementTree) -> Result<Circuit> {
    Builder::new().build(tree)
}

/// Configurable builder.
pub struct Builder<'lib> {
    ground: String,
    library: Option<&'lib SpiceLibrary>,
}

impl Default for Builder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'lib> Builder<'lib> {
    pub fn new() -> Self {
        Self {
            ground: "0".to_string(),
            library: None,
        }
    }

    /// Node name to canonicalize to ground (`0`).
    pub fn ground(mut self, alias: &str) -> Self {
        self.ground = alias.to_string();
        self
    }

    pub fn library(mut self, library: &'lib SpiceLibrary) -> Self {
        self.library = Some(library);
        self
    }

    pub fn build(&self, tree: &StatementTree) -> Result<Circuit> {
        let mut circuit = Circuit::new(tree.title.as_deref().unwrap_or(""));
        let mut build = Build {
            ground: &self.ground,
            library: self.library,
            scopes: Vec::new(),
            def_names: Vec::new(),
            def_refs: Vec::new(),
        };
        let extras = build.build_scope(None, None, &tree.statements, &mut circuit.scope)?;
        build.check_cycles()?;
        apply_extras(&mut build, &extras, &mut circuit)?;
        Ok(circuit)
    }
}

/// One scope in the arena.
struct ScopeCtx {
    parent: Option<usize>,
    /// Numeric parameter bindings resolved in this scope.
    params: HashMap<String, f64>,
    /// Subcircuit names declared (and built) here, with their node ids
    /// in the reference graph.
    defs: IndexMap<String, usize>,
    /// Model names declared here.
    models: IndexMap<String, ModelCard>,
}

struct Build<'b> {
    ground: &'b str,
    library: Option<&'b SpiceLibrary>,
    scopes: Vec<ScopeCtx>,
    // Subcircuit reference graph for self-instantiation detection.
    def_names: Vec<String>,
    def_refs: Vec<Vec<usize>>,
}

impl<'b> Build<'b> {
    /// Build one scope's statements into `target`; returns circuit-level
    /// statements (analyses, options, ...) for the caller to apply.
    fn build_scope(
        &mut self,
        parent: Option<usize>,
        def_id: Option<usize>,
        statements: &[Statement],
        target: &mut Scope,
    ) -> Result<Vec<Statement>> {
        let scope_id = self.scopes.len();
        self.scopes.push(ScopeCtx {
            parent,
            params: HashMap::new(),
            defs: IndexMap::new(),
            models: IndexMap::new(),
        });

        let mut params: Vec<(String, Expr)> = Vec::new();
        let mut defs: Vec<ScopeDef> = Vec::new();
        let mut elements: Vec<&ElementCard> = Vec::new();
        let mut extras: Vec<Statement> = Vec::new();
        self.collect(statements, scope_id, &mut params, &mut defs, &mut elements, &mut extras)?;

        // Register subcircuit names before building anything so forward
        // and sibling references resolve.
        for def in &defs {
            if self.scopes[scope_id].defs.contains_key(&def.name) {
                return Err(Error::DuplicateName {
                    name: def.name.clone(),
                });
            }
            let id = self.new_def_node(&def.name);
            self.scopes[scope_id].defs.insert(def.name.clone(), id);
        }

        self.resolve_parameters(scope_id, params, target)?;

        let models: Vec<ModelCard> = self.scopes[scope_id].models.values().cloned().collect();
        for card in models {
            let mut device_model = DeviceModel::new(&card.name, &card.model_type);
            for (key, value) in &card.parameters {
                let value = match value {
                    None => ParamValue::Flag,
                    Some(expr) => self.value_of(scope_id, expr)?,
                };
                device_model.parameters.insert(key.clone(), value);
            }
            target
                .add_model(device_model)
                .map_err(|_| Error::DuplicateName {
                    name: card.name.clone(),
                })?;
        }

        for def in &defs {
            let def_node = self.scopes[scope_id].defs[&def.name];
            let sub = self.build_subcircuit(scope_id, def_node, def)?;
            target.add_subcircuit(sub).map_err(|_| Error::DuplicateName {
                name: def.name.clone(),
            })?;
        }

        for card in elements {
            self.build_element(scope_id, def_id, card, target)?;
        }

        Ok(extras)
    }

    /// Flatten includes and `.lib` calls, registering declarations.
    #[allow(clippy::too_many_arguments)]
    fn collect<'t>(
        &mut self,
        statements: &'t [Statement],
        scope_id: usize,
        params: &mut Vec<(String, Expr)>,
        defs: &mut Vec<ScopeDef>,
        elements: &mut Vec<&'t ElementCard>,
        extras: &mut Vec<Statement>,
    ) -> Result<()> {
        // Elements borrow from `statements`; includes own their contents,
        // so their elements are skipped rather than merged.
        for statement in statements {
            match statement {
                Statement::Param(bindings) => {
                    for (name, expr) in bindings {
                        params.push((name.clone(), expr.clone()));
                    }
                }
                Statement::Model(card) => {
                    if self.scopes[scope_id].models.contains_key(&card.name) {
                        return Err(Error::DuplicateName {
                            name: card.name.clone(),
                        });
                    }
                    self.scopes[scope_id]
                        .models
                        .insert(card.name.clone(), card.clone());
                }
                Statement::SubCircuit(def) => defs.push(def.clone()),
                Statement::Element(card) => elements.push(card),
                Statement::Include { contents, .. } => {
                    self.collect_merged(contents, scope_id, params, defs)?;
                }
                Statement::LibraryCall { path, entry } => {
                    let tree = crate::parser::parse_fragment(path, 0)
                        .map_err(|e| e.in_library(path.clone()))?;
                    let body = tree
                        .statements
                        .iter()
                        .find_map(|s| match s {
                            Statement::LibraryDef(def) if def.name == *entry => {
                                Some(def.body.clone())
                            }
                            _ => None,
                        })
                        .ok_or_else(|| Error::Parse {
                            line: 0,
                            message: format!(
                                "library entry '{}' not found in {}",
                                entry,
                                path.display()
                            ),
                        })?;
                    self.collect_merged(&body, scope_id, params, defs)?;
                }
                Statement::LibraryDef(def) => {
                    log::debug!("skipping inline library definition '{}'", def.name);
                }
                Statement::End => {}
                other => extras.push(other.clone()),
            }
        }
        Ok(())
    }

    /// Merge definitions from an included file or library entry. Only
    /// parameters, models, and subcircuits cross the file boundary.
    fn collect_merged(
        &mut self,
        statements: &[Statement],
        scope_id: usize,
        params: &mut Vec<(String, Expr)>,
        defs: &mut Vec<ScopeDef>,
    ) -> Result<()> {
        for statement in statements {
            match statement {
                Statement::Param(bindings) => {
                    for (name, expr) in bindings {
                        params.push((name.clone(), expr.clone()));
                    }
                }
                Statement::Model(card) => {
                    if self.scopes[scope_id].models.contains_key(&card.name) {
                        return Err(Error::DuplicateName {
                            name: card.name.clone(),
                        });
                    }
                    self.scopes[scope_id]
                        .models
                        .insert(card.name.clone(), card.clone());
                }
                Statement::SubCircuit(def) => defs.push(def.clone()),
                Statement::Include { contents, .. } => {
                    self.collect_merged(contents, scope_id, params, defs)?;
                }
                Statement::Element(card) => {
                    log::warn!(
                        "element '{}' in included file is not merged into the circuit",
                        card.name
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Evaluate `.param` bindings to a fixpoint so declaration order does
    /// not matter; what cannot reduce stays a residual expression.
    fn resolve_parameters(
        &mut self,
        scope_id: usize,
        params: Vec<(String, Expr)>,
        target: &mut Scope,
    ) -> Result<()> {
        let mut pending: Vec<(String, Expr)> = params;
        loop {
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for (name, expr) in pending {
                match self.eval(scope_id, &expr)? {
                    Evaluated::Value(v) => {
                        self.scopes[scope_id]
                            .params
                            .insert(name.clone(), v.real());
                        target.set_parameter(&name, ParamValue::Number(v.real()));
                        progressed = true;
                    }
                    Evaluated::Residual(_) => still_pending.push((name, expr)),
                }
            }
            pending = still_pending;
            if pending.is_empty() || !progressed {
                break;
            }
        }
        // Leftovers keep their (partially substituted) expressions.
        for (name, expr) in pending {
            let residual = match self.eval(scope_id, &expr)? {
                Evaluated::Residual(r) => r,
                Evaluated::Value(v) => Expr::number(v.real()),
            };
            target.set_parameter(&name, ParamValue::Expr(residual));
        }
        Ok(())
    }

    fn build_subcircuit(
        &mut self,
        parent: usize,
        def_node: usize,
        def: &ScopeDef,
    ) -> Result<SubCircuit> {
        let nodes: Vec<NodeName> = def.nodes.iter().map(NodeName::new).collect();
        let mut sub = SubCircuit::new(&def.name, nodes)?;
        for (key, expr) in &def.defaults {
            let value = self.value_of(parent, expr)?;
            sub.defaults.insert(key.clone(), value);
        }
        let extras = self.build_scope(Some(parent), Some(def_node), &def.body, &mut sub.scope)?;
        for extra in extras {
            log::warn!(
                "directive inside .subckt {} ignored: {:?}",
                def.name,
                kind_of(&extra)
            );
        }
        Ok(sub)
    }

    fn build_element(
        &mut self,
        scope_id: usize,
        def_id: Option<usize>,
        card: &ElementCard,
        target: &mut Scope,
    ) -> Result<()> {
        let nodes: Vec<NodeName> = card
            .nodes
            .iter()
            .map(|n| NodeName::canonicalize(n, self.ground))
            .collect();

        let element = match card.kind {
            DeviceKind::Vcvs | DeviceKind::Vccs => {
                self.rewrite_voltage_controlled(scope_id, card, nodes)?
            }
            DeviceKind::Cccs | DeviceKind::Ccvs => {
                self.rewrite_current_controlled(scope_id, card, nodes)?
            }
            _ => self.plain_element(scope_id, card, nodes)?,
        };

        if element.kind == DeviceKind::SubcircuitInstance {
            let name = element
                .subcircuit_name()
                .ok_or_else(|| Error::Parse {
                    line: card.line,
                    message: format!("instance '{}' has no subcircuit name", card.name),
                })?
                .to_string();
            self.resolve_subcircuit(scope_id, def_id, &name, target)?;
        } else if let Some(model) = element.model_name() {
            self.resolve_model(scope_id, model, target)?;
        }

        target.add_element(element).map_err(|e| match e {
            spicenet_core::circuit::Error::DuplicateElement(name) => {
                Error::DuplicateName { name }
            }
            other => Error::Circuit(other),
        })
    }

    /// Resolve a subcircuit reference: local defs, then the enclosing
    /// chain, then the library. A library hit is parsed, built once into
    /// the requesting scope, and reused from there.
    fn resolve_subcircuit(
        &mut self,
        scope_id: usize,
        def_id: Option<usize>,
        name: &str,
        target: &mut Scope,
    ) -> Result<()> {
        if let Some(found) = self.find_def(scope_id, name) {
            if let Some(current) = def_id {
                self.def_refs[current].push(found);
            }
            return Ok(());
        }

        let loaded = match self.library {
            Some(library) => library.subcircuit(name)?,
            None => None,
        };
        let Some(def) = loaded else {
            return Err(Error::UnresolvedSubcircuit {
                name: name.to_string(),
            });
        };

        log::debug!("loading subcircuit '{}' from library", name);
        let def_node = self.new_def_node(&def.name);
        self.scopes[scope_id].defs.insert(def.name.clone(), def_node);
        let sub = self.build_subcircuit(scope_id, def_node, &def)?;
        target
            .add_subcircuit(sub)
            .map_err(|_| Error::DuplicateName {
                name: def.name.clone(),
            })?;
        if let Some(current) = def_id {
            self.def_refs[current].push(def_node);
        }
        Ok(())
    }

    /// Resolve a model reference through the chain, then the library.
    /// Library models merge into the requesting scope so they render.
    fn resolve_model(&mut self, scope_id: usize, name: &str, target: &mut Scope) -> Result<()> {
        let mut cursor = Some(scope_id);
        while let Some(id) = cursor {
            if self.scopes[id].models.contains_key(&name.to_ascii_lowercase()) {
                return Ok(());
            }
            cursor = self.scopes[id].parent;
        }

        let loaded = match self.library {
            Some(library) => library.model(name)?,
            None => None,
        };
        let Some(card) = loaded else {
            return Err(Error::UnresolvedModel {
                name: name.to_string(),
            });
        };

        log::debug!("loading model '{}' from library", name);
        let mut model = DeviceModel::new(&card.name, &card.model_type);
        for (key, value) in &card.parameters {
            let value = match value {
                None => ParamValue::Flag,
                Some(expr) => self.value_of(scope_id, expr)?,
            };
            model.parameters.insert(key.clone(), value);
        }
        self.scopes[scope_id]
            .models
            .insert(card.name.clone(), card.clone());
        target.add_model(model).map_err(|_| Error::DuplicateName {
            name: card.name.clone(),
        })?;
        Ok(())
    }

    fn find_def(&self, scope_id: usize, name: &str) -> Option<usize> {
        let name = name.to_ascii_lowercase();
        let mut cursor = Some(scope_id);
        while let Some(id) = cursor {
            if let Some(&node) = self.scopes[id].defs.get(&name) {
                return Some(node);
            }
            cursor = self.scopes[id].parent;
        }
        None
    }

    fn plain_element(
        &mut self,
        scope_id: usize,
        card: &ElementCard,
        nodes: Vec<NodeName>,
    ) -> Result<Element> {
        let mut element = Element::new(card.kind, &card.name, nodes);
        for (index, expr) in card.positionals.iter().enumerate() {
            let value = self.positional_value(scope_id, card.kind, index, expr)?;
            element.positionals.push(value);
        }
        for (key, expr) in &card.keywords {
            let value = self.value_of(scope_id, expr)?;
            element.set_parameter(key, value);
        }
        Ok(element)
    }

    /// `E`/`G` to behavioral `B`: output nodes keep the element, the
    /// control becomes an expression.
    fn rewrite_voltage_controlled(
        &mut self,
        scope_id: usize,
        card: &ElementCard,
        nodes: Vec<NodeName>,
    ) -> Result<Element> {
        let output_key = if card.kind == DeviceKind::Vcvs { "v" } else { "i" };

        let control = if nodes.len() >= 4 {
            // Linear four-port form: gain * v(cp, cn).
            let gain = card.positionals.first().cloned().ok_or_else(|| {
                Error::Parse {
                    line: card.line,
                    message: format!("controlled source '{}' has no gain", card.name),
                }
            })?;
            let probe = Expr::voltage_probe(vec![
                nodes[2].as_str().to_string(),
                nodes[3].as_str().to_string(),
            ]);
            Some(Expr::binary(BinaryOp::Mul, gain, probe))
        } else if let Some(expr) = card.keywords.get("value").or_else(|| card.keywords.get(output_key))
        {
            Some(expr.clone())
        } else {
            card.positionals.first().cloned()
        };

        let Some(control) = control else {
            return Err(Error::Parse {
                line: card.line,
                message: format!("controlled source '{}' has no control expression", card.name),
            });
        };

        let out_nodes = nodes.into_iter().take(2).collect();
        let mut element = Element::new(DeviceKind::Behavioral, &card.name, out_nodes);
        let value = self.expression_value(scope_id, &control)?;
        element.set_parameter(output_key, value);
        Ok(element)
    }

    /// `F`/`H` to behavioral `B`: gain * i(source).
    fn rewrite_current_controlled(
        &mut self,
        scope_id: usize,
        card: &ElementCard,
        nodes: Vec<NodeName>,
    ) -> Result<Element> {
        let output_key = if card.kind == DeviceKind::Ccvs { "v" } else { "i" };

        let control = match card.positionals.as_slice() {
            [Expr::Variable(source), gain] => {
                Expr::binary(
                    BinaryOp::Mul,
                    gain.clone(),
                    Expr::current_probe(source.clone()),
                )
            }
            [poly @ Expr::Poly { .. }] => poly.clone(),
            _ => match card.keywords.get(output_key) {
                Some(expr) => expr.clone(),
                None => {
                    return Err(Error::Parse {
                        line: card.line,
                        message: format!(
                            "controlled source '{}' needs a source name and gain",
                            card.name
                        ),
                    });
                }
            },
        };

        let mut element = Element::new(DeviceKind::Behavioral, &card.name, nodes);
        let value = self.expression_value(scope_id, &control)?;
        element.set_parameter(output_key, value);
        Ok(element)
    }

    /// Convert one positional by card position: name positions stay bare
    /// words, value positions evaluate.
    fn positional_value(
        &mut self,
        scope_id: usize,
        kind: DeviceKind,
        index: usize,
        expr: &Expr,
    ) -> Result<ParamValue> {
        let is_name = match kind {
            DeviceKind::SubcircuitInstance => index == 0,
            DeviceKind::MutualInductance => index <= 1,
            DeviceKind::Diode
            | DeviceKind::Bjt
            | DeviceKind::Mosfet
            | DeviceKind::Jfet
            | DeviceKind::Switch
            | DeviceKind::CurrentSwitch => matches!(expr, Expr::Variable(_)),
            _ => false,
        };
        if is_name {
            if let Expr::Variable(name) = expr {
                return Ok(ParamValue::Text(name.clone()));
            }
        }

        // Source keywords and waveforms never evaluate.
        if matches!(
            kind,
            DeviceKind::VoltageSource | DeviceKind::CurrentSource
        ) {
            if let Expr::Variable(word) = expr
                && matches!(word.as_str(), "dc" | "ac")
            {
                return Ok(ParamValue::Text(word.clone()));
            }
            if let Expr::Call { name, args } = expr
                && WAVEFORMS.contains(&name.as_str())
            {
                let args = args
                    .iter()
                    .map(|arg| {
                        Ok(match self.eval(scope_id, arg)? {
                            Evaluated::Value(v) => Expr::number(v.real()),
                            Evaluated::Residual(r) => r,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                return Ok(ParamValue::Raw(Expr::call(name.clone(), args)));
            }
        }

        self.value_of(scope_id, expr)
    }

    /// Evaluate an expression into a parameter value.
    fn value_of(&mut self, scope_id: usize, expr: &Expr) -> Result<ParamValue> {
        Ok(match self.eval(scope_id, expr)? {
            Evaluated::Value(v) => match v {
                spicenet_core::expr::Value::Real(x) => ParamValue::Number(x),
                spicenet_core::expr::Value::Complex(c) => {
                    ParamValue::Expr(Expr::Complex(c))
                }
            },
            Evaluated::Residual(r) => ParamValue::Expr(r),
        })
    }

    /// Like [`Self::value_of`] but always keeps an expression value;
    /// used for behavioral controls, which stay expressions even when
    /// they would reduce.
    fn expression_value(&mut self, scope_id: usize, expr: &Expr) -> Result<ParamValue> {
        Ok(match self.eval(scope_id, expr)? {
            Evaluated::Value(v) => ParamValue::Expr(Expr::number(v.real())),
            Evaluated::Residual(r) => ParamValue::Expr(r),
        })
    }

    fn eval(&mut self, scope_id: usize, expr: &Expr) -> Result<Evaluated> {
        let mut ctx = EvalContext::with_bindings(self.merged_bindings(scope_id));
        Ok(ctx.evaluate(expr)?)
    }

    /// Bindings visible from a scope: nearest declaration wins.
    fn merged_bindings(&self, scope_id: usize) -> HashMap<String, f64> {
        let mut merged = HashMap::new();
        let mut cursor = Some(scope_id);
        while let Some(id) = cursor {
            for (name, value) in &self.scopes[id].params {
                merged.entry(name.clone()).or_insert(*value);
            }
            cursor = self.scopes[id].parent;
        }
        merged
    }

    fn new_def_node(&mut self, name: &str) -> usize {
        self.def_names.push(name.to_string());
        self.def_refs.push(Vec::new());
        self.def_names.len() - 1
    }

    /// The built graph must be instantiation-acyclic.
    fn check_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }
        fn visit(
            node: usize,
            refs: &[Vec<usize>],
            marks: &mut [Mark],
        ) -> Option<usize> {
            marks[node] = Mark::Grey;
            for &next in &refs[node] {
                match marks[next] {
                    Mark::Grey => return Some(next),
                    Mark::White => {
                        if let Some(cycle) = visit(next, refs, marks) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }
            marks[node] = Mark::Black;
            None
        }

        let mut marks = vec![Mark::White; self.def_names.len()];
        for node in 0..self.def_names.len() {
            if marks[node] == Mark::White
                && let Some(cycle) = visit(node, &self.def_refs, &mut marks)
            {
                return Err(Error::RecursiveSubcircuit {
                    name: self.def_names[cycle].clone(),
                });
            }
        }
        Ok(())
    }
}

fn apply_extras(build: &mut Build, extras: &[Statement], circuit: &mut Circuit) -> Result<()> {
    for statement in extras {
        match statement {
            Statement::Global(nodes) => {
                circuit
                    .global_nodes
                    .extend(nodes.iter().map(NodeName::new));
            }
            Statement::Options(options) => {
                for (key, value) in options {
                    let value = match value {
                        None => ParamValue::Flag,
                        Some(expr) => build.value_of(0, expr)?,
                    };
                    circuit.options.insert(key.clone(), value);
                }
            }
            Statement::InitialCondition(entries) => {
                for (node, voltage) in entries {
                    circuit.initial_conditions.push(InitialCondition {
                        node: NodeName::canonicalize(node, build.ground),
                        voltage: *voltage,
                    });
                }
            }
            Statement::NodeSet(entries) => {
                for (node, voltage) in entries {
                    circuit.node_sets.push(InitialCondition {
                        node: NodeName::canonicalize(node, build.ground),
                        voltage: *voltage,
                    });
                }
            }
            Statement::Data(table) => {
                circuit
                    .data_tables
                    .insert(table.name.clone(), table.columns.clone());
            }
            Statement::Analysis(card) => {
                circuit.analyses.push(build_analysis(build, card)?);
            }
            other => log::debug!("ignoring top-level statement {:?}", kind_of(other)),
        }
    }
    Ok(())
}

fn build_analysis(build: &mut Build, card: &AnalysisCard) -> Result<Analysis> {
    let mut analysis = Analysis::new(&card.kind);
    for arg in &card.args {
        let value = match arg {
            // Sweep names, scale keywords (`dec`), and flags (`uic`)
            // stay words; probes render bare.
            Expr::Variable(word) => ParamValue::Text(word.clone()),
            probe @ Expr::Probe { .. } => ParamValue::Raw(probe.clone()),
            call @ Expr::Call { .. } => ParamValue::Raw(call.clone()),
            other => build.value_of(0, other)?,
        };
        analysis.args.push(value);
    }
    for (key, expr) in &card.keywords {
        let value = build.value_of(0, expr)?;
        analysis.parameters.insert(key.clone(), value);
    }
    Ok(analysis)
}

fn kind_of(statement: &Statement) -> &'static str {
    match statement {
        Statement::Element(_) => "element",
        Statement::Model(_) => "model",
        Statement::Param(_) => "param",
        Statement::SubCircuit(_) => "subckt",
        Statement::LibraryDef(_) => "lib",
        Statement::LibraryCall { .. } => "lib call",
        Statement::Include { .. } => "include",
        Statement::Data(_) => "data",
        Statement::Global(_) => "global",
        Statement::Options(_) => "options",
        Statement::InitialCondition(_) => "ic",
        Statement::NodeSet(_) => "nodeset",
        Statement::Analysis(_) => "analysis",
        Statement::End => "end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn build_source(source: &str) -> Result<Circuit> {
        build(&parse(source)?)
    }

    #[test]
    fn test_divider_scenario() {
        let circuit = build_source(
            ".title Divider\nV1 1 0 DC 10\nR1 1 2 1k\nR2 2 0 1k\n.end\n",
        )
        .unwrap();
        assert_eq!(circuit.title, "Divider");

        let r1 = circuit.element("r1").unwrap();
        assert_eq!(r1.nodes, vec![NodeName::new("1"), NodeName::new("2")]);
        let r2 = circuit.element("r2").unwrap();
        assert_eq!(r2.nodes, vec![NodeName::new("2"), NodeName::new("0")]);
        assert_eq!(r2.positionals[0].as_number(), Some(1000.0));

        let v1 = circuit.element("v1").unwrap();
        assert_eq!(v1.nodes, vec![NodeName::new("1"), NodeName::new("0")]);
        assert_eq!(v1.positionals[1].as_number(), Some(10.0));
    }

    #[test]
    fn test_forward_reference_resolves() {
        let circuit = build_source(
            "t\nX1 1 2 sub1\n.subckt sub1 a b\nR1 a b 1k\n.ends\n.end\n",
        )
        .unwrap();
        assert!(circuit.subcircuit("sub1").is_some());
        assert_eq!(
            circuit.element("x1").unwrap().subcircuit_name(),
            Some("sub1")
        );
    }

    #[test]
    fn test_unresolved_subcircuit() {
        let err = build_source("t\nX1 a b missing_subckt\n.end\n").unwrap_err();
        match err {
            Error::UnresolvedSubcircuit { name } => assert_eq!(name, "missing_subckt"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unresolved_model() {
        let err = build_source("t\nD1 1 0 missing_model\n.end\n").unwrap_err();
        match err {
            Error::UnresolvedModel { name } => assert_eq!(name, "missing_model"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_model_is_build_error() {
        let err = build_source(
            "t\n.model foo d (is=1p)\n.model foo d (is=2p)\nD1 1 0 foo\n.end\n",
        )
        .unwrap_err();
        match err {
            Error::DuplicateName { name } => assert_eq!(name, "foo"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_element_is_build_error() {
        let err = build_source("t\nR1 1 0 1k\nR1 2 0 1k\n.end\n").unwrap_err();
        assert!(matches!(err, Error::DuplicateName { name } if name == "r1"));
    }

    #[test]
    fn test_scope_shadowing() {
        let circuit = build_source(
            "t\n\
             .subckt inner a b\nR1 a b 1k\n.ends\n\
             .subckt outer a b\n\
             .subckt inner c d\nR1 c d 2k\n.ends\n\
             X1 a b inner\n\
             .ends\n\
             X1 1 2 outer\n\
             X2 3 4 inner\n\
             .end\n",
        )
        .unwrap();
        // The outer scope sees its nested definition; the top level its
        // own.
        let outer = circuit.subcircuit("outer").unwrap();
        let nested = outer.scope.subcircuit("inner").unwrap();
        assert_eq!(
            nested.scope.element("r1").unwrap().positionals[0].as_number(),
            Some(2000.0)
        );
        let top = circuit.subcircuit("inner").unwrap();
        assert_eq!(
            top.scope.element("r1").unwrap().positionals[0].as_number(),
            Some(1000.0)
        );
    }

    #[test]
    fn test_ground_alias_translation() {
        let circuit = Builder::new()
            .ground("vss")
            .build(&parse("t\nR1 in vss 1k\n.end\n").unwrap())
            .unwrap();
        let r1 = circuit.element("r1").unwrap();
        assert!(r1.nodes[1].is_ground());
    }

    #[test]
    fn test_gnd_alias_is_always_ground() {
        let circuit = build_source("t\nR1 in gnd 1k\n.end\n").unwrap();
        assert!(circuit.element("r1").unwrap().nodes[1].is_ground());
    }

    #[test]
    fn test_parameter_forward_reference() {
        let circuit = build_source(
            "t\n.param b={a*2}\n.param a=1k\nR1 1 0 {b}\n.end\n",
        )
        .unwrap();
        assert_eq!(
            circuit.element("r1").unwrap().positionals[0].as_number(),
            Some(2000.0)
        );
    }

    #[test]
    fn test_unresolvable_parameter_stays_residual() {
        let circuit = build_source("t\n.param x={y+1}\nR1 1 0 1k\n.end\n").unwrap();
        match &circuit.scope.parameters["x"] {
            ParamValue::Expr(e) => assert_eq!(e.to_string(), "y + 1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_vcvs_rewritten_to_behavioral() {
        let circuit = build_source("t\nV1 1 0 10\nE1 3 0 1 2 2.0\n.end\n").unwrap();
        let e1 = circuit.element("e1").unwrap();
        assert_eq!(e1.kind, DeviceKind::Behavioral);
        assert_eq!(e1.nodes.len(), 2);
        match &e1.parameters["v"] {
            ParamValue::Expr(expr) => assert_eq!(expr.to_string(), "2 * v(1,2)"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cccs_rewritten_to_behavioral() {
        let circuit = build_source("t\nV1 1 0 10\nF1 2 0 V1 3.0\n.end\n").unwrap();
        let f1 = circuit.element("f1").unwrap();
        assert_eq!(f1.kind, DeviceKind::Behavioral);
        match &f1.parameters["i"] {
            ParamValue::Expr(expr) => assert_eq!(expr.to_string(), "3 * i(v1)"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_self_instantiating_subcircuit() {
        let err = build_source(
            "t\n.subckt loop a b\nX1 a b loop\n.ends\nX1 1 2 loop\n.end\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::RecursiveSubcircuit { name } if name == "loop"));
    }

    #[test]
    fn test_mutually_recursive_subcircuits() {
        let err = build_source(
            "t\n\
             .subckt a 1 2\nX1 1 2 b\n.ends\n\
             .subckt b 1 2\nX1 1 2 a\n.ends\n\
             X1 5 6 a\n.end\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::RecursiveSubcircuit { .. }));
    }

    #[test]
    fn test_waveform_value_stays_raw() {
        let circuit = build_source("t\nV1 in 0 SIN(0 1 1k)\n.end\n").unwrap();
        let v1 = circuit.element("v1").unwrap();
        match &v1.positionals[0] {
            ParamValue::Raw(expr) => assert_eq!(expr.to_string(), "sin(0,1,1000)"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_behavioral_keyword_expression() {
        let circuit = build_source("t\nV1 1 0 10\nB1 2 0 V=V(1)*0.5\n.end\n").unwrap();
        let b1 = circuit.element("b1").unwrap();
        match &b1.parameters["v"] {
            ParamValue::Expr(expr) => assert!(expr.has_probe()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_analysis_and_options_carried() {
        let circuit = build_source(
            "t\nV1 1 0 10\nR1 1 0 1k\n.options reltol=1e-4\n.op\n.dc V1 0 10 0.5\n.end\n",
        )
        .unwrap();
        assert_eq!(circuit.analyses.len(), 2);
        assert_eq!(circuit.analyses[1].kind, "dc");
        assert_eq!(circuit.analyses[1].args[0], ParamValue::Text("v1".into()));
        assert_eq!(circuit.options["reltol"].as_number(), Some(1e-4));
    }

    #[test]
    fn test_subckt_defaults_and_instance_overrides() {
        let circuit = build_source(
            "t\n.subckt res in out params: r=1k\nR1 in out {r}\n.ends\nX1 1 0 res params: r=2k\n.end\n",
        )
        .unwrap();
        let sub = circuit.subcircuit("res").unwrap();
        assert_eq!(sub.defaults["r"].as_number(), Some(1000.0));
        // The inner value stays parametric; the instance carries its
        // override.
        match &sub.scope.element("r1").unwrap().positionals[0] {
            ParamValue::Expr(e) => assert_eq!(e.to_string(), "r"),
            other => panic!("unexpected: {other:?}"),
        }
        let x1 = circuit.element("x1").unwrap();
        assert_eq!(x1.parameters["r"].as_number(), Some(2000.0));
    }
}
