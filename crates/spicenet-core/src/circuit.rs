//! Resolved circuit object graph.
//!
//! A [`Circuit`] is a tree of scopes: the top-level scope plus nested
//! [`SubCircuit`] definitions, each owning its parameters, models,
//! subcircuits, and elements in declaration order. The graph is produced
//! by the builder, mutated only through the explicit `add_*` calls here,
//! and rendered back to SPICE text by the serializer.

use indexmap::IndexMap;
use thiserror::Error;

use crate::expr::Expr;
use crate::node::NodeName;
use crate::units::format_value;

/// Errors raised by direct mutation of the graph.
#[derive(Debug, Error)]
pub enum Error {
    #[error("element {0} is already defined")]
    DuplicateElement(String),
    #[error("model {0} is already defined")]
    DuplicateModel(String),
    #[error("subcircuit {0} is already defined")]
    DuplicateSubcircuit(String),
    #[error("duplicated node {0} in subcircuit ports")]
    DuplicatePort(String),
    #[error("subcircuit nodes {0:?} are not connected")]
    DanglingNodes(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Device kind selected by the card's first letter.
///
/// The prefix set is finite and known at compile time, so dispatch is a
/// closed enum rather than a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Resistor,
    Capacitor,
    Inductor,
    Diode,
    Bjt,
    Mosfet,
    Jfet,
    VoltageSource,
    CurrentSource,
    /// E — voltage-controlled voltage source.
    Vcvs,
    /// F — current-controlled current source.
    Cccs,
    /// G — voltage-controlled current source.
    Vccs,
    /// H — current-controlled voltage source.
    Ccvs,
    Behavioral,
    /// S — voltage-controlled switch.
    Switch,
    /// W — current-controlled switch.
    CurrentSwitch,
    SubcircuitInstance,
    MutualInductance,
    TransmissionLine,
}

impl DeviceKind {
    /// Map a card's first letter (case-insensitive) to its device kind.
    pub fn from_prefix(prefix: char) -> Option<DeviceKind> {
        match prefix.to_ascii_uppercase() {
            'R' => Some(DeviceKind::Resistor),
            'C' => Some(DeviceKind::Capacitor),
            'L' => Some(DeviceKind::Inductor),
            'D' => Some(DeviceKind::Diode),
            'Q' => Some(DeviceKind::Bjt),
            'M' => Some(DeviceKind::Mosfet),
            'J' => Some(DeviceKind::Jfet),
            'V' => Some(DeviceKind::VoltageSource),
            'I' => Some(DeviceKind::CurrentSource),
            'E' => Some(DeviceKind::Vcvs),
            'F' => Some(DeviceKind::Cccs),
            'G' => Some(DeviceKind::Vccs),
            'H' => Some(DeviceKind::Ccvs),
            'B' => Some(DeviceKind::Behavioral),
            'S' => Some(DeviceKind::Switch),
            'W' => Some(DeviceKind::CurrentSwitch),
            'X' => Some(DeviceKind::SubcircuitInstance),
            'K' => Some(DeviceKind::MutualInductance),
            'T' => Some(DeviceKind::TransmissionLine),
            _ => None,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            DeviceKind::Resistor => 'r',
            DeviceKind::Capacitor => 'c',
            DeviceKind::Inductor => 'l',
            DeviceKind::Diode => 'd',
            DeviceKind::Bjt => 'q',
            DeviceKind::Mosfet => 'm',
            DeviceKind::Jfet => 'j',
            DeviceKind::VoltageSource => 'v',
            DeviceKind::CurrentSource => 'i',
            DeviceKind::Vcvs => 'e',
            DeviceKind::Cccs => 'f',
            DeviceKind::Vccs => 'g',
            DeviceKind::Ccvs => 'h',
            DeviceKind::Behavioral => 'b',
            DeviceKind::Switch => 's',
            DeviceKind::CurrentSwitch => 'w',
            DeviceKind::SubcircuitInstance => 'x',
            DeviceKind::MutualInductance => 'k',
            DeviceKind::TransmissionLine => 't',
        }
    }

    /// Minimum node tokens read from the card.
    ///
    /// `K` references two inductor names rather than nodes, so its node
    /// count is zero; `X` nodes are scope-defined and read until the
    /// trailing subcircuit name.
    pub fn min_nodes(self) -> usize {
        match self {
            DeviceKind::Resistor
            | DeviceKind::Capacitor
            | DeviceKind::Inductor
            | DeviceKind::Diode
            | DeviceKind::VoltageSource
            | DeviceKind::CurrentSource
            | DeviceKind::Behavioral
            | DeviceKind::Switch
            | DeviceKind::CurrentSwitch => 2,
            DeviceKind::Bjt | DeviceKind::Jfet => 3,
            DeviceKind::Mosfet | DeviceKind::TransmissionLine => 4,
            DeviceKind::Vcvs | DeviceKind::Vccs => 4,
            DeviceKind::Cccs | DeviceKind::Ccvs => 2,
            DeviceKind::SubcircuitInstance | DeviceKind::MutualInductance => 0,
        }
    }
}

/// A parameter or positional value on an element, model, or directive.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    /// A residual expression, rendered back as `{expr}`.
    Expr(Expr),
    /// An expression rendered without braces: source waveforms
    /// (`pulse(...)`) and probe references in directives (`v(out)`).
    Raw(Expr),
    /// A bare word (model name, source keyword like `dc`).
    Text(String),
    /// A key with no value (`off`).
    Flag,
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Expr(e) | ParamValue::Raw(e) => e.as_number(),
            _ => None,
        }
    }

    /// SPICE rendering of the value alone.
    pub fn render(&self) -> String {
        match self {
            ParamValue::Number(v) => format_value(*v),
            ParamValue::Expr(e) => format!("{{{}}}", e),
            ParamValue::Raw(e) => e.to_string(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::Flag => String::new(),
        }
    }
}

/// One circuit element.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: DeviceKind,
    /// Full element name with prefix, lower-cased (`r1`).
    pub name: String,
    pub nodes: Vec<NodeName>,
    pub positionals: Vec<ParamValue>,
    pub parameters: IndexMap<String, ParamValue>,
}

impl Element {
    pub fn new(kind: DeviceKind, name: &str, nodes: Vec<NodeName>) -> Self {
        Self {
            kind,
            name: name.to_ascii_lowercase(),
            nodes,
            positionals: Vec::new(),
            parameters: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, value: ParamValue) -> Self {
        self.positionals.push(value);
        self
    }

    pub fn set_parameter(&mut self, name: &str, value: ParamValue) {
        self.parameters.insert(name.to_ascii_lowercase(), value);
    }

    /// For `X` instances, the referenced subcircuit name.
    pub fn subcircuit_name(&self) -> Option<&str> {
        if self.kind != DeviceKind::SubcircuitInstance {
            return None;
        }
        self.positionals.first().and_then(|v| match v {
            ParamValue::Text(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The referenced model name for model-backed devices, if the card
    /// carried one. The model name is always the last bare word before
    /// any keyword parameters (a BJT's optional substrate node precedes
    /// it).
    pub fn model_name(&self) -> Option<&str> {
        match self.kind {
            DeviceKind::Diode
            | DeviceKind::Bjt
            | DeviceKind::Mosfet
            | DeviceKind::Jfet
            | DeviceKind::Switch
            | DeviceKind::CurrentSwitch => {}
            _ => return None,
        }
        // Initial-state flags (`on`/`off`) may trail the model name.
        self.positionals.iter().rev().find_map(|v| match v {
            ParamValue::Text(name) if !matches!(name.as_str(), "on" | "off") => {
                Some(name.as_str())
            }
            _ => None,
        })
    }
}

/// A `.model` definition.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    pub name: String,
    pub model_type: String,
    pub parameters: IndexMap<String, ParamValue>,
}

impl DeviceModel {
    pub fn new(name: &str, model_type: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            model_type: model_type.to_ascii_lowercase(),
            parameters: IndexMap::new(),
        }
    }
}

/// An analysis or output directive carried on the circuit (`.op`, `.dc`,
/// `.ac`, `.tran`, ...).
#[derive(Debug, Clone)]
pub struct Analysis {
    pub kind: String,
    pub args: Vec<ParamValue>,
    pub parameters: IndexMap<String, ParamValue>,
}

impl Analysis {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            args: Vec::new(),
            parameters: IndexMap::new(),
        }
    }
}

/// A `.ic`/`.nodeset` entry.
#[derive(Debug, Clone)]
pub struct InitialCondition {
    pub node: NodeName,
    pub voltage: f64,
}

/// The shared shape of every name scope: circuit, subcircuit, or library
/// entry. Declaration order is preserved for rendering.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parameters: IndexMap<String, ParamValue>,
    pub models: IndexMap<String, DeviceModel>,
    pub subcircuits: IndexMap<String, SubCircuit>,
    pub elements: IndexMap<String, Element>,
}

impl Scope {
    /// Set a parameter; re-assignment overwrites.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) {
        self.parameters.insert(name.to_ascii_lowercase(), value);
    }

    pub fn add_model(&mut self, model: DeviceModel) -> Result<()> {
        let name = model.name.clone();
        if self.models.contains_key(&name) {
            return Err(Error::DuplicateModel(name));
        }
        self.models.insert(name, model);
        Ok(())
    }

    pub fn add_subcircuit(&mut self, subcircuit: SubCircuit) -> Result<()> {
        let name = subcircuit.name.clone();
        if self.subcircuits.contains_key(&name) {
            return Err(Error::DuplicateSubcircuit(name));
        }
        self.subcircuits.insert(name, subcircuit);
        Ok(())
    }

    pub fn add_element(&mut self, element: Element) -> Result<()> {
        let name = element.name.clone();
        if self.elements.contains_key(&name) {
            return Err(Error::DuplicateElement(name));
        }
        self.elements.insert(name, element);
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.get(&name.to_ascii_lowercase())
    }

    pub fn model(&self, name: &str) -> Option<&DeviceModel> {
        self.models.get(&name.to_ascii_lowercase())
    }

    pub fn subcircuit(&self, name: &str) -> Option<&SubCircuit> {
        self.subcircuits.get(&name.to_ascii_lowercase())
    }
}

/// A subcircuit definition: a named scope with external ports and default
/// parameters.
#[derive(Debug, Clone)]
pub struct SubCircuit {
    pub name: String,
    pub external_nodes: Vec<NodeName>,
    /// `params:` defaults from the `.subckt` header.
    pub defaults: IndexMap<String, ParamValue>,
    pub scope: Scope,
}

impl SubCircuit {
    pub fn new(name: &str, nodes: Vec<NodeName>) -> Result<Self> {
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].contains(node) {
                return Err(Error::DuplicatePort(node.to_string()));
            }
        }
        Ok(Self {
            name: name.to_ascii_lowercase(),
            external_nodes: nodes,
            defaults: IndexMap::new(),
            scope: Scope::default(),
        })
    }

    /// Report externally declared ports never touched by an element.
    pub fn check_nodes(&self) -> Result<()> {
        let mut connected: IndexMap<&NodeName, bool> = self
            .external_nodes
            .iter()
            .map(|node| (node, false))
            .collect();
        for element in self.scope.elements.values() {
            for node in &element.nodes {
                if let Some(seen) = connected.get_mut(node) {
                    *seen = true;
                }
            }
        }
        let dangling: Vec<String> = connected
            .iter()
            .filter(|(_, seen)| !**seen)
            .map(|(node, _)| node.to_string())
            .collect();
        if dangling.is_empty() {
            Ok(())
        } else {
            Err(Error::DanglingNodes(dangling))
        }
    }
}

/// The top-level circuit.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    pub title: String,
    pub global_nodes: Vec<NodeName>,
    pub options: IndexMap<String, ParamValue>,
    pub initial_conditions: Vec<InitialCondition>,
    pub node_sets: Vec<InitialCondition>,
    /// `.data` tables: table name -> column name -> values.
    pub data_tables: IndexMap<String, IndexMap<String, Vec<f64>>>,
    pub analyses: Vec<Analysis>,
    pub scope: Scope,
}

impl Circuit {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.scope.elements.values()
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.scope.element(name)
    }

    pub fn subcircuit(&self, name: &str) -> Option<&SubCircuit> {
        self.scope.subcircuit(name)
    }

    pub fn model(&self, name: &str) -> Option<&DeviceModel> {
        self.scope.model(name)
    }
}
