//! Spice library: a directory tree indexed by subcircuit and model name.
//!
//! The scan is a one-time, single-threaded walk; after construction the
//! index is read-only and safe to share across concurrent builds. Entry
//! files are fully parsed lazily, on the first lookup that needs them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::parser::{self, ModelCard, ScopeDef, Statement};

/// File extensions scanned for definitions.
const EXTENSIONS: &[&str] = &["lib", "mod", "spice"];

/// An index of subcircuit/model names to the files that define them.
#[derive(Debug, Default)]
pub struct SpiceLibrary {
    subcircuits: HashMap<String, PathBuf>,
    models: HashMap<String, PathBuf>,
}

impl SpiceLibrary {
    /// Recursively scan a directory for library files.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let mut library = SpiceLibrary::default();
        library.scan(root.as_ref())?;
        log::debug!(
            "library index: {} subcircuits, {} models",
            library.subcircuits.len(),
            library.models.len()
        );
        Ok(library)
    }

    fn scan(&mut self, dir: &Path) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_dir() {
                self.scan(&path)?;
                continue;
            }
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if matches {
                self.index_file(&path)?;
            }
        }
        Ok(())
    }

    fn index_file(&mut self, path: &Path) -> Result<()> {
        let tree =
            parser::parse_fragment(path, 0).map_err(|e| e.in_library(path.to_path_buf()))?;
        self.index_statements(&tree.statements, path);
        Ok(())
    }

    fn index_statements(&mut self, statements: &[Statement], path: &Path) {
        for statement in statements {
            match statement {
                Statement::SubCircuit(def) => {
                    self.subcircuits
                        .insert(def.name.clone(), path.to_path_buf());
                }
                Statement::Model(card) => {
                    self.models.insert(card.name.clone(), path.to_path_buf());
                }
                // Definitions inside .lib entry blocks are reachable too.
                Statement::LibraryDef(def) => self.index_statements(&def.body, path),
                Statement::Include { contents, .. } => self.index_statements(contents, path),
                _ => {}
            }
        }
    }

    /// The file that defines `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&Path> {
        let name = name.to_ascii_lowercase();
        self.subcircuits
            .get(&name)
            .or_else(|| self.models.get(&name))
            .map(PathBuf::as_path)
    }

    pub fn subcircuit_names(&self) -> impl Iterator<Item = &str> {
        self.subcircuits.keys().map(String::as_str)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Parse the defining file and return the named subcircuit.
    pub fn subcircuit(&self, name: &str) -> Result<Option<ScopeDef>> {
        let name = name.to_ascii_lowercase();
        let Some(path) = self.subcircuits.get(&name) else {
            return Ok(None);
        };
        let tree = parser::parse_fragment(path, 0).map_err(|e| e.in_library(path.clone()))?;
        Ok(find_subcircuit(&tree.statements, &name))
    }

    /// Parse the defining file and return the named model.
    pub fn model(&self, name: &str) -> Result<Option<ModelCard>> {
        let name = name.to_ascii_lowercase();
        let Some(path) = self.models.get(&name) else {
            return Ok(None);
        };
        let tree = parser::parse_fragment(path, 0).map_err(|e| e.in_library(path.clone()))?;
        Ok(find_model(&tree.statements, &name))
    }
}

fn find_subcircuit(statements: &[Statement], name: &str) -> Option<ScopeDef> {
    for statement in statements {
        match statement {
            Statement::SubCircuit(def) if def.name == name => return Some(def.clone()),
            Statement::LibraryDef(def) => {
                if let Some(found) = find_subcircuit(&def.body, name) {
                    return Some(found);
                }
            }
            Statement::Include { contents, .. } => {
                if let Some(found) = find_subcircuit(contents, name) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_model(statements: &[Statement], name: &str) -> Option<ModelCard> {
    for statement in statements {
        match statement {
            Statement::Model(card) if card.name == name => return Some(card.clone()),
            Statement::LibraryDef(def) => {
                if let Some(found) = find_model(&def.body, name) {
                    return Some(found);
                }
            }
            Statement::Include { contents, .. } => {
                if let Some(found) = find_model(contents, name) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}
