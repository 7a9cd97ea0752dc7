//! Stream dependency resolution
//!
//! Orders the requested streams so that every stream runs after the requested
//! streams it depends on. Dependencies on streams outside the request are
//! dropped; they only constrain order when both ends are synced.

use crate::error::{Error, Result};
use crate::stream::StreamDefinition;
use std::collections::{HashMap, HashSet};

/// Dependency graph over all declared streams, built once per sync
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Stream names in declaration order
    names: Vec<String>,
    /// Declared dependencies of each stream
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from stream definitions
    pub fn new(definitions: &[StreamDefinition]) -> Result<Self> {
        let mut names = Vec::with_capacity(definitions.len());
        let mut dependencies = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if dependencies.contains_key(&definition.name) {
                return Err(Error::config(format!(
                    "Stream '{}' is declared more than once",
                    definition.name
                )));
            }
            if definition.dependencies.contains(&definition.name) {
                return Err(Error::config(format!(
                    "Stream '{}' depends on itself",
                    definition.name
                )));
            }
            names.push(definition.name.clone());
            dependencies.insert(definition.name.clone(), definition.dependencies.clone());
        }

        Ok(Self {
            names,
            dependencies,
        })
    }

    /// Declared stream names
    pub fn known(&self) -> &[String] {
        &self.names
    }

    /// Order `requested` so dependencies come first
    ///
    /// Among streams whose requested dependencies are satisfied, request
    /// order wins, so the result is deterministic and equals the request
    /// order when no requested stream depends on another.
    pub fn resolve(&self, requested: &[&str]) -> Result<Vec<String>> {
        let mut pending: Vec<&str> = Vec::with_capacity(requested.len());
        let mut unknown = Vec::new();
        for name in requested {
            if !self.dependencies.contains_key(*name) {
                if !unknown.iter().any(|u: &String| u == name) {
                    unknown.push((*name).to_string());
                }
            } else if !pending.contains(name) {
                pending.push(*name);
            }
        }

        if !unknown.is_empty() {
            return Err(Error::UnknownStreams {
                unknown,
                known: self.known().to_vec(),
            });
        }

        let selected: HashSet<&str> = pending.iter().copied().collect();
        let mut ordered: Vec<String> = Vec::with_capacity(pending.len());
        let mut done: HashSet<&str> = HashSet::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|name| {
                self.dependencies[*name]
                    .iter()
                    .filter(|dep| selected.contains(dep.as_str()))
                    .all(|dep| done.contains(dep.as_str()))
            });

            let Some(index) = ready else {
                return Err(Error::DependencyCycle {
                    streams: pending.iter().map(ToString::to_string).collect(),
                });
            };

            let name = pending.remove(index);
            done.insert(name);
            ordered.push(name.to_string());
        }

        Ok(ordered)
    }
}
