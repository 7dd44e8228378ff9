use std::{
    any::TypeId,
    collections::{BTreeMap, HashMap},
};

use thiserror::Error;

use crate::{
    container::DiContainer,
    types::{DependencyInfo, TypeInfo},
};

/// Static graph of everything registered in a container
///
/// Built from declared dependencies only, so factories (which resolve whatever they like) show
/// up as leaves. Used to check for cycles and missing registrations before anything is
/// resolved, and enables visualization of the app.
pub struct DependencyGraph {
    map: BTreeMap<TypeId, DependencyGraphEntry>,
}
impl DependencyGraph {
    pub fn new(container: &DiContainer) -> Self {
        let mut graph = Self {
            map: Default::default(),
        };

        for descriptor in container.all_descriptors() {
            graph.add(descriptor.service(), descriptor.dependencies());
        }

        graph
    }

    /// Adds a node, merging dependencies of services registered more than once
    pub fn add(&mut self, info: TypeInfo, dependencies: Vec<DependencyInfo>) {
        let entry = self
            .map
            .entry(info.type_id)
            .or_insert_with(|| DependencyGraphEntry {
                info,
                dependencies: Vec::new(),
            });

        for dependency in dependencies {
            if !entry.dependencies.contains(&dependency) {
                entry.dependencies.push(dependency);
            }
        }
    }

    pub fn services(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.map.values().map(|entry| entry.info)
    }

    pub fn dependencies_of(&self, service: TypeInfo) -> &[DependencyInfo] {
        self.map
            .get(&service.type_id)
            .map(|entry| entry.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Checks for cycles and missing registrations without constructing anything
    ///
    /// All problems are collected, not just the first one.
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut walk = Walk {
            graph: self,
            state: HashMap::new(),
            path: Vec::new(),
            errors: Vec::new(),
        };
        for entry in self.map.values() {
            walk.visit(entry);
        }

        match walk.errors.is_empty() {
            true => Ok(()),
            false => Err(DependencyGraphErrors {
                errors: walk.errors,
            }),
        }
    }
}

struct DependencyGraphEntry {
    info: TypeInfo,
    dependencies: Vec<DependencyInfo>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnPath,
    Done,
}

/// Depth-first walk, `path` holds the services currently being built
struct Walk<'a> {
    graph: &'a DependencyGraph,
    state: HashMap<TypeId, Visit>,
    path: Vec<TypeInfo>,
    errors: Vec<DependencyGraphError>,
}
impl<'a> Walk<'a> {
    fn visit(&mut self, entry: &'a DependencyGraphEntry) {
        match self.state.get(&entry.info.type_id) {
            Some(Visit::Done) => return,
            Some(Visit::OnPath) => {
                self.report_cycle(entry.info);
                return;
            }
            None => {}
        }

        let graph = self.graph;
        self.state.insert(entry.info.type_id, Visit::OnPath);
        self.path.push(entry.info);

        for dependency in &entry.dependencies {
            match graph.map.get(&dependency.type_info.type_id) {
                None if dependency.optional => {}
                None => self.errors.push(DependencyGraphError::MissingDependency {
                    dependency: dependency.type_info,
                    required_by: entry.info,
                }),
                // Resolved after construction
                Some(_) if dependency.lazy => {}
                Some(next) => self.visit(next),
            }
        }

        self.path.pop();
        self.state.insert(entry.info.type_id, Visit::Done);
    }

    fn report_cycle(&mut self, repeated: TypeInfo) {
        let Some(start) = self.path.iter().position(|info| *info == repeated) else {
            return;
        };
        let Some(&to) = self.path.last() else {
            return;
        };

        let mut chain = self.path[start..].to_vec();
        chain.push(repeated);
        self.errors.push(DependencyGraphError::CircularDependency {
            from: repeated,
            to,
            chain,
        });
    }
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("'{required_by}' needs '{dependency}' but it is missing")]
    MissingDependency {
        dependency: TypeInfo,
        required_by: TypeInfo,
    },
    #[error("A Circular Dependency exists between '{from}' and '{to}' through {chain:?} - Consider using `Lazy`")]
    CircularDependency {
        from: TypeInfo,
        to: TypeInfo,
        chain: Vec<TypeInfo>,
    },
}

/// Every problem found by [DependencyGraph::check]
#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}
impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "The dependency graph had one or more errors:")?;
        for error in &self.errors {
            write!(f, "\n- {error}")?;
        }
        Ok(())
    }
}
