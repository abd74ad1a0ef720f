//! Dependency adjacency over integer vertex ids

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Vertex identifier, assigned monotonically when a graph is built
pub type VertexId = usize;

/// Dependency relation: each vertex maps to the set of vertices it depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacency {
    deps: BTreeMap<VertexId, BTreeSet<VertexId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl Adjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex with no dependencies (no-op if already present)
    pub fn add_vertex(&mut self, id: VertexId) {
        self.deps.entry(id).or_default();
    }

    /// Record that `dependent` depends on `dependency`
    pub fn add_edge(&mut self, dependency: VertexId, dependent: VertexId) {
        self.add_vertex(dependency);
        self.deps.entry(dependent).or_default().insert(dependency);
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.deps.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// All vertex ids in ascending order
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.deps.keys().copied()
    }

    /// Direct dependencies of a vertex
    pub fn dependencies(&self, id: VertexId) -> Vec<VertexId> {
        self.deps
            .get(&id)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Vertices that directly depend on `id`
    pub fn dependents(&self, id: VertexId) -> Vec<VertexId> {
        self.deps
            .iter()
            .filter(|(_, deps)| deps.contains(&id))
            .map(|(v, _)| *v)
            .collect()
    }

    /// All edges as `(dependency, dependent)` pairs
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        self.deps
            .iter()
            .flat_map(|(to, deps)| deps.iter().map(move |from| (*from, *to)))
            .collect()
    }

    /// Remove a vertex, connecting each of its dependencies to each of its
    /// dependents so the ordering it carried is preserved
    pub fn eliminate(&mut self, id: VertexId) {
        let inherited = self.deps.remove(&id).unwrap_or_default();

        for deps in self.deps.values_mut() {
            if deps.remove(&id) {
                deps.extend(inherited.iter().copied());
            }
        }
    }

    /// Return one dependency cycle as a list of ids (first id repeated at the end)
    pub fn find_cycle(&self) -> Option<Vec<VertexId>> {
        self.topological_order().err()
    }

    /// Dependencies-first ordering of every vertex, or the offending cycle
    pub fn topological_order(&self) -> Result<Vec<VertexId>, Vec<VertexId>> {
        let mut marks: BTreeMap<VertexId, Mark> =
            self.deps.keys().map(|id| (*id, Mark::Unvisited)).collect();
        let mut order = Vec::with_capacity(self.deps.len());
        let mut path = Vec::new();

        for id in self.deps.keys() {
            path.clear();
            self.visit(*id, &mut marks, &mut order, &mut path)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: VertexId,
        marks: &mut BTreeMap<VertexId, Mark>,
        order: &mut Vec<VertexId>,
        path: &mut Vec<VertexId>,
    ) -> Result<(), Vec<VertexId>> {
        match marks.get(&id).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|v| *v == id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(id);
                return Err(cycle);
            }
            Mark::Unvisited => {}
        }

        marks.insert(id, Mark::Visiting);
        path.push(id);

        if let Some(deps) = self.deps.get(&id) {
            for dep in deps {
                self.visit(*dep, marks, order, path)?;
            }
        }

        path.pop();
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }
}
