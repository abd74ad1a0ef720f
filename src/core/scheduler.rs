//! Vertex scheduler - DAG-based dependency tracking with failure propagation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::adjacency::{Adjacency, VertexId};
use super::Result;
use crate::error::DeployError;

/// Lifecycle of a vertex during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VertexStatus {
    Pending,
    /// Every dependency completed
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for VertexStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl VertexStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for VertexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Vertex scheduler with dependency resolution
pub struct Scheduler {
    adjacency: Adjacency,
    status: BTreeMap<VertexId, VertexStatus>,
}

impl Scheduler {
    /// Create a new scheduler over a dependency relation
    pub fn new(adjacency: Adjacency) -> Self {
        let status = adjacency
            .vertices()
            .map(|id| (id, VertexStatus::Pending))
            .collect();
        Self { adjacency, status }
    }

    pub fn status(&self, id: VertexId) -> Option<VertexStatus> {
        self.status.get(&id).copied()
    }

    /// Check if a vertex can start (all dependencies completed)
    pub fn can_start(&self, id: VertexId) -> bool {
        self.adjacency
            .dependencies(id)
            .iter()
            .all(|dep| self.status(*dep) == Some(VertexStatus::Completed))
    }

    /// Promote pending vertices whose dependencies have all completed and
    /// return every ready vertex
    pub fn schedule_next(&mut self) -> Vec<VertexId> {
        let promoted: Vec<VertexId> = self
            .status
            .iter()
            .filter(|(id, status)| **status == VertexStatus::Pending && self.can_start(**id))
            .map(|(id, _)| *id)
            .collect();
        for id in promoted {
            self.status.insert(id, VertexStatus::Ready);
        }

        self.status
            .iter()
            .filter(|(_, status)| **status == VertexStatus::Ready)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Mark vertex as started
    pub fn mark_started(&mut self, id: VertexId) -> Result<()> {
        self.transition(id, VertexStatus::Ready, VertexStatus::Running)
    }

    /// Mark vertex as completed
    pub fn mark_done(&mut self, id: VertexId) -> Result<()> {
        self.transition(id, VertexStatus::Running, VertexStatus::Completed)
    }

    /// Mark vertex as failed and skip everything downstream of it.
    /// Returns the vertices newly skipped.
    pub fn mark_failed(&mut self, id: VertexId) -> Result<Vec<VertexId>> {
        self.transition(id, VertexStatus::Running, VertexStatus::Failed)?;

        let mut skipped = Vec::new();
        let mut frontier = self.adjacency.dependents(id);
        while let Some(next) = frontier.pop() {
            if matches!(
                self.status(next),
                Some(VertexStatus::Pending | VertexStatus::Ready)
            ) {
                self.status.insert(next, VertexStatus::Skipped);
                skipped.push(next);
                frontier.extend(self.adjacency.dependents(next));
            }
        }
        skipped.sort_unstable();
        Ok(skipped)
    }

    fn transition(&mut self, id: VertexId, from: VertexStatus, to: VertexStatus) -> Result<()> {
        match self.status.get_mut(&id) {
            Some(status) if *status == from => {
                *status = to;
                Ok(())
            }
            Some(status) => Err(DeployError::GraphInvariant(format!(
                "vertex {} cannot move from {} to {}",
                id, status, to
            ))),
            None => Err(DeployError::GraphInvariant(format!(
                "vertex {} is not scheduled",
                id
            ))),
        }
    }

    /// Check if every vertex has reached a terminal state
    pub fn all_done(&self) -> bool {
        self.status.values().all(VertexStatus::is_terminal)
    }

    /// Vertices that never started (only non-empty if something went wrong)
    pub fn pending(&self) -> Vec<VertexId> {
        self.status
            .iter()
            .filter(|(_, s)| matches!(s, VertexStatus::Pending | VertexStatus::Ready))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0 -> 1 -> 2, 0 -> 3, 4 independent
    fn diamond() -> Scheduler {
        let mut adj = Adjacency::new();
        adj.add_edge(0, 1);
        adj.add_edge(1, 2);
        adj.add_edge(0, 3);
        adj.add_vertex(4);
        Scheduler::new(adj)
    }

    #[test]
    fn test_only_roots_ready_initially() {
        let mut s = diamond();
        assert_eq!(s.schedule_next(), vec![0, 4]);
        assert_eq!(s.status(0), Some(VertexStatus::Ready));
        assert_eq!(s.status(1), Some(VertexStatus::Pending));
    }

    #[test]
    fn test_completion_unlocks_dependents() {
        let mut s = diamond();
        s.schedule_next();
        s.mark_started(0).unwrap();
        assert_eq!(s.schedule_next(), vec![4]);
        s.mark_done(0).unwrap();
        assert_eq!(s.schedule_next(), vec![1, 3, 4]);
    }

    #[test]
    fn test_failure_skips_transitively() {
        let mut s = diamond();
        s.schedule_next();
        s.mark_started(0).unwrap();
        s.mark_started(4).unwrap();

        let skipped = s.mark_failed(0).unwrap();
        assert_eq!(skipped, vec![1, 2, 3]);
        assert_eq!(s.status(2), Some(VertexStatus::Skipped));
        assert!(!s.all_done());

        s.mark_done(4).unwrap();
        assert!(s.all_done());
        assert!(s.schedule_next().is_empty());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut s = diamond();
        // pending vertices must become ready first
        assert!(s.mark_started(1).is_err());
        s.schedule_next();
        assert!(s.mark_done(0).is_err());
        assert!(s.mark_started(99).is_err());
    }
}
