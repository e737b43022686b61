//! Validation run before an edge is persisted.
//!
//! The baseline check is direct-pair only: it rejects an exact duplicate, the
//! same fact stored in inverse orientation, and a parent/child edge whose
//! direct inverse already exists between the same two persons. Longer cycles
//! (A→B→C→A) are only caught under [`CyclePolicy::Ancestry`].

use family_graph_types::RelationshipType;
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};

use crate::config::CyclePolicy;
use crate::db::tables::relationships;
use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone, Copy)]
pub struct CycleGuard {
    pub policy: CyclePolicy,
    /// Upper bound on how many generations the ancestry walk inspects
    pub max_walk: u32,
}

impl CycleGuard {
    pub fn new(policy: CyclePolicy, max_walk: u32) -> Self {
        Self { policy, max_walk }
    }

    pub fn check(
        &self,
        conn: &Connection,
        person1_id: i64,
        person2_id: i64,
        relationship_type: RelationshipType,
    ) -> GraphResult<()> {
        if is_recorded(conn, person1_id, person2_id, relationship_type)? {
            return Err(GraphError::Conflict(format!(
                "relationship {} between {} and {} already exists",
                relationship_type.as_str(),
                person1_id,
                person2_id
            )));
        }

        if !relationship_type.is_directed() {
            return Ok(());
        }

        // (p1, p2, T) contradicts (p2, p1, T) and its equivalent (p1, p2, inverse(T)).
        let reversed = relationships::find_edge(conn, person2_id, person1_id, relationship_type)?;
        let inverted =
            relationships::find_edge(conn, person1_id, person2_id, relationship_type.inverse())?;
        if let Some(existing) = reversed.or(inverted) {
            return Err(GraphError::Conflict(format!(
                "edge would form a cycle with relationship {} ({} is {} of {})",
                existing.id,
                existing.person1_id,
                existing.relationship_type.as_str(),
                existing.person2_id
            )));
        }

        if self.policy == CyclePolicy::Ancestry {
            if let Some((parent, child)) = parent_child(person1_id, person2_id, relationship_type) {
                if self.is_ancestor(conn, child, parent)? {
                    return Err(GraphError::Conflict(format!(
                        "{} is already an ancestor of {}",
                        child, parent
                    )));
                }
            }
        }

        Ok(())
    }

    /// Bounded breadth-first walk up from `of`, looking for `candidate`.
    fn is_ancestor(&self, conn: &Connection, candidate: i64, of: i64) -> GraphResult<bool> {
        let mut seen = HashSet::from([of]);
        let mut frontier = VecDeque::from([(of, 0u32)]);
        while let Some((person, depth)) = frontier.pop_front() {
            if depth >= self.max_walk {
                continue;
            }
            for parent in relationships::parent_ids(conn, person)? {
                if parent == candidate {
                    return Ok(true);
                }
                if seen.insert(parent) {
                    frontier.push_back((parent, depth + 1));
                }
            }
        }
        Ok(false)
    }
}

/// True if the fact is already stored in either orientation.
pub fn is_recorded(
    conn: &Connection,
    person1_id: i64,
    person2_id: i64,
    relationship_type: RelationshipType,
) -> GraphResult<bool> {
    Ok(
        relationships::find_edge(conn, person1_id, person2_id, relationship_type)?.is_some()
            || relationships::find_edge(conn, person2_id, person1_id, relationship_type.inverse())?
                .is_some(),
    )
}

/// (parent, child) for biological parent/child edges
fn parent_child(p1: i64, p2: i64, relationship_type: RelationshipType) -> Option<(i64, i64)> {
    match relationship_type {
        RelationshipType::Parent => Some((p1, p2)),
        RelationshipType::Child => Some((p2, p1)),
        _ => None,
    }
}
