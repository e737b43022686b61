//! Relationship store: typed, immutable edges within one tree.

use family_graph_types::{CreateRelationshipRequest, Person, Relationship, TreeRole};
use rusqlite::Connection;

use super::access::ensure_access;
use super::cycle_guard::CycleGuard;
use super::{parse_id, GraphService};
use crate::db::tables::persons;
use crate::db::tables::relationships::{self, NewRelationship};
use crate::error::{GraphError, GraphResult};

/// Validate and insert one edge inside `tree_id`.
pub(crate) fn create_edge_in(
    conn: &Connection,
    guard: &CycleGuard,
    edge: &NewRelationship,
) -> GraphResult<Relationship> {
    if edge.person1_id == edge.person2_id {
        return Err(GraphError::Validation(
            "a person cannot be related to themselves".to_string(),
        ));
    }
    for id in [edge.person1_id, edge.person2_id] {
        let person = persons::get_person(conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))?;
        if person.tree_id != edge.tree_id {
            return Err(GraphError::Validation(format!(
                "person {} belongs to tree '{}', not '{}'",
                id, person.tree_id, edge.tree_id
            )));
        }
    }
    guard.check(conn, edge.person1_id, edge.person2_id, edge.relationship_type)?;
    Ok(relationships::insert_relationship(conn, edge)?)
}

fn load_persons(conn: &Connection, ids: Vec<i64>) -> GraphResult<Vec<Person>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(p) = persons::get_person(conn, id)? {
            out.push(p);
        }
    }
    Ok(out)
}

impl GraphService {
    pub(crate) fn cycle_guard(&self) -> CycleGuard {
        CycleGuard::new(self.settings.cycle_policy, self.settings.max_depth)
    }

    pub fn create_edge(
        &self,
        caller: &str,
        tree_id: &str,
        req: &CreateRelationshipRequest,
    ) -> GraphResult<Relationship> {
        let person1_id = parse_id(&req.person1_id, "person")?;
        let person2_id = parse_id(&req.person2_id, "person")?;

        let conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Member)?;
        let edge = create_edge_in(
            &conn,
            &self.cycle_guard(),
            &NewRelationship {
                tree_id: tree_id.to_string(),
                person1_id,
                person2_id,
                relationship_type: req.relationship_type,
                is_biological: req.is_biological,
                created_by: caller.to_string(),
            },
        )?;
        log::info!(
            "[GRAPH] {} is {} of {} in tree {}",
            person1_id,
            req.relationship_type.as_str(),
            person2_id,
            tree_id
        );
        Ok(edge)
    }

    /// Every edge touching the person, in either position
    pub fn find_by_person(&self, caller: &str, person_id: &str) -> GraphResult<Vec<Relationship>> {
        let id = parse_id(person_id, "person")?;
        let conn = self.db.conn();
        self.readable_person(&conn, caller, id)?;
        Ok(relationships::find_by_person(&conn, id)?)
    }

    /// Logical parents, whether stored as `(X, Y, parent)` or `(Y, X, child)`
    pub fn find_parents(&self, caller: &str, person_id: &str) -> GraphResult<Vec<Person>> {
        let id = parse_id(person_id, "person")?;
        let conn = self.db.conn();
        self.readable_person(&conn, caller, id)?;
        load_persons(&conn, relationships::parent_ids(&conn, id)?)
    }

    pub fn find_children(&self, caller: &str, person_id: &str) -> GraphResult<Vec<Person>> {
        let id = parse_id(person_id, "person")?;
        let conn = self.db.conn();
        self.readable_person(&conn, caller, id)?;
        load_persons(&conn, relationships::child_ids(&conn, id)?)
    }

    /// Edges are never edited in place; a correction is delete + recreate.
    pub fn delete_edge(&self, caller: &str, relationship_id: &str) -> GraphResult<()> {
        let id = parse_id(relationship_id, "relationship")?;
        let conn = self.db.conn();
        let edge = relationships::get_relationship(&conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("relationship {}", id)))?;
        ensure_access(&conn, &edge.tree_id, caller, TreeRole::Member)?;
        relationships::delete_relationship(&conn, id)?;
        log::info!("[GRAPH] Deleted relationship {} from tree {}", id, edge.tree_id);
        Ok(())
    }

    pub(crate) fn readable_person(&self, conn: &Connection, caller: &str, id: i64) -> GraphResult<Person> {
        let person = persons::get_person(conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))?;
        ensure_access(conn, &person.tree_id, caller, TreeRole::Viewer)?;
        Ok(person)
    }
}
