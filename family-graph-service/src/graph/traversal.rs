//! Depth-bounded ancestor/descendant views that cross tree boundaries.
//!
//! Each node in the walk is an *individual*: a person record plus, for a
//! confirmed link to another account, that account's self node in its own
//! tree when the caller may read it. Records for the same account are merged
//! under one key, so a grandparent that lives in a third tree surfaces once.
//! The walk only reads.

use family_graph_types::{
    LinkStatus, Person, RelationshipType, StubReason, TreeEdge, TreeNode, TreeRole, TreeView,
};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

use super::access::{effective_role, ensure_access};
use super::{parse_id, GraphService};
use crate::db::tables::{persons, relationships};
use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Account(String),
    Person(i64),
}

fn key_of(person: &Person) -> NodeKey {
    match (&person.linked_user_id, person.link_status) {
        (Some(uid), LinkStatus::Confirmed) => NodeKey::Account(uid.clone()),
        _ => NodeKey::Person(person.id),
    }
}

#[derive(Debug)]
struct Individual {
    node: TreeNode,
    /// Person rows (across trees) that stand for this individual
    records: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

struct Walk<'a> {
    conn: &'a Connection,
    caller: &'a str,
    seen: HashMap<NodeKey, Individual>,
    edges: Vec<TreeEdge>,
    edge_keys: HashSet<(i64, i64, RelationshipType)>,
}

impl<'a> Walk<'a> {
    fn new(conn: &'a Connection, caller: &'a str) -> Self {
        Self {
            conn,
            caller,
            seen: HashMap::new(),
            edges: Vec::new(),
            edge_keys: HashSet::new(),
        }
    }

    /// Build the individual for a person row, entering its account's tree if allowed.
    fn resolve(&self, person: Person, generation: i32) -> GraphResult<Individual> {
        let mut records = vec![person.id];
        let mut resolved_trees = vec![person.tree_id.clone()];
        let mut stub = None;

        if let Some(account) = person.confirmed_foreign_link() {
            match effective_role(self.conn, account, self.caller)? {
                Some(role) if role >= TreeRole::Viewer => {
                    match persons::find_by_linked_user(self.conn, account, account)? {
                        Some(home) => {
                            records.push(home.id);
                            resolved_trees.push(account.to_string());
                        }
                        None => stub = Some(StubReason::Unresolved),
                    }
                }
                _ => stub = Some(StubReason::Inaccessible),
            }
        }

        Ok(Individual {
            node: TreeNode {
                person,
                generation,
                resolved_trees,
                display_name: None,
                stub,
            },
            records,
        })
    }

    fn canonical_id(&self, key: &NodeKey) -> Option<i64> {
        self.seen.get(key).map(|i| i.node.person.id)
    }

    fn add_edge(&mut self, from: i64, to: i64, relationship_type: RelationshipType) {
        if self.edge_keys.insert((from, to, relationship_type)) {
            self.edges.push(TreeEdge {
                from_person_id: from,
                to_person_id: to,
                relationship_type,
            });
        }
    }

    /// Breadth-first walk from `root` in one direction, one generation per level.
    /// Returns the keys discovered, in visit order.
    fn expand(&mut self, root: &NodeKey, direction: Direction, depth: u32) -> GraphResult<Vec<NodeKey>> {
        let mut discovered = Vec::new();
        let mut frontier = vec![root.clone()];

        for level in 1..=depth {
            let mut next = Vec::new();
            for key in &frontier {
                let (from_id, records) = match self.seen.get(key) {
                    Some(ind) => (ind.node.person.id, ind.records.clone()),
                    None => continue,
                };
                for record in records {
                    let neighbours = match direction {
                        Direction::Up => relationships::parent_ids(self.conn, record)?,
                        Direction::Down => relationships::child_ids(self.conn, record)?,
                    };
                    for id in neighbours {
                        let person = match persons::get_person(self.conn, id)? {
                            Some(p) => p,
                            None => continue,
                        };
                        let neighbour_key = key_of(&person);
                        if !self.seen.contains_key(&neighbour_key) {
                            let generation = match direction {
                                Direction::Up => -(level as i32),
                                Direction::Down => level as i32,
                            };
                            let ind = self.resolve(person, generation)?;
                            self.seen.insert(neighbour_key.clone(), ind);
                            discovered.push(neighbour_key.clone());
                            next.push(neighbour_key.clone());
                        }
                        if let Some(neighbour_id) = self.canonical_id(&neighbour_key) {
                            match direction {
                                Direction::Up => {
                                    self.add_edge(neighbour_id, from_id, RelationshipType::Parent)
                                }
                                Direction::Down => {
                                    self.add_edge(from_id, neighbour_id, RelationshipType::Parent)
                                }
                            }
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(discovered)
    }

    fn spouses(&mut self, root: &NodeKey) -> GraphResult<Vec<NodeKey>> {
        let (root_id, records) = match self.seen.get(root) {
            Some(ind) => (ind.node.person.id, ind.records.clone()),
            None => return Ok(Vec::new()),
        };
        let mut found = Vec::new();
        for record in records {
            for id in relationships::spouse_ids(self.conn, record)? {
                let person = match persons::get_person(self.conn, id)? {
                    Some(p) => p,
                    None => continue,
                };
                let key = key_of(&person);
                if !self.seen.contains_key(&key) {
                    let ind = self.resolve(person, 0)?;
                    self.seen.insert(key.clone(), ind);
                    found.push(key.clone());
                }
                if let Some(spouse_id) = self.canonical_id(&key) {
                    if spouse_id != root_id {
                        self.add_edge(spouse_id, root_id, RelationshipType::Spouse);
                    }
                }
            }
        }
        Ok(found)
    }

    fn take(&mut self, keys: Vec<NodeKey>) -> Vec<TreeNode> {
        keys.iter()
            .filter_map(|k| self.seen.remove(k))
            .map(|ind| ind.node)
            .collect()
    }
}

impl GraphService {
    /// Assemble the view around `root` (default: the tree owner's self node).
    pub fn build_tree(
        &self,
        caller: &str,
        tree_id: &str,
        root: Option<&str>,
        max_depth: Option<u32>,
    ) -> GraphResult<TreeView> {
        let depth = max_depth
            .unwrap_or(self.settings.default_depth)
            .min(self.settings.max_depth);
        let root_id = root.map(|r| parse_id(r, "person")).transpose()?;

        let mut view = {
            let conn = self.db.conn();
            ensure_access(&conn, tree_id, caller, TreeRole::Viewer)?;

            let root_person = match root_id {
                Some(id) => {
                    let person = persons::get_person(&conn, id)?
                        .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))?;
                    if person.tree_id != tree_id {
                        return Err(GraphError::Validation(format!(
                            "person {} does not belong to tree '{}'",
                            id, tree_id
                        )));
                    }
                    person
                }
                None => persons::find_by_linked_user(&conn, tree_id, tree_id)?.ok_or_else(|| {
                    GraphError::NotFound(format!("tree '{}' has no self node", tree_id))
                })?,
            };

            let mut walk = Walk::new(&conn, caller);
            let root_key = key_of(&root_person);
            let root_ind = walk.resolve(root_person, 0)?;
            walk.seen.insert(root_key.clone(), root_ind);

            let ancestors = walk.expand(&root_key, Direction::Up, depth)?;
            let descendants = walk.expand(&root_key, Direction::Down, depth)?;
            let spouses = walk.spouses(&root_key)?;

            let ancestors = walk.take(ancestors);
            let descendants = walk.take(descendants);
            let spouses = walk.take(spouses);
            let root = walk
                .seen
                .remove(&root_key)
                .map(|ind| ind.node)
                .ok_or_else(|| GraphError::Internal("root dropped from walk".to_string()))?;

            TreeView {
                tree_id: tree_id.to_string(),
                max_depth: depth,
                root,
                ancestors,
                descendants,
                spouses,
                edges: walk.edges,
            }
        };

        // Directory names are looked up after the store lock is released
        let mut names: HashMap<String, Option<String>> = HashMap::new();
        let nodes = std::iter::once(&mut view.root)
            .chain(view.ancestors.iter_mut())
            .chain(view.descendants.iter_mut())
            .chain(view.spouses.iter_mut());
        for node in nodes {
            let account = match &node.person.linked_user_id {
                Some(uid) if node.person.link_status == LinkStatus::Confirmed => {
                    uid.clone()
                }
                _ => continue,
            };
            let name = names
                .entry(account.clone())
                .or_insert_with(|| match self.directory.profile(&account) {
                    Ok(profile) => profile.map(|p| p.display_name),
                    Err(e) => {
                        log::warn!("[TRAVERSAL] Directory lookup for {} failed: {}", account, e);
                        None
                    }
                })
                .clone();
            node.display_name = name;
        }

        log::debug!(
            "[TRAVERSAL] {} viewed tree {} (depth {}): {} ancestor(s), {} descendant(s)",
            caller,
            tree_id,
            depth,
            view.ancestors.len(),
            view.descendants.len()
        );
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add, add_with, service};
    use family_graph_types::RelationshipSpec;

    fn parent_of(id: i64) -> Vec<RelationshipSpec> {
        vec![RelationshipSpec {
            person_id: id.to_string(),
            relationship_type: RelationshipType::Parent,
            is_biological: true,
        }]
    }

    fn spec(person_id: &str, relationship_type: RelationshipType) -> Vec<RelationshipSpec> {
        vec![RelationshipSpec {
            person_id: person_id.to_string(),
            relationship_type,
            is_biological: true,
        }]
    }

    /// self ← parent ← grandparent ← great-grandparent, plus one child
    fn four_generations(svc: &GraphService) -> Vec<i64> {
        let p = add_with(svc, "alice", "Paul", "Smith", spec("self", RelationshipType::Parent), None)
            .person
            .id;
        let g = add_with(svc, "alice", "Gina", "Smith", parent_of(p), None).person.id;
        let gg = add_with(svc, "alice", "Gus", "Smith", parent_of(g), None).person.id;
        let kid = add_with(svc, "alice", "Kim", "Smith", spec("self", RelationshipType::Child), None)
            .person
            .id;
        vec![p, g, gg, kid]
    }

    #[test]
    fn test_depth_bound_is_respected() {
        let (svc, _) = service();
        let ids = four_generations(&svc);

        let view = svc.build_tree("alice", "alice", None, Some(2)).unwrap();
        assert!(view.root.person.is_self_node());
        let gens: Vec<(i64, i32)> = view.ancestors.iter().map(|n| (n.person.id, n.generation)).collect();
        assert_eq!(gens, vec![(ids[0], -1), (ids[1], -2)]);
        assert!(view.ancestors.iter().all(|n| n.generation.abs() <= 2));
        assert_eq!(view.descendants.len(), 1);
        assert_eq!(view.descendants[0].generation, 1);

        let deep = svc.build_tree("alice", "alice", None, Some(3)).unwrap();
        assert_eq!(deep.ancestors.len(), 3);
        assert_eq!(deep.edges.len(), 4);
    }

    #[test]
    fn test_depth_clamped_to_ceiling() {
        let (svc, _) = service();
        four_generations(&svc);
        let view = svc.build_tree("alice", "alice", None, Some(500)).unwrap();
        assert_eq!(view.max_depth, svc.settings().max_depth);
        let default = svc.build_tree("alice", "alice", None, None).unwrap();
        assert_eq!(default.max_depth, 3);
    }

    #[test]
    fn test_explicit_root_and_spouses() {
        let (svc, _) = service();
        let paul = add(&svc, "alice", "Paul", "Smith");
        add_with(&svc, "alice", "Rita", "Smith", spec(&paul.id.to_string(), RelationshipType::Spouse), None);
        add_with(&svc, "alice", "Kim", "Smith", spec(&paul.id.to_string(), RelationshipType::Child), None);

        let view = svc
            .build_tree("alice", "alice", Some(&paul.id.to_string()), None)
            .unwrap();
        assert_eq!(view.root.person.id, paul.id);
        assert_eq!(view.spouses.len(), 1);
        assert_eq!(view.spouses[0].generation, 0);
        assert_eq!(view.descendants.len(), 1);
        assert!(view
            .edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::Spouse));
    }

    #[test]
    fn test_root_validation_and_access() {
        let (svc, _) = service();
        let other = add(&svc, "bob", "Ben", "Jones");
        assert!(matches!(
            svc.build_tree("alice", "alice", None, None),
            Err(GraphError::NotFound(_))
        ));
        assert!(matches!(
            svc.build_tree("alice", "alice", Some(&other.id.to_string()), None),
            Err(GraphError::Validation(_))
        ));
        assert!(matches!(
            svc.build_tree("alice", "bob", Some(&other.id.to_string()), None),
            Err(GraphError::Permission(_))
        ));
    }

    #[test]
    fn test_inaccessible_and_unresolved_links_become_stubs() {
        let (svc, _) = service();
        let bob_node = add_with(
            &svc,
            "alice",
            "Bob",
            "King",
            spec("self", RelationshipType::Parent),
            Some("bob"),
        )
        .person
        .id;
        svc.approve_link("bob", &bob_node.to_string()).unwrap();

        let view = svc.build_tree("alice", "alice", None, None).unwrap();
        assert_eq!(view.ancestors[0].stub, None);

        svc.revoke_membership("bob", "bob", "alice").unwrap();
        let view = svc.build_tree("alice", "alice", None, None).unwrap();
        assert_eq!(view.ancestors[0].stub, Some(StubReason::Inaccessible));
        assert_eq!(view.ancestors[0].resolved_trees, vec!["alice".to_string()]);

        svc.grant_membership("bob", "bob", "alice", TreeRole::Viewer).unwrap();
        let bob_self = svc
            .list_persons("bob", "bob")
            .unwrap()
            .into_iter()
            .find(|p| p.is_self_node())
            .unwrap();
        svc.delete_person("bob", &bob_self.id.to_string()).unwrap();
        let view = svc.build_tree("alice", "alice", None, None).unwrap();
        assert_eq!(view.ancestors[0].stub, Some(StubReason::Unresolved));
    }

    #[test]
    fn test_same_account_merged_once() {
        let (svc, _) = service();
        let bob_node = add_with(
            &svc,
            "alice",
            "Bob",
            "King",
            spec("self", RelationshipType::Parent),
            Some("bob"),
        )
        .person
        .id;
        svc.approve_link("bob", &bob_node.to_string()).unwrap();

        // From Bob's tree, Alice appears once even though she has a node in both trees
        let view = svc.build_tree("bob", "bob", None, None).unwrap();
        let alices: Vec<&TreeNode> = view
            .descendants
            .iter()
            .filter(|n| n.person.linked_user_id.as_deref() == Some("alice"))
            .collect();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].resolved_trees.len(), 2);
        assert!(view.ancestors.is_empty());
    }
}
