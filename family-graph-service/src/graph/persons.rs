//! Person store: node creation (with relatives and optional account link),
//! reads, edits, cascading delete, and ranked name search.

use family_graph_types::{
    AddPersonRequest, AddPersonResponse, Gender, LinkStatus, Person, PersonSource, TreeRole,
    UpdatePersonRequest,
};
use rusqlite::Connection;

use super::access::ensure_access;
use super::relationships::create_edge_in;
use super::{parse_id, split_display_name, validate_account_id, GraphService};
use crate::db::tables::pending_links::{self, NewPendingLink};
use crate::db::tables::persons::{self, NewPerson};
use crate::db::tables::memberships;
use crate::db::tables::relationships::{self, NewRelationship};
use crate::error::{GraphError, GraphResult};
use crate::notify::NotificationEvent;

/// Relationship target naming the tree owner's own node
pub const SELF_PERSON: &str = "self";

const SEARCH_LIMIT: usize = 50;

fn require_name(value: &str, field: &str) -> GraphResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GraphError::Validation(format!("{} is required", field)));
    }
    if trimmed.len() > 200 {
        return Err(GraphError::Validation(format!("{} is too long", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_email(raw: &str) -> GraphResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(GraphError::Validation(format!("Malformed invite email '{}'", raw))),
    }
}

/// Find or create the node representing the owner of `tree_id`.
pub(crate) fn ensure_self_node(
    conn: &Connection,
    tree_id: &str,
    first_name: &str,
    last_name: &str,
) -> GraphResult<Person> {
    if let Some(existing) = persons::find_by_linked_user(conn, tree_id, tree_id)? {
        return Ok(existing);
    }
    let person = persons::insert_person(
        conn,
        &NewPerson {
            tree_id: tree_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            maiden_name: None,
            gender: Gender::Unknown,
            birth_date: None,
            death_date: None,
            is_alive: true,
            linked_user_id: Some(tree_id.to_string()),
            link_status: LinkStatus::Confirmed,
            source: PersonSource::PlatformUser,
            created_by: tree_id.to_string(),
        },
    )?;
    log::info!("[GRAPH] Created self node {} for tree {}", person.id, tree_id);
    Ok(person)
}

/// Position of a name match; lower sorts first.
fn match_rank(person: &Person, query: &str) -> Option<u8> {
    let full = person.full_name().to_lowercase();
    let mut tokens = vec![person.first_name.to_lowercase(), person.last_name.to_lowercase()];
    if let Some(maiden) = &person.maiden_name {
        tokens.push(maiden.to_lowercase());
    }

    if full == query {
        Some(0)
    } else if tokens.iter().any(|t| t == query) {
        Some(1)
    } else if full.starts_with(query) || tokens.iter().any(|t| t.starts_with(query)) {
        Some(2)
    } else if full.contains(query) || tokens.iter().any(|t| t.contains(query)) {
        Some(3)
    } else {
        None
    }
}

fn rank_results(mut found: Vec<Person>, query: &str) -> Vec<Person> {
    let query = query.trim().to_lowercase();
    let mut ranked: Vec<(u8, Person)> = found
        .drain(..)
        .filter_map(|p| match_rank(&p, &query).map(|r| (r, p)))
        .collect();
    ranked.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb)
            .then_with(|| a.last_name.to_lowercase().cmp(&b.last_name.to_lowercase()))
            .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.into_iter().map(|(_, p)| p).take(SEARCH_LIMIT).collect()
}

impl GraphService {
    /// Add a person to a tree, with its relationships and an optional account link.
    ///
    /// Person and edges are written in one local transaction. When the request
    /// names another account (by id or invite email) the node starts out
    /// `pending` and a link request is opened for that account to answer.
    pub fn add_person(
        &self,
        caller: &str,
        tree_id: &str,
        req: &AddPersonRequest,
    ) -> GraphResult<AddPersonResponse> {
        validate_account_id(tree_id, "tree id")?;
        let first_name = require_name(&req.first_name, "first_name")?;
        let last_name = require_name(&req.last_name, "last_name")?;

        let linked_user_id = match req.linked_user_id.as_deref() {
            Some(uid) => {
                validate_account_id(uid, "linked_user_id")?;
                Some(uid.to_string())
            }
            None => None,
        };
        let invite_email = req.invite_email.as_deref().map(validate_email).transpose()?;

        // Relationship targets: None means the self node
        let mut targets = Vec::with_capacity(req.relationships.len());
        for spec in &req.relationships {
            if spec.person_id.trim().eq_ignore_ascii_case(SELF_PERSON) {
                targets.push(None);
            } else {
                targets.push(Some(parse_id(&spec.person_id, "person")?));
            }
        }

        let owner_name = if targets.iter().any(Option::is_none) {
            Some(split_display_name(&self.display_name_of(tree_id)))
        } else {
            None
        };

        let is_owner_link = linked_user_id.as_deref() == Some(tree_id);
        let wants_link = !is_owner_link && (linked_user_id.is_some() || invite_email.is_some());
        let (link_status, source) = if is_owner_link {
            (LinkStatus::Confirmed, PersonSource::PlatformUser)
        } else if wants_link {
            (LinkStatus::Pending, PersonSource::Manual)
        } else {
            (LinkStatus::None, PersonSource::Manual)
        };

        let mut conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Member)?;

        if let Some(uid) = linked_user_id.as_deref() {
            if persons::find_by_linked_user(&conn, tree_id, uid)?.is_some() {
                return Err(GraphError::Conflict(format!(
                    "tree '{}' already has a person linked to {}",
                    tree_id, uid
                )));
            }
        }

        let tx = conn.transaction()?;
        let person = persons::insert_person(
            &tx,
            &NewPerson {
                tree_id: tree_id.to_string(),
                first_name,
                last_name,
                maiden_name: req.maiden_name.clone().filter(|s| !s.trim().is_empty()),
                gender: req.gender,
                birth_date: req.birth_date.clone(),
                death_date: req.death_date.clone(),
                is_alive: req.is_alive.unwrap_or(req.death_date.is_none()),
                linked_user_id: linked_user_id.clone(),
                link_status,
                source,
                created_by: caller.to_string(),
            },
        )?;

        let guard = self.cycle_guard();
        let mut created_edges = Vec::with_capacity(targets.len());
        for (spec, target) in req.relationships.iter().zip(targets) {
            let other = match target {
                Some(id) => id,
                None => {
                    let (first, last) = owner_name.clone().unwrap_or_default();
                    ensure_self_node(&tx, tree_id, &first, &last)?.id
                }
            };
            created_edges.push(create_edge_in(
                &tx,
                &guard,
                &NewRelationship {
                    tree_id: tree_id.to_string(),
                    person1_id: person.id,
                    person2_id: other,
                    relationship_type: spec.relationship_type,
                    is_biological: spec.is_biological,
                    created_by: caller.to_string(),
                },
            )?);
        }

        let pending_link = if wants_link {
            let expires_at = (chrono::Utc::now() + self.settings.link_ttl).to_rfc3339();
            Some(pending_links::insert_link(
                &tx,
                &NewPendingLink {
                    tree_id: tree_id.to_string(),
                    person_id: person.id,
                    target_user_id: linked_user_id.clone(),
                    target_email: invite_email.clone(),
                    created_by: caller.to_string(),
                    expires_at,
                },
            )?)
        } else {
            None
        };
        tx.commit()?;
        drop(conn);

        log::info!(
            "[GRAPH] {} added person {} to tree {} with {} relationship(s)",
            caller,
            person.id,
            tree_id,
            created_edges.len()
        );

        if let Some(link) = &pending_link {
            self.notifier.notify(NotificationEvent::InviteCreated {
                link_id: link.id,
                token: link.token.clone(),
                tree_id: tree_id.to_string(),
                person_id: person.id,
                requester: caller.to_string(),
                target_user_id: link.target_user_id.clone(),
                target_email: link.target_email.clone(),
            });
        }

        Ok(AddPersonResponse {
            person,
            relationships: created_edges,
            pending_link,
        })
    }

    pub fn get_person(&self, caller: &str, person_id: &str) -> GraphResult<Person> {
        let id = parse_id(person_id, "person")?;
        let conn = self.db.conn();
        let person = self.readable_person(&conn, caller, id)?;
        if person.link_status == LinkStatus::Pending
            && persons::confirm_approved_links(&conn, &person.tree_id)? > 0
        {
            log::warn!("[LINKS] Reconciled approved links in tree {}", person.tree_id);
            return self.readable_person(&conn, caller, id);
        }
        Ok(person)
    }

    pub fn list_persons(&self, caller: &str, tree_id: &str) -> GraphResult<Vec<Person>> {
        let conn = self.db.conn();
        ensure_access(&conn, tree_id, caller, TreeRole::Viewer)?;
        let reconciled = persons::confirm_approved_links(&conn, tree_id)?;
        if reconciled > 0 {
            log::warn!("[LINKS] Reconciled {} approved link(s) in tree {}", reconciled, tree_id);
        }
        Ok(persons::list_persons(&conn, tree_id)?)
    }

    pub fn update_person(
        &self,
        caller: &str,
        person_id: &str,
        patch: &UpdatePersonRequest,
    ) -> GraphResult<Person> {
        let id = parse_id(person_id, "person")?;
        let mut patch = patch.clone();
        if let Some(first) = &patch.first_name {
            patch.first_name = Some(require_name(first, "first_name")?);
        }
        if let Some(last) = &patch.last_name {
            patch.last_name = Some(require_name(last, "last_name")?);
        }

        let conn = self.db.conn();
        let person = persons::get_person(&conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))?;
        ensure_access(&conn, &person.tree_id, caller, TreeRole::Member)?;
        persons::update_person(&conn, id, &patch)?;
        persons::get_person(&conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))
    }

    /// Remove every edge touching the person, then the person itself.
    pub fn delete_person(&self, caller: &str, person_id: &str) -> GraphResult<usize> {
        let id = parse_id(person_id, "person")?;
        let mut conn = self.db.conn();
        let person = persons::get_person(&conn, id)?
            .ok_or_else(|| GraphError::NotFound(format!("person {}", id)))?;
        ensure_access(&conn, &person.tree_id, caller, TreeRole::Member)?;

        let tx = conn.transaction()?;
        let removed_edges = relationships::delete_edges_of_person(&tx, id)?;
        persons::delete_person(&tx, id)?;
        tx.commit()?;

        log::info!(
            "[GRAPH] Deleted person {} from tree {} ({} edge(s))",
            id,
            person.tree_id,
            removed_edges
        );
        Ok(removed_edges)
    }

    /// Case-insensitive name search, exact full-name matches first.
    ///
    /// Without a tree, searches the caller's own tree and every tree they
    /// hold a membership on.
    pub fn search_persons(
        &self,
        caller: &str,
        tree_id: Option<&str>,
        query: &str,
    ) -> GraphResult<Vec<Person>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Err(GraphError::Validation("search query is required".to_string()));
        }

        let conn = self.db.conn();
        let trees = match tree_id {
            Some(tree) => {
                ensure_access(&conn, tree, caller, TreeRole::Viewer)?;
                vec![tree.to_string()]
            }
            None => {
                let mut trees = vec![caller.to_string()];
                trees.extend(memberships::trees_for_user(&conn, caller)?);
                trees
            }
        };

        let mut found = Vec::new();
        for tree in &trees {
            found.extend(persons::search_in_tree(&conn, tree, needle)?);
        }
        Ok(rank_results(found, needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add, add_with, service};
    use family_graph_types::{RelationshipSpec, RelationshipType};

    #[test]
    fn test_search_orders_exact_token_first() {
        let (svc, _) = service();
        add(&svc, "alice", "Johnny", "Walker");
        add(&svc, "alice", "John", "Smith");
        add(&svc, "alice", "Mary", "Jones");

        let hits = svc.search_persons("alice", Some("alice"), "John").unwrap();
        let names: Vec<String> = hits.iter().map(|p| p.full_name()).collect();
        assert_eq!(names, vec!["John Smith", "Johnny Walker"]);
    }

    #[test]
    fn test_search_full_name_beats_token() {
        let (svc, _) = service();
        add(&svc, "alice", "Smith", "Adams");
        add(&svc, "alice", "John", "Smith");
        let hits = svc.search_persons("alice", None, "john smith").unwrap();
        assert_eq!(hits[0].full_name(), "John Smith");
        assert_eq!(hits.len(), 1);

        let hits = svc.search_persons("alice", None, "SMITH").unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_matches_maiden_name_and_respects_access() {
        let (svc, _) = service();
        let mut req = AddPersonRequest {
            first_name: "Mary".to_string(),
            last_name: "Jones".to_string(),
            ..Default::default()
        };
        req.maiden_name = Some("Brown".to_string());
        svc.add_person("bob", "bob", &req).unwrap();

        assert!(svc.search_persons("alice", None, "brown").unwrap().is_empty());
        assert!(matches!(
            svc.search_persons("alice", Some("bob"), "brown"),
            Err(GraphError::Permission(_))
        ));
        svc.grant_membership("bob", "bob", "alice", TreeRole::Viewer).unwrap();
        assert_eq!(svc.search_persons("alice", None, "brown").unwrap().len(), 1);
        assert!(matches!(
            svc.search_persons("alice", None, "  "),
            Err(GraphError::Validation(_))
        ));
    }

    #[test]
    fn test_add_person_requires_names() {
        let (svc, _) = service();
        let req = AddPersonRequest {
            first_name: " ".to_string(),
            last_name: "Smith".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            svc.add_person("alice", "alice", &req),
            Err(GraphError::Validation(_))
        ));
    }

    #[test]
    fn test_add_person_with_self_relationship_creates_self_node() {
        let (svc, _) = service();
        let resp = add_with(
            &svc,
            "alice",
            "Frank",
            "Smith",
            vec![RelationshipSpec {
                person_id: "self".to_string(),
                relationship_type: RelationshipType::Parent,
                is_biological: true,
            }],
            None,
        );
        assert_eq!(resp.relationships.len(), 1);
        let persons = svc.list_persons("alice", "alice").unwrap();
        let me = persons.iter().find(|p| p.is_self_node()).unwrap();
        assert_eq!(resp.relationships[0].person2_id, me.id);
        assert_eq!(me.link_status, LinkStatus::Confirmed);

        let parents = svc.find_parents("alice", &me.id.to_string()).unwrap();
        assert_eq!(parents[0].first_name, "Frank");
    }

    #[test]
    fn test_failed_relationship_rolls_back_person() {
        let (svc, _) = service();
        let req = AddPersonRequest {
            first_name: "Ghost".to_string(),
            last_name: "Smith".to_string(),
            relationships: vec![RelationshipSpec {
                person_id: "999".to_string(),
                relationship_type: RelationshipType::Sibling,
                is_biological: true,
            }],
            ..Default::default()
        };
        assert!(matches!(
            svc.add_person("alice", "alice", &req),
            Err(GraphError::NotFound(_))
        ));
        assert!(svc.list_persons("alice", "alice").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_linked_user_conflicts() {
        let (svc, _) = service();
        add_with(&svc, "alice", "Bob", "King", vec![], Some("bob"));
        let req = AddPersonRequest {
            first_name: "Robert".to_string(),
            last_name: "King".to_string(),
            linked_user_id: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            svc.add_person("alice", "alice", &req),
            Err(GraphError::Conflict(_))
        ));
    }

    #[test]
    fn test_viewer_cannot_write() {
        let (svc, _) = service();
        svc.grant_membership("alice", "alice", "bob", TreeRole::Viewer).unwrap();
        let req = AddPersonRequest {
            first_name: "Ann".to_string(),
            last_name: "Smith".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            svc.add_person("bob", "alice", &req),
            Err(GraphError::Permission(_))
        ));
        svc.grant_membership("alice", "alice", "bob", TreeRole::Member).unwrap();
        assert!(svc.add_person("bob", "alice", &req).is_ok());
    }

    #[test]
    fn test_delete_person_cascades_edges() {
        let (svc, _) = service();
        let a = add(&svc, "alice", "Ann", "Smith");
        let resp = add_with(
            &svc,
            "alice",
            "Ben",
            "Smith",
            vec![RelationshipSpec {
                person_id: a.id.to_string(),
                relationship_type: RelationshipType::Sibling,
                is_biological: true,
            }],
            None,
        );
        assert_eq!(svc.delete_person("alice", &resp.person.id.to_string()).unwrap(), 1);
        assert!(svc.find_by_person("alice", &a.id.to_string()).unwrap().is_empty());
        assert!(matches!(
            svc.get_person("alice", &resp.person.id.to_string()),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_person() {
        let (svc, _) = service();
        let a = add(&svc, "alice", "Ann", "Smith");
        let patch = UpdatePersonRequest {
            death_date: Some("1999-01-01".to_string()),
            is_alive: Some(false),
            ..Default::default()
        };
        let updated = svc.update_person("alice", &a.id.to_string(), &patch).unwrap();
        assert!(!updated.is_alive);
        assert_eq!(updated.first_name, "Ann");

        let bad = UpdatePersonRequest {
            last_name: Some("".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update_person("alice", &a.id.to_string(), &bad),
            Err(GraphError::Validation(_))
        ));
        assert!(matches!(
            svc.get_person("alice", "not-an-id"),
            Err(GraphError::Validation(_))
        ));
    }
}
