//! Cross-account link approval.
//!
//! A link request moves `pending → approved | rejected | expired` and never
//! leaves a terminal state. Approval is a saga over two independently owned
//! trees: the approver's mirror (self node, mirrored requester, inverse
//! edges) is written first through [`run_mirrored`], and only then is the
//! request marked approved on the requester's side. Any failure before that
//! point leaves the request pending so approving again is safe.
//!
//! Nothing the mirror writes is visible as a link until approval: the mirrored
//! node stays `pending` and no membership is granted. Confirmation, both
//! viewer grants, and any invite the approver had open for the requester are
//! settled in the one transaction that marks the request approved. Rejection
//! or expiry discards a mirrored node left behind by a failed attempt.

use family_graph_types::{
    LinkDecision, LinkStatus, PendingLink, PendingLinkStatus, Person, PersonSource, TreeRole,
};
use rusqlite::Connection;

use super::cycle_guard::{is_recorded, CycleGuard};
use super::mirror::{run_mirrored, MirroredWrite};
use super::persons::ensure_self_node;
use super::{parse_id, split_display_name, GraphService};
use crate::db::tables::memberships;
use crate::db::tables::pending_links;
use crate::db::tables::persons::{self, NewPerson};
use crate::db::tables::relationships::{self, NewRelationship};
use crate::error::{GraphError, GraphResult};
use crate::notify::NotificationEvent;

/// Node ids the approver's tree gains on approval
#[derive(Debug, Clone, Copy)]
pub struct ApprovalAnchor {
    pub approver_self_id: i64,
    pub mirrored_person_id: i64,
}

/// Mirror of a link request into the approver's own tree
struct ApprovalMirror<'a> {
    approver: &'a str,
    requester: &'a str,
    /// Node in the requester's tree that represents the approver
    linked_person: &'a Person,
    requester_self_id: Option<i64>,
    /// Names for the mirrored requester node
    requester_name: (String, String),
    guard: CycleGuard,
}

impl MirroredWrite for ApprovalMirror<'_> {
    type Anchor = ApprovalAnchor;

    fn upsert_anchor(&self, conn: &Connection) -> GraphResult<(ApprovalAnchor, bool)> {
        let approver_self = ensure_self_node(
            conn,
            self.approver,
            &self.linked_person.first_name,
            &self.linked_person.last_name,
        )?;

        // Left pending until the link is approved; confirmed in finalize_approval
        let (mirrored_person_id, created) =
            match persons::find_by_linked_user(conn, self.approver, self.requester)? {
                Some(existing) => (existing.id, false),
                None => {
                    let (first_name, last_name) = self.requester_name.clone();
                    let mirrored = persons::insert_person(
                        conn,
                        &NewPerson {
                            tree_id: self.approver.to_string(),
                            first_name,
                            last_name,
                            maiden_name: None,
                            gender: Default::default(),
                            birth_date: None,
                            death_date: None,
                            is_alive: true,
                            linked_user_id: Some(self.requester.to_string()),
                            link_status: LinkStatus::Pending,
                            source: PersonSource::PlatformUser,
                            created_by: self.approver.to_string(),
                        },
                    )?;
                    (mirrored.id, true)
                }
            };

        Ok((
            ApprovalAnchor {
                approver_self_id: approver_self.id,
                mirrored_person_id,
            },
            created,
        ))
    }

    fn ensure_mirror(&self, conn: &Connection, anchor: &ApprovalAnchor) -> GraphResult<usize> {
        let requester_self_id = match self.requester_self_id {
            Some(id) => id,
            None => return Ok(0),
        };

        let translate = |id: i64| {
            if id == self.linked_person.id {
                anchor.approver_self_id
            } else {
                anchor.mirrored_person_id
            }
        };

        let mut written = 0;
        for edge in relationships::find_between(conn, self.linked_person.id, requester_self_id)? {
            // Same fact, seen from the other side: (Q, P, inverse T)
            let person1_id = translate(edge.person2_id);
            let person2_id = translate(edge.person1_id);
            let relationship_type = edge.relationship_type.inverse();

            if is_recorded(conn, person1_id, person2_id, relationship_type)? {
                continue;
            }
            self.guard.check(conn, person1_id, person2_id, relationship_type)?;
            relationships::insert_relationship(
                conn,
                &NewRelationship {
                    tree_id: self.approver.to_string(),
                    person1_id,
                    person2_id,
                    relationship_type,
                    is_biological: edge.is_biological,
                    created_by: self.approver.to_string(),
                },
            )?;
            written += 1;
        }
        Ok(written)
    }
}

/// Mark a pending link expired if its deadline passed. Returns true if it did.
pub(crate) fn expire_if_due(conn: &mut Connection, link: &mut PendingLink) -> GraphResult<bool> {
    if link.status.is_terminal() {
        return Ok(false);
    }
    let deadline = match chrono::DateTime::parse_from_rfc3339(&link.expires_at) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("[LINKS] Link {} has unreadable expiry '{}': {}", link.id, link.expires_at, e);
            return Ok(false);
        }
    };
    if deadline > chrono::Utc::now() {
        return Ok(false);
    }

    let tx = conn.transaction()?;
    if pending_links::resolve(&tx, link.id, PendingLinkStatus::Expired)? {
        persons::set_link_state(&tx, link.person_id, None, LinkStatus::Unlinked)?;
        discard_unconfirmed_mirror(&tx, link)?;
    }
    tx.commit()?;

    link.status = PendingLinkStatus::Expired;
    log::info!("[LINKS] Link {} for person {} expired", link.id, link.person_id);
    Ok(true)
}

/// Remove the node a failed approval attempt left in the target's tree.
/// Approval attempts record the target account first, so without one there is nothing to undo.
fn discard_unconfirmed_mirror(conn: &Connection, link: &PendingLink) -> GraphResult<()> {
    let Some(approver) = link.target_user_id.as_deref() else {
        return Ok(());
    };
    if let Some(id) = persons::find_unconfirmed_mirror(conn, approver, &link.tree_id)? {
        relationships::delete_edges_of_person(conn, id)?;
        persons::delete_person(conn, id)?;
        log::info!("[LINKS] Discarded unconfirmed mirror {} of link {} in tree {}", id, link.id, approver);
    }
    Ok(())
}

/// Settle an approval in one transaction once the mirror is in place.
/// Returns true if the link had already been approved, by this or a concurrent call.
fn finalize_approval(
    conn: &mut Connection,
    link: &PendingLink,
    linked_person_id: i64,
    approver: &str,
    anchor: &ApprovalAnchor,
) -> GraphResult<bool> {
    let requester = link.tree_id.as_str();
    let tx = conn.transaction()?;

    let mut replayed = link.status == PendingLinkStatus::Approved;
    if !replayed && !pending_links::resolve(&tx, link.id, PendingLinkStatus::Approved)? {
        let current = pending_links::get_by_token(&tx, &link.token)?.map(|l| l.status);
        if current != Some(PendingLinkStatus::Approved) {
            return Err(GraphError::Conflict(format!(
                "link request {} was resolved concurrently",
                link.id
            )));
        }
        replayed = true;
    }

    persons::set_link_state(&tx, linked_person_id, Some(approver), LinkStatus::Confirmed)?;

    // A reused mirror may be the approver's own invite to the requester; it is answered too
    persons::set_link_state(&tx, anchor.mirrored_person_id, Some(requester), LinkStatus::Confirmed)?;
    if let Some(own) = pending_links::latest_for_person(&tx, anchor.mirrored_person_id)? {
        if pending_links::resolve(&tx, own.id, PendingLinkStatus::Approved)? {
            if own.target_user_id.is_none() {
                pending_links::set_target_user(&tx, own.id, requester)?;
            }
            log::info!("[LINKS] Link {} answered by approval of link {}", own.id, link.id);
        }
    }

    memberships::grant_at_least(&tx, requester, approver, TreeRole::Viewer)?;
    memberships::grant_at_least(&tx, approver, requester, TreeRole::Viewer)?;
    tx.commit()?;
    Ok(replayed)
}

/// Whether `caller` is the account a link is addressed to
fn is_target(link: &PendingLink, caller: &str, caller_email: Option<&str>) -> bool {
    match (&link.target_user_id, &link.target_email) {
        (Some(uid), _) => uid == caller,
        (None, Some(email)) => caller_email.is_some_and(|e| e.eq_ignore_ascii_case(email)),
        (None, None) => false,
    }
}

fn load_link(conn: &Connection, person_id: i64) -> GraphResult<(Person, PendingLink)> {
    let person = persons::get_person(conn, person_id)?
        .ok_or_else(|| GraphError::NotFound(format!("person {}", person_id)))?;
    let link = pending_links::latest_for_person(conn, person_id)?
        .ok_or_else(|| GraphError::NotFound(format!("no link request for person {}", person_id)))?;
    Ok((person, link))
}

fn terminal_conflict(link: &PendingLink) -> GraphError {
    GraphError::Conflict(format!("link request {} is {}", link.id, link.status.as_str()))
}

impl GraphService {
    fn email_of(&self, user_id: &str) -> GraphResult<Option<String>> {
        Ok(self.directory.profile(user_id)?.and_then(|p| p.email))
    }

    /// Approve the link request on `person_id`, mirroring it into the caller's tree.
    pub fn approve_link(&self, caller: &str, person_id: &str) -> GraphResult<LinkDecision> {
        let id = parse_id(person_id, "person")?;
        let caller_email = self.email_of(caller)?;

        let (person, link, requester_self) = {
            let mut conn = self.db.conn();
            let (person, mut link) = load_link(&conn, id)?;
            if !is_target(&link, caller, caller_email.as_deref()) {
                return Err(GraphError::Permission(format!(
                    "link request {} is not addressed to {}",
                    link.id, caller
                )));
            }
            if link.tree_id == caller {
                return Err(GraphError::Validation(
                    "cannot approve a link request in your own tree".to_string(),
                ));
            }
            if expire_if_due(&mut conn, &mut link)? {
                return Err(terminal_conflict(&link));
            }
            if matches!(link.status, PendingLinkStatus::Rejected | PendingLinkStatus::Expired) {
                return Err(terminal_conflict(&link));
            }
            if person.linked_user_id.as_deref() != Some(caller) {
                if let Some(other) = persons::find_by_linked_user(&conn, &link.tree_id, caller)? {
                    if other.id != person.id {
                        return Err(GraphError::Conflict(format!(
                            "tree '{}' already has person {} linked to {}",
                            link.tree_id, other.id, caller
                        )));
                    }
                }
            }
            if link.target_user_id.is_none() {
                // Email match settled: later rejection or expiry knows whose tree to clean
                pending_links::set_target_user(&conn, link.id, caller)?;
                link.target_user_id = Some(caller.to_string());
            }
            let requester_self = persons::find_by_linked_user(&conn, &link.tree_id, &link.tree_id)?;
            (person, link, requester_self)
        };

        let requester = link.tree_id.clone();
        let requester_name = match &requester_self {
            Some(me) => (me.first_name.clone(), me.last_name.clone()),
            None => split_display_name(&self.display_name_of(&requester)),
        };

        let mirror = ApprovalMirror {
            approver: caller,
            requester: &requester,
            linked_person: &person,
            requester_self_id: requester_self.as_ref().map(|p| p.id),
            requester_name,
            guard: self.cycle_guard(),
        };

        let mut conn = self.db.conn();
        let report = run_mirrored(&mut conn, &mirror).map_err(|e| {
            log::warn!("[LINKS] Mirroring link {} into tree {} failed: {}", link.id, caller, e);
            e
        })?;

        let replayed = finalize_approval(&mut conn, &link, person.id, caller, &report.anchor)?;

        let link = pending_links::get_by_token(&conn, &link.token)?
            .ok_or_else(|| GraphError::Internal(format!("link {} vanished", link.id)))?;
        drop(conn);

        if replayed {
            log::info!(
                "[LINKS] Re-ran approval of link {} ({} mirrored edge(s) repaired)",
                link.id,
                report.mirrored_rows
            );
        } else {
            log::info!(
                "[LINKS] {} approved link {} from tree {} ({} mirrored edge(s))",
                caller,
                link.id,
                requester,
                report.mirrored_rows
            );
            self.notifier.notify(NotificationEvent::InviteApproved {
                link_id: link.id,
                tree_id: requester.clone(),
                requester: link.created_by.clone(),
                approver: caller.to_string(),
            });
        }

        Ok(LinkDecision {
            link,
            mirrored_person_id: Some(report.anchor.mirrored_person_id),
            mirrored_relationships: report.mirrored_rows,
            replayed,
        })
    }

    /// Reject the link request on `person_id`. The target or the tree owner may reject.
    pub fn reject_link(&self, caller: &str, person_id: &str) -> GraphResult<PendingLink> {
        let id = parse_id(person_id, "person")?;
        let caller_email = self.email_of(caller)?;

        let mut conn = self.db.conn();
        let (person, mut link) = load_link(&conn, id)?;
        if !is_target(&link, caller, caller_email.as_deref()) && link.tree_id != caller {
            return Err(GraphError::Permission(format!(
                "link request {} is not addressed to {}",
                link.id, caller
            )));
        }
        expire_if_due(&mut conn, &mut link)?;
        if link.status.is_terminal() {
            return Err(terminal_conflict(&link));
        }

        let tx = conn.transaction()?;
        if !pending_links::resolve(&tx, link.id, PendingLinkStatus::Rejected)? {
            return Err(GraphError::Conflict(format!(
                "link request {} was resolved concurrently",
                link.id
            )));
        }
        persons::set_link_state(&tx, person.id, None, LinkStatus::Unlinked)?;
        discard_unconfirmed_mirror(&tx, &link)?;
        tx.commit()?;

        let link = pending_links::get_by_token(&conn, &link.token)?
            .ok_or_else(|| GraphError::Internal(format!("link {} vanished", link.id)))?;
        drop(conn);

        log::info!("[LINKS] {} rejected link {} from tree {}", caller, link.id, link.tree_id);
        self.notifier.notify(NotificationEvent::InviteRejected {
            link_id: link.id,
            tree_id: link.tree_id.clone(),
            requester: link.created_by.clone(),
            rejected_by: caller.to_string(),
        });
        Ok(link)
    }

    /// Pending link requests addressed to the caller, by user id or directory email
    pub fn list_incoming(&self, caller: &str) -> GraphResult<Vec<PendingLink>> {
        let caller_email = self.email_of(caller)?;
        let mut conn = self.db.conn();
        let candidates = pending_links::list_open_for_target(&conn, caller, caller_email.as_deref())?;
        let mut open = Vec::with_capacity(candidates.len());
        for mut link in candidates {
            if !expire_if_due(&mut conn, &mut link)? {
                open.push(link);
            }
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSettings;
    use crate::test_support::{add, add_with, profile, service, service_with};
    use family_graph_types::{AddPersonRequest, RelationshipSpec, RelationshipType};

    /// The added person is the parent of the tree owner
    fn parent_of_self() -> Vec<RelationshipSpec> {
        vec![RelationshipSpec {
            person_id: "self".to_string(),
            relationship_type: RelationshipType::Parent,
            is_biological: true,
        }]
    }

    /// `tree` adds a father node linked to `father`, returning that node's id
    fn invite_father(svc: &GraphService, tree: &str, first: &str, father: &str) -> i64 {
        add_with(svc, tree, first, "King", parent_of_self(), Some(father))
            .person
            .id
    }

    fn self_node(svc: &GraphService, tree: &str) -> Person {
        svc.list_persons(tree, tree)
            .unwrap()
            .into_iter()
            .find(|p| p.is_self_node())
            .unwrap()
    }

    #[test]
    fn test_approve_mirrors_into_both_trees() {
        let (svc, notes) = service();
        profile(&svc, "alice", "Alice King", None);
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        assert_eq!(notes.names(), vec!["invite_created"]);

        let decision = svc.approve_link("bob", &bob_node.to_string()).unwrap();
        assert_eq!(decision.link.status, PendingLinkStatus::Approved);
        assert_eq!(decision.mirrored_relationships, 1);
        assert!(!decision.replayed);
        assert_eq!(notes.names(), vec!["invite_created", "invite_approved"]);

        // Alice's tree shows Bob as her parent, now confirmed
        let alice_self = self_node(&svc, "alice");
        let parents = svc.find_parents("alice", &alice_self.id.to_string()).unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].link_status, LinkStatus::Confirmed);
        assert_eq!(parents[0].linked_user_id.as_deref(), Some("bob"));

        // Bob's tree shows Alice as his child
        let bob_self = self_node(&svc, "bob");
        assert_eq!(bob_self.first_name, "Bob");
        let kids = svc.find_children("bob", &bob_self.id.to_string()).unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].id, decision.mirrored_person_id.unwrap());
        assert_eq!(kids[0].first_name, "Alice");
        assert_eq!(kids[0].source, PersonSource::PlatformUser);

        // Mutual read access
        assert!(svc.ensure_access("bob", "alice", TreeRole::Viewer).is_ok());
        assert!(svc.ensure_access("alice", "bob", TreeRole::Viewer).is_ok());
    }

    #[test]
    fn test_approve_twice_is_idempotent() {
        let (svc, notes) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        let first = svc.approve_link("bob", &bob_node.to_string()).unwrap();
        let second = svc.approve_link("bob", &bob_node.to_string()).unwrap();

        assert!(second.replayed);
        assert_eq!(second.mirrored_relationships, 0);
        assert_eq!(first.mirrored_person_id, second.mirrored_person_id);
        assert_eq!(svc.list_persons("bob", "bob").unwrap().len(), 2);
        let bob_self = self_node(&svc, "bob");
        assert_eq!(svc.find_by_person("bob", &bob_self.id.to_string()).unwrap().len(), 1);
        assert_eq!(
            notes.names().iter().filter(|n| **n == "invite_approved").count(),
            1
        );
    }

    #[test]
    fn test_half_linked_state_converges() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");

        // The mirrored node exists, no edge yet
        interrupt_after_anchor(&svc, bob_node);
        assert_eq!(svc.list_persons("bob", "bob").unwrap().len(), 2);
        assert!(svc.get_person("alice", &bob_node.to_string()).is_ok());

        let decision = svc.approve_link("bob", &bob_node.to_string()).unwrap();
        assert!(!decision.replayed);
        assert_eq!(decision.mirrored_relationships, 1);
        assert_eq!(svc.list_persons("bob", "bob").unwrap().len(), 2);
    }

    #[test]
    fn test_three_tree_propagation() {
        let (svc, _) = service();
        profile(&svc, "alice", "Alice King", None);
        profile(&svc, "carl", "Carl King", None);

        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        svc.approve_link("bob", &bob_node.to_string()).unwrap();
        let carl_node = invite_father(&svc, "bob", "Carl", "carl");
        svc.approve_link("carl", &carl_node.to_string()).unwrap();

        let view = svc.build_tree("alice", "alice", None, Some(3)).unwrap();
        let grandfather = view
            .ancestors
            .iter()
            .find(|n| n.person.linked_user_id.as_deref() == Some("carl"))
            .expect("carl reachable from alice's tree");
        assert_eq!(grandfather.generation, -2);
        assert_eq!(grandfather.display_name.as_deref(), Some("Carl King"));

        let father = view
            .ancestors
            .iter()
            .find(|n| n.person.linked_user_id.as_deref() == Some("bob"))
            .unwrap();
        assert_eq!(father.generation, -1);
        assert!(father.resolved_trees.contains(&"bob".to_string()));
    }

    #[test]
    fn test_reject_unlinks_and_blocks_approval() {
        let (svc, notes) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");

        assert!(matches!(
            svc.reject_link("mallory", &bob_node.to_string()),
            Err(GraphError::Permission(_))
        ));
        let link = svc.reject_link("bob", &bob_node.to_string()).unwrap();
        assert_eq!(link.status, PendingLinkStatus::Rejected);
        assert_eq!(notes.names().last(), Some(&"invite_rejected"));

        let node = svc.get_person("alice", &bob_node.to_string()).unwrap();
        assert_eq!(node.link_status, LinkStatus::Unlinked);
        assert!(node.linked_user_id.is_none());

        assert!(matches!(
            svc.approve_link("bob", &bob_node.to_string()),
            Err(GraphError::Conflict(_))
        ));
        assert!(matches!(
            svc.reject_link("alice", &bob_node.to_string()),
            Err(GraphError::Conflict(_))
        ));
        assert!(svc.list_persons("bob", "bob").is_ok_and(|p| p.is_empty()));
    }

    #[test]
    fn test_expired_link_cannot_be_approved() {
        let settings = GraphSettings {
            link_ttl: chrono::Duration::seconds(-1),
            ..GraphSettings::default()
        };
        let (svc, _) = service_with(settings);
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");

        assert!(svc.list_incoming("bob").unwrap().is_empty());
        assert!(matches!(
            svc.approve_link("bob", &bob_node.to_string()),
            Err(GraphError::Conflict(_))
        ));
        let node = svc.get_person("alice", &bob_node.to_string()).unwrap();
        assert_eq!(node.link_status, LinkStatus::Unlinked);
        assert!(svc.list_persons("bob", "bob").unwrap().is_empty());
    }

    #[test]
    fn test_email_target_approval() {
        let (svc, _) = service();
        profile(&svc, "bob", "Bob King", Some("Bob@Example.com"));
        let req = AddPersonRequest {
            first_name: "Bob".to_string(),
            last_name: "King".to_string(),
            relationships: parent_of_self(),
            invite_email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        let node = svc.add_person("alice", "alice", &req).unwrap().person;

        let incoming = svc.list_incoming("bob").unwrap();
        assert_eq!(incoming.len(), 1);
        assert!(svc.list_incoming("carol").unwrap().is_empty());
        assert!(matches!(
            svc.approve_link("carol", &node.id.to_string()),
            Err(GraphError::Permission(_))
        ));

        let decision = svc.approve_link("bob", &node.id.to_string()).unwrap();
        assert_eq!(decision.link.target_user_id.as_deref(), Some("bob"));
        let node = svc.get_person("alice", &node.id.to_string()).unwrap();
        assert_eq!(node.linked_user_id.as_deref(), Some("bob"));
        assert_eq!(node.link_status, LinkStatus::Confirmed);

        // Replays go through the recorded user id
        assert!(svc.approve_link("bob", &node.id.to_string()).unwrap().replayed);
    }

    #[test]
    fn test_mirror_conflict_leaves_link_pending() {
        let (svc, notes) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");

        // Bob already recorded Alice as his parent, contradicting her invite
        let bob_self = add_with(&svc, "bob", "Bob", "King", vec![], Some("bob")).person;
        add_with(
            &svc,
            "bob",
            "Alice",
            "King",
            vec![RelationshipSpec {
                person_id: bob_self.id.to_string(),
                relationship_type: RelationshipType::Parent,
                is_biological: true,
            }],
            Some("alice"),
        );

        let err = svc.approve_link("bob", &bob_node.to_string()).unwrap_err();
        assert!(matches!(err, GraphError::Conflict(_)), "got {:?}", err);

        let conn = svc.db().conn();
        let link = pending_links::latest_for_person(&conn, bob_node).unwrap().unwrap();
        assert_eq!(link.status, PendingLinkStatus::Pending);
        drop(conn);
        assert!(!notes.names().contains(&"invite_approved"));

        // Nothing of the failed attempt is visible as a link
        assert!(svc.ensure_access("bob", "alice", TreeRole::Viewer).is_err());
        assert!(svc.ensure_access("alice", "bob", TreeRole::Viewer).is_err());
        let alice_in_bob = svc
            .list_persons("bob", "bob")
            .unwrap()
            .into_iter()
            .find(|p| p.linked_user_id.as_deref() == Some("alice"))
            .unwrap();
        assert_eq!(alice_in_bob.link_status, LinkStatus::Pending);
    }

    #[test]
    fn test_reject_after_failed_approval_grants_nothing() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        let bob_self = add_with(&svc, "bob", "Bob", "King", vec![], Some("bob")).person;
        let bobs_alice = add_with(
            &svc,
            "bob",
            "Alice",
            "King",
            vec![RelationshipSpec {
                person_id: bob_self.id.to_string(),
                relationship_type: RelationshipType::Parent,
                is_biological: true,
            }],
            Some("alice"),
        )
        .person;

        assert!(svc.approve_link("bob", &bob_node.to_string()).is_err());
        svc.reject_link("bob", &bob_node.to_string()).unwrap();

        assert!(svc.ensure_access("bob", "alice", TreeRole::Viewer).is_err());
        let persons = svc.list_persons("bob", "bob").unwrap();
        assert!(persons.iter().all(|p| p.link_status != LinkStatus::Confirmed || p.is_self_node()));
        // Bob's own invite to Alice is untouched
        let kept = persons.iter().find(|p| p.id == bobs_alice.id).unwrap();
        assert_eq!(kept.linked_user_id.as_deref(), Some("alice"));
        assert_eq!(kept.link_status, LinkStatus::Pending);
    }

    /// Stop an approval after the anchor step, as a crash would
    fn interrupt_after_anchor(svc: &GraphService, node: i64) -> ApprovalAnchor {
        let conn = svc.db().conn();
        let person = persons::get_person(&conn, node).unwrap().unwrap();
        let mirror = ApprovalMirror {
            approver: "bob",
            requester: "alice",
            linked_person: &person,
            requester_self_id: None,
            requester_name: ("Alice".to_string(), "King".to_string()),
            guard: svc.cycle_guard(),
        };
        mirror.upsert_anchor(&conn).unwrap().0
    }

    #[test]
    fn test_reject_discards_unconfirmed_mirror() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        let anchor = interrupt_after_anchor(&svc, bob_node);

        let mirror = svc.get_person("bob", &anchor.mirrored_person_id.to_string()).unwrap();
        assert_eq!(mirror.link_status, LinkStatus::Pending);
        assert!(svc.ensure_access("bob", "alice", TreeRole::Viewer).is_err());

        svc.reject_link("bob", &bob_node.to_string()).unwrap();
        assert!(matches!(
            svc.get_person("bob", &anchor.mirrored_person_id.to_string()),
            Err(GraphError::NotFound(_))
        ));
        let left = svc.list_persons("bob", "bob").unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].is_self_node());
    }

    #[test]
    fn test_expiry_discards_unconfirmed_mirror() {
        let settings = GraphSettings {
            link_ttl: chrono::Duration::seconds(-1),
            ..GraphSettings::default()
        };
        let (svc, _) = service_with(settings);
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        interrupt_after_anchor(&svc, bob_node);

        assert!(svc.list_incoming("bob").unwrap().is_empty());
        assert!(svc
            .list_persons("bob", "bob")
            .unwrap()
            .iter()
            .all(|p| p.linked_user_id.as_deref() != Some("alice")));
        assert!(svc.ensure_access("bob", "alice", TreeRole::Viewer).is_err());
    }

    #[test]
    fn test_crossed_invites_settle_together() {
        let (svc, _) = service();
        // Bob invites Alice as his daughter, Alice invites Bob as her father
        let bobs_alice = add_with(
            &svc,
            "bob",
            "Alice",
            "King",
            vec![RelationshipSpec {
                person_id: "self".to_string(),
                relationship_type: RelationshipType::Child,
                is_biological: true,
            }],
            Some("alice"),
        )
        .person;
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");

        let decision = svc.approve_link("bob", &bob_node.to_string()).unwrap();
        assert_eq!(decision.mirrored_person_id, Some(bobs_alice.id));
        assert_eq!(decision.mirrored_relationships, 0);

        assert!(svc.list_incoming("alice").unwrap().is_empty());
        assert!(matches!(
            svc.reject_link("alice", &bobs_alice.id.to_string()),
            Err(GraphError::Conflict(_))
        ));

        let mirror = svc.get_person("bob", &bobs_alice.id.to_string()).unwrap();
        assert_eq!(mirror.linked_user_id.as_deref(), Some("alice"));
        assert_eq!(mirror.link_status, LinkStatus::Confirmed);
        let conn = svc.db().conn();
        let own = pending_links::latest_for_person(&conn, bobs_alice.id).unwrap().unwrap();
        assert_eq!(own.status, PendingLinkStatus::Approved);
    }

    #[test]
    fn test_losing_a_concurrent_approval_is_a_replay() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        let stale = {
            let conn = svc.db().conn();
            pending_links::latest_for_person(&conn, bob_node).unwrap().unwrap()
        };

        let decision = svc.approve_link("bob", &bob_node.to_string()).unwrap();
        let anchor = ApprovalAnchor {
            approver_self_id: self_node(&svc, "bob").id,
            mirrored_person_id: decision.mirrored_person_id.unwrap(),
        };

        let mut conn = svc.db().conn();
        assert!(finalize_approval(&mut conn, &stale, bob_node, "bob", &anchor).unwrap());
    }

    #[test]
    fn test_approval_racing_a_rejection_conflicts() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        let stale = {
            let conn = svc.db().conn();
            pending_links::latest_for_person(&conn, bob_node).unwrap().unwrap()
        };
        let anchor = interrupt_after_anchor(&svc, bob_node);
        svc.reject_link("alice", &bob_node.to_string()).unwrap();

        let mut conn = svc.db().conn();
        assert!(matches!(
            finalize_approval(&mut conn, &stale, bob_node, "bob", &anchor),
            Err(GraphError::Conflict(_))
        ));
    }

    #[test]
    fn test_only_target_may_approve() {
        let (svc, _) = service();
        let bob_node = invite_father(&svc, "alice", "Bob", "bob");
        assert!(matches!(
            svc.approve_link("alice", &bob_node.to_string()),
            Err(GraphError::Permission(_))
        ));
        let plain = add(&svc, "alice", "Ann", "King");
        assert!(matches!(
            svc.approve_link("bob", &plain.id.to_string()),
            Err(GraphError::NotFound(_))
        ));
    }
}
