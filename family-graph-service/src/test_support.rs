//! Shared fixtures for unit tests.

use family_graph_types::{AddPersonRequest, AddPersonResponse, Person, RelationshipSpec};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::tables::persons::{insert_person, NewPerson};
use crate::db::tables::user_profiles;
use crate::db::Db;
use crate::directory::{CachedDirectory, DbDirectory};
use crate::graph::{GraphService, GraphSettings};
use crate::notify::{NotificationEvent, Notifier};

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn service() -> (GraphService, Arc<RecordingNotifier>) {
    service_with(GraphSettings::default())
}

pub fn service_with(settings: GraphSettings) -> (GraphService, Arc<RecordingNotifier>) {
    let db = Arc::new(Db::open(":memory:").unwrap());
    let directory = CachedDirectory::new(DbDirectory::new(db.clone()), Duration::from_secs(60), 64);
    let notifier = Arc::new(RecordingNotifier::default());
    let svc = GraphService::new(db, Arc::new(directory), notifier.clone(), settings);
    (svc, notifier)
}

/// Register a directory profile, bypassing the cache.
pub fn profile(svc: &GraphService, user_id: &str, display_name: &str, email: Option<&str>) {
    let conn = svc.db().conn();
    user_profiles::upsert_profile(&conn, user_id, display_name, email, None).unwrap();
    drop(conn);
    svc.directory().invalidate(user_id);
}

/// Add an unlinked person to `tree_id`, acting as the tree owner.
pub fn add(svc: &GraphService, tree_id: &str, first: &str, last: &str) -> Person {
    add_with(svc, tree_id, first, last, vec![], None).person
}

pub fn add_with(
    svc: &GraphService,
    tree_id: &str,
    first: &str,
    last: &str,
    relationships: Vec<RelationshipSpec>,
    linked_user_id: Option<&str>,
) -> AddPersonResponse {
    let req = AddPersonRequest {
        first_name: first.to_string(),
        last_name: last.to_string(),
        relationships,
        linked_user_id: linked_user_id.map(str::to_string),
        ..Default::default()
    };
    svc.add_person(tree_id, tree_id, &req).unwrap()
}

/// Raw insert of a manual person, for store-level tests.
pub fn insert_manual(conn: &Connection, tree_id: &str, first: &str, last: &str) -> i64 {
    insert_person(
        conn,
        &NewPerson {
            tree_id: tree_id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            maiden_name: None,
            gender: Default::default(),
            birth_date: None,
            death_date: None,
            is_alive: true,
            linked_user_id: None,
            link_status: family_graph_types::LinkStatus::None,
            source: family_graph_types::PersonSource::Manual,
            created_by: tree_id.to_string(),
        },
    )
    .unwrap()
    .id
}
