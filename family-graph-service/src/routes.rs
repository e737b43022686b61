//! Axum route handlers for the family graph API.
//!
//! Handlers are thin: extract the caller, call [`GraphService`], wrap the
//! result in the `RpcResponse` envelope. Errors render through
//! `GraphError`'s `IntoResponse`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use family_graph_types::*;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::Caller;
use crate::db::tables::{pending_links, persons, relationships};
use crate::error::GraphResult;
use crate::graph::GraphService;

pub struct AppState {
    pub graph: Arc<GraphService>,
    pub start_time: Instant,
}

type ApiResult<T> = GraphResult<Json<RpcResponse<T>>>;

fn ok<T: serde::Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(RpcResponse::ok(data)))
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub max_depth: Option<u32>,
    pub root: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub tree_id: Option<String>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/trees/:tree_id", get(view_tree))
        .route("/trees/:tree_id/persons", post(add_person).get(list_persons))
        .route("/trees/:tree_id/relationships", post(create_relationship))
        .route("/trees/:tree_id/members", get(list_members).post(grant_member))
        .route("/trees/:tree_id/members/:user_id", delete(revoke_member))
        .route("/persons/search", get(search_persons))
        .route(
            "/persons/:id",
            get(get_person).patch(update_person).delete(delete_person),
        )
        .route("/persons/:id/relationships", get(person_relationships))
        .route("/persons/:id/parents", get(person_parents))
        .route("/persons/:id/children", get(person_children))
        .route("/persons/:id/approve", post(approve_link))
        .route("/persons/:id/reject", post(reject_link))
        .route("/relationships/:id", delete(delete_relationship))
        .route("/links/incoming", get(incoming_links))
        .route("/users/me", put(upsert_me))
        .route("/users/:user_id", get(get_user))
        .route("/connections", get(list_connections).post(connect))
        .route("/connections/:peer", delete(disconnect))
        .route("/status", get(status))
        .with_state(state)
}

// POST /trees/:tree_id/persons
pub async fn add_person(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
    Json(req): Json<AddPersonRequest>,
) -> ApiResult<AddPersonResponse> {
    ok(state.graph.add_person(caller.as_str(), &tree_id, &req)?)
}

// GET /trees/:tree_id/persons
pub async fn list_persons(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
) -> ApiResult<Vec<Person>> {
    ok(state.graph.list_persons(caller.as_str(), &tree_id)?)
}

// GET /trees/:tree_id?max_depth=N&root=ID
pub async fn view_tree(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> ApiResult<TreeView> {
    ok(state.graph.build_tree(
        caller.as_str(),
        &tree_id,
        query.root.as_deref(),
        query.max_depth,
    )?)
}

// POST /trees/:tree_id/relationships
pub async fn create_relationship(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
    Json(req): Json<CreateRelationshipRequest>,
) -> ApiResult<Relationship> {
    ok(state.graph.create_edge(caller.as_str(), &tree_id, &req)?)
}

// GET /trees/:tree_id/members
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
) -> ApiResult<Vec<TreeMembership>> {
    ok(state.graph.list_members(caller.as_str(), &tree_id)?)
}

// POST /trees/:tree_id/members
pub async fn grant_member(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(tree_id): Path<String>,
    Json(req): Json<GrantMembershipRequest>,
) -> ApiResult<TreeMembership> {
    ok(state
        .graph
        .grant_membership(caller.as_str(), &tree_id, &req.user_id, req.role)?)
}

// DELETE /trees/:tree_id/members/:user_id
pub async fn revoke_member(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((tree_id, user_id)): Path<(String, String)>,
) -> ApiResult<bool> {
    state.graph.revoke_membership(caller.as_str(), &tree_id, &user_id)?;
    ok(true)
}

// GET /persons/search?q=&tree_id=
pub async fn search_persons(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Person>> {
    ok(state
        .graph
        .search_persons(caller.as_str(), query.tree_id.as_deref(), &query.q)?)
}

// GET /persons/:id
pub async fn get_person(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Person> {
    ok(state.graph.get_person(caller.as_str(), &id)?)
}

// PATCH /persons/:id
pub async fn update_person(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<UpdatePersonRequest>,
) -> ApiResult<Person> {
    ok(state.graph.update_person(caller.as_str(), &id, &patch)?)
}

// DELETE /persons/:id
pub async fn delete_person(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    state.graph.delete_person(caller.as_str(), &id)?;
    ok(true)
}

// GET /persons/:id/relationships
pub async fn person_relationships(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<Relationship>> {
    ok(state.graph.find_by_person(caller.as_str(), &id)?)
}

// GET /persons/:id/parents
pub async fn person_parents(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<Person>> {
    ok(state.graph.find_parents(caller.as_str(), &id)?)
}

// GET /persons/:id/children
pub async fn person_children(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<Person>> {
    ok(state.graph.find_children(caller.as_str(), &id)?)
}

// POST /persons/:id/approve
pub async fn approve_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<LinkDecision> {
    ok(state.graph.approve_link(caller.as_str(), &id)?)
}

// POST /persons/:id/reject
pub async fn reject_link(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<PendingLink> {
    ok(state.graph.reject_link(caller.as_str(), &id)?)
}

// DELETE /relationships/:id
pub async fn delete_relationship(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    state.graph.delete_edge(caller.as_str(), &id)?;
    ok(true)
}

// GET /links/incoming
pub async fn incoming_links(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<PendingLink>> {
    ok(state.graph.list_incoming(caller.as_str())?)
}

// PUT /users/me
pub async fn upsert_me(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<UpsertProfileRequest>,
) -> ApiResult<UserProfile> {
    ok(state.graph.upsert_profile(caller.as_str(), &req)?)
}

// GET /users/:user_id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<UserProfile> {
    ok(state.graph.get_profile(&user_id)?)
}

// GET /connections
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<Connection>> {
    ok(state.graph.list_connections(caller.as_str())?)
}

// POST /connections
pub async fn connect(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<ConnectRequest>,
) -> ApiResult<Connection> {
    ok(state.graph.connect(caller.as_str(), &req)?)
}

// DELETE /connections/:peer
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(peer): Path<String>,
) -> ApiResult<bool> {
    state.graph.disconnect(caller.as_str(), &peer)?;
    ok(true)
}

// GET /status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<ServiceStatus>>) {
    let conn = state.graph.db().conn();
    let status = ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        total_persons: persons::count_persons(&conn).unwrap_or(0),
        total_relationships: relationships::count_relationships(&conn).unwrap_or(0),
        pending_links: pending_links::count_open(&conn).unwrap_or(0),
    };
    (StatusCode::OK, Json(RpcResponse::ok(status)))
}
