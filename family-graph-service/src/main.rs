//! Family Graph Service: standalone binary serving the family graph API.
//!
//! Default: http://127.0.0.1:9110/

use family_graph_service::config::Config;
use family_graph_service::db::Db;
use family_graph_service::directory::{CachedDirectory, DbDirectory};
use family_graph_service::graph::{GraphService, GraphSettings};
use family_graph_service::notify;
use family_graph_service::routes::{self, AppState};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    log::info!("Opening database at: {}", config.database_path);
    let database = Arc::new(Db::open(&config.database_path).expect("Failed to open database"));

    let directory = CachedDirectory::new(
        DbDirectory::new(database.clone()),
        config.directory_cache_ttl,
        config.directory_cache_capacity,
    );
    let graph = GraphService::new(
        database,
        Arc::new(directory),
        notify::from_config(&config),
        GraphSettings::from(&config),
    );

    log::info!(
        "Cycle policy: {:?}, traversal depth {} (max {}), link TTL {} day(s)",
        config.cycle_policy,
        config.default_depth,
        config.max_depth,
        config.link_ttl.num_days()
    );

    let state = Arc::new(AppState {
        graph: Arc::new(graph),
        start_time: Instant::now(),
    });

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::build_router(state).layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    log::info!("Family Graph Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
