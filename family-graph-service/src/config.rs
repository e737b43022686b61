use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How far the cycle guard looks before accepting a parent/child edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Reject only the direct inverse pair between the two persons
    Direct,
    /// Also reject when the prospective child is already an ancestor of the parent
    Ancestry,
}

impl CyclePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(CyclePolicy::Direct),
            "ancestry" => Some(CyclePolicy::Ancestry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub link_ttl: chrono::Duration,
    pub default_depth: u32,
    pub max_depth: u32,
    pub cycle_policy: CyclePolicy,
    pub notify_url: Option<String>,
    pub directory_cache_ttl: Duration,
    pub directory_cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9110,
            database_path: "./family_graph.db".to_string(),
            link_ttl: chrono::Duration::days(14),
            default_depth: 3,
            max_depth: 8,
            cycle_policy: CyclePolicy::Direct,
            notify_url: None,
            directory_cache_ttl: Duration::from_secs(300),
            directory_cache_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cycle_policy = match env::var("FAMILY_GRAPH_CYCLE_POLICY") {
            Ok(raw) => CyclePolicy::from_str(&raw).unwrap_or_else(|| {
                log::warn!("Unknown FAMILY_GRAPH_CYCLE_POLICY '{}', using direct", raw);
                defaults.cycle_policy
            }),
            Err(_) => defaults.cycle_policy,
        };

        let max_depth = parse_var("FAMILY_GRAPH_MAX_DEPTH", defaults.max_depth).max(1);
        let default_depth =
            parse_var("FAMILY_GRAPH_DEFAULT_DEPTH", defaults.default_depth).min(max_depth);

        Self {
            port: parse_var("FAMILY_GRAPH_PORT", defaults.port),
            database_path: env::var("FAMILY_GRAPH_DB_PATH").unwrap_or(defaults.database_path),
            link_ttl: chrono::Duration::days(parse_var("FAMILY_GRAPH_LINK_TTL_DAYS", 14i64)),
            default_depth,
            max_depth,
            cycle_policy,
            notify_url: env::var("FAMILY_GRAPH_NOTIFY_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            directory_cache_ttl: Duration::from_secs(parse_var(
                "FAMILY_GRAPH_DIRECTORY_CACHE_TTL_SECS",
                defaults.directory_cache_ttl.as_secs(),
            )),
            directory_cache_capacity: parse_var(
                "FAMILY_GRAPH_DIRECTORY_CACHE_CAPACITY",
                defaults.directory_cache_capacity,
            ),
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} must be a valid number (got '{}'), using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
