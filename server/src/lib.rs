use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use search_core::persist::{load_snapshot, SnapshotPaths};
use search_core::{search_directory, Role, SearchableRecord, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

pub const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "query")]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub per_page: Option<usize>,
}
fn default_page() -> usize { 1 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub total_hits: usize,
    pub page: usize,
    pub per_page: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub batch_year: Option<i32>,
    pub skills: Option<String>,
    pub score: u32,
}

/// The user directory the search core reads from. Records keep registration
/// order; `by_id` maps an id to its position.
#[derive(Default)]
pub struct Directory {
    records: Vec<SearchableRecord>,
    by_id: HashMap<UserId, usize>,
}

impl Directory {
    pub fn from_records(records: Vec<SearchableRecord>) -> Self {
        let mut dir = Directory::default();
        for record in records {
            if dir.insert(record).is_err() {
                tracing::warn!("duplicate user id in snapshot, keeping first");
            }
        }
        dir
    }

    /// Add a user; hands the record back if its id is taken.
    pub fn insert(&mut self, record: SearchableRecord) -> Result<(), SearchableRecord> {
        if self.by_id.contains_key(&record.id) {
            return Err(record);
        }
        self.by_id.insert(record.id, self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, id: UserId) -> Option<&SearchableRecord> {
        self.by_id.get(&id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[SearchableRecord] { &self.records }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<RwLock<Directory>>,
    pub page_size: usize,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(directory: Directory, page_size: usize) -> Self {
        Self {
            directory: Arc::new(RwLock::new(directory)),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
        }
    }
}

pub fn build_app(snapshot_dir: &str, page_size: usize) -> Result<Router> {
    let (users, meta) = load_snapshot(&SnapshotPaths::new(snapshot_dir))?;
    tracing::info!(users = users.len(), created_at = %meta.created_at, "directory snapshot loaded");
    Ok(router(AppState::new(Directory::from_records(users), page_size)))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_get).post(search_post))
        .route("/users", post(register_user))
        .route("/users/:user_id", get(user_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_get(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    Json(run_search(&state, params))
}

pub async fn search_post(State(state): State<AppState>, Json(params): Json<SearchParams>) -> Json<SearchResponse> {
    Json(run_search(&state, params))
}

/// Rebuild the index from the live directory, rank, then hydrate one page.
fn run_search(state: &AppState, params: SearchParams) -> SearchResponse {
    let start = std::time::Instant::now();
    let per_page = params.per_page.unwrap_or(state.page_size).clamp(1, MAX_PAGE_SIZE);
    let page = params.page.max(1);

    let directory = state.directory.read();
    let ranked = search_directory(&params.q, directory.records());
    let total_hits = ranked.len();

    let results: Vec<SearchHit> = ranked
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .filter_map(|(user_id, score)| {
            let user = directory.get(user_id)?;
            Some(SearchHit {
                user_id,
                username: user.username.clone(),
                role: user.role,
                batch_year: user.batch_year,
                skills: user.skills.clone(),
                score,
            })
        })
        .collect();
    drop(directory);

    let elapsed = start.elapsed();
    tracing::info!(query = %params.q, total_hits, page, took_ms = elapsed.as_millis() as u64, "search");
    SearchResponse { query: params.q, took_ms: elapsed.as_millis(), total_hits, page, per_page, results }
}

pub async fn user_handler(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<SearchableRecord>, (StatusCode, String)> {
    state
        .directory
        .read()
        .get(user_id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "not found".into()))
}

async fn register_user(State(state): State<AppState>, headers: HeaderMap, Json(record): Json<SearchableRecord>) -> Result<(StatusCode, Json<SearchableRecord>), (StatusCode, String)> {
    authorize(&state, &headers)?;
    let mut directory = state.directory.write();
    match directory.insert(record.clone()) {
        Ok(()) => {
            tracing::info!(user_id = record.id, users = directory.len(), "user registered");
            Ok((StatusCode::CREATED, Json(record)))
        }
        Err(existing) => Err((StatusCode::CONFLICT, format!("user {} already exists", existing.id))),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, name: &str) -> SearchableRecord {
        SearchableRecord { id, username: name.into(), role: Role::Student, batch_year: None, skills: None }
    }

    #[test]
    fn directory_rejects_duplicate_ids() {
        let mut dir = Directory::from_records(vec![user(1, "a"), user(1, "b")]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(1).unwrap().username, "a");
        assert!(dir.insert(user(1, "c")).is_err());
        assert!(dir.insert(user(2, "c")).is_ok());
        assert_eq!(dir.records()[1].username, "c");
    }

    #[test]
    fn pagination_slices_ranked_hits() {
        let users = (1..=25).map(|i| user(i, &format!("sam{i}"))).collect();
        let state = AppState::new(Directory::from_records(users), 10);
        let resp = run_search(&state, SearchParams { q: "student".into(), page: 3, per_page: None });
        assert_eq!(resp.total_hits, 25);
        assert_eq!(resp.per_page, 10);
        let ids: Vec<UserId> = resp.results.iter().map(|h| h.user_id).collect();
        assert_eq!(ids, vec![21, 22, 23, 24, 25]);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let state = AppState::new(Directory::from_records(vec![user(1, "a")]), 10);
        let resp = run_search(&state, SearchParams { q: "student".into(), page: 9, per_page: Some(500) });
        assert_eq!(resp.per_page, MAX_PAGE_SIZE);
        assert_eq!(resp.total_hits, 1);
        assert!(resp.results.is_empty());
    }
}
