use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use kaiga_proto::content::{Category, CategoryItem, Post, NAV_CATEGORIES};
use kaiga_proto::protocol::{CommandOutcome, ControlOutcome, PlayOutcome, SessionSnapshot};
use kaiga_proto::station::{Catalog, Station};
use kaiga_proto::wordpress::WordPressClient;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::session::SessionClient;

#[derive(Clone)]
pub struct HttpState {
    pub session: SessionClient,
    pub catalog: Arc<Catalog>,
    pub content: WordPressClient,
    pub per_page: u32,
}

#[derive(Deserialize)]
struct PostsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    category: Option<u64>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    page: Option<u32>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/stations", get(get_stations))
        .route("/api/play/:id", post(play_station))
        .route("/api/stop", post(stop))
        .route("/api/toggle", post(toggle))
        .route("/api/posts", get(get_posts))
        .route("/api/posts/search", get(search_posts))
        .route("/api/posts/:slug", get(get_post))
        .route("/api/categories", get(get_categories))
        .route("/api/nav", get(get_nav))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: HttpState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

// ── playback ──────────────────────────────────────────────────────────────────

async fn get_state(State(state): State<HttpState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

async fn get_stations(State(state): State<HttpState>) -> Json<Vec<Station>> {
    Json(state.catalog.stations().to_vec())
}

async fn play_station(State(state): State<HttpState>, Path(id): Path<u32>) -> Response {
    info!("HTTP API: play station {}", id);
    let Some(station) = state.catalog.get(id).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(CommandOutcome::UnknownStation { station_id: id }),
        )
            .into_response();
    };
    let outcome = state.session.play_station(station).await;
    let status = match outcome {
        PlayOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        PlayOutcome::Superseded => StatusCode::CONFLICT,
        PlayOutcome::Started { .. } => StatusCode::OK,
    };
    (status, Json(CommandOutcome::Play(outcome))).into_response()
}

async fn stop(State(state): State<HttpState>) -> Response {
    info!("HTTP API: stop");
    control_response(state.session.stop_playback().await)
}

async fn toggle(State(state): State<HttpState>) -> Response {
    info!("HTTP API: toggle");
    control_response(state.session.toggle_playback().await)
}

fn control_response(outcome: ControlOutcome) -> Response {
    let status = match outcome {
        ControlOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(CommandOutcome::Control(outcome))).into_response()
}

// ── content ───────────────────────────────────────────────────────────────────
//
// Upstream failures answer with an empty list; the client shows its empty
// state and lets the user retry.

async fn get_posts(
    State(state): State<HttpState>,
    Query(query): Query<PostsQuery>,
) -> Json<Vec<Post>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(state.per_page).clamp(1, 100);
    let result = match query.category {
        Some(category) if category != 0 => {
            state
                .content
                .fetch_posts_by_category(category, page, per_page)
                .await
        }
        _ => state.content.fetch_posts(page, per_page).await,
    };
    Json(result.unwrap_or_else(|e| {
        warn!("Error fetching posts: {}", e);
        Vec::new()
    }))
}

async fn search_posts(
    State(state): State<HttpState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Post>> {
    let term = query.q.trim();
    if term.is_empty() {
        return Json(Vec::new());
    }
    let page = query.page.unwrap_or(1).max(1);
    Json(
        state
            .content
            .search_posts(term, page)
            .await
            .unwrap_or_else(|e| {
                warn!("Error searching posts: {}", e);
                Vec::new()
            }),
    )
}

async fn get_post(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    match state.content.fetch_post_by_slug(&slug).await {
        Ok(Some(post)) => Json(post).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Error fetching post by slug '{}': {}", slug, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn get_categories(State(state): State<HttpState>) -> Json<Vec<Category>> {
    Json(state.content.fetch_categories().await.unwrap_or_else(|e| {
        warn!("Error fetching categories: {}", e);
        Vec::new()
    }))
}

async fn get_nav() -> Json<&'static [CategoryItem]> {
    Json(NAV_CATEGORIES)
}
