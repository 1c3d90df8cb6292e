use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::collection::{
    Column, SliderConfig, Track, apply_filters, merge_tags, navpoints, paginate, render_rows,
    slider_config, sort_tracks,
};
use crate::playlist::{ApplyOutcome, PlaylistAction, apply_action};
use crate::preferences::PreferenceStore;
use crate::search::SearchTerms;
use crate::session::{Session, SessionStore, clear_session_cookie, session_cookie, session_id};
use crate::spotify::{ArtistRef, SpotifyClient, SpotifyConfig};
use crate::tags::TagStore;

#[derive(Clone)]
pub struct AppState {
    pub spotify: SpotifyConfig,
    pub http: reqwest::Client,
    pub sessions: SessionStore,
    pub tags: TagStore,
    pub preferences: PreferenceStore,
}

pub fn create_router(
    spotify: SpotifyConfig,
    tags: TagStore,
    preferences: PreferenceStore,
) -> Router {
    let state = AppState {
        spotify,
        http: reqwest::Client::new(),
        sessions: SessionStore::new(),
        tags,
        preferences,
    };

    Router::new()
        .route("/", get(root))
        .route("/auth/login", get(login))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", get(logout))
        .route("/preferences", get(get_preferences).put(put_preferences))
        .route("/collection/view", post(view_collection))
        .route("/search", get(search_catalog))
        .route("/playlists", get(list_playlists))
        .route("/playlists/apply", post(apply_playlist))
        .route("/tags/add", post(add_tags))
        .route("/tags/remove", post(remove_tags))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Dancify API v0.1.0"
}

/// Resolve the request's session, refreshing the access token when it is
/// about to expire, and build a client bound to the current token.
async fn authed(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(SpotifyClient, Session), StatusCode> {
    let id = session_id(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let mut session = state
        .sessions
        .get(&id)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if session.token.expires_soon() {
        tracing::debug!("Refreshing access token for {}", session.user_id);
        let token = state
            .spotify
            .refresh(&state.http, &session.token)
            .await
            .map_err(|e| {
                tracing::error!("Token refresh failed: {:#}", e);
                StatusCode::UNAUTHORIZED
            })?;
        state.sessions.update_token(&id, token.clone()).await;
        session.token = token;
    }

    let client = SpotifyClient::new(state.http.clone(), &session.token.access_token);
    Ok((client, session))
}

// ========== AUTH ENDPOINTS ==========

/// Redirect to the service's consent page
async fn login(State(state): State<AppState>) -> Result<Redirect, StatusCode> {
    let url = state.spotify.authorize_url().map_err(|e| {
        tracing::error!("Failed to build authorize URL: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
}

/// Exchange the authorization code, look up the user and establish a session
async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, StatusCode> {
    let token = state
        .spotify
        .exchange_code(&state.http, &query.code)
        .await
        .map_err(|e| {
            tracing::error!("Code exchange failed: {:#}", e);
            StatusCode::BAD_GATEWAY
        })?;

    let client = SpotifyClient::new(state.http.clone(), &token.access_token);
    let profile = client.current_user().await.map_err(|e| {
        tracing::error!("Failed to fetch user profile: {:#}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let display_name = profile.display_name.unwrap_or_else(|| profile.id.clone());
    tracing::info!("Logged in user {} ({})", display_name, profile.id);

    let session = Session {
        token,
        user_id: profile.id,
        display_name,
    };
    let id = state.sessions.insert(session).await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&id))],
        Redirect::to("/"),
    )
        .into_response())
}

/// Drop the session and clear the cookie
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id).await;
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

// ========== PREFERENCES ENDPOINTS ==========

#[derive(Debug, Serialize, Deserialize)]
struct ColumnsBody {
    columns: Vec<String>,
}

/// Get the user's active column set
async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ColumnsBody>, StatusCode> {
    let (_, session) = authed(&state, &headers).await?;
    let columns = state
        .preferences
        .columns_for(&session.user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load preferences: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(ColumnsBody {
        columns: columns.iter().map(|c| c.name().to_string()).collect(),
    }))
}

/// Replace the user's active column set; unknown names are dropped
async fn put_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ColumnsBody>,
) -> Result<Json<ColumnsBody>, StatusCode> {
    let (_, session) = authed(&state, &headers).await?;
    let columns: Vec<Column> = body
        .columns
        .iter()
        .filter_map(|name| Column::from_name(name))
        .collect();
    if columns.is_empty() {
        tracing::warn!("Rejected empty column preference for {}", session.user_id);
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .preferences
        .set_columns(&session.user_id, &columns)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store preferences: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ColumnsBody {
        columns: columns.iter().map(|c| c.name().to_string()).collect(),
    }))
}

// ========== COLLECTION VIEW ==========

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CollectionContext {
    Library,
    Playlist { id: String },
    Artist { id: String },
    Album { id: String },
}

#[derive(Debug, Deserialize)]
struct SortSpec {
    column: String,
    #[serde(default = "default_true")]
    ascending: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ViewRequest {
    context: CollectionContext,
    #[serde(default)]
    filters: HashMap<String, String>,
    #[serde(default)]
    ranges: HashMap<String, [f64; 2]>,
    sort: Option<SortSpec>,
    page: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Histogram {
    column: String,
    values: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct ViewResponse {
    collection: String,
    columns: Vec<String>,
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
    total: usize,
    page: usize,
    pages: usize,
    nav_pages: Vec<usize>,
    sliders: Vec<SliderConfig>,
    histograms: Vec<Histogram>,
}

/// The view pipeline: fetch the collection, merge features and tags, filter,
/// sort and paginate. The collection is re-fetched on every evaluation and
/// filters always apply to the full unfiltered set.
async fn view_collection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ViewRequest>,
) -> Result<Json<ViewResponse>, StatusCode> {
    let (client, session) = authed(&state, &headers).await?;

    let (collection_name, items) = match &request.context {
        CollectionContext::Library => {
            tracing::debug!("Fetching library for {}", session.user_id);
            let items = client.saved_tracks().await.map_err(internal)?;
            ("Library".to_string(), items)
        }
        CollectionContext::Playlist { id } => {
            tracing::debug!("Fetching playlist {} for {}", id, session.user_id);
            let meta = client.playlist_meta(id).await.map_err(internal)?;
            let items = client.playlist_tracks(id).await.map_err(internal)?;
            (meta.name, items)
        }
        CollectionContext::Artist { id } => {
            tracing::debug!("Fetching artist {} top tracks for {}", id, session.user_id);
            let artist = client.artist(id).await.map_err(internal)?;
            let items = client.artist_top_tracks(id).await.map_err(internal)?;
            (artist.name, items)
        }
        CollectionContext::Album { id } => {
            tracing::debug!("Fetching album {} for {}", id, session.user_id);
            let album = client.album(id).await.map_err(internal)?;
            let items = client.album_tracks(&album).await.map_err(internal)?;
            (album.name, items)
        }
    };

    let ids: Vec<String> = items
        .iter()
        .filter_map(|item| item.track.as_ref()?.id.clone())
        .collect();
    let features = client.audio_features(&ids).await.map_err(internal)?;

    let mut tracks: Vec<Track> = items
        .iter()
        .filter_map(|item| {
            let id = item.track.as_ref()?.id.as_ref()?;
            Track::from_parts(item, features.get(id))
        })
        .collect();

    let tag_map = state
        .tags
        .tags_for_tracks(&session.user_id, &ids)
        .await
        .map_err(internal)?;
    merge_tags(&mut tracks, &tag_map);

    let columns = state
        .preferences
        .columns_for(&session.user_id)
        .await
        .map_err(internal)?;

    // Slider bounds come from the unfiltered collection, so narrowing one
    // range never shrinks another slider's bounds.
    let sliders: Vec<SliderConfig> = columns
        .iter()
        .copied()
        .filter(|c| c.graphable())
        .filter_map(|c| slider_config(c, &numeric_series(&tracks, c)))
        .collect();

    // Filters naming unknown columns are dropped silently.
    let text_filters: Vec<(Column, SearchTerms)> = request
        .filters
        .iter()
        .filter_map(|(name, query)| Column::from_name(name).map(|c| (c, SearchTerms::parse(query))))
        .collect();
    let ranges: Vec<(Column, (f64, f64))> = request
        .ranges
        .iter()
        .filter_map(|(name, &[lo, hi])| Column::from_name(name).map(|c| (c, (lo, hi))))
        .collect();

    let mut view = apply_filters(&tracks, &text_filters, &ranges);

    if let Some(sort) = &request.sort {
        if let Some(column) = Column::from_name(&sort.column) {
            sort_tracks(&mut view, column, sort.ascending);
        }
    }

    let histograms: Vec<Histogram> = columns
        .iter()
        .copied()
        .filter(|c| c.graphable())
        .map(|c| Histogram {
            column: c.name().to_string(),
            values: numeric_series(&view, c),
        })
        .collect();

    let total = view.len();
    let (page, pages, rows) = paginate(&view, request.page.unwrap_or(1));
    let nav_pages = navpoints(page, pages);

    tracing::debug!(
        "Rendered {} of {} tracks for {} (page {}/{})",
        rows.len(),
        total,
        session.user_id,
        page,
        pages
    );

    Ok(Json(ViewResponse {
        collection: collection_name,
        columns: columns.iter().map(|c| c.name().to_string()).collect(),
        rows: render_rows(rows, &columns),
        total,
        page,
        pages,
        nav_pages,
        sliders,
        histograms,
    }))
}

// ========== SEARCH ==========

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SearchKind {
    Track,
    Artist,
    Album,
    Playlist,
}

impl SearchKind {
    fn as_type(self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Artist => "artist",
            SearchKind::Album => "album",
            SearchKind::Playlist => "playlist",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    kind: Option<SearchKind>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: String,
    name: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct SearchBody {
    tracks: Vec<SearchHit>,
    artists: Vec<SearchHit>,
    albums: Vec<SearchHit>,
    playlists: Vec<SearchHit>,
}

/// Search the catalog. Artist, album and playlist hits carry ids the client
/// can open as collection contexts.
async fn search_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchBody>, StatusCode> {
    let (client, session) = authed(&state, &headers).await?;

    let q = query.q.trim();
    if q.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let types = match query.kind {
        Some(kind) => kind.as_type(),
        None => "track,artist,album,playlist",
    };

    tracing::debug!("Searching '{}' ({}) for {}", q, types, session.user_id);
    let results = client.search(q, types).await.map_err(internal)?;

    Ok(Json(SearchBody {
        tracks: results
            .tracks
            .into_iter()
            .filter_map(|t| {
                Some(SearchHit {
                    id: t.id?,
                    name: t.name,
                    detail: artist_names(&t.artists),
                })
            })
            .collect(),
        artists: results
            .artists
            .into_iter()
            .map(|a| SearchHit {
                id: a.id,
                name: a.name,
                detail: String::new(),
            })
            .collect(),
        albums: results
            .albums
            .into_iter()
            .map(|a| SearchHit {
                id: a.id,
                name: a.name,
                detail: artist_names(&a.artists),
            })
            .collect(),
        playlists: results
            .playlists
            .into_iter()
            .map(|p| SearchHit {
                id: p.id,
                name: p.name,
                detail: p.owner.display_name.unwrap_or(p.owner.id),
            })
            .collect(),
    }))
}

fn artist_names(artists: &[ArtistRef]) -> String {
    artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn numeric_series(tracks: &[Track], column: Column) -> Vec<f64> {
    tracks
        .iter()
        .filter_map(|t| t.numeric_value(column))
        .collect()
}

fn internal(e: anyhow::Error) -> StatusCode {
    tracing::error!("External service error: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

// ========== PLAYLIST ENDPOINTS ==========

#[derive(Debug, Serialize)]
struct PlaylistInfo {
    id: String,
    name: String,
    owner: String,
    total_tracks: i64,
}

/// List the user's playlists, sorted by name
async fn list_playlists(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PlaylistInfo>>, StatusCode> {
    let (client, session) = authed(&state, &headers).await?;

    let mut playlists: Vec<PlaylistInfo> = client
        .current_user_playlists()
        .await
        .map_err(internal)?
        .into_iter()
        .map(|p| PlaylistInfo {
            id: p.id,
            name: p.name,
            owner: p.owner.display_name.unwrap_or(p.owner.id),
            total_tracks: p.tracks.map(|t| t.total).unwrap_or(0),
        })
        .collect();
    playlists.sort_by_key(|p| p.name.to_lowercase());

    tracing::debug!(
        "Returning {} playlists for {}",
        playlists.len(),
        session.user_id
    );
    Ok(Json(playlists))
}

#[derive(Debug, Deserialize)]
struct PlaylistRequest {
    action: PlaylistAction,
    name: String,
    track_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PlaylistResponse {
    snapshot_id: Option<String>,
    error: Option<String>,
}

/// Apply one explicit playlist action. Recoverable rejections ("Playlist
/// not found", "Playlist too long") come back as 200s with an error string.
async fn apply_playlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PlaylistRequest>,
) -> Result<Json<PlaylistResponse>, StatusCode> {
    let (client, session) = authed(&state, &headers).await?;

    tracing::debug!(
        "Applying {:?} to playlist '{}' ({} tracks) for {}",
        request.action,
        request.name,
        request.track_ids.len(),
        session.user_id
    );

    let outcome = apply_action(
        &client,
        &session.user_id,
        request.action,
        &request.name,
        &request.track_ids,
    )
    .await
    .map_err(internal)?;

    let response = match outcome {
        ApplyOutcome::Applied { snapshot_id } => PlaylistResponse {
            snapshot_id: Some(snapshot_id),
            error: None,
        },
        ApplyOutcome::Rejected { reason } => {
            tracing::debug!("Playlist action rejected: {}", reason);
            PlaylistResponse {
                snapshot_id: None,
                error: Some(reason),
            }
        }
    };
    Ok(Json(response))
}

// ========== TAG ENDPOINTS ==========

#[derive(Debug, Deserialize)]
struct TagRequest {
    tag: String,
    // The client sends the selected rows, or the whole visible table when
    // nothing is selected.
    track_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TagResponse {
    tag: String,
    affected: usize,
}

/// Apply a tag to the target tracks
async fn add_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TagRequest>,
) -> Result<Json<TagResponse>, StatusCode> {
    let (_, session) = authed(&state, &headers).await?;

    let tag = TagStore::canonicalize(&request.tag);
    if tag.is_empty() || request.track_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let affected = state
        .tags
        .add_tag(&session.user_id, &tag, &request.track_ids)
        .await
        .map_err(internal)?;

    Ok(Json(TagResponse { tag, affected }))
}

/// Remove a tag from the target tracks
async fn remove_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TagRequest>,
) -> Result<Json<TagResponse>, StatusCode> {
    let (_, session) = authed(&state, &headers).await?;

    let tag = TagStore::canonicalize(&request.tag);
    if tag.is_empty() || request.track_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let affected = state
        .tags
        .remove_tag(&session.user_id, &tag, &request.track_ids)
        .await
        .map_err(internal)?;

    Ok(Json(TagResponse { tag, affected }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_contexts_deserialize_by_kind() {
        let library: CollectionContext = serde_json::from_str(r#"{"kind":"library"}"#).unwrap();
        assert!(matches!(library, CollectionContext::Library));

        let playlist: CollectionContext =
            serde_json::from_str(r#"{"kind":"playlist","id":"p1"}"#).unwrap();
        assert!(matches!(playlist, CollectionContext::Playlist { id } if id == "p1"));

        let artist: CollectionContext =
            serde_json::from_str(r#"{"kind":"artist","id":"a1"}"#).unwrap();
        assert!(matches!(artist, CollectionContext::Artist { id } if id == "a1"));

        let album: CollectionContext =
            serde_json::from_str(r#"{"kind":"album","id":"b1"}"#).unwrap();
        assert!(matches!(album, CollectionContext::Album { id } if id == "b1"));
    }

    #[test]
    fn search_kinds_map_to_request_types() {
        for (kind, expected) in [
            (SearchKind::Track, "track"),
            (SearchKind::Artist, "artist"),
            (SearchKind::Album, "album"),
            (SearchKind::Playlist, "playlist"),
        ] {
            assert_eq!(kind.as_type(), expected);
        }
    }
}
