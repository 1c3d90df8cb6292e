//! Spotify Web API client: OAuth2 authorization-code flow, paginated
//! library/playlist fetches accumulated client-side, batched audio-feature
//! lookups and chunked playlist mutations.
//!
//! A client is constructed per request from the session's current access
//! token over a shared HTTP connection pool. There is no caching and no
//! retry policy, so transport failures propagate to the caller.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum ids per audio-features request and per playlist mutation request.
pub const BATCH_LIMIT: usize = 100;

/// OAuth scopes the application needs.
const SCOPE: &str = "user-library-read playlist-read-private playlist-modify-private";

/// Refresh tokens that expire within this many seconds of now.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Application credentials and the redirect endpoint registered with the
/// service.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// An access token with its refresh token and absolute expiry time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl TokenInfo {
    pub fn expires_soon(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

impl SpotifyConfig {
    /// The URL users are redirected to for consent.
    pub fn authorize_url(&self) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &format!("{ACCOUNTS_BASE}/authorize"),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", SCOPE),
                ("show_dialog", "true"),
            ],
        )
        .context("Failed to build authorize URL")?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access + refresh token pair.
    pub async fn exchange_code(&self, http: &reqwest::Client, code: &str) -> Result<TokenInfo> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
        ];
        let response = self
            .token_request(http, &params)
            .await
            .context("Failed to exchange authorization code")?;
        let refresh_token = response
            .refresh_token
            .context("Token response carried no refresh token")?;
        Ok(TokenInfo {
            access_token: response.access_token,
            refresh_token,
            expires_at: Utc::now().timestamp() + response.expires_in,
        })
    }

    /// Refresh an expired or expiring token. The service may omit the
    /// refresh token from the response, in which case the old one stays
    /// valid.
    pub async fn refresh(&self, http: &reqwest::Client, token: &TokenInfo) -> Result<TokenInfo> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_str()),
        ];
        let response = self
            .token_request(http, &params)
            .await
            .context("Failed to refresh access token")?;
        Ok(TokenInfo {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| token.refresh_token.clone()),
            expires_at: Utc::now().timestamp() + response.expires_in,
        })
    }

    async fn token_request(
        &self,
        http: &reqwest::Client,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let credentials = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = http
            .post(format!("{ACCOUNTS_BASE}/api/token"))
            .header(reqwest::header::AUTHORIZATION, format!("Basic {credentials}"))
            .form(params)
            .send()
            .await
            .context("Token endpoint request failed")?
            .error_for_status()
            .context("Token endpoint rejected the request")?;
        response
            .json::<TokenResponse>()
            .await
            .context("Failed to decode token response")
    }
}

// ---------- API models ----------

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavedTrack {
    pub added_at: Option<String>,
    // Playlist entries can reference tracks that no longer exist.
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    // Local files have no id.
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
    pub duration_ms: i64,
    pub popularity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    pub name: String,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner: OwnerRef,
    pub tracks: Option<TracksRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerRef {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracksRef {
    pub total: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistProfile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumDetail {
    pub id: String,
    pub name: String,
    pub release_date: Option<String>,
}

// Track listings under /albums/{id}/tracks carry no album or popularity
// fields of their own.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumTrack {
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub release_date: Option<String>,
}

/// Matches for a search query, grouped by entity kind. Kinds the query did
/// not ask for come back empty.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub tracks: Vec<TrackObject>,
    pub artists: Vec<ArtistProfile>,
    pub albums: Vec<AlbumSummary>,
    pub playlists: Vec<PlaylistSummary>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<SearchPage<TrackObject>>,
    artists: Option<SearchPage<ArtistProfile>>,
    albums: Option<SearchPage<AlbumSummary>>,
    playlists: Option<SearchPage<PlaylistSummary>>,
}

// Search pages pad unavailable entries with nulls.
#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    items: Vec<Option<T>>,
}

impl<T> SearchPage<T> {
    fn into_items(self) -> Vec<T> {
        self.items.into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    pub danceability: f64,
    pub energy: f64,
    pub tempo: f64,
    pub key: i64,
    pub loudness: f64,
    pub mode: i64,
    pub valence: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    pub time_signature: i64,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    // Unknown ids come back as nulls.
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    snapshot_id: String,
}

// ---------- Client ----------

/// A per-request API client bound to one access token. The HTTP client is
/// a shared handle, so requests reuse the process-wide connection pool.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    token: String,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, access_token: &str) -> Self {
        Self {
            http,
            token: access_token.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }

    /// Follow `next` links until the final page, accumulating items.
    async fn get_all_pages<T: serde::de::DeserializeOwned>(&self, first_url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut url = Some(first_url.to_string());
        while let Some(current) = url {
            let page: Page<T> = self.get_json(&current).await?;
            items.extend(page.items);
            url = page.next;
        }
        Ok(items)
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get_json(&format!("{API_BASE}/me")).await
    }

    /// All tracks saved in the user's library.
    pub async fn saved_tracks(&self) -> Result<Vec<SavedTrack>> {
        self.get_all_pages(&format!("{API_BASE}/me/tracks?limit=50"))
            .await
    }

    /// All playlists the user follows or owns.
    pub async fn current_user_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        self.get_all_pages(&format!("{API_BASE}/me/playlists?limit=50"))
            .await
    }

    pub async fn playlist_meta(&self, playlist_id: &str) -> Result<PlaylistSummary> {
        self.get_json(&format!(
            "{API_BASE}/playlists/{playlist_id}?fields=id,name,owner,tracks.total"
        ))
        .await
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<SavedTrack>> {
        self.get_all_pages(&format!(
            "{API_BASE}/playlists/{playlist_id}/tracks?limit=100"
        ))
        .await
    }

    pub async fn artist(&self, artist_id: &str) -> Result<ArtistProfile> {
        self.get_json(&format!("{API_BASE}/artists/{artist_id}"))
            .await
    }

    /// An artist's most popular tracks, with the market resolved from the
    /// access token. The endpoint caps the listing at ten tracks.
    pub async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<SavedTrack>> {
        #[derive(Deserialize)]
        struct TopTracks {
            tracks: Vec<TrackObject>,
        }
        let top: TopTracks = self
            .get_json(&format!(
                "{API_BASE}/artists/{artist_id}/top-tracks?market=from_token"
            ))
            .await?;
        Ok(top
            .tracks
            .into_iter()
            .map(|track| SavedTrack {
                added_at: None,
                track: Some(track),
            })
            .collect())
    }

    pub async fn album(&self, album_id: &str) -> Result<AlbumDetail> {
        self.get_json(&format!("{API_BASE}/albums/{album_id}")).await
    }

    /// All tracks on an album, rebuilt into full track objects from the
    /// album's own metadata.
    pub async fn album_tracks(&self, album: &AlbumDetail) -> Result<Vec<SavedTrack>> {
        let tracks: Vec<AlbumTrack> = self
            .get_all_pages(&format!("{API_BASE}/albums/{}/tracks?limit=50", album.id))
            .await?;
        Ok(album_saved_tracks(album, tracks))
    }

    /// Search for entities of the requested kinds, up to twenty per kind.
    /// `types` is a comma-separated list such as `"track,album"`.
    pub async fn search(&self, query: &str, types: &str) -> Result<SearchResults> {
        let url = reqwest::Url::parse_with_params(
            &format!("{API_BASE}/search"),
            &[("q", query), ("type", types), ("limit", "20")],
        )
        .context("Failed to build search URL")?;
        let response: SearchResponse = self.get_json(url.as_str()).await?;
        Ok(SearchResults {
            tracks: response.tracks.map(SearchPage::into_items).unwrap_or_default(),
            artists: response.artists.map(SearchPage::into_items).unwrap_or_default(),
            albums: response.albums.map(SearchPage::into_items).unwrap_or_default(),
            playlists: response
                .playlists
                .map(SearchPage::into_items)
                .unwrap_or_default(),
        })
    }

    /// Audio features for up to `BATCH_LIMIT` ids per request, keyed by
    /// track id. Ids the service does not know are absent from the result.
    pub async fn audio_features(&self, ids: &[String]) -> Result<HashMap<String, AudioFeatures>> {
        let mut features = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_LIMIT) {
            let url = format!("{API_BASE}/audio-features?ids={}", chunk.join(","));
            let response: AudioFeaturesResponse = self.get_json(&url).await?;
            for f in response.audio_features.into_iter().flatten() {
                features.insert(f.id.clone(), f);
            }
        }
        Ok(features)
    }

    /// Create a private playlist for the user.
    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<PlaylistSummary> {
        let url = format!("{API_BASE}/users/{user_id}/playlists");
        let body = json!({
            "name": name,
            "public": false,
            "description": description,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .context("Playlist creation was rejected")?;
        response
            .json::<PlaylistSummary>()
            .await
            .context("Failed to decode created playlist")
    }

    /// Overwrite a playlist's contents with up to `BATCH_LIMIT` tracks.
    pub async fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<String> {
        let body = json!({ "uris": track_uris(track_ids) });
        self.mutate_playlist(playlist_id, reqwest::Method::PUT, body)
            .await
    }

    /// Append up to `BATCH_LIMIT` tracks to a playlist.
    pub async fn add_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<String> {
        let body = json!({ "uris": track_uris(track_ids) });
        self.mutate_playlist(playlist_id, reqwest::Method::POST, body)
            .await
    }

    /// Remove all occurrences of up to `BATCH_LIMIT` tracks from a playlist.
    pub async fn remove_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<String> {
        let tracks: Vec<_> = track_uris(track_ids)
            .into_iter()
            .map(|uri| json!({ "uri": uri }))
            .collect();
        let body = json!({ "tracks": tracks });
        self.mutate_playlist(playlist_id, reqwest::Method::DELETE, body)
            .await
    }

    async fn mutate_playlist(
        &self,
        playlist_id: &str,
        method: reqwest::Method,
        body: serde_json::Value,
    ) -> Result<String> {
        let url = format!("{API_BASE}/playlists/{playlist_id}/tracks");
        let response = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{method} {url} returned an error status"))?;
        let snapshot = response
            .json::<SnapshotResponse>()
            .await
            .context("Failed to decode mutation snapshot")?;
        Ok(snapshot.snapshot_id)
    }
}

/// Album track listings omit the album reference and popularity; fill them
/// in from the album detail so the tracks render like library entries.
fn album_saved_tracks(album: &AlbumDetail, tracks: Vec<AlbumTrack>) -> Vec<SavedTrack> {
    tracks
        .into_iter()
        .map(|track| SavedTrack {
            added_at: None,
            track: Some(TrackObject {
                id: track.id,
                name: track.name,
                artists: track.artists,
                album: AlbumRef {
                    name: album.name.clone(),
                    release_date: album.release_date.clone(),
                },
                duration_ms: track.duration_ms,
                popularity: None,
            }),
        })
        .collect()
}

fn track_uris(track_ids: &[String]) -> Vec<String> {
    track_ids
        .iter()
        .map(|id| format!("spotify:track:{id}"))
        .collect()
}
