//! Playlist mutations against the external service.
//!
//! Each user gesture arrives as one explicit [`PlaylistAction`]; there is no
//! reconstruction of intent from click timestamps. Target playlists are
//! matched by exact name and ownership, and every mutation is chunked at
//! [`BATCH_LIMIT`] tracks per request. Recoverable outcomes ("Playlist not
//! found", "Playlist too long") come back as [`ApplyOutcome::Rejected`];
//! only transport failures surface as errors.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::spotify::{BATCH_LIMIT, SpotifyClient};

/// Hard cap on the resulting playlist length for the add action.
pub const MAX_PLAYLIST_TRACKS: usize = 10_000;

/// Description given to playlists this application creates.
pub const PLAYLIST_DESCRIPTION: &str = "Curated with Dancify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistAction {
    /// Full overwrite; creates the playlist if it does not exist.
    SaveAs,
    /// Append to an existing playlist.
    Add,
    /// Remove all occurrences of the tracks from an existing playlist.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { snapshot_id: String },
    Rejected { reason: String },
}

impl ApplyOutcome {
    fn rejected(reason: &str) -> Self {
        ApplyOutcome::Rejected {
            reason: reason.to_string(),
        }
    }
}

/// Resolve and apply one playlist action for the given user.
pub async fn apply_action(
    client: &SpotifyClient,
    user_id: &str,
    action: PlaylistAction,
    name: &str,
    track_ids: &[String],
) -> Result<ApplyOutcome> {
    let playlists = client.current_user_playlists().await?;
    let existing = playlists
        .iter()
        .find(|p| p.name == name && p.owner.id == user_id);

    match action {
        PlaylistAction::SaveAs => {
            let playlist = match existing {
                Some(p) => p.clone(),
                None => {
                    tracing::info!("Creating playlist '{}' for {}", name, user_id);
                    client
                        .create_playlist(user_id, name, PLAYLIST_DESCRIPTION)
                        .await?
                }
            };

            // Replace with the first chunk (an empty batch clears the
            // playlist), then append the rest.
            let mut chunks = track_ids.chunks(BATCH_LIMIT);
            let first = chunks.next().unwrap_or(&[]);
            let mut snapshot_id = client.replace_playlist_tracks(&playlist.id, first).await?;
            for chunk in chunks {
                snapshot_id = client.add_playlist_tracks(&playlist.id, chunk).await?;
            }
            Ok(ApplyOutcome::Applied { snapshot_id })
        }
        PlaylistAction::Add => {
            let Some(playlist) = existing else {
                return Ok(ApplyOutcome::rejected("Playlist not found"));
            };
            if track_ids.is_empty() {
                return Ok(ApplyOutcome::rejected("No tracks selected"));
            }
            let current = playlist
                .tracks
                .as_ref()
                .map(|t| t.total.max(0) as usize)
                .unwrap_or(0);
            if current + track_ids.len() > MAX_PLAYLIST_TRACKS {
                return Ok(ApplyOutcome::rejected("Playlist too long"));
            }

            let mut snapshot_id = String::new();
            for chunk in track_ids.chunks(BATCH_LIMIT) {
                snapshot_id = client.add_playlist_tracks(&playlist.id, chunk).await?;
            }
            Ok(ApplyOutcome::Applied { snapshot_id })
        }
        PlaylistAction::Remove => {
            let Some(playlist) = existing else {
                return Ok(ApplyOutcome::rejected("Playlist not found"));
            };
            if track_ids.is_empty() {
                return Ok(ApplyOutcome::rejected("No tracks selected"));
            }

            let mut snapshot_id = String::new();
            for chunk in track_ids.chunks(BATCH_LIMIT) {
                snapshot_id = client.remove_playlist_tracks(&playlist.id, chunk).await?;
            }
            Ok(ApplyOutcome::Applied { snapshot_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("track{i}")).collect()
    }

    #[test]
    fn batches_are_chunked_at_the_limit() {
        for n in [1, 99, 100, 101, 250, 300] {
            let batch = ids(n);
            let chunks: Vec<_> = batch.chunks(BATCH_LIMIT).collect();
            assert_eq!(chunks.len(), n.div_ceil(BATCH_LIMIT));
            let expected_last = if n % BATCH_LIMIT == 0 {
                BATCH_LIMIT
            } else {
                n % BATCH_LIMIT
            };
            assert_eq!(chunks.last().unwrap().len(), expected_last);
            assert!(chunks.iter().all(|c| c.len() <= BATCH_LIMIT));
        }
    }

    #[test]
    fn action_names_deserialize() {
        assert_eq!(
            serde_json::from_str::<PlaylistAction>("\"save_as\"").unwrap(),
            PlaylistAction::SaveAs
        );
        assert_eq!(
            serde_json::from_str::<PlaylistAction>("\"add\"").unwrap(),
            PlaylistAction::Add
        );
        assert_eq!(
            serde_json::from_str::<PlaylistAction>("\"remove\"").unwrap(),
            PlaylistAction::Remove
        );
    }
}
