//! Persisted per-user per-track tags.
//!
//! A row's presence means "this user has applied this tag to this track";
//! removal is row deletion. The composite primary key makes adds idempotent.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

// SQLite caps bound parameters well above this.
const SELECT_CHUNK: usize = 500;

#[derive(Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    /// Open (and create if missing) the tag database.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await.with_context(|| {
            format!("Failed to connect to tag database at: {}", db_path.display())
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                user_id TEXT NOT NULL,
                song_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (user_id, song_id, tag)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create tags table")?;

        tracing::info!("Tag database initialized: {}", db_path.display());

        Ok(Self { pool })
    }

    /// Canonical form of a tag: lowercase, trimmed, commas stripped (the
    /// comma is the tag-list delimiter and must not appear inside a tag).
    /// An empty result means the tag is unusable.
    pub fn canonicalize(tag: &str) -> String {
        tag.replace(',', "").trim().to_lowercase()
    }

    /// Tags for one user restricted to the given track ids, keyed by track
    /// id. Tracks with no tags are absent from the map.
    pub async fn tags_for_tracks(
        &self,
        user_id: &str,
        track_ids: &[String],
    ) -> Result<HashMap<String, BTreeSet<String>>> {
        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
        for chunk in track_ids.chunks(SELECT_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT song_id, tag FROM tags WHERE user_id = ? AND song_id IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(user_id);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch tags")?;
            for (song_id, tag) in rows {
                map.entry(song_id).or_default().insert(tag);
            }
        }
        Ok(map)
    }

    /// Apply a tag to every target track that lacks it. Returns the number
    /// of tracks the tag was newly applied to.
    pub async fn add_tag(&self, user_id: &str, tag: &str, track_ids: &[String]) -> Result<usize> {
        let tag = Self::canonicalize(tag);
        if tag.is_empty() {
            return Ok(0);
        }

        let mut applied = 0;
        for track_id in track_ids {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO tags (user_id, song_id, tag) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(track_id)
            .bind(&tag)
            .execute(&self.pool)
            .await
            .context("Failed to insert tag")?;
            applied += result.rows_affected() as usize;
        }

        tracing::debug!("Applied tag '{}' to {} tracks for {}", tag, applied, user_id);
        Ok(applied)
    }

    /// Remove a tag from every target track, whether or not it was present.
    /// Returns the number of tracks it was actually removed from.
    pub async fn remove_tag(
        &self,
        user_id: &str,
        tag: &str,
        track_ids: &[String],
    ) -> Result<usize> {
        let tag = Self::canonicalize(tag);
        if tag.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        for track_id in track_ids {
            let result =
                sqlx::query("DELETE FROM tags WHERE user_id = ? AND song_id = ? AND tag = ?")
                    .bind(user_id)
                    .bind(track_id)
                    .bind(&tag)
                    .execute(&self.pool)
                    .await
                    .context("Failed to delete tag")?;
            removed += result.rows_affected() as usize;
        }

        tracing::debug!(
            "Removed tag '{}' from {} tracks for {}",
            tag,
            removed,
            user_id
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_and_strips_commas() {
        assert_eq!(TagStore::canonicalize("  Swing, Fast "), "swing fast");
        assert_eq!(TagStore::canonicalize("LINDY"), "lindy");
        assert_eq!(TagStore::canonicalize(" ,, "), "");
    }
}
