//! Per-user column visibility preferences, stored as a comma-joined list of
//! column names. Storing names instead of a bitmask means no hidden coupling
//! to a column ordering; unknown names are dropped on decode.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::collection::Column;

/// Columns shown when the user has never saved a preference.
pub const DEFAULT_COLUMNS: [Column; 10] = [
    Column::Track,
    Column::Artist,
    Column::Album,
    Column::Tags,
    Column::Duration,
    Column::Release,
    Column::Popularity,
    Column::Danceability,
    Column::Energy,
    Column::Tempo,
];

#[derive(Clone)]
pub struct PreferenceStore {
    pool: SqlitePool,
}

impl PreferenceStore {
    /// Open (and create if missing) the preference database.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await.with_context(|| {
            format!(
                "Failed to connect to preference database at: {}",
                db_path.display()
            )
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                columns TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create preferences table")?;

        tracing::info!("Preference database initialized: {}", db_path.display());

        Ok(Self { pool })
    }

    /// The user's active column set, or the default when none is stored.
    pub async fn columns_for(&self, user_id: &str) -> Result<Vec<Column>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT columns FROM preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch preferences")?;

        match row {
            Some((encoded,)) => {
                let columns = decode_columns(&encoded);
                if columns.is_empty() {
                    Ok(DEFAULT_COLUMNS.to_vec())
                } else {
                    Ok(columns)
                }
            }
            None => Ok(DEFAULT_COLUMNS.to_vec()),
        }
    }

    /// Replace the user's active column set.
    pub async fn set_columns(&self, user_id: &str, columns: &[Column]) -> Result<()> {
        let encoded = encode_columns(columns);
        sqlx::query(
            r#"
            INSERT INTO preferences (user_id, columns) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET columns = excluded.columns
            "#,
        )
        .bind(user_id)
        .bind(&encoded)
        .execute(&self.pool)
        .await
        .context("Failed to store preferences")?;

        tracing::debug!("Stored column preferences for {}: {}", user_id, encoded);
        Ok(())
    }
}

fn encode_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_columns(encoded: &str) -> Vec<Column> {
    encoded
        .split(',')
        .filter_map(|name| Column::from_name(name.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let columns = vec![Column::Track, Column::Tempo, Column::TimeSignature];
        let encoded = encode_columns(&columns);
        assert_eq!(encoded, "Track,Tempo,Time Signature");
        assert_eq!(decode_columns(&encoded), columns);
    }

    #[test]
    fn decode_drops_unknown_names() {
        let columns = decode_columns("Track,Bogus,Tempo");
        assert_eq!(columns, vec![Column::Track, Column::Tempo]);
    }
}
