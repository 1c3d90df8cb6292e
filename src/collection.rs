//! The in-memory track collection and the view pipeline that backs the
//! dashboard table: column definitions, text and range filtering, sorting,
//! range-slider configuration and sparse pagination.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::search::SearchTerms;
use crate::spotify::{AudioFeatures, SavedTrack};

/// Number of rows per rendered page.
pub const PAGE_SIZE: usize = 100;

/// Tick count above which slider marks are thinned to every other step.
const MARK_DENSITY_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
}

/// The closed set of known collection columns. Capability flags (filterable,
/// graphable, slider step) live here rather than being synthesized from
/// runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Track,
    Artist,
    Album,
    Tags,
    Duration,
    Added,
    Release,
    Popularity,
    Danceability,
    Energy,
    Tempo,
    TimeSignature,
    Key,
    Loudness,
    Mode,
    Valence,
    Acousticness,
    Instrumentalness,
    Liveness,
    Speechiness,
}

impl Column {
    pub const ALL: [Column; 21] = [
        Column::Id,
        Column::Track,
        Column::Artist,
        Column::Album,
        Column::Tags,
        Column::Duration,
        Column::Added,
        Column::Release,
        Column::Popularity,
        Column::Danceability,
        Column::Energy,
        Column::Tempo,
        Column::TimeSignature,
        Column::Key,
        Column::Loudness,
        Column::Mode,
        Column::Valence,
        Column::Acousticness,
        Column::Instrumentalness,
        Column::Liveness,
        Column::Speechiness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Track => "Track",
            Column::Artist => "Artist",
            Column::Album => "Album",
            Column::Tags => "Tags",
            Column::Duration => "Duration",
            Column::Added => "Added",
            Column::Release => "Release",
            Column::Popularity => "Popularity",
            Column::Danceability => "Danceability",
            Column::Energy => "Energy",
            Column::Tempo => "Tempo",
            Column::TimeSignature => "Time Signature",
            Column::Key => "Key",
            Column::Loudness => "Loudness",
            Column::Mode => "Mode",
            Column::Valence => "Valence",
            Column::Acousticness => "Acousticness",
            Column::Instrumentalness => "Instrumentalness",
            Column::Liveness => "Liveness",
            Column::Speechiness => "Speechiness",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Id
            | Column::Track
            | Column::Artist
            | Column::Album
            | Column::Tags
            | Column::Added => ColumnKind::Text,
            _ => ColumnKind::Numeric,
        }
    }

    /// Text columns eligible for search-term filtering.
    pub fn filterable(self) -> bool {
        matches!(
            self,
            Column::Track | Column::Artist | Column::Album | Column::Tags
        )
    }

    /// Slider step size for columns eligible for range filtering and
    /// histogram display. `None` for everything else.
    pub fn step(self) -> Option<f64> {
        match self {
            Column::Duration => Some(15.0),
            Column::Release => Some(1.0),
            Column::Popularity => Some(5.0),
            Column::Tempo => Some(10.0),
            Column::Key => Some(1.0),
            Column::Loudness => Some(5.0),
            Column::Mode => Some(1.0),
            Column::Danceability
            | Column::Energy
            | Column::Valence
            | Column::Acousticness
            | Column::Instrumentalness
            | Column::Liveness
            | Column::Speechiness => Some(0.05),
            _ => None,
        }
    }

    pub fn graphable(self) -> bool {
        self.step().is_some()
    }
}

/// One row of the collection. The track id is stable across fetches and is
/// the join key between metadata, audio features and tags. `tags` is a
/// render-time overlay, never persisted on the record.
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub added: String,
    pub release_year: f64,
    pub popularity: f64,
    pub duration_secs: f64,
    pub danceability: f64,
    pub energy: f64,
    pub tempo: f64,
    pub time_signature: f64,
    pub key: f64,
    pub loudness: f64,
    pub mode: f64,
    pub valence: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    pub tags: String,
}

impl Track {
    /// Build a row from a fetched library/playlist item and its audio
    /// features. Items without a track object (removed from the service) or
    /// without an id (local files) yield `None`. Missing features default
    /// to zero.
    pub fn from_parts(saved: &SavedTrack, features: Option<&AudioFeatures>) -> Option<Track> {
        let track = saved.track.as_ref()?;
        let id = track.id.clone()?;

        let artists = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        // Release dates arrive with year, month or day precision; only the
        // year is kept for filtering.
        let release_year = track
            .album
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<f64>().ok())
            .unwrap_or(0.0);

        let f = features;
        Some(Track {
            id,
            title: track.name.clone(),
            artists,
            album: track.album.name.clone(),
            added: saved.added_at.clone().unwrap_or_default(),
            release_year,
            popularity: track.popularity.unwrap_or(0) as f64,
            duration_secs: track.duration_ms as f64 / 1000.0,
            danceability: f.map(|f| f.danceability).unwrap_or(0.0),
            energy: f.map(|f| f.energy).unwrap_or(0.0),
            tempo: f.map(|f| f.tempo).unwrap_or(0.0),
            time_signature: f.map(|f| f.time_signature as f64).unwrap_or(0.0),
            key: f.map(|f| f.key as f64).unwrap_or(0.0),
            loudness: f.map(|f| f.loudness).unwrap_or(0.0),
            mode: f.map(|f| f.mode as f64).unwrap_or(0.0),
            valence: f.map(|f| f.valence).unwrap_or(0.0),
            acousticness: f.map(|f| f.acousticness).unwrap_or(0.0),
            instrumentalness: f.map(|f| f.instrumentalness).unwrap_or(0.0),
            liveness: f.map(|f| f.liveness).unwrap_or(0.0),
            speechiness: f.map(|f| f.speechiness).unwrap_or(0.0),
            tags: String::new(),
        })
    }

    pub fn text_value(&self, column: Column) -> Option<&str> {
        match column {
            Column::Id => Some(&self.id),
            Column::Track => Some(&self.title),
            Column::Artist => Some(&self.artists),
            Column::Album => Some(&self.album),
            Column::Tags => Some(&self.tags),
            Column::Added => Some(&self.added),
            _ => None,
        }
    }

    pub fn numeric_value(&self, column: Column) -> Option<f64> {
        match column {
            Column::Duration => Some(self.duration_secs),
            Column::Release => Some(self.release_year),
            Column::Popularity => Some(self.popularity),
            Column::Danceability => Some(self.danceability),
            Column::Energy => Some(self.energy),
            Column::Tempo => Some(self.tempo),
            Column::TimeSignature => Some(self.time_signature),
            Column::Key => Some(self.key),
            Column::Loudness => Some(self.loudness),
            Column::Mode => Some(self.mode),
            Column::Valence => Some(self.valence),
            Column::Acousticness => Some(self.acousticness),
            Column::Instrumentalness => Some(self.instrumentalness),
            Column::Liveness => Some(self.liveness),
            Column::Speechiness => Some(self.speechiness),
            _ => None,
        }
    }

    pub fn display_value(&self, column: Column) -> Value {
        match self.text_value(column) {
            Some(text) => Value::String(text.to_string()),
            None => match self.numeric_value(column) {
                Some(n) => json!(n),
                None => Value::Null,
            },
        }
    }
}

/// Render a page of rows as column-name → value maps in the given column
/// order.
pub fn render_rows(tracks: &[Track], columns: &[Column]) -> Vec<Map<String, Value>> {
    tracks
        .iter()
        .map(|track| {
            columns
                .iter()
                .map(|&col| (col.name().to_string(), track.display_value(col)))
                .collect()
        })
        .collect()
}

/// Apply text filters (conjunctive across columns) and then inclusive
/// numeric range filters against the full unfiltered collection. Filters on
/// non-filterable/non-graphable columns are ignored.
pub fn apply_filters(
    tracks: &[Track],
    text_filters: &[(Column, SearchTerms)],
    ranges: &[(Column, (f64, f64))],
) -> Vec<Track> {
    tracks
        .iter()
        .filter(|track| {
            text_filters.iter().all(|(column, terms)| {
                if !column.filterable() || terms.is_empty() {
                    return true;
                }
                terms.matches(track.text_value(*column).unwrap_or(""))
            })
        })
        .filter(|track| {
            ranges.iter().all(|(column, (lo, hi))| {
                if !column.graphable() {
                    return true;
                }
                match track.numeric_value(*column) {
                    Some(v) => *lo <= v && v <= *hi,
                    None => true,
                }
            })
        })
        .cloned()
        .collect()
}

/// Sort in place: case-insensitive lexicographic for text columns, numeric
/// total order otherwise.
pub fn sort_tracks(tracks: &mut [Track], column: Column, ascending: bool) {
    match column.kind() {
        ColumnKind::Text => {
            tracks.sort_by(|a, b| {
                let ka = a.text_value(column).unwrap_or("").to_lowercase();
                let kb = b.text_value(column).unwrap_or("").to_lowercase();
                ka.cmp(&kb)
            });
        }
        ColumnKind::Numeric => {
            tracks.sort_by(|a, b| {
                let ka = a.numeric_value(column).unwrap_or(0.0);
                let kb = b.numeric_value(column).unwrap_or(0.0);
                ka.total_cmp(&kb)
            });
        }
    }
    if !ascending {
        tracks.reverse();
    }
}

/// Range-slider configuration for one graphable column.
#[derive(Debug, Clone, Serialize)]
pub struct SliderConfig {
    pub column: String,
    pub min: f64,
    pub max: f64,
    pub value: [f64; 2],
    pub step: f64,
    pub marks: Vec<f64>,
}

/// Compute slider bounds snapped outward to step multiples, so every value
/// in the series is representable, plus tick marks from min to max
/// inclusive. Returns `None` for non-graphable columns and empty series.
pub fn slider_config(column: Column, series: &[f64]) -> Option<SliderConfig> {
    let step = column.step()?;
    let mut values = series.iter().copied().filter(|v| v.is_finite());
    let first = values.next()?;
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let min = (lo / step).floor() * step;
    let max = (hi / step).ceil() * step;

    let ticks = ((max - min) / step).round() as usize;
    let stride = if ticks > MARK_DENSITY_LIMIT { 2 } else { 1 };
    let mut marks: Vec<f64> = (0..=ticks)
        .step_by(stride)
        .map(|i| min + i as f64 * step)
        .collect();
    if marks.last() != Some(&max) {
        marks.push(max);
    }

    Some(SliderConfig {
        column: column.name().to_string(),
        min,
        max,
        value: [min, max],
        step,
        marks,
    })
}

/// Sparse page-navigation points: a base-2 logarithmic spread downward and
/// upward from the current page, plus the first page, the last page and the
/// immediate neighbors. Sorted, deduplicated, all within `[1, pages]`.
pub fn navpoints(page: usize, pages: usize) -> Vec<usize> {
    let pages = pages.max(1) as i64;
    let page = (page as i64).clamp(1, pages);

    let mut points = std::collections::BTreeSet::new();
    points.insert(1);
    points.insert(pages);
    points.insert((page - 1).max(1));
    points.insert((page + 1).min(pages));

    for step in logspread(page) {
        points.insert((page + 1 - step).clamp(1, pages));
    }
    for step in logspread(pages - page) {
        points.insert((page - 1 + step).clamp(1, pages));
    }

    points.into_iter().map(|p| p as usize).collect()
}

/// Six points spread as powers of two from 1 up to `span`. Both directions
/// start at step 1 (the current page), so together with the four fixed
/// points the navpoint set never exceeds fifteen entries.
fn logspread(span: i64) -> impl Iterator<Item = i64> {
    let end = (span.max(1) as f64).log2();
    (0..6).map(move |i| 2f64.powf(end * i as f64 / 5.0).round() as i64)
}

/// Clamp the requested page and slice out its rows.
pub fn paginate(tracks: &[Track], page: usize) -> (usize, usize, &[Track]) {
    let pages = tracks.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.clamp(1, pages);
    let start = (page - 1) * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(tracks.len());
    (page, pages, &tracks[start..end])
}

/// Overlay persisted tags onto the collection as the synthesized Tags
/// column, comma-joined in sorted order.
pub fn merge_tags(
    tracks: &mut [Track],
    tag_map: &HashMap<String, std::collections::BTreeSet<String>>,
) {
    for track in tracks.iter_mut() {
        track.tags = tag_map
            .get(&track.id)
            .map(|tags| tags.iter().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str, artists: &str, tempo: f64) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            artists: artists.to_string(),
            album: String::new(),
            added: String::new(),
            release_year: 2000.0,
            popularity: 50.0,
            duration_secs: 200.0,
            danceability: 0.5,
            energy: 0.5,
            tempo,
            time_signature: 4.0,
            key: 0.0,
            loudness: -10.0,
            mode: 1.0,
            valence: 0.5,
            acousticness: 0.5,
            instrumentalness: 0.5,
            liveness: 0.5,
            speechiness: 0.5,
            tags: String::new(),
        }
    }

    #[test]
    fn column_names_round_trip() {
        for column in Column::ALL {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name("Nope"), None);
    }

    #[test]
    fn filterable_and_graphable_are_disjoint() {
        for column in Column::ALL {
            assert!(!(column.filterable() && column.graphable()));
        }
    }

    #[test]
    fn text_filter_keeps_only_matching_rows() {
        let tracks = vec![
            track("1", "Help!", "The Beatles", 120.0),
            track("2", "Satisfaction", "The Rolling Stones", 130.0),
            track("3", "Let It Be", "The Beatles", 75.0),
        ];
        let filters = vec![(Column::Artist, SearchTerms::parse("+beatles"))];
        let kept = apply_filters(&tracks, &filters, &[]);
        assert_eq!(kept.len(), 2);
        for t in &kept {
            assert!(t.artists.to_lowercase().contains("beatles"));
        }
    }

    #[test]
    fn range_filter_is_inclusive_and_idempotent() {
        let tracks: Vec<Track> = (0..50)
            .map(|i| track(&i.to_string(), "t", "a", 90.0 + 2.0 * i as f64))
            .collect();
        let ranges = vec![(Column::Tempo, (100.0, 140.0))];
        let kept = apply_filters(&tracks, &[], &ranges);
        assert!(!kept.is_empty());
        for t in &kept {
            assert!(t.tempo >= 100.0 && t.tempo <= 140.0);
        }
        // Boundary values survive.
        assert!(kept.iter().any(|t| t.tempo == 100.0));
        assert!(kept.iter().any(|t| t.tempo == 140.0));

        let again = apply_filters(&kept, &[], &ranges);
        assert_eq!(again.len(), kept.len());
    }

    #[test]
    fn filters_combine_conjunctively() {
        let tracks = vec![
            track("1", "Help!", "The Beatles", 120.0),
            track("2", "Let It Be", "The Beatles", 75.0),
        ];
        let filters = vec![(Column::Artist, SearchTerms::parse("beatles"))];
        let ranges = vec![(Column::Tempo, (100.0, 140.0))];
        let kept = apply_filters(&tracks, &filters, &ranges);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
    }

    #[test]
    fn sort_text_is_case_insensitive() {
        let mut tracks = vec![
            track("1", "yesterday", "a", 0.0),
            track("2", "Abbey Road", "a", 0.0),
            track("3", "help!", "a", 0.0),
        ];
        sort_tracks(&mut tracks, Column::Track, true);
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Abbey Road", "help!", "yesterday"]);

        sort_tracks(&mut tracks, Column::Track, false);
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["yesterday", "help!", "Abbey Road"]);
    }

    #[test]
    fn sort_numeric_orders_by_value() {
        let mut tracks = vec![
            track("1", "a", "x", 130.0),
            track("2", "b", "x", 90.0),
            track("3", "c", "x", 110.0),
        ];
        sort_tracks(&mut tracks, Column::Tempo, true);
        let tempos: Vec<f64> = tracks.iter().map(|t| t.tempo).collect();
        assert_eq!(tempos, vec![90.0, 110.0, 130.0]);
    }

    #[test]
    fn slider_bounds_bracket_series_on_step_multiples() {
        let series = vec![103.0, 121.5, 138.2];
        let config = slider_config(Column::Tempo, &series).unwrap();
        assert_eq!(config.min, 100.0);
        assert_eq!(config.max, 140.0);
        assert_eq!(config.value, [100.0, 140.0]);
        assert!(config.min <= 103.0 && config.max >= 138.2);
        assert_eq!(config.marks.first(), Some(&100.0));
        assert_eq!(config.marks.last(), Some(&140.0));
    }

    #[test]
    fn slider_fractional_step_bounds_are_step_multiples() {
        let series = vec![0.13, 0.68, 0.42];
        let config = slider_config(Column::Danceability, &series).unwrap();
        let step = 0.05;
        assert!(((config.min / step).round() * step - config.min).abs() < 1e-9);
        assert!(((config.max / step).round() * step - config.max).abs() < 1e-9);
        assert!(config.min <= 0.13 && config.max >= 0.68);
    }

    #[test]
    fn slider_collapses_for_single_value_series() {
        let series = vec![120.0];
        let config = slider_config(Column::Tempo, &series).unwrap();
        assert_eq!(config.min, 120.0);
        assert_eq!(config.max, 120.0);
        assert_eq!(config.marks, vec![120.0]);
    }

    #[test]
    fn slider_rejects_non_graphable_and_empty() {
        assert!(slider_config(Column::Artist, &[1.0]).is_none());
        assert!(slider_config(Column::Tempo, &[]).is_none());
    }

    #[test]
    fn navpoints_single_page() {
        assert_eq!(navpoints(1, 1), vec![1]);
    }

    #[test]
    fn navpoints_middle_of_large_range() {
        let points = navpoints(50, 100);
        for expected in [1, 49, 50, 51, 100] {
            assert!(points.contains(&expected), "missing {expected}");
        }
        assert!(points.len() <= 15);
        assert!(points.iter().all(|&p| (1..=100).contains(&p)));
        assert!(points.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn navpoints_stays_within_budget_deep_into_large_collections() {
        // Pages large enough that neither spread lands on page +/- 1 by
        // itself; the fixed neighbor points must not push past the budget.
        for (page, pages) in [(725, 2000), (1000, 10_000), (1000, 100_000), (5000, 50_000)] {
            let points = navpoints(page, pages);
            assert!(points.len() <= 15, "({page},{pages}) -> {points:?}");
            for expected in [1, page - 1, page, page + 1, pages] {
                assert!(points.contains(&expected), "({page},{pages}) missing {expected}");
            }
            assert!(points.iter().all(|&p| (1..=pages).contains(&p)));
            assert!(points.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn navpoints_clamps_out_of_range_page() {
        let points = navpoints(500, 10);
        assert!(points.contains(&1));
        assert!(points.contains(&10));
        assert!(points.iter().all(|&p| (1..=10).contains(&p)));
    }

    #[test]
    fn paginate_clamps_and_slices() {
        let tracks: Vec<Track> = (0..250)
            .map(|i| track(&i.to_string(), "t", "a", 100.0))
            .collect();
        let (page, pages, rows) = paginate(&tracks, 3);
        assert_eq!(page, 3);
        assert_eq!(pages, 3);
        assert_eq!(rows.len(), 50);

        let (page, _, rows) = paginate(&tracks, 99);
        assert_eq!(page, 3);
        assert_eq!(rows.len(), 50);

        let (page, pages, rows) = paginate(&[], 1);
        assert_eq!((page, pages), (1, 1));
        assert!(rows.is_empty());
    }

    #[test]
    fn merge_tags_joins_sorted() {
        let mut tracks = vec![track("1", "t", "a", 0.0), track("2", "t", "a", 0.0)];
        let mut map = HashMap::new();
        let mut set = std::collections::BTreeSet::new();
        set.insert("swing".to_string());
        set.insert("fast".to_string());
        map.insert("1".to_string(), set);
        merge_tags(&mut tracks, &map);
        assert_eq!(tracks[0].tags, "fast, swing");
        assert_eq!(tracks[1].tags, "");
    }
}
