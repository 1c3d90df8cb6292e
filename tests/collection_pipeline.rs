//! End-to-end exercise of the view pipeline: filter a collection by artist
//! search terms, narrow with a tempo range, then sort and paginate.

use dancify::collection::{
    Column, PAGE_SIZE, Track, apply_filters, navpoints, paginate, render_rows, slider_config,
    sort_tracks,
};
use dancify::search::SearchTerms;

fn track(i: usize, title: &str, artists: &str, tempo: f64) -> Track {
    Track {
        id: format!("id{i}"),
        title: title.to_string(),
        artists: artists.to_string(),
        album: "Album".to_string(),
        added: "2024-01-01T00:00:00Z".to_string(),
        release_year: 1965.0,
        popularity: 60.0,
        duration_secs: 180.0,
        danceability: 0.6,
        energy: 0.7,
        tempo,
        time_signature: 4.0,
        key: 2.0,
        loudness: -8.0,
        mode: 1.0,
        valence: 0.5,
        acousticness: 0.3,
        instrumentalness: 0.1,
        liveness: 0.2,
        speechiness: 0.05,
        tags: String::new(),
    }
}

/// A 250-track collection: every third track is by The Beatles, tempos
/// spread from 60 upward.
fn collection() -> Vec<Track> {
    (0..250)
        .map(|i| {
            let artist = if i % 3 == 0 {
                "The Beatles"
            } else {
                "The Rolling Stones"
            };
            let title = format!("{}ong {:03}", if i % 2 == 0 { "S" } else { "s" }, i);
            track(i, &title, artist, 60.0 + i as f64)
        })
        .collect()
}

#[test]
fn filter_then_range_then_sort() {
    let tracks = collection();

    let filters = vec![(Column::Artist, SearchTerms::parse("+beatles"))];
    let ranges = vec![(Column::Tempo, (100.0, 140.0))];
    let mut view = apply_filters(&tracks, &filters, &ranges);

    assert!(!view.is_empty());
    for t in &view {
        assert!(t.artists.to_lowercase().contains("beatles"));
        assert!(t.tempo >= 100.0 && t.tempo <= 140.0);
    }

    sort_tracks(&mut view, Column::Track, true);
    let keys: Vec<String> = view.iter().map(|t| t.title.to_lowercase()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn pagination_covers_the_whole_collection() {
    let tracks = collection();
    let (page, pages, rows) = paginate(&tracks, 1);
    assert_eq!(page, 1);
    assert_eq!(pages, 3);
    assert_eq!(rows.len(), PAGE_SIZE);

    let (_, _, last_rows) = paginate(&tracks, 3);
    assert_eq!(last_rows.len(), 50);

    let nav = navpoints(2, pages);
    assert!(nav.contains(&1) && nav.contains(&2) && nav.contains(&3));
}

#[test]
fn sliders_from_the_unfiltered_collection_bracket_every_value() {
    let tracks = collection();
    let series: Vec<f64> = tracks.iter().map(|t| t.tempo).collect();
    let config = slider_config(Column::Tempo, &series).unwrap();

    let lo = series.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!(config.min <= lo);
    assert!(config.max >= hi);
    assert_eq!(config.min % config.step, 0.0);
    assert_eq!(config.max % config.step, 0.0);
}

#[test]
fn rendered_rows_follow_the_column_order() {
    let tracks = collection();
    let columns = [Column::Track, Column::Artist, Column::Tempo];
    let rows = render_rows(&tracks[..5], &columns);

    assert_eq!(rows.len(), 5);
    for row in &rows {
        assert_eq!(row.len(), 3);
        assert!(row.contains_key("Track"));
        assert!(row.contains_key("Artist"));
        assert!(row["Tempo"].is_number());
    }
}
