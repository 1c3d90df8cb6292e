//! Dancify - browse, filter, tag and curate a Spotify library
//!
//! This library provides the core functionality for the Dancify server:
//! the collection view pipeline (filtering, sorting, slider configuration,
//! pagination), the persisted tag and preference stores, and the Spotify
//! Web API client used to fetch collections and write playlists back.

pub mod collection;
pub mod playlist;
pub mod preferences;
pub mod search;
pub mod server;
pub mod session;
pub mod spotify;
pub mod tags;
