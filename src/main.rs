use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dancify::preferences::PreferenceStore;
use dancify::server;
use dancify::spotify::SpotifyConfig;
use dancify::tags::TagStore;

#[derive(Parser)]
#[command(name = "dancify")]
#[command(about = "Dancify Server", long_about = None)]
struct Cli {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Directory for the tag and preference databases
    #[arg(short, long, env = "DANCIFY_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Spotify application client id
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    client_id: String,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET")]
    client_secret: String,

    /// OAuth redirect URL registered with Spotify
    #[arg(
        long,
        env = "SPOTIFY_REDIRECT_URL",
        default_value = "http://localhost:8080/auth/callback"
    )]
    redirect_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting Dancify");
    tracing::info!("Data directory: {}", cli.data_dir.display());

    let tags = TagStore::new(&cli.data_dir.join("tags.db"))
        .await
        .context("Failed to open tag database")?;
    let preferences = PreferenceStore::new(&cli.data_dir.join("preferences.db"))
        .await
        .context("Failed to open preference database")?;

    let spotify = SpotifyConfig {
        client_id: cli.client_id,
        client_secret: cli.client_secret,
        redirect_url: cli.redirect_url,
    };

    let app = server::create_router(spotify, tags, preferences);
    let addr = format!("{}:{}", cli.host, cli.port);

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /                 - API info");
    tracing::info!("  GET  /auth/login       - Start Spotify login");
    tracing::info!("  GET  /auth/logout      - End the session");
    tracing::info!("  GET  /preferences      - Active column set");
    tracing::info!("  POST /collection/view  - Filter/sort/paginate a collection");
    tracing::info!("  GET  /playlists        - List playlists");
    tracing::info!("  POST /playlists/apply  - Save-as/add/remove playlist tracks");
    tracing::info!("  POST /tags/add         - Tag the selected tracks");
    tracing::info!("  POST /tags/remove      - Untag the selected tracks");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
