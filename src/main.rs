use anyhow::Result;
use drive_gateway::{config::Config, drive::DriveClient, session::SessionStore, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("Starting Drive gateway");

    let session_store = Arc::new(SessionStore::new(
        config.session_file.clone(),
        config.session_ttl,
    ));
    if let Some(path) = &config.session_file {
        info!("Sessions will be persisted to: {}", path.display());
    }
    if let Some(path) = &config.token_mirror_path {
        info!("Tokens will be mirrored to: {}", path.display());
    }

    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("drive-gateway/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let drive = Arc::new(DriveClient::new(
        http_client.clone(),
        config.drive_api_base.clone(),
        config.drive_upload_base.clone(),
    ));

    let app_state = AppState {
        config: config.clone(),
        session_store,
        http_client,
        drive,
    };

    let app = drive_gateway::router(app_state);

    let addr = config.server_address();
    info!("Listening on {}", addr);

    println!("\nDrive Gateway");
    println!("=============");
    println!("Server running at: http://localhost:{}", config.port);
    println!("\nAuthentication:");
    println!("  Visit: http://localhost:{}/authorize", config.port);
    println!("\nTransfers:");
    println!(
        "  Upload:   POST http://localhost:{}/upload_by_folder_name",
        config.port
    );
    println!(
        "  Download: GET  http://localhost:{}/download_by_folder_name?folder_name=..&filename=..\n",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
