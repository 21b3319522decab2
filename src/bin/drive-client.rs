//! Command-line client for the gateway's folder-scoped transfer routes.
//!
//! Credentials come from the token mirror file written after the browser
//! authorization, and are sent as headers rather than a session cookie.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use drive_gateway::guard::{
    CLIENT_ID_HEADER, CLIENT_SECRET_HEADER, REFRESH_TOKEN_HEADER, TOKEN_URI_HEADER,
};
use drive_gateway::token_mirror::{self, MirroredTokens};
use reqwest::{multipart, Client, RequestBuilder};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "drive-client")]
#[command(about = "Upload and download Drive files through the gateway")]
#[command(version)]
struct Cli {
    /// Gateway base URL.
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway: String,

    /// Token file written by the gateway.
    #[arg(long, env = "TOKEN_MIRROR_PATH")]
    tokens: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file into a named Drive folder.
    Upload {
        #[arg(long)]
        folder: String,
        /// Local file to send.
        path: PathBuf,
        /// Remote name; defaults to the local file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file from a named Drive folder.
    Download {
        #[arg(long)]
        folder: String,
        filename: String,
        /// Where to write the file; defaults to `filename`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn with_credentials(request: RequestBuilder, tokens: &MirroredTokens) -> RequestBuilder {
    let mut request = request.bearer_auth(&tokens.access_token);
    for (header, value) in [
        (REFRESH_TOKEN_HEADER, &tokens.refresh_token),
        (TOKEN_URI_HEADER, &tokens.token_uri),
        (CLIENT_ID_HEADER, &tokens.client_id),
        (CLIENT_SECRET_HEADER, &tokens.client_secret),
    ] {
        if !value.is_empty() {
            request = request.header(header, value);
        }
    }
    request
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let tokens = token_mirror::read(&cli.tokens)?;
    if tokens.access_token.is_empty() {
        bail!("No access_token in {}", cli.tokens.display());
    }

    let client = Client::new();
    let base = cli.gateway.trim_end_matches('/');

    match cli.command {
        Commands::Upload { folder, path, name } => {
            let file_name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("Cannot derive a file name from the path")?,
            };
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Cannot open {}", path.display()))?;

            info!("Uploading {} to folder {}", file_name, folder);
            let form = multipart::Form::new()
                .text("folder_name", folder)
                .text("file_name", file_name.clone())
                .part("file", multipart::Part::bytes(data).file_name(file_name));

            let response = with_credentials(
                client.post(format!("{}/upload_by_folder_name", base)),
                &tokens,
            )
            .multipart(form)
            .send()
            .await?;

            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            if !status.is_success() {
                bail!("Upload failed ({}): {}", status, body);
            }
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Download {
            folder,
            filename,
            output,
        } => {
            info!("Downloading {} from folder {}", filename, folder);
            let response = with_credentials(
                client.get(format!("{}/download_by_folder_name", base)),
                &tokens,
            )
            .query(&[("folder_name", folder.as_str()), ("filename", filename.as_str())])
            .send()
            .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("Download failed ({}): {}", status, body);
            }

            let output = output.unwrap_or_else(|| PathBuf::from(&filename));
            let bytes = response.bytes().await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}
