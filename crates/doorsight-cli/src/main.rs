use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doorsight_core::{load_enrollment, OnnxExtractor};
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;

const DEFAULT_URL: &str = "http://127.0.0.1:5001";

#[derive(Parser)]
#[command(name = "doorsight", about = "doorsight face recognition CLI")]
struct Cli {
    /// Base URL of a running doorsightd
    #[arg(long, global = true, default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health
    Health,
    /// Upload a snapshot and print who is in it
    Recognize {
        /// Image file to upload
        image: PathBuf,
    },
    /// Make the daemon rescan its known-faces directory
    Reload,
    /// Check which reference images in a directory would enroll (runs locally)
    Scan {
        /// Known-faces directory
        dir: PathBuf,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let resp = client.get(format!("{base}/health")).send().await.context("contacting doorsightd")?;
            print_json(resp).await?;
        }
        Commands::Recognize { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "snapshot.jpg".to_string());
            let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
            let resp = client
                .post(format!("{base}/recognize"))
                .multipart(form)
                .send()
                .await
                .context("contacting doorsightd")?;
            print_json(resp).await?;
        }
        Commands::Reload => {
            let resp = client.post(format!("{base}/reload")).send().await.context("contacting doorsightd")?;
            print_json(resp).await?;
        }
        Commands::Scan { dir, model_dir } => {
            let model_dir = model_dir.unwrap_or_else(doorsight_core::default_model_dir);
            tracing::debug!(dir = %dir.display(), model_dir = %model_dir.display(), "scanning");
            let set = tokio::task::spawn_blocking(move || -> Result<_> {
                let mut extractor = OnnxExtractor::load(&model_dir)
                    .with_context(|| format!("loading models from {}", model_dir.display()))?;
                Ok(load_enrollment(&dir, &mut extractor)?)
            })
            .await??;

            for identity in set.identities() {
                println!("ok    {}", identity.name);
            }
            for skipped in set.skipped() {
                println!("skip  {}: {}", skipped.path.display(), skipped.reason);
            }
            println!("{} enrolled, {} skipped", set.len(), set.skipped().len());
        }
    }

    Ok(())
}

/// Pretty-print a JSON response body; non-2xx statuses become an error after printing.
async fn print_json(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.context("decoding response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("doorsightd returned {status}");
    }
    Ok(())
}
