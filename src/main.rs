use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thesis_docx::config::Settings;
use thesis_docx::storage::{LocalStorage, Storage, Sweeper};
use thesis_docx::token::TokenService;
use thesis_docx::Converter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Settings file (TOML). Defaults to thesis_docx.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an HTML file to .docx.
    Convert {
        /// Input HTML file.
        #[arg(long)]
        html_file: PathBuf,

        /// Output .docx path.
        #[arg(long)]
        out: PathBuf,

        /// Document title metadata (optional).
        #[arg(long)]
        title: Option<String>,
    },
    /// Convert, store the result and print a signed download link.
    Publish {
        #[arg(long)]
        html_file: PathBuf,

        /// Link lifetime in seconds; clamped to the configured maximum.
        #[arg(long)]
        expires_in: Option<i64>,

        #[arg(long)]
        title: Option<String>,
    },
    /// Write the stored document a download token refers to.
    Fetch {
        #[arg(long)]
        token: String,

        #[arg(long)]
        out: PathBuf,
    },
    /// Remove expired stored documents.
    Sweep {
        /// Keep sweeping at the configured interval until interrupted.
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Serialize)]
struct PublishOutput {
    download_url: String,
    expires_in: i64,
    file_id: String,
}

fn read_html(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("open {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

/// Converter for an input file: relative images resolve against the
/// configured base directory, else the HTML file's own directory.
fn converter_for(settings: &Settings, html_file: &Path, title: Option<String>) -> Converter {
    let base = settings
        .image_base_dir
        .clone()
        .or_else(|| html_file.parent().map(Path::to_path_buf));
    Converter::new()
        .with_image_base_dir(base)
        .with_placeholder_label(settings.image_placeholder_label.clone())
        .with_title(title)
}

fn open_storage(settings: &Settings) -> Result<LocalStorage> {
    LocalStorage::open(&settings.storage_path, Duration::from_secs(settings.file_retention))
        .with_context(|| format!("open storage {}", settings.storage_path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("load settings")?;

    match args.command {
        Command::Convert { html_file, out, title } => {
            let html = read_html(&html_file)?;
            let bytes = converter_for(&settings, &html_file, title)
                .convert(&html)
                .context("convert html")?;
            write_output(&out, &bytes)?;
        }
        Command::Publish {
            html_file,
            expires_in,
            title,
        } => {
            let html = read_html(&html_file)?;
            let bytes = converter_for(&settings, &html_file, title)
                .convert(&html)
                .context("convert html")?;
            let storage = open_storage(&settings)?;
            let file_id = storage.save(&bytes).context("store document")?;

            let tokens = TokenService::new(
                &settings.secret_key,
                settings.link_expires_default,
                settings.link_expires_max,
            );
            let token = tokens.issue(&file_id, expires_in).context("issue token")?;
            let output = PublishOutput {
                download_url: format!("{}/download/{}", settings.base_url.trim_end_matches('/'), token),
                expires_in: tokens.effective_ttl(expires_in),
                file_id,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Fetch { token, out } => {
            let tokens = TokenService::new(
                &settings.secret_key,
                settings.link_expires_default,
                settings.link_expires_max,
            );
            let file_id = tokens.verify(&token).context("verify token")?;
            let storage = open_storage(&settings)?;
            let bytes = storage
                .get(&file_id)?
                .ok_or_else(|| anyhow!("file {file_id} not found or expired"))?;
            write_output(&out, &bytes)?;
        }
        Command::Sweep { watch } => {
            let storage = Arc::new(open_storage(&settings)?);
            let removed = storage.cleanup_expired()?;
            println!("removed {removed} expired file(s)");
            if watch {
                let _sweeper = Sweeper::spawn(storage, Duration::from_secs(settings.sweep_interval.max(1)));
                loop {
                    std::thread::park();
                }
            }
        }
    }
    Ok(())
}
