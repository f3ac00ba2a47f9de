//! filedeck command-line front end.
//!
//! Drives a [`FileManager`] directly: every invocation builds one over the
//! configured roots, runs a single command and shuts it down.
//!
//! Usage:
//!   filedeck --config filedeck.toml ls /docs/
//!   filedeck --root /docs/=/srv/docs cp /docs/a.txt --to /docs/backup/
//!   filedeck --root /docs/=/srv/docs get /docs/big.iso --range bytes=0-1023 -o head.bin

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use filedeck_kernel::{ByteRange, Config, FileManager, SortOrder, UploadRequest};
use filedeck_types::{JobStatus, ResultCode};

/// Clipboard session used by this process.
const SESSION: &str = "cli";

/// Browse and manage files through filedeck virtual paths.
#[derive(Parser, Debug)]
#[command(name = "filedeck")]
#[command(about = "Virtual file manager over configured root folders")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra root folder as PREFIX=DIR, e.g. /docs/=/srv/docs
    #[arg(long = "root", value_name = "PREFIX=DIR")]
    roots: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured roots
    Roots,
    /// List a folder
    Ls {
        #[arg(default_value = "/")]
        folder: String,
        /// name-asc, name-desc, size-asc or size-desc
        #[arg(long, default_value = "name-asc")]
        sort: String,
    },
    /// Print the folder tree
    Tree {
        #[arg(default_value = "")]
        id: String,
        /// Expand the ancestors of ID and mark it selected
        #[arg(long)]
        select: bool,
    },
    /// Copy items into a folder
    Cp {
        #[arg(required = true)]
        items: Vec<String>,
        #[arg(long)]
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Move items into a folder
    Mv {
        #[arg(required = true)]
        items: Vec<String>,
        #[arg(long)]
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete files and folders
    Rm {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Rename a file or folder
    Rename { item: String, name: String },
    /// Create a folder
    Mkdir { parent: String, name: String },
    /// Upload a local file in chunks
    Upload {
        file: PathBuf,
        /// Destination folder
        destination: String,
        /// Chunk size in bytes (defaults to the configured size)
        #[arg(long)]
        chunk_size: Option<u64>,
    },
    /// Download files; several items or a folder come back as a zip
    Get {
        #[arg(required = true)]
        items: Vec<String>,
        /// Range header value, e.g. bytes=0-1023
        #[arg(long)]
        range: Option<String>,
        /// Output file (defaults to the download's name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a text file
    Cat { file: String },
    /// Replace a text file with stdin
    Save { file: String },
    /// Show file details
    Info { file: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let manager = FileManager::start(config)
        .await
        .context("unable to start file manager")?;

    let outcome = run(&manager, args.command).await;
    manager.shutdown().await;
    outcome
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    for spec in &args.roots {
        let (prefix, dir) = spec
            .split_once('=')
            .with_context(|| format!("--root {spec}: expected PREFIX=DIR"))?;
        config = config.with_root(prefix, dir);
    }
    if config.root_folders.is_empty() {
        bail!("no root folders configured; pass --config or --root");
    }
    Ok(config)
}

async fn run(manager: &FileManager, command: Command) -> Result<()> {
    match command {
        Command::Roots => {
            for root in manager.roots().iter() {
                println!("{}\t{}", root.prefix(), root.dir().display());
            }
        }
        Command::Ls { folder, sort } => {
            let order = SortOrder::from_str(&sort)
                .with_context(|| format!("unknown sort order {sort}"))?;
            print_json(&manager.folders().list(&folder, order).await?)?;
        }
        Command::Tree { id, select } => {
            print_json(&manager.folders().tree(&id, select).await?)?;
        }
        Command::Cp { items, to, overwrite } => {
            manager.copy(SESSION, items);
            paste(manager, &to, overwrite).await?;
        }
        Command::Mv { items, to, overwrite } => {
            manager.cut(SESSION, items);
            paste(manager, &to, overwrite).await?;
        }
        Command::Rm { items } => {
            let result = manager.folders().delete(items).await?;
            print_json(&result)?;
            ensure_ok(result.code, &result.message)?;
        }
        Command::Rename { item, name } => {
            let result = manager.folders().rename(&item, &name).await?;
            print_json(&result)?;
            ensure_ok(result.code, &result.message)?;
        }
        Command::Mkdir { parent, name } => {
            let result = manager.folders().create_folder(&parent, &name).await?;
            print_json(&result)?;
            ensure_ok(result.code, &result.message)?;
        }
        Command::Upload {
            file,
            destination,
            chunk_size,
        } => upload(manager, &file, destination, chunk_size).await?,
        Command::Get {
            items,
            range,
            output,
        } => get(manager, items, range, output).await?,
        Command::Cat { file } => {
            let content = manager.content().get_text(&file).await?;
            println!("{}", content.text);
        }
        Command::Save { file } => {
            let text = tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
                .await??;
            let saved = manager.content().set_text(&file, &text).await?;
            tracing::info!(file = %file, bytes = saved.text.len(), "saved");
        }
        Command::Info { file } => {
            print_json(&manager.downloads().file_info(&file).await?)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_ok(code: ResultCode, message: &str) -> Result<()> {
    match code {
        ResultCode::Success => Ok(()),
        _ => bail!("{code}: {message}"),
    }
}

async fn paste(manager: &FileManager, destination: &str, overwrite: bool) -> Result<()> {
    let mut status: JobStatus = manager.paste(SESSION, destination, overwrite)?;
    while !status.is_finished() {
        eprintln!("{}: {}", status.title, status.message);
        status = manager.poll_paste(status.id, Duration::from_secs(1)).await?;
    }
    print_json(&status)?;
    ensure_ok(status.code, &status.message)
}

async fn upload(
    manager: &FileManager,
    file: &Path,
    destination: String,
    chunk_size: Option<u64>,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("unable to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("upload source has no file name")?;

    let uploads = manager.uploads();
    let chunk_size = chunk_size.unwrap_or_else(|| uploads.chunk_size()).max(1);
    let chunks: Vec<&[u8]> = data.chunks(chunk_size as usize).collect();
    let upload_id = uuid::Uuid::new_v4().to_string();

    uploads
        .start(UploadRequest {
            upload_id: upload_id.clone(),
            destination,
            file_name,
            declared_size: data.len() as u64,
            chunk_count: chunks.len(),
            chunk_size,
        })
        .await?;

    for (chunk_id, chunk) in chunks.iter().enumerate() {
        let offset = chunk_id as u64 * chunk_size;
        if let Err(e) = uploads.add_chunk(&upload_id, chunk_id, offset, chunk).await {
            uploads.cancel(&upload_id).await.ok();
            return Err(e.into());
        }
    }
    let receipt = uploads.complete(&upload_id).await?;
    print_json(&receipt)
}

async fn get(
    manager: &FileManager,
    items: Vec<String>,
    range: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let downloads = manager.downloads();
    let (file_name, data) = match range {
        Some(header) => {
            let range = ByteRange::from_header(Some(&header));
            let payload = if downloads.is_single_file(&items) {
                downloads.read_range(&items[0], &range).await?
            } else {
                let archive = downloads.compress(&items, true).await?;
                downloads.archive_range(&archive, &range)?
            };
            eprintln!("Content-Range: {}", payload.content_range());
            (payload.file_name, payload.data)
        }
        None => {
            let download = downloads.download(&items).await?;
            (download.file_name, download.data)
        }
    };

    let target = output.unwrap_or_else(|| PathBuf::from(&file_name));
    tokio::fs::write(&target, &data)
        .await
        .with_context(|| format!("unable to write {}", target.display()))?;
    tracing::info!(file = %target.display(), bytes = data.len(), "downloaded");
    Ok(())
}
