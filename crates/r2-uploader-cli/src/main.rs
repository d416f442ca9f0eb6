// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader - Command line frontend
//
// Inspects what would be staged and manages buckets, settings and history.
// Uploading itself is left to frontends that ship a transfer executor.

use chrono::Local;
use clap::{Parser, Subcommand};
use r2_uploader_core::{
    preview_file, AppError, BucketConfig, BucketKind, BucketProvider, BucketStore,
    ConfiguredBucket, FilePreview, FsPathResolver, Normalizer, SettingsStore, StatusCategory,
    TransferHistory, TransferStatus,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Stage files for upload to R2 and S3 buckets
#[derive(Parser, Debug)]
#[command(name = "r2-uploader", version, about, long_about = None)]
struct Cli {
    /// Read and write configuration here instead of the user config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve paths and print the items that would be staged
    Stage {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Prefix prepended to every object key
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print an image as a data URL or the first lines of a text file
    Preview {
        path: String,
    },
    /// Show finished transfers, most recent first
    History {
        /// all, in-progress or completed
        #[arg(long, default_value = "all")]
        category: StatusCategory,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage bucket configurations
    Bucket {
        #[command(subcommand)]
        action: BucketAction,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum BucketAction {
    List,
    Add {
        #[arg(long = "type", default_value = "r2")]
        kind: BucketKind,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        account_id: String,
        #[arg(long)]
        access_key: String,
        #[arg(long)]
        secret_key: String,
        #[arg(long, default_value = "")]
        custom_domain: String,
        /// S3 API endpoint, required for S3 buckets
        #[arg(long)]
        s3_api: Option<String>,
    },
    Remove {
        id: u32,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    SetDefaultBucket {
        /// Omit to clear the default
        id: Option<u32>,
    },
    SetLocale {
        locale: String,
    },
}

/// Where the three configuration documents live
struct ConfigPaths {
    dir: Option<PathBuf>,
}

impl ConfigPaths {
    fn file(&self, name: &str) -> Result<PathBuf, AppError> {
        match &self.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    AppError::FileIo(format!("Failed to create {}: {}", dir.display(), e))
                })?;
                Ok(dir.join(name))
            }
            None => r2_uploader_core::store::config_file(name),
        }
    }

    fn history(&self) -> Result<TransferHistory, AppError> {
        TransferHistory::open(self.file("history.json")?)
    }

    fn buckets(&self) -> Result<BucketStore, AppError> {
        BucketStore::open(self.file("buckets.json")?)
    }

    fn settings(&self) -> Result<SettingsStore, AppError> {
        SettingsStore::open(self.file("settings.json")?)
    }
}

fn status_cell(status: &TransferStatus) -> String {
    match status {
        TransferStatus::Error { message, code } => format!("error [{}] {}", code, message),
        other => other.label().to_string(),
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

async fn stage(
    paths: &ConfigPaths,
    inputs: Vec<String>,
    prefix: Option<String>,
) -> Result<Vec<String>, AppError> {
    let buckets = ConfiguredBucket::new(
        Arc::new(paths.buckets()?),
        Arc::new(paths.settings()?),
    );
    let bucket = buckets.active_bucket();

    let normalizer = Normalizer::new(Arc::new(FsPathResolver));
    let report = normalizer.normalize_paths(&inputs).await;

    let mut lines = Vec::new();
    for mut item in report.staged {
        if let Some(prefix) = &prefix {
            item.remote_name_prefix = prefix.clone();
        }
        let key = item.object_key();
        let target = match &bucket {
            Some(bucket) => bucket.public_url(&key),
            None => key,
        };
        lines.push(format!("{:<6} {} -> {}", item.kind().as_str(), item.source(), target));
    }
    for failure in &report.failures {
        tracing::warn!("Skipping {}: {}", failure.source, failure.error);
        lines.push(format!("skip   {}: {}", failure.source, failure.error));
    }

    if bucket.is_none() {
        lines.push("No bucket configured; showing object keys only".to_string());
    }
    Ok(lines)
}

fn history(
    paths: &ConfigPaths,
    category: StatusCategory,
    offset: usize,
    limit: usize,
    json: bool,
) -> Result<Vec<String>, AppError> {
    let history = paths.history()?;
    let entries: Vec<_> = history
        .list_by_status_category(category)
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();

    if json {
        return Ok(vec![serde_json::to_string_pretty(&entries)?]);
    }

    Ok(entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<40} {:<12} {}",
                entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                entry.filename,
                status_cell(&entry.status),
                entry.remote_url
            )
        })
        .collect())
}

fn bucket(paths: &ConfigPaths, action: BucketAction) -> Result<Vec<String>, AppError> {
    let store = paths.buckets()?;
    match action {
        BucketAction::List => {
            let default_id = paths.settings()?.get().default_bucket_id;
            Ok(store
                .list()
                .iter()
                .map(|b| {
                    let marker = if Some(b.id) == default_id { "*" } else { " " };
                    format!(
                        "{}{:>3}  {:<3} {:<24} key={} {}",
                        marker,
                        b.id,
                        b.kind.as_str(),
                        b.bucket_name,
                        mask(&b.access_key),
                        b.custom_domain
                    )
                })
                .collect())
        }
        BucketAction::Add {
            kind,
            name,
            account_id,
            access_key,
            secret_key,
            custom_domain,
            s3_api,
        } => {
            let added = store.add(BucketConfig {
                id: 0,
                kind,
                bucket_name: name,
                account_id,
                access_key,
                secret_key,
                custom_domain,
                s3_api,
            })?;
            Ok(vec![format!("Added bucket {}", added.id)])
        }
        BucketAction::Remove { id } => {
            store.delete(id)?;
            let settings = paths.settings()?;
            if settings.get().default_bucket_id == Some(id) {
                settings.set_default_bucket(None)?;
            }
            Ok(vec![format!("Removed bucket {}", id)])
        }
    }
}

fn settings(paths: &ConfigPaths, action: SettingsAction) -> Result<Vec<String>, AppError> {
    let store = paths.settings()?;
    match action {
        SettingsAction::Show => Ok(vec![serde_json::to_string_pretty(&store.get())?]),
        SettingsAction::SetDefaultBucket { id } => {
            if let Some(id) = id {
                if paths.buckets()?.get(id).is_none() {
                    return Err(AppError::InvalidConfig(format!("No bucket with id {}", id)));
                }
            }
            store.set_default_bucket(id)?;
            Ok(vec![match id {
                Some(id) => format!("Default bucket set to {}", id),
                None => "Default bucket cleared".to_string(),
            }])
        }
        SettingsAction::SetLocale { locale } => {
            let mut current = store.get();
            current.locale = locale;
            store.update(current)?;
            Ok(vec!["Locale updated".to_string()])
        }
    }
}

async fn run(cli: Cli) -> Result<Vec<String>, AppError> {
    let paths = ConfigPaths { dir: cli.config_dir };
    match cli.command {
        Commands::Stage { paths: inputs, prefix } => stage(&paths, inputs, prefix).await,
        Commands::Preview { path } => match preview_file(&path).await? {
            FilePreview::Image(data_url) => Ok(vec![data_url]),
            FilePreview::Text(text) => Ok(text.lines().map(str::to_string).collect()),
        },
        Commands::History {
            category,
            offset,
            limit,
            json,
        } => history(&paths, category, offset, limit, json),
        Commands::Bucket { action } => bucket(&paths, action),
        Commands::Settings { action } => settings(&paths, action),
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("r2_uploader=info".parse().unwrap())
                .add_directive("r2_uploader_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("r2-uploader: {}", e);
            std::process::exit(1);
        }
    }
}
