//! Utility functions for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use photoid_cluster::Config as ClusterConfig;
use photoid_store::{Datastore, RedbDatastore};

use crate::Cli;
use crate::config::{Config, Context, load_config};

/// Clustering flags shared by commands that run the detector.
#[derive(Args, Debug, Default)]
pub struct TuningArgs {
    /// Similarity threshold in (0, 1] (overrides context)
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Minimum neighborhood size to seed a community (overrides context)
    #[arg(long)]
    pub min_community_size: Option<usize>,
    /// Neighbors explored per seed (overrides context)
    #[arg(long)]
    pub init_max_size: Option<usize>,
}

impl TuningArgs {
    /// Applies context values, then flags, on top of `base`.
    pub fn resolve(&self, ctx: &Context, base: ClusterConfig) -> ClusterConfig {
        ClusterConfig {
            threshold: self.threshold.or(ctx.threshold).unwrap_or(base.threshold),
            min_community_size: self
                .min_community_size
                .or(ctx.min_community_size)
                .unwrap_or(base.min_community_size),
            init_max_size: self
                .init_max_size
                .or(ctx.init_max_size)
                .unwrap_or(base.init_max_size),
        }
    }
}

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(cli.config.as_deref())
}

/// Gets the context to use. Without `-c` and without a current context an
/// empty context is returned, so built-in defaults apply.
pub fn get_context(cli: &Cli, cfg: &Config) -> anyhow::Result<Context> {
    match cfg.resolve_context(cli.context.as_deref()) {
        Some(ctx) => Ok(ctx.clone()),
        None => match cli.context.as_deref() {
            Some(name) if !name.is_empty() => anyhow::bail!("context '{}' not found", name),
            _ => Ok(Context::default()),
        },
    }
}

/// Resolves the owner from the flag or the context.
pub fn resolve_owner(flag: Option<&str>, ctx: &Context) -> anyhow::Result<String> {
    match flag {
        Some(owner) if !owner.is_empty() => Ok(owner.to_string()),
        _ if !ctx.owner.is_empty() => Ok(ctx.owner.clone()),
        _ => anyhow::bail!("owner is required, use --owner or set it in the context"),
    }
}

/// Resolves the database path from the flag, the context, or the default.
pub fn resolve_db(flag: Option<&str>, ctx: &Context, cfg: &Config) -> PathBuf {
    match flag {
        Some(db) if !db.is_empty() => PathBuf::from(db),
        _ if !ctx.db.is_empty() => PathBuf::from(&ctx.db),
        _ => cfg.default_db_path(),
    }
}

/// Opens the redb database, creating its directory if needed.
pub fn open_store(path: &Path) -> anyhow::Result<Arc<dyn Datastore>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Arc::new(RedbDatastore::open(path)?))
}

/// Loads a request from a YAML or JSON file.
pub fn load_request<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    Ok(result)
}

/// Requires input file to be provided.
pub fn require_input_file(cli: &Cli) -> anyhow::Result<&str> {
    cli.input
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("input file is required, use -f flag"))
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)?
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }

    Ok(())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}
