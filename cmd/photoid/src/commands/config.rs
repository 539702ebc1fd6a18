//! Configuration management commands.

use clap::{Args, Subcommand};

use super::{get_config, print_success};
use crate::Cli;
use crate::config::Context;

/// Manage CLI configuration.
///
/// Contexts hold a database path, an owner and clustering defaults,
/// similar to kubectl's context management.
///
/// Configuration is stored in ~/.photoid/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add a new context
    #[command(name = "add-context")]
    AddContext {
        /// Context name
        name: String,
        /// Database path
        #[arg(long)]
        db: Option<String>,
        /// Owner of photos and persons
        #[arg(long)]
        owner: Option<String>,
        /// Similarity threshold in (0, 1]
        #[arg(long)]
        threshold: Option<f32>,
        /// Minimum neighborhood size to seed a community
        #[arg(long)]
        min_community_size: Option<usize>,
        /// Neighbors explored per seed
        #[arg(long)]
        init_max_size: Option<usize>,
        /// Retries for transient photo update failures
        #[arg(long)]
        max_retries: Option<usize>,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

impl ConfigCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext {
                name,
                db,
                owner,
                threshold,
                min_community_size,
                init_max_size,
                max_retries,
            } => {
                if let Some(t) = threshold {
                    if !(*t > 0.0 && *t <= 1.0) {
                        anyhow::bail!("threshold must be in (0, 1], got {}", t);
                    }
                }

                let mut cfg = get_config(cli)?;
                let ctx = Context {
                    db: db.clone().unwrap_or_default(),
                    owner: owner.clone().unwrap_or_default(),
                    threshold: *threshold,
                    min_community_size: *min_community_size,
                    init_max_size: *init_max_size,
                    max_retries: *max_retries,
                    ..Default::default()
                };

                cfg.add_context(name, ctx)?;
                print_success(&format!("Context \"{}\" added successfully", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<20} {:<16} {}", "CURRENT", "NAME", "OWNER", "DB");
                for (name, ctx) in &cfg.contexts {
                    let current = if *name == cfg.current_context { "*" } else { "" };
                    let db = if ctx.db.is_empty() { "(default)" } else { ctx.db.as_str() };
                    println!("{:<8} {:<20} {:<16} {}", current, name, ctx.owner, db);
                }

                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Default database: {}", cfg.default_db_path().display());
                println!("Contexts: {}", cfg.contexts.len());

                for (name, ctx) in &cfg.contexts {
                    println!("\n  {}:", name);
                    if !ctx.db.is_empty() {
                        println!("    Database: {}", ctx.db);
                    }
                    if !ctx.owner.is_empty() {
                        println!("    Owner: {}", ctx.owner);
                    }
                    if let Some(t) = ctx.threshold {
                        println!("    Threshold: {}", t);
                    }
                    if let Some(n) = ctx.min_community_size {
                        println!("    Min community size: {}", n);
                    }
                    if let Some(n) = ctx.init_max_size {
                        println!("    Init max size: {}", n);
                    }
                    if let Some(n) = ctx.max_retries {
                        println!("    Max retries: {}", n);
                    }
                }

                Ok(())
            }
        }
    }
}
