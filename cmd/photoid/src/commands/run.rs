//! Cluster an index file and persist the result.

use std::sync::Arc;

use clap::Args;
use tracing::info;

use photoid_cluster::EmbeddingIndex;
use photoid_pipeline::{ClusterRunner, RunReport, RunnerConfig};
use photoid_store::{Datastore, Photo, Repository};

use super::{
    TuningArgs, get_config, get_context, load_request, open_store, output_result, print_success,
    print_warning, require_input_file, resolve_db, resolve_owner,
};
use crate::Cli;

/// Cluster faces from an index file and store persons, faces and photo links.
///
/// Photos of the index missing from the database are registered first, with
/// their id as uri. Photos processed by an earlier run are skipped unless
/// --reprocess is given.
#[derive(Args)]
pub struct RunCommand {
    #[command(flatten)]
    tuning: TuningArgs,

    /// Owner of the photos (overrides context)
    #[arg(long)]
    owner: Option<String>,

    /// Database path (overrides context)
    #[arg(long)]
    db: Option<String>,

    /// Retries for transient photo update failures (overrides context)
    #[arg(long)]
    max_retries: Option<usize>,

    /// Cluster photos that earlier runs already processed
    #[arg(long)]
    reprocess: bool,
}

impl RunCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let ctx = get_context(cli, &cfg)?;
        let owner = resolve_owner(self.owner.as_deref(), &ctx)?;
        let db = resolve_db(self.db.as_deref(), &ctx, &cfg);
        let index: EmbeddingIndex = load_request(require_input_file(cli)?)?;

        let mut runner_cfg = RunnerConfig::new(owner);
        runner_cfg.cluster = self.tuning.resolve(&ctx, runner_cfg.cluster);
        if let Some(retries) = self.max_retries.or(ctx.max_retries) {
            runner_cfg.max_retries = retries;
        }
        runner_cfg.reprocess = self.reprocess;

        info!("opening database {}", db.display());
        let store = open_store(&db)?;
        let report = persist(store, &index, runner_cfg)?;

        if report.failed_photos.is_empty() {
            print_success(&format!(
                "{} persons from {} photos ({} already processed)",
                report.persons, report.photos_updated, report.photos_skipped
            ));
        } else {
            print_warning(&format!(
                "{} photos could not be updated",
                report.failed_photos.len()
            ));
        }
        output_result(&report, cli.output.as_deref(), cli.json)
    }
}

/// Registers unknown photos, then runs the clustering pipeline.
fn persist(store: Arc<dyn Datastore>, index: &EmbeddingIndex, cfg: RunnerConfig) -> anyhow::Result<RunReport> {
    let repo = Repository::new(store.clone());
    let missing: Vec<Photo> = index
        .photo_ids()
        .filter_map(|id| match repo.get::<Photo>(id) {
            Ok(Some(_)) => None,
            Ok(None) => Some(Ok(Photo::new(id, id, cfg.owner.as_str()))),
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if !missing.is_empty() {
        info!("registering {} new photos", missing.len());
        repo.insert_all(&missing)?;
    }

    let runner = ClusterRunner::new(store, cfg)?;
    Ok(runner.run(index)?)
}
