//! Inspect persisted persons.

use clap::Args;
use serde::Serialize;

use photoid_store::Repository;

use super::{get_config, get_context, open_store, output_result, resolve_db, resolve_owner};
use crate::Cli;

/// List persons of an owner.
#[derive(Args)]
pub struct PersonsCommand {
    /// Owner of the persons (overrides context)
    #[arg(long)]
    owner: Option<String>,

    /// Database path (overrides context)
    #[arg(long)]
    db: Option<String>,

    /// Include each person's faces
    #[arg(long)]
    faces: bool,
}

#[derive(Debug, Serialize)]
struct FaceSummary {
    id: String,
    photo_id: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct PersonSummary {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    face_count: usize,
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    faces: Option<Vec<FaceSummary>>,
}

impl PersonsCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let ctx = get_context(cli, &cfg)?;
        let owner = resolve_owner(self.owner.as_deref(), &ctx)?;
        let store = open_store(&resolve_db(self.db.as_deref(), &ctx, &cfg))?;

        let summaries = summarize(Repository::new(store), &owner, self.faces)?;
        output_result(&summaries, cli.output.as_deref(), cli.json)
    }
}

fn summarize(repo: Repository, owner: &str, with_faces: bool) -> anyhow::Result<Vec<PersonSummary>> {
    let mut summaries = Vec::new();
    for person in repo.persons(owner)? {
        let faces = if with_faces {
            let faces = repo
                .faces_of_person(&person.id)?
                .into_iter()
                .map(|f| FaceSummary {
                    id: f.id,
                    photo_id: f.photo_id,
                    score: f.score,
                })
                .collect();
            Some(faces)
        } else {
            None
        };
        summaries.push(PersonSummary {
            face_count: person.faces.len(),
            id: person.id,
            name: person.name,
            images: person.images,
            faces,
        });
    }
    Ok(summaries)
}
