//! Offline clustering of an embedding index file.

use clap::Args;
use serde::Serialize;

use photoid_cluster::{Clustering, CommunityDetector, Config as ClusterConfig, EmbeddingIndex, FitStats};

use super::{TuningArgs, get_config, get_context, load_request, output_result, require_input_file};
use crate::Cli;

/// Cluster faces from an index file without touching a database.
///
/// The index file (-f, YAML or JSON) maps photo ids to faces:
///
///   photo-1:
///     faces:
///       face_1: { embedding: [...], score: 0.98, bbox: [x, y, w, h] }
#[derive(Args)]
pub struct ClusterCommand {
    #[command(flatten)]
    tuning: TuningArgs,

    /// Include centroids in the output
    #[arg(long)]
    centroids: bool,
}

#[derive(Debug, Serialize)]
struct Member {
    photo_id: String,
    face_key: String,
}

#[derive(Debug, Serialize)]
struct ClusterEntry {
    members: Vec<Member>,
    #[serde(skip_serializing_if = "Option::is_none")]
    centroid: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ClusterOutput {
    config: ClusterConfig,
    clusters: Vec<ClusterEntry>,
    stats: FitStats,
}

impl ClusterOutput {
    fn new(config: ClusterConfig, clustering: &Clustering, with_centroids: bool) -> Self {
        let clusters = clustering
            .iter()
            .map(|(members, centroid)| ClusterEntry {
                members: members
                    .iter()
                    .map(|(photo_id, face_key)| Member {
                        photo_id: photo_id.clone(),
                        face_key: face_key.clone(),
                    })
                    .collect(),
                centroid: with_centroids.then(|| centroid.to_vec()),
            })
            .collect();
        Self {
            config,
            clusters,
            stats: clustering.stats,
        }
    }
}

impl ClusterCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let ctx = get_context(cli, &cfg)?;
        let index: EmbeddingIndex = load_request(require_input_file(cli)?)?;

        let mut detector = CommunityDetector::new(self.tuning.resolve(&ctx, ClusterConfig::default()))?;
        let config = *detector.config();
        let clustering = detector.fit(&index)?;

        let output = ClusterOutput::new(config, clustering, self.centroids);
        output_result(&output, cli.output.as_deref(), cli.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoid_cluster::FaceData;

    #[test]
    fn test_output_shape() {
        let mut index = EmbeddingIndex::new();
        index.insert_face("p1", "face_1", FaceData::new(vec![1.0, 0.0]));
        index.insert_face("p2", "face_1", FaceData::new(vec![1.0, 0.05]));
        index.insert_face("p3", "face_1", FaceData::new(vec![0.0, 1.0]));

        let mut detector = CommunityDetector::new(ClusterConfig::default()).unwrap();
        let clustering = detector.fit(&index).unwrap();

        let value = serde_json::to_value(ClusterOutput::new(ClusterConfig::default(), clustering, false)).unwrap();
        assert_eq!(value["clusters"][0]["members"][0]["photo_id"], "p1");
        assert_eq!(value["clusters"][0]["members"][1]["photo_id"], "p2");
        assert!(value["clusters"][0].get("centroid").is_none());
        assert_eq!(value["stats"]["clusters"], 1);

        let value = serde_json::to_value(ClusterOutput::new(ClusterConfig::default(), clustering, true)).unwrap();
        assert_eq!(value["clusters"][0]["centroid"].as_array().unwrap().len(), 2);
    }
}
