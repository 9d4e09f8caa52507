//! Named lanes and routing of job types onto them.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use brainflow_core::Priority;

use super::types::JobType;

/// A named queue with its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lane {
    #[serde(rename = "ai-processing-high")]
    AiProcessingHigh,
    #[serde(rename = "ai-processing")]
    AiProcessing,
    #[serde(rename = "ai-content-generation")]
    AiContentGeneration,
    #[serde(rename = "ai-embeddings")]
    AiEmbeddings,
    #[serde(rename = "ai-learning")]
    AiLearning,
}

impl Lane {
    pub const ALL: [Lane; 5] = [
        Lane::AiProcessingHigh,
        Lane::AiProcessing,
        Lane::AiContentGeneration,
        Lane::AiEmbeddings,
        Lane::AiLearning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::AiProcessingHigh => "ai-processing-high",
            Lane::AiProcessing => "ai-processing",
            Lane::AiContentGeneration => "ai-content-generation",
            Lane::AiEmbeddings => "ai-embeddings",
            Lane::AiLearning => "ai-learning",
        }
    }

    fn default_concurrency(&self) -> usize {
        match self {
            Lane::AiProcessingHigh => 4,
            Lane::AiProcessing | Lane::AiContentGeneration | Lane::AiEmbeddings => 2,
            Lane::AiLearning => 1,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lane: {0}")]
pub struct UnknownLane(pub String);

impl FromStr for Lane {
    type Err = UnknownLane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lane::ALL
            .into_iter()
            .find(|lane| lane.as_str() == s.trim())
            .ok_or_else(|| UnknownLane(s.to_string()))
    }
}

/// Per-lane worker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub lane: Lane,
    /// Worker threads pulling from this lane.
    pub concurrency: usize,
}

/// Maps job types (plus a priority hint) to lanes and holds lane settings.
#[derive(Debug, Clone)]
pub struct QueueRouter {
    lanes: BTreeMap<Lane, LaneConfig>,
}

impl Default for QueueRouter {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl QueueRouter {
    /// Lanes missing from `lanes` keep their default settings.
    pub fn new(lanes: impl IntoIterator<Item = LaneConfig>) -> Self {
        let mut map: BTreeMap<Lane, LaneConfig> = Lane::ALL
            .into_iter()
            .map(|lane| {
                (
                    lane,
                    LaneConfig {
                        lane,
                        concurrency: lane.default_concurrency(),
                    },
                )
            })
            .collect();

        for cfg in lanes {
            map.insert(cfg.lane, cfg);
        }

        Self { lanes: map }
    }

    /// Default lane for a job type; `urgent` parsing goes to the high lane.
    pub fn route(&self, job_type: JobType, priority: Priority) -> Lane {
        match (job_type, priority) {
            (JobType::BrainDumpParse, Priority::Urgent) => Lane::AiProcessingHigh,
            (JobType::BrainDumpParse, Priority::Normal) => Lane::AiProcessing,
            (JobType::AiContentGeneration, _) => Lane::AiContentGeneration,
            (JobType::EmbeddingGeneration, _) => Lane::AiEmbeddings,
            (JobType::FeedbackLearning, _) => Lane::AiLearning,
        }
    }

    pub fn config(&self, lane: Lane) -> LaneConfig {
        self.lanes.get(&lane).copied().unwrap_or(LaneConfig {
            lane,
            concurrency: lane.default_concurrency(),
        })
    }

    pub fn lanes(&self) -> impl Iterator<Item = &LaneConfig> {
        self.lanes.values()
    }
}
