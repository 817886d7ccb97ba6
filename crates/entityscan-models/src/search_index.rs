//! The per-process Search Index row shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::VideoId;
use crate::job::JobStatus;

/// One `(video_id, label)` entry of the rebuildable search index
///. The indexer holds one row per label per
/// completed job; `tokens` backs the Jaccard fallback when no Embedder is
/// configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexRow {
    pub video_id: VideoId,
    pub label: String,
    pub presence: f64,
    pub appearances: u32,
    pub filename: String,
    pub status: JobStatus,
    pub duration_sec: f64,
    pub created_at: DateTime<Utc>,
    /// Normalized whitespace-split tokens of `label`.
    pub tokens: Vec<String>,
    /// Present only when an Embedder capability is configured.
    pub embedding: Option<Vec<f32>>,
}

impl SearchIndexRow {
    pub fn new(
        video_id: VideoId,
        label: String,
        presence: f64,
        appearances: u32,
        filename: String,
        status: JobStatus,
        duration_sec: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let tokens = label.split_whitespace().map(str::to_string).collect();
        Self {
            video_id,
            label,
            presence,
            appearances,
            filename,
            status,
            duration_sec,
            created_at,
            tokens,
            embedding: None,
        }
    }

    /// Jaccard similarity between this row's tokens and a query's tokens,
    /// the fallback used when no Embedder is available.
    pub fn jaccard_similarity(&self, query_tokens: &[String]) -> f64 {
        if self.tokens.is_empty() && query_tokens.is_empty() {
            return 0.0;
        }
        let a: std::collections::HashSet<&str> =
            self.tokens.iter().map(String::as_str).collect();
        let b: std::collections::HashSet<&str> =
            query_tokens.iter().map(String::as_str).collect();
        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

/// One matched entity within a job's search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedEntity {
    pub label: String,
    pub presence: f64,
    pub frames: u32,
}

/// One label surfaced via the semantic/fallback pass, with its similarity
/// score to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarEntity {
    pub label: String,
    pub similarity: f64,
}

/// One job's contribution to a search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJobHit {
    pub video_id: VideoId,
    pub filename: String,
    pub matched_entities: Vec<MatchedEntity>,
}

/// The full response to a `search` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchJobHit>,
    pub similar_entities: Vec<SimilarEntity>,
    pub exact_matches_count: u32,
    pub ai_enhancements_count: u32,
    pub total_unique_videos: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> SearchIndexRow {
        SearchIndexRow::new(
            VideoId::from("abcd1234"),
            "fighter jet".to_string(),
            0.8,
            4,
            "clip.mp4".to_string(),
            JobStatus::Completed,
            20.0,
            Utc::now(),
        )
    }

    #[test]
    fn tokens_split_on_whitespace() {
        let row = sample_row();
        assert_eq!(row.tokens, vec!["fighter", "jet"]);
    }

    #[test]
    fn jaccard_similarity_of_identical_tokens_is_one() {
        let row = sample_row();
        let query = vec!["fighter".to_string(), "jet".to_string()];
        assert_eq!(row.jaccard_similarity(&query), 1.0);
    }

    #[test]
    fn jaccard_similarity_of_disjoint_tokens_is_zero() {
        let row = sample_row();
        let query = vec!["submarine".to_string()];
        assert_eq!(row.jaccard_similarity(&query), 0.0);
    }

    #[test]
    fn jaccard_similarity_partial_overlap() {
        let row = sample_row();
        let query = vec!["jet".to_string(), "engine".to_string()];
        // intersection = {jet} = 1, union = {fighter, jet, engine} = 3
        assert!((row.jaccard_similarity(&query) - (1.0 / 3.0)).abs() < 1e-9);
    }
}
