//! Search Indexer: a rebuildable, in-memory row store over
//! every completed job's entities, answering substring and semantic
//! queries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use entityscan_media::Embedder;
use entityscan_models::{
    normalize_label, JobStatus, MatchedEntity, Report, SearchIndexRow, SearchJobHit,
    SearchResponse, SimilarEntity, VideoId,
};
use tokio::sync::RwLock;

/// Holds one [`SearchIndexRow`] per `(video_id, label)` pair across every
/// completed job. Readers (queries) proceed
/// concurrently; a rebuild briefly takes the write lock while swapping in
/// the refreshed row set.
pub struct SearchIndex {
    rows: RwLock<Vec<SearchIndexRow>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SearchIndex {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { rows: RwLock::new(Vec::new()), embedder }
    }

    /// Replace one job's rows with freshly computed ones. Any prior rows for this
    /// `video_id` are discarded first, so a job that loses entities across
    /// a re-run does not leak stale rows.
    pub async fn index_job(&self, video_id: VideoId, report: &Report, status: JobStatus, created_at: DateTime<Utc>) {
        let mut fresh = Vec::with_capacity(report.entities.len());
        for (label, summary) in &report.entities {
            let mut row = SearchIndexRow::new(
                video_id.clone(),
                label.clone(),
                summary.presence,
                summary.appearances,
                report.filename.clone(),
                status,
                report.duration_sec,
                created_at,
            );
            if let Some(embedder) = &self.embedder {
                row.embedding = embedder.embed(label).await.ok();
            }
            fresh.push(row);
        }

        let mut rows = self.rows.write().await;
        rows.retain(|row| row.video_id != video_id);
        rows.extend(fresh);
    }

    pub async fn remove_job(&self, video_id: VideoId) {
        let mut rows = self.rows.write().await;
        rows.retain(|row| row.video_id != video_id);
    }

    /// Rebuild the whole index from persisted reports on disk, used at worker
    /// startup and after crash recovery. `reports_dir` is `<data_dir>/reports`.
    pub async fn rebuild_from_disk(&self, reports_dir: &Path) -> std::io::Result<()> {
        let mut fresh = Vec::new();
        let mut entries = tokio::fs::read_dir(reports_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let report_path = entry.path().join("report.json");
            let Ok(body) = tokio::fs::read(&report_path).await else { continue };
            let Ok(report) = serde_json::from_slice::<Report>(&body) else { continue };
            let created_at = tokio::fs::metadata(&report_path)
                .await
                .and_then(|meta| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            for (label, summary) in &report.entities {
                let mut row = SearchIndexRow::new(
                    report.video_id.clone(),
                    label.clone(),
                    summary.presence,
                    summary.appearances,
                    report.filename.clone(),
                    JobStatus::Completed,
                    report.duration_sec,
                    created_at,
                );
                if let Some(embedder) = &self.embedder {
                    row.embedding = embedder.embed(label).await.ok();
                }
                fresh.push(row);
            }
        }

        let mut rows = self.rows.write().await;
        *rows = fresh;
        Ok(())
    }

    /// Answer a query.
    pub async fn search(&self, q: &str, similarity: f64, min_presence: f64, min_frames: u32) -> SearchResponse {
        let normalized_q = normalize_label(q);
        let query_tokens: Vec<String> = normalized_q.split_whitespace().map(str::to_string).collect();
        let rows = self.rows.read().await;

        let distinct_labels: HashSet<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        let mut semantic_scores: std::collections::HashMap<String, f64> = std::collections::HashMap::new();

        if let Some(embedder) = &self.embedder {
            if let Ok(query_embedding) = embedder.embed(&normalized_q).await {
                for label in distinct_labels {
                    let Some(row) = rows.iter().find(|r| r.label == label) else { continue };
                    let Some(row_embedding) = &row.embedding else { continue };
                    let score = cosine_similarity(&query_embedding, row_embedding);
                    if score >= similarity {
                        semantic_scores.insert(label.to_string(), score);
                    }
                }
            }
        } else {
            for label in distinct_labels {
                let Some(row) = rows.iter().find(|r| r.label == label) else { continue };
                let score = row.jaccard_similarity(&query_tokens);
                if score >= similarity {
                    semantic_scores.insert(label.to_string(), score);
                }
            }
        }
        let semantic_labels: HashSet<String> = semantic_scores.keys().cloned().collect();

        let mut exact_videos: HashSet<VideoId> = HashSet::new();
        let mut semantic_added_labels: HashSet<String> = HashSet::new();
        let mut hits_by_video: std::collections::BTreeMap<VideoId, (String, f64, Vec<MatchedEntity>)> =
            std::collections::BTreeMap::new();

        for row in rows.iter() {
            if row.presence < min_presence || row.appearances < min_frames {
                continue;
            }
            let is_exact = !normalized_q.is_empty() && row.label.contains(&normalized_q);
            let is_semantic = semantic_labels.contains(&row.label);
            if !is_exact && !is_semantic {
                continue;
            }
            if is_exact {
                exact_videos.insert(row.video_id.clone());
            }
            if is_semantic && !is_exact {
                semantic_added_labels.insert(row.label.clone());
            }

            let entry = hits_by_video
                .entry(row.video_id.clone())
                .or_insert_with(|| (row.filename.clone(), 0.0, Vec::new()));
            entry.2.push(MatchedEntity {
                label: row.label.clone(),
                presence: row.presence,
                frames: row.appearances,
            });
        }

        let total_unique_videos = hits_by_video.len() as u32;
        let hits: Vec<SearchJobHit> = hits_by_video
            .into_iter()
            .map(|(video_id, (filename, _, mut matched))| {
                matched.sort_by(|a, b| a.label.cmp(&b.label));
                SearchJobHit { video_id, filename, matched_entities: matched }
            })
            .collect();

        let mut similar_entities: Vec<SimilarEntity> = semantic_scores
            .into_iter()
            .map(|(label, similarity)| SimilarEntity { label, similarity })
            .collect();
        similar_entities.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

        SearchResponse {
            hits,
            similar_entities,
            exact_matches_count: exact_videos.len() as u32,
            ai_enhancements_count: semantic_added_labels.len() as u32,
            total_unique_videos,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

pub fn reports_dir(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("reports")
}

#[cfg(test)]
mod tests {
    use super::*;
    use entityscan_models::EntitySummary;
    use std::collections::BTreeMap;

    fn sample_report() -> Report {
        let mut entities = BTreeMap::new();
        entities.insert(
            "fighter jet".to_string(),
            EntitySummary {
                count: 4,
                appearances: 4,
                presence: 0.8,
                time_ranges: vec![],
                confidence_score: 0.7,
                sources: vec![],
            },
        );
        Report {
            video_id: VideoId::from("abcd1234"),
            filename: "clip.mp4".to_string(),
            duration_sec: 20.0,
            interval_sec: 5,
            frames_analyzed: 5,
            unique_entities: 1,
            entities,
            transcript: None,
        }
    }

    #[tokio::test]
    async fn exact_substring_match_counts_the_video() {
        let index = SearchIndex::new(None);
        index.index_job(VideoId::from("abcd1234"), &sample_report(), JobStatus::Completed, Utc::now()).await;

        let response = index.search("fighter", 0.8, 0.0, 0).await;
        assert_eq!(response.exact_matches_count, 1);
        assert_eq!(response.total_unique_videos, 1);
        assert_eq!(response.hits[0].matched_entities[0].label, "fighter jet");
    }

    #[tokio::test]
    async fn min_presence_filters_out_low_presence_rows() {
        let index = SearchIndex::new(None);
        index.index_job(VideoId::from("abcd1234"), &sample_report(), JobStatus::Completed, Utc::now()).await;

        let response = index.search("fighter", 0.8, 0.9, 0).await;
        assert_eq!(response.total_unique_videos, 0);
    }

    #[tokio::test]
    async fn reindexing_a_job_drops_its_previous_rows() {
        let index = SearchIndex::new(None);
        let video_id = VideoId::from("abcd1234");
        index.index_job(video_id.clone(), &sample_report(), JobStatus::Completed, Utc::now()).await;

        let mut empty_report = sample_report();
        empty_report.entities.clear();
        index.index_job(video_id.clone(), &empty_report, JobStatus::Completed, Utc::now()).await;

        let response = index.search("fighter", 0.8, 0.0, 0).await;
        assert_eq!(response.total_unique_videos, 0);
    }
}
