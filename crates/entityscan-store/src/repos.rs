//! The Job Orchestrator & State Store.
//!
//! `JobStore` is the single source of truth for job state: every mutation
//! is a single durable write against SQLite before the caller is
//! acknowledged, and the status DAG is
//! enforced here rather than trusted to callers.

use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::{Row, SqlitePool};

use entityscan_models::{Job, JobStatus, VideoId};

use crate::error::{StoreError, StoreResult};

/// Durable job state store backed by a single SQLite database.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `Submit(filename, intervalSec, voiceFile?) -> video_id`.
    pub async fn submit(
        &self,
        filename: impl Into<String>,
        interval_sec: Option<u32>,
        voice_file: Option<String>,
    ) -> StoreResult<VideoId> {
        let job = Job::new(filename, interval_sec, voice_file);
        self.insert(&job).await?;
        counter!("entityscan_jobs_submitted_total").increment(1);
        Ok(job.video_id.clone())
    }

    async fn insert(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO jobs (
                video_id, filename, interval_sec, voice_file, status, progress,
                current_stage, duration_sec, frames_analyzed, unique_entities,
                entities_json, video_path, frames_dir, report_path, error,
                created_at, updated_at, event_seq
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.video_id.as_str())
        .bind(&job.filename)
        .bind(job.interval_sec)
        .bind(&job.voice_file)
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(&job.current_stage)
        .bind(job.duration_sec)
        .bind(job.frames_analyzed as i64)
        .bind(job.unique_entities as i64)
        .bind(job.entities_json.as_ref().map(|v| v.to_string()))
        .bind(&job.video_path)
        .bind(&job.frames_dir)
        .bind(&job.report_path)
        .bind(&job.error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(job.event_seq as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `Get(video_id) -> Job`.
    pub async fn get(&self, video_id: &VideoId) -> StoreResult<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE video_id = ?")
            .bind(video_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(video_id.to_string()))?;
        row_to_job(&row)
    }

    /// `UpdateStatus(video_id, status, progress, stage, statusText?)`.
    /// Enforces the status DAG and progress monotonicity at the store
    /// boundary. Only the owning worker is
    /// expected to call this; the store does not itself track ownership
    /// beyond serializing writes per `video_id`.
    pub async fn update_status(
        &self,
        video_id: &VideoId,
        status: JobStatus,
        progress: u8,
        stage: Option<&str>,
        status_text: Option<&str>,
    ) -> StoreResult<()> {
        let current = self.get(video_id).await?;
        if !current.status.can_transition_to(status) && current.status != status {
            return Err(StoreError::IllegalTransition {
                video_id: video_id.to_string(),
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let progress = progress.clamp(0, 100).max(current.progress);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE jobs SET status = ?, progress = ?, current_stage = ?, error = ?,
             updated_at = ?, event_seq = event_seq + 1 WHERE video_id = ?",
        )
        .bind(status.as_str())
        .bind(progress as i64)
        .bind(stage)
        .bind(status_text)
        .bind(now)
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `Finish(video_id, report | error)`. Marks the job terminal, setting
    /// `progress = 100` on success.
    pub async fn finish_ok(
        &self,
        video_id: &VideoId,
        duration_sec: f64,
        frames_analyzed: u32,
        unique_entities: u32,
        entities_json: serde_json::Value,
        report_path: impl Into<String>,
    ) -> StoreResult<()> {
        let current = self.get(video_id).await?;
        if !current.status.can_transition_to(JobStatus::Completed) {
            return Err(StoreError::IllegalTransition {
                video_id: video_id.to_string(),
                from: current.status.as_str().to_string(),
                to: JobStatus::Completed.as_str().to_string(),
            });
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = ?, progress = 100, current_stage = NULL, error = NULL,
             duration_sec = ?, frames_analyzed = ?, unique_entities = ?, entities_json = ?,
             report_path = ?, updated_at = ?, event_seq = event_seq + 1 WHERE video_id = ?",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(duration_sec)
        .bind(frames_analyzed as i64)
        .bind(unique_entities as i64)
        .bind(entities_json.to_string())
        .bind(report_path.into())
        .bind(now)
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await?;
        counter!("entityscan_jobs_completed_total").increment(1);
        Ok(())
    }

    pub async fn finish_failed(&self, video_id: &VideoId, error: impl Into<String>) -> StoreResult<()> {
        let current = self.get(video_id).await?;
        if !current.status.can_transition_to(JobStatus::Failed) {
            return Err(StoreError::IllegalTransition {
                video_id: video_id.to_string(),
                from: current.status.as_str().to_string(),
                to: JobStatus::Failed.as_str().to_string(),
            });
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = ?, error = ?, updated_at = ?, event_seq = event_seq + 1
             WHERE video_id = ?",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(error.into())
        .bind(now)
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await?;
        counter!("entityscan_jobs_failed_total").increment(1);
        Ok(())
    }

    /// Record the paths a job owns once extraction begins, so `Delete` can
    /// clean up artifacts.
    pub async fn set_paths(
        &self,
        video_id: &VideoId,
        video_path: Option<&str>,
        frames_dir: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET video_path = COALESCE(?, video_path),
             frames_dir = COALESCE(?, frames_dir), updated_at = ? WHERE video_id = ?",
        )
        .bind(video_path)
        .bind(frames_dir)
        .bind(Utc::now().to_rfc3339())
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `List(statusFilter?, page, pageSize) -> (jobs, total)`.
    pub async fn list(
        &self,
        status_filter: Option<JobStatus>,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Job>, u64)> {
        let page_size = page_size.max(1) as i64;
        let offset = (page.saturating_sub(1) as i64) * page_size;

        let (rows, total) = if let Some(status) = status_filter {
            let rows = sqlx::query(
                "SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(status.as_str())
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
            (rows, total)
        } else {
            let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?")
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
                .fetch_one(&self.pool)
                .await?;
            (rows, total)
        };

        let jobs = rows.iter().map(row_to_job).collect::<StoreResult<Vec<_>>>()?;
        Ok((jobs, total as u64))
    }

    /// `Delete(video_id)`. Permitted only in a terminal state, or for a
    /// `processing` job whose `updated_at` is older than `stale_after`
    ///. Callers are responsible for
    /// removing on-disk artifacts; this only removes the durable row.
    pub async fn delete(&self, video_id: &VideoId, stale_after: chrono::Duration) -> StoreResult<()> {
        let job = self.get(video_id).await?;
        let stale = !job.is_terminal() && Utc::now() - job.updated_at > stale_after;
        if !job.is_terminal() && !stale {
            return Err(StoreError::DeleteNotPermitted(video_id.to_string()));
        }
        sqlx::query("DELETE FROM jobs WHERE video_id = ?")
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Crash recovery sweep: run once at
    /// worker startup. Any job stuck in `processing` past `stale_after` is
    /// reset to `queued` with its stage/progress cleared, ready to be
    /// re-enqueued by the caller. Returns the `video_id`s reset so the
    /// caller can discard their on-disk artifacts and re-enqueue tasks.
    pub async fn recover_stale_processing(
        &self,
        stale_after: chrono::Duration,
    ) -> StoreResult<Vec<VideoId>> {
        let cutoff = (Utc::now() - stale_after).to_rfc3339();
        let rows = sqlx::query(
            "SELECT video_id FROM jobs WHERE status = ? AND updated_at < ?",
        )
        .bind(JobStatus::Processing.as_str())
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut reset = Vec::with_capacity(rows.len());
        for row in &rows {
            let video_id: String = row.try_get("video_id")?;
            let video_id = VideoId::from(video_id);
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE jobs SET status = ?, progress = 0, current_stage = NULL, error = NULL,
                 updated_at = ?, event_seq = event_seq + 1 WHERE video_id = ?",
            )
            .bind(JobStatus::Queued.as_str())
            .bind(&now)
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await?;
            tracing::warn!(video_id = %video_id, "reset stale processing job to queued");
            reset.push(video_id);
        }
        Ok(reset)
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Job> {
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "queued" => JobStatus::Queued,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        other => return Err(StoreError::Database(sqlx::Error::Decode(
            format!("unknown job status '{other}'").into(),
        ))),
    };

    let entities_json: Option<String> = row.try_get("entities_json")?;
    let entities_json = entities_json
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        video_id: VideoId::from(row.try_get::<String, _>("video_id")?),
        filename: row.try_get("filename")?,
        interval_sec: row.try_get::<i64, _>("interval_sec")? as u32,
        voice_file: row.try_get("voice_file")?,
        status,
        progress: row.try_get::<i64, _>("progress")? as u8,
        current_stage: row.try_get("current_stage")?,
        duration_sec: row.try_get("duration_sec")?,
        frames_analyzed: row.try_get::<i64, _>("frames_analyzed")? as u32,
        unique_entities: row.try_get::<i64, _>("unique_entities")? as u32,
        entities_json,
        video_path: row.try_get("video_path")?,
        frames_dir: row.try_get("frames_dir")?,
        report_path: row.try_get("report_path")?,
        error: row.try_get("error")?,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
        event_seq: row.try_get::<i64, _>("event_seq")? as u64,
    })
}

fn parse_rfc3339(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> JobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        JobStore::new(pool)
    }

    #[tokio::test]
    async fn submit_then_get_round_trips() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", Some(5), None).await.unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.filename, "clip.mp4");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", None, None).await.unwrap();
        let result = store.update_status(&id, JobStatus::Completed, 100, None, None).await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", None, None).await.unwrap();
        store
            .update_status(&id, JobStatus::Processing, 50, Some("detecting_entities"), None)
            .await
            .unwrap();
        store
            .update_status(&id, JobStatus::Processing, 10, Some("detecting_entities"), None)
            .await
            .unwrap();
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.progress, 50);
    }

    #[tokio::test]
    async fn delete_before_terminal_is_rejected() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", None, None).await.unwrap();
        store
            .update_status(&id, JobStatus::Processing, 0, Some("extracting_frames"), None)
            .await
            .unwrap();
        let result = store.delete(&id, chrono::Duration::minutes(15)).await;
        assert!(matches!(result, Err(StoreError::DeleteNotPermitted(_))));
    }

    #[tokio::test]
    async fn delete_allowed_after_completion() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", None, None).await.unwrap();
        store
            .update_status(&id, JobStatus::Processing, 0, Some("extracting_frames"), None)
            .await
            .unwrap();
        store
            .finish_ok(&id, 10.0, 2, 1, serde_json::json!({}), "reports/x/report.json")
            .await
            .unwrap();
        store.delete(&id, chrono::Duration::minutes(15)).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn recover_stale_processing_resets_to_queued() {
        let store = test_store().await;
        let id = store.submit("clip.mp4", None, None).await.unwrap();
        store
            .update_status(&id, JobStatus::Processing, 30, Some("detecting_entities"), None)
            .await
            .unwrap();

        // `recover_stale_processing` compares against `updated_at`, which
        // `test_store` just set to `Utc::now()`; a zero-width stale window
        // treats every `processing` job as stale.
        let reset = store
            .recover_stale_processing(chrono::Duration::zero())
            .await
            .unwrap();
        assert_eq!(reset, vec![id.clone()]);
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = test_store().await;
        let a = store.submit("a.mp4", None, None).await.unwrap();
        let _b = store.submit("b.mp4", None, None).await.unwrap();
        store
            .update_status(&a, JobStatus::Processing, 0, Some("extracting_frames"), None)
            .await
            .unwrap();

        let (queued, total) = store.list(Some(JobStatus::Queued), 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].filename, "b.mp4");
    }
}
