//! Repository for the `jobs` table.
//!
//! Uses the `JobStatus` enum from `models::status` for all status
//! transitions. No magic numbers -- every status literal is a named constant.

use chrono::Utc;

use autopub_core::types::DbId;

use crate::models::job::{Job, JobListQuery, SubmitJob};
use crate::models::status::{JobStatus, StatusId};
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str =
    "id, resource_id, goal, known_vars, status_id, message, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Non-terminal statuses: queued, running.
const ACTIVE_STATUSES: [StatusId; 2] = [
    JobStatus::Queued as StatusId,
    JobStatus::Running as StatusId,
];

/// Provides CRUD operations for automation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new queued job. Returns immediately with the job row.
    pub async fn create(pool: &DbPool, input: &SubmitJob) -> Result<Job, sqlx::Error> {
        let known_vars = input
            .known_vars
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "{}".to_string());
        let now = Utc::now();

        let query = format!(
            "INSERT INTO jobs (resource_id, goal, known_vars, status_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.resource_id)
            .bind(&input.goal)
            .bind(&known_vars)
            .bind(JobStatus::Queued.id())
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs newest-first with optional status filter and paging.
    pub async fn list(pool: &DbPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        match params.status_id {
            Some(status_id) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs WHERE status_id = ? \
                     ORDER BY id DESC LIMIT ? OFFSET ?"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(status_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query =
                    format!("SELECT {COLUMNS} FROM jobs ORDER BY id DESC LIMIT ? OFFSET ?");
                sqlx::query_as::<_, Job>(&query)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// List queued jobs oldest-first, for the dispatcher.
    pub async fn list_queued(pool: &DbPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status_id = ? ORDER BY id ASC LIMIT ?"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Move a job to `running`.
    pub async fn mark_running(pool: &DbPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET status_id = ?, updated_at = ? WHERE id = ?")
            .bind(JobStatus::Running.id())
            .bind(Utc::now())
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Commit a terminal status, but only if the job is still active.
    ///
    /// Returns `true` if this call performed the transition. A job that
    /// already reached a terminal state is left untouched, so whichever
    /// path terminates first wins and later cleanup passes are no-ops.
    pub async fn finish_if_active(
        pool: &DbPool,
        job_id: DbId,
        status: JobStatus,
        message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE jobs SET status_id = ?, message = ?, updated_at = ? \
             WHERE id = ? AND status_id IN (?, ?)",
        )
        .bind(status.id())
        .bind(message)
        .bind(Utc::now())
        .bind(job_id)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;

    use super::*;

    fn submit(resource_id: &str) -> SubmitJob {
        SubmitJob {
            resource_id: resource_id.to_string(),
            goal: "publish the draft".to_string(),
            known_vars: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn create_starts_queued(pool: SqlitePool) {
        let job = JobRepo::create(&pool, &submit("p1")).await.unwrap();

        assert_eq!(job.resource_id, "p1");
        assert_eq!(job.status_id, JobStatus::Queued.id());
        assert!(job.message.is_none());
        assert_eq!(job.known_vars, "{}");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn find_returns_created_row(pool: SqlitePool) {
        let created = JobRepo::create(&pool, &submit("p1")).await.unwrap();
        let found = JobRepo::find_by_id(&pool, created.id).await.unwrap();
        assert_eq!(found.unwrap().id, created.id);

        let missing = JobRepo::find_by_id(&pool, 9999).await.unwrap();
        assert!(missing.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn finish_if_active_transitions_once(pool: SqlitePool) {
        let job = JobRepo::create(&pool, &submit("p1")).await.unwrap();
        JobRepo::mark_running(&pool, job.id).await.unwrap();

        let first = JobRepo::finish_if_active(&pool, job.id, JobStatus::Done, None)
            .await
            .unwrap();
        assert!(first);

        // A later error path must not overwrite the terminal state.
        let second =
            JobRepo::finish_if_active(&pool, job.id, JobStatus::Error, Some("too late"))
                .await
                .unwrap();
        assert!(!second);

        let row = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(row.status_id, JobStatus::Done.id());
        assert!(row.message.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn list_filters_by_status(pool: SqlitePool) {
        let a = JobRepo::create(&pool, &submit("p1")).await.unwrap();
        let _b = JobRepo::create(&pool, &submit("p2")).await.unwrap();
        JobRepo::finish_if_active(&pool, a.id, JobStatus::Error, Some("boom"))
            .await
            .unwrap();

        let errored = JobRepo::list(
            &pool,
            &JobListQuery {
                status_id: Some(JobStatus::Error.id()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].id, a.id);

        let queued = JobRepo::list_queued(&pool, 10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].resource_id, "p2");
    }
}
