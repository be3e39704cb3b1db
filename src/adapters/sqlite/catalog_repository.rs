//! SQLite projections of jobs and candidate profiles.
//!
//! Other services own this data; the core only reads it. The upsert methods
//! exist for the CLI and for tests seeding a database.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CandidateProfile, Job, JobSource};
use crate::domain::ports::{JobCatalog, ProfileDirectory};

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_job(&self, job: &Job) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO jobs (id, source, apply_url, title, company, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   source = excluded.source,
                   apply_url = excluded.apply_url,
                   title = excluded.title,
                   company = excluded.company,
                   updated_at = excluded.updated_at"#,
        )
        .bind(job.id.to_string())
        .bind(job.source.as_str())
        .bind(&job.apply_url)
        .bind(&job.title)
        .bind(&job.company)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_profile(&self, profile: &CandidateProfile) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO candidate_profiles
                   (user_id, full_name, email, phone, location, resume_file_reference, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                   full_name = excluded.full_name,
                   email = excluded.email,
                   phone = excluded.phone,
                   location = excluded.location,
                   resume_file_reference = excluded.resume_file_reference,
                   updated_at = excluded.updated_at"#,
        )
        .bind(profile.user_id.to_string())
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.phone)
        .bind(&profile.location)
        .bind(&profile.resume_file_reference)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_jobs(&self) -> DomainResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs ORDER BY company, title")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl JobCatalog for SqliteCatalog {
    async fn get_job(&self, id: Uuid) -> DomainResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl ProfileDirectory for SqliteCatalog {
    async fn get_profile(&self, user_id: Uuid) -> DomainResult<Option<CandidateProfile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT * FROM candidate_profiles WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    source: String,
    apply_url: String,
    title: String,
    company: String,
}

impl TryFrom<JobRow> for Job {
    type Error = DomainError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: parse_uuid(&row.id)?,
            source: JobSource::parse(&row.source),
            apply_url: row.apply_url,
            title: row.title,
            company: row.company,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    location: Option<String>,
    resume_file_reference: Option<String>,
}

impl TryFrom<ProfileRow> for CandidateProfile {
    type Error = DomainError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(CandidateProfile {
            user_id: parse_uuid(&row.user_id)?,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            location: row.location,
            resume_file_reference: row.resume_file_reference,
        })
    }
}
