use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{
    EducationRow, ExperienceRow, ProjectRow, Resume, ResumeData, ResumeRow, Skill, SkillRow,
};

/// Persistence for the resume aggregate. Carried in `AppState` as
/// `Arc<dyn ResumeRepository>`.
#[async_trait]
pub trait ResumeRepository: Send + Sync {
    /// Returns the user's resume, or `None` before the first save.
    async fn load(&self, user_id: &str) -> Result<Option<Resume>, AppError>;

    /// Creates the resume on first save; afterwards overwrites the personal
    /// fields and replaces every child collection wholesale.
    async fn save(&self, user_id: &str, data: &ResumeData) -> Result<Resume, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

const DELETE_CHILDREN: &[&str] = &[
    "DELETE FROM resume_education WHERE resume_id = $1",
    "DELETE FROM resume_experience WHERE resume_id = $1",
    "DELETE FROM resume_projects WHERE resume_id = $1",
    "DELETE FROM resume_skills WHERE resume_id = $1",
];

pub struct PgResumeRepository {
    pool: PgPool,
}

impl PgResumeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeRepository for PgResumeRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Resume>, AppError> {
        // Root and children must come from the same snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let row: Option<ResumeRow> = sqlx::query_as(
            r#"
            SELECT id, name, email, phone, linkedin, github, updated_at
            FROM resumes WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data = load_children(&mut tx, &row).await?;
        tx.commit().await?;

        Ok(Some(Resume {
            id: row.id,
            updated_at: row.updated_at,
            data,
        }))
    }

    async fn save(&self, user_id: &str, data: &ResumeData) -> Result<Resume, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Upsert the aggregate root (one row per user)
        let personal = &data.personal;
        let row: ResumeRow = sqlx::query_as(
            r#"
            INSERT INTO resumes (id, user_id, name, email, phone, linkedin, github)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                linkedin = EXCLUDED.linkedin,
                github = EXCLUDED.github,
                updated_at = NOW()
            RETURNING id, name, email, phone, linkedin, github, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&personal.name)
        .bind(&personal.email)
        .bind(&personal.phone)
        .bind(&personal.linkedin)
        .bind(&personal.github)
        .fetch_one(&mut *tx)
        .await?;

        // 2. Drop every child row, then re-insert in editor order
        for statement in DELETE_CHILDREN {
            sqlx::query(statement).bind(row.id).execute(&mut *tx).await?;
        }
        insert_children(&mut tx, row.id, data).await?;

        tx.commit().await?;

        info!(
            "Saved resume {} for user {user_id} ({} education, {} experience, {} projects, {} skill groups)",
            row.id,
            data.education.len(),
            data.experience.len(),
            data.projects.len(),
            data.skills.len()
        );

        Ok(Resume {
            id: row.id,
            updated_at: row.updated_at,
            data: data.clone(),
        })
    }
}

async fn insert_children(
    conn: &mut PgConnection,
    resume_id: Uuid,
    data: &ResumeData,
) -> Result<(), sqlx::Error> {
    for (position, e) in (0_i32..).zip(&data.education) {
        sqlx::query(
            r#"
            INSERT INTO resume_education
                (resume_id, position, school, degree, location, start_date, end_date, gpa)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(resume_id)
        .bind(position)
        .bind(&e.school)
        .bind(&e.degree)
        .bind(&e.location)
        .bind(&e.start_date)
        .bind(&e.end_date)
        .bind(&e.gpa)
        .execute(&mut *conn)
        .await?;
    }

    for (position, e) in (0_i32..).zip(&data.experience) {
        sqlx::query(
            r#"
            INSERT INTO resume_experience
                (resume_id, position, company, role, location, start_date, end_date, bullets)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(resume_id)
        .bind(position)
        .bind(&e.company)
        .bind(&e.role)
        .bind(&e.location)
        .bind(&e.start_date)
        .bind(&e.end_date)
        .bind(&e.bullets)
        .execute(&mut *conn)
        .await?;
    }

    for (position, p) in (0_i32..).zip(&data.projects) {
        sqlx::query(
            r#"
            INSERT INTO resume_projects
                (resume_id, position, name, tech_stack, link, start_date, end_date, bullets)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(resume_id)
        .bind(position)
        .bind(&p.name)
        .bind(&p.tech_stack)
        .bind(&p.link)
        .bind(&p.start_date)
        .bind(&p.end_date)
        .bind(&p.bullets)
        .execute(&mut *conn)
        .await?;
    }

    for (position, s) in (0_i32..).zip(&data.skills) {
        sqlx::query(
            "INSERT INTO resume_skills (resume_id, position, category, items) VALUES ($1, $2, $3, $4)",
        )
        .bind(resume_id)
        .bind(position)
        .bind(s.category.as_str())
        .bind(&s.items)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn load_children(conn: &mut PgConnection, row: &ResumeRow) -> Result<ResumeData, AppError> {
    let education: Vec<EducationRow> = sqlx::query_as(
        r#"
        SELECT school, degree, location, start_date, end_date, gpa
        FROM resume_education WHERE resume_id = $1 ORDER BY position
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let experience: Vec<ExperienceRow> = sqlx::query_as(
        r#"
        SELECT company, role, location, start_date, end_date, bullets
        FROM resume_experience WHERE resume_id = $1 ORDER BY position
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let projects: Vec<ProjectRow> = sqlx::query_as(
        r#"
        SELECT name, tech_stack, link, start_date, end_date, bullets
        FROM resume_projects WHERE resume_id = $1 ORDER BY position
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let skills: Vec<SkillRow> = sqlx::query_as(
        "SELECT category, items FROM resume_skills WHERE resume_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let skills = skills
        .into_iter()
        .map(Skill::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(anyhow!("corrupt skill row for resume {}: {e}", row.id)))?;

    Ok(ResumeData {
        personal: row.personal(),
        education: education.into_iter().map(Into::into).collect(),
        experience: experience.into_iter().map(Into::into).collect(),
        projects: projects.into_iter().map(Into::into).collect(),
        skills,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory (handler tests)
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub struct InMemoryResumeRepository {
    resumes: std::sync::Mutex<std::collections::HashMap<String, Resume>>,
}

#[cfg(test)]
#[async_trait]
impl ResumeRepository for InMemoryResumeRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Resume>, AppError> {
        Ok(self.resumes.lock().unwrap().get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, data: &ResumeData) -> Result<Resume, AppError> {
        let mut resumes = self.resumes.lock().unwrap();
        let id = resumes.get(user_id).map_or_else(Uuid::new_v4, |r| r.id);
        let resume = Resume {
            id,
            updated_at: chrono::Utc::now(),
            data: data.clone(),
        };
        resumes.insert(user_id.to_string(), resume.clone());
        Ok(resume)
    }
}
