//! Axum route handlers for the Resume API.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Html,
    Json,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::resume::{Resume, ResumeData};
use crate::resume::render::{render_document, render_preview};
use crate::resume::validation::validate_resume;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub resume: Option<Resume>,
}

/// GET /api/resume
///
/// `resume` is null until the first save.
pub async fn handle_get_resume(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ResumeResponse>, AppError> {
    let resume = state.resumes.load(&user.user_id).await?;
    Ok(Json(ResumeResponse { resume }))
}

/// POST /api/resume
///
/// Full-state save from the editor's auto-save. Creates the resume on first
/// call and replaces every child collection afterwards.
pub async fn handle_save_resume(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ResumeData>, JsonRejection>,
) -> Result<Json<ResumeResponse>, AppError> {
    let Json(data) = payload?;
    validate_resume(&data)?;
    let resume = state.resumes.save(&user.user_id, &data).await?;
    Ok(Json(ResumeResponse {
        resume: Some(resume),
    }))
}

/// GET /api/resume/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Html<String>, AppError> {
    let resume = load_existing(&state, &user).await?;
    Ok(Html(render_preview(&resume.data)))
}

/// GET /api/resume/export
///
/// Paywalled. Returns a print-ready document the browser saves as PDF.
pub async fn handle_export(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Html<String>, AppError> {
    let subscribed = state
        .subscriptions
        .get(&user.user_id)
        .await?
        .is_some_and(|s| s.is_active());
    if !subscribed {
        return Err(AppError::PaymentRequired);
    }

    let resume = load_existing(&state, &user).await?;
    Ok(Html(render_document(&resume)))
}

async fn load_existing(state: &AppState, user: &AuthUser) -> Result<Resume, AppError> {
    state
        .resumes
        .load(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No resume saved yet".to_string()))
}
