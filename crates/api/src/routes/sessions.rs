use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use livepoll_db::models::{Question, QuestionType, Session, SessionStatus};
use livepoll_services::session::{NewQuestion, NewSession};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::{ApiError, parse_object_id},
    extractors::JsonBody,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1))]
    pub organizer_id: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub join_code: Option<String>,
    #[validate(length(min = 1), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[validate(length(min = 2))]
    pub options: Vec<String>,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub questions: Vec<QuestionResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
}

pub async fn create(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if body.join_code.as_deref().is_some_and(|c| !c.is_empty()) {
        return Err(ApiError::BadRequest(
            "Do not provide a join code, it is generated by the server".to_string(),
        ));
    }
    body.validate()?;
    let organizer_id = parse_object_id("organizerId", &body.organizer_id)?;

    let session = state
        .services
        .sessions
        .create_session(NewSession {
            organizer_id,
            title: body.title,
            join_code: body.join_code,
            questions: body
                .questions
                .into_iter()
                .map(|q| NewQuestion {
                    text: q.text,
                    options: q.options,
                    question_type: q.question_type,
                })
                .collect(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(session))))
}

pub async fn get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sid = parse_object_id("sessionId", &session_id)?;
    let session = state.services.sessions.get_session(&sid).await?;
    Ok(Json(to_response(session)))
}

pub async fn get_by_join_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.services.sessions.find_by_join_code(&code).await?;
    Ok(Json(to_response(session)))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(body): JsonBody<UpdateStatusRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sid = parse_object_id("sessionId", &session_id)?;
    let session = state
        .services
        .sessions
        .update_status(&sid, body.status)
        .await?;
    Ok(Json(to_response(session)))
}

pub async fn list_by_organizer(
    State(state): State<AppState>,
    Path(organizer_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let oid = parse_object_id("organizerId", &organizer_id)?;
    let sessions = state.services.sessions.list_by_organizer(&oid).await?;
    let items: Vec<SessionResponse> = sessions.into_iter().map(to_response).collect();

    Ok(Json(serde_json::json!({
        "total": items.len(),
        "items": items,
    })))
}

pub fn to_response(session: Session) -> SessionResponse {
    SessionResponse {
        id: session.id.to_hex(),
        organizer_id: session.organizer_id.to_hex(),
        title: session.title,
        join_code: session.join_code,
        status: session.status,
        questions: session.questions.into_iter().map(question_response).collect(),
        created_at: session.created_at.to_chrono().to_rfc3339(),
        updated_at: session.updated_at.to_chrono().to_rfc3339(),
    }
}

fn question_response(question: Question) -> QuestionResponse {
    QuestionResponse {
        id: question.id.to_hex(),
        text: question.text,
        options: question.options,
        question_type: question.question_type,
    }
}
