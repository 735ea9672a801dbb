use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::{Answer, ConversationTurn, DomainError};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_check_relevance")]
    pub check_relevance: bool,
}

fn default_check_relevance() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub turns: Vec<ConversationTurn>,
}

pub async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("question must not be empty"));
    }

    match state.rag.ask(question, request.check_relevance).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e @ DomainError::Generation(_)) => {
            Err(ApiError::from(e).with_message(state.config.prompts.error_response.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        turns: state.rag.history().await,
    })
}

pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.rag.clear_history().await;
    StatusCode::NO_CONTENT
}
