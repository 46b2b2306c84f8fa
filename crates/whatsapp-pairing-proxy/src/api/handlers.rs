//! HTTP request handlers.

use super::types::{HealthResponse, PairCodeResponse, PhoneQuery, StatusResponse};
use super::AppState;
use crate::error::ServiceError;
use crate::session::{PairingOutcome, PhoneNumber};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

fn phone_from_query(query: &PhoneQuery) -> Result<PhoneNumber, ServiceError> {
    match query.phone.as_deref() {
        Some(phone) => PhoneNumber::parse(phone),
        None => Err(ServiceError::InvalidPhoneNumber("missing phone parameter".into())),
    }
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.sessions.count().await,
        bridge_healthy: state.sessions.bridge_healthy().await,
    })
}

/// Issue a pairing code, or return the one already issued for this number.
pub async fn pair_code(
    State(state): State<AppState>,
    Query(query): Query<PhoneQuery>,
) -> Result<Json<PairCodeResponse>, ServiceError> {
    let phone = phone_from_query(&query)?;
    info!(phone_number = %phone, "Pairing code request received");

    let outcome = state.sessions.request_pairing(&phone).await?;

    let message = match outcome {
        PairingOutcome::New(_) => {
            "Pairing code generated successfully. Connect your WhatsApp now!"
        }
        PairingOutcome::Existing(_) => "Session already active.",
    };

    Ok(Json(PairCodeResponse {
        phone: phone.to_string(),
        pairing_code: outcome.code().to_string(),
        message: message.to_string(),
    }))
}

/// Report whether a session is held for this number.
pub async fn session_status(
    State(state): State<AppState>,
    Query(query): Query<PhoneQuery>,
) -> Result<(StatusCode, Json<StatusResponse>), ServiceError> {
    let phone = phone_from_query(&query)?;

    let response = match state.sessions.status(&phone).await {
        Some(session_state) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "active".to_string(),
                phone: phone.to_string(),
                state: Some(session_state),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(StatusResponse {
                status: "inactive".to_string(),
                phone: phone.to_string(),
                state: None,
            }),
        ),
    };

    Ok(response)
}
