use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::SystemTime;

use super::{Action, HealthResponse, JobRequest, ModelsResponse, TokenResponse};
use crate::api::routes::AppState;
use crate::auth::{Claims, TokenError};
use crate::backend::{model_info, Engine};
use crate::error::AppError;

const MAX_TEXT_LEN: usize = 10_000;

/// Single job ingress. Dispatches on the action after converting the
/// untrusted envelope into a typed request.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let job = parse_envelope(body)?;

    match job.action() {
        Action::Health => Ok(Json(health_info(&state)).into_response()),
        Action::GenerateToken => {
            let response = generate_token(&state, &job)?;
            Ok(Json(response).into_response())
        }
        Action::RefreshToken => {
            let response = refresh_token(&state, &job)?;
            Ok(Json(response).into_response())
        }
        Action::Synthesize => synthesize(&state, &job).await,
        Action::ListModels => {
            authorize(&state, &job)?;
            Ok(Json(list_models()).into_response())
        }
        Action::Unrecognized => Err(AppError::Validation(
            "Unrecognized action; expected one of: health, generate_token, refresh_token, \
             synthesize, list_models"
                .to_string(),
        )),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(health_info(&state))
}

/// Accepts both a bare job and the `{"input": {...}}` envelope used by
/// serverless ingress.
fn parse_envelope(body: Value) -> Result<JobRequest, AppError> {
    let inner = match body {
        Value::Object(mut map) => match map.remove("input") {
            Some(input @ Value::Object(_)) => input,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "'input' must be an object, got {other}"
                )))
            }
            None => Value::Object(map),
        },
        other => {
            return Err(AppError::Validation(format!(
                "Job must be a JSON object, got {other}"
            )))
        }
    };

    serde_json::from_value(inner).map_err(|e| AppError::Validation(format!("Invalid job: {e}")))
}

/// Token gate for protected actions. Returns the validated claims, or `None`
/// when authentication is disabled by configuration. The forwarder is never
/// reached unless this succeeds.
fn authorize(state: &AppState, job: &JobRequest) -> Result<Option<Claims>, AppError> {
    if !state.config.require_auth {
        return Ok(None);
    }

    let token = job.token.as_deref().ok_or(TokenError::Missing)?;
    let claims = state.tokens.validate(token)?;
    Ok(Some(claims))
}

fn health_info(state: &AppState) -> HealthResponse {
    let mut engines = Map::new();
    for engine in Engine::all() {
        engines.insert(
            engine.name().to_string(),
            json!(state.config.routes.contains_key(&engine)),
        );
    }

    HealthResponse {
        success: true,
        status: "healthy".to_string(),
        gateway: "tts-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jwt_auth_enabled: state.config.require_auth,
        engines,
    }
}

fn generate_token(state: &AppState, job: &JobRequest) -> Result<TokenResponse, AppError> {
    let user_id = job
        .user_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("No user_id provided".to_string()))?;
    let role = job.role.as_deref().unwrap_or("user");

    let issued = state
        .tokens
        .issue(user_id, role, job.user_data.clone(), SystemTime::now())?;

    tracing::info!("Issued token for user '{}' with role '{}'", user_id, role);

    Ok(TokenResponse {
        success: true,
        token: issued,
    })
}

/// The presented token is the credential here: refresh re-checks its
/// signature and age, so no separate authorization pass is needed.
fn refresh_token(state: &AppState, job: &JobRequest) -> Result<TokenResponse, AppError> {
    let token = job.token.as_deref().ok_or(TokenError::Missing)?;
    let issued = state.tokens.refresh(token, SystemTime::now())?;

    tracing::info!("Refreshed token for user '{}'", issued.user_id);

    Ok(TokenResponse {
        success: true,
        token: issued,
    })
}

async fn synthesize(state: &AppState, job: &JobRequest) -> Result<Response, AppError> {
    // Auth comes first: an unauthenticated job must never reach the backend.
    let claims = authorize(state, job)?;

    let text = job.text.as_deref().unwrap_or("").trim();
    if text.is_empty() {
        return Err(AppError::Validation("No text provided".to_string()));
    }
    if text.len() > MAX_TEXT_LEN {
        return Err(AppError::Validation(format!(
            "Text too long (max {MAX_TEXT_LEN} chars)"
        )));
    }

    let engine = job.engine.as_deref().unwrap_or("kokkoro");
    if let Some(claims) = &claims {
        tracing::info!("Synthesis request from user '{}' for '{engine}'", claims.sub);
    }

    let mut params = job.synthesis_params();
    params.text = text.to_string();
    let body = state.forwarder.forward(engine, &params).await?;

    Ok(Json(synthesize_response(engine, body)).into_response())
}

/// Embed the backend body verbatim in a success envelope.
fn synthesize_response(engine: &str, body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            map.insert("success".to_string(), json!(true));
            map.insert("engine".to_string(), json!(engine));
            Value::Object(map)
        }
        other => json!({
            "success": true,
            "engine": engine,
            "output": other,
        }),
    }
}

fn list_models() -> ModelsResponse {
    let models: Vec<_> = Engine::all().into_iter().map(model_info).collect();
    let total_models = models.len();
    ModelsResponse {
        success: true,
        models,
        total_models,
    }
}
