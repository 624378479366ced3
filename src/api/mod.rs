pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::IssuedToken;
use crate::backend::{ModelInfo, SynthesisParams};

/// Closed set of gateway actions. Unknown strings fall through to
/// `Unrecognized` at the serde boundary and are rejected in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Health,
    GenerateToken,
    RefreshToken,
    Synthesize,
    ListModels,
    Unrecognized,
}

impl Action {
    /// `get_models` is a deprecated alias kept for older clients.
    fn parse(raw: &str) -> Action {
        match raw {
            "health" => Action::Health,
            "generate_token" => Action::GenerateToken,
            "refresh_token" => Action::RefreshToken,
            "synthesize" => Action::Synthesize,
            "list_models" | "get_models" => Action::ListModels,
            _ => Action::Unrecognized,
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Action::parse(&raw))
    }
}

/// One inbound job. `token` is the canonical credential field; `jwt_token`,
/// `authorization` and `auth_token` are deprecated aliases kept for older
/// clients and resolved here.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub action: Option<Action>,

    #[serde(alias = "jwt_token", alias = "authorization", alias = "auth_token")]
    pub token: Option<String>,

    // Synthesis fields. `model` is the deprecated name for `engine`.
    pub text: Option<String>,
    #[serde(alias = "model")]
    pub engine: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub format: Option<String>,

    // Token issuance fields
    pub user_id: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub user_data: Map<String, Value>,

    /// Engine-specific fields passed through to the backend
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRequest {
    /// A job with no explicit action but with text is treated as synthesis,
    /// matching what older clients send.
    pub fn action(&self) -> Action {
        match self.action {
            Some(action) => action,
            None if self.text.is_some() => Action::Synthesize,
            None => Action::Unrecognized,
        }
    }

    pub fn synthesis_params(&self) -> SynthesisParams {
        SynthesisParams {
            text: self.text.clone().unwrap_or_default(),
            voice: self.voice.clone(),
            speed: self.speed,
            format: self.format.clone(),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub gateway: String,
    pub version: String,
    pub jwt_auth_enabled: bool,
    /// Which engines have a configured endpoint
    pub engines: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    #[serde(flatten)]
    pub token: IssuedToken,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<ModelInfo>,
    pub total_models: usize,
}
