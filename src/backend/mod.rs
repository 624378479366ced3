pub mod forward;

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

pub use forward::Forwarder;

/// The closed set of backend engines. Untrusted engine names are converted
/// here at the boundary; anything else is rejected before a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Kokkoro,
    Chatterbox,
}

impl Engine {
    pub fn parse(name: &str) -> Option<Engine> {
        match name.to_ascii_lowercase().as_str() {
            "kokkoro" | "kokoro" => Some(Engine::Kokkoro),
            "chatterbox" | "chat" => Some(Engine::Chatterbox),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::Kokkoro => "kokkoro",
            Engine::Chatterbox => "chatterbox",
        }
    }

    pub fn all() -> [Engine; 2] {
        [Engine::Kokkoro, Engine::Chatterbox]
    }
}

/// Static route to one backend service. Loaded at startup, never mutated.
#[derive(Debug, Clone)]
pub struct BackendRoute {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub voices: &'static [&'static str],
    pub languages: &'static [&'static str],
}

pub fn model_info(engine: Engine) -> ModelInfo {
    match engine {
        Engine::Kokkoro => ModelInfo {
            id: "kokkoro",
            name: "Kokkoro TTS",
            description: "High-quality neural TTS model",
            voices: &["default", "female1", "male1"],
            languages: &["en", "ja"],
        },
        Engine::Chatterbox => ModelInfo {
            id: "chatterbox",
            name: "Chatterbox TTS",
            description: "Fast and efficient TTS model",
            voices: &["default", "casual", "formal"],
            languages: &["en"],
        },
    }
}

/// Caller-supplied synthesis fields, already validated by the router.
#[derive(Debug, Clone, Default)]
pub struct SynthesisParams {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub format: Option<String>,
    pub extra: Map<String, Value>,
}

/// Merge caller fields over engine-specific defaults and wrap in the
/// `{"input": {...}}` envelope the backends expect.
pub fn build_payload(engine: Engine, params: &SynthesisParams) -> Value {
    let mut body = match engine {
        Engine::Kokkoro => {
            let mut m = Map::new();
            m.insert("voice".to_string(), json!("af_sarah"));
            m.insert("speed".to_string(), json!(1.0));
            m.insert("language".to_string(), json!("en-us"));
            m
        }
        Engine::Chatterbox => {
            let mut m = Map::new();
            m.insert("voice_mode".to_string(), json!("predefined"));
            m.insert("voice_id".to_string(), json!("1"));
            m.insert("temperature".to_string(), json!(0.7));
            m.insert("speed_factor".to_string(), json!(1.0));
            m
        }
    };

    for (key, value) in &params.extra {
        body.insert(key.clone(), value.clone());
    }

    if let Some(voice) = &params.voice {
        body.insert("voice".to_string(), json!(voice));
    }
    if let Some(speed) = params.speed {
        let key = match engine {
            Engine::Kokkoro => "speed",
            Engine::Chatterbox => "speed_factor",
        };
        body.insert(key.to_string(), json!(speed));
    }
    if let Some(format) = &params.format {
        body.insert("format".to_string(), json!(format));
    }
    body.insert("text".to_string(), json!(params.text));

    json!({ "input": Value::Object(body) })
}
