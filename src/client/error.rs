use serde_json::Value;

use crate::validation::ValidationError;

const TIMEOUT_KEYWORDS: [&str; 3] = ["timeout", "timed out", "deadline"];
const NETWORK_KEYWORDS: [&str; 7] = [
    "network",
    "failed to fetch",
    "connection",
    "connect",
    "dns",
    "offline",
    "unreachable",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("invalid input: {message}")]
    Validation {
        message: String,
        fields: Vec<ValidationError>,
    },
    #[error("simulation failed: {message}")]
    Simulation { status: Option<u16>, message: String },
    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },
}

impl ApiError {
    pub fn from_transport_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if TIMEOUT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            ApiError::Timeout(message.to_string())
        } else if NETWORK_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            ApiError::Network(message.to_string())
        } else {
            ApiError::Simulation {
                status: None,
                message: message.to_string(),
            }
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            ApiError::Timeout(message)
        } else if err.is_connect() {
            ApiError::Network(message)
        } else if let Some(status) = err.status() {
            ApiError::from_response(status.as_u16(), "")
        } else {
            ApiError::from_transport_message(&message)
        }
    }

    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let mut message = None;
        let mut fields = Vec::new();

        if let Some(json) = &parsed {
            match json.get("detail") {
                Some(Value::String(detail)) => message = Some(detail.clone()),
                Some(Value::Array(items)) => fields = items.iter().filter_map(field_error).collect(),
                _ => {}
            }
            if message.is_none() {
                message = ["message", "error"]
                    .iter()
                    .find_map(|key| json.get(*key).and_then(Value::as_str))
                    .map(str::to_string);
            }
        }

        if status == 422 || !fields.is_empty() {
            let message = if fields.is_empty() {
                message.unwrap_or_else(|| "the request was rejected as invalid".to_string())
            } else {
                fields
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return ApiError::Validation { message, fields };
        }

        let message = message.unwrap_or_else(|| fallback_message(status, body));
        if status >= 500 {
            ApiError::Simulation {
                status: Some(status),
                message,
            }
        } else {
            ApiError::Api { status, message }
        }
    }

    pub fn field_errors(&self) -> &[ValidationError] {
        match self {
            ApiError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.chars().take(200).collect()
    }
}

// Converts one `{loc, msg}` entry. Leading `body`/`query`/`path` markers are dropped and
// numeric segments become indices, so `["body","holdings",0,"balance"]` reads
// `holdings[0].balance`.
fn field_error(item: &Value) -> Option<ValidationError> {
    let msg = item.get("msg").and_then(Value::as_str)?;
    let mut path = String::new();
    if let Some(loc) = item.get("loc").and_then(Value::as_array) {
        for (i, segment) in loc.iter().enumerate() {
            match segment {
                Value::String(s) if i == 0 && matches!(s.as_str(), "body" | "query" | "path") => {}
                Value::String(s) => {
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(s);
                }
                Value::Number(n) => path.push_str(&format!("[{n}]")),
                _ => {}
            }
        }
    }
    Some(ValidationError::new(path, msg))
}
