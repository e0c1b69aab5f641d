//! Output envelope for the CLI.
//!
//! Human-facing text goes to stderr; the machine-facing JSON envelope goes
//! to stdout, and only when JSON mode is selected.

use serde::Serialize;
use serde_json::Value;

use crate::domain::errors::CoreError;

pub const API_VERSION: &str = "v1";

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub api_version: &'static str,
    pub cmd: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorBody>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl Envelope {
    pub fn success(cmd: &str, data: Value) -> Self {
        Self {
            api_version: API_VERSION,
            cmd: cmd.to_string(),
            ok: true,
            data: Some(data),
            errors: None,
        }
    }

    pub fn failure(cmd: &str, err: &CoreError) -> Self {
        Self {
            api_version: API_VERSION,
            cmd: cmd.to_string(),
            ok: false,
            data: None,
            errors: Some(vec![ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }]),
        }
    }
}

/// Emit a successful result in the selected mode.
pub fn emit_success(cmd: &str, json_mode: bool, data: Value, human: &str) {
    if json_mode {
        let envelope = Envelope::success(cmd, data);
        println!(
            "{}",
            serde_json::to_string_pretty(&envelope).unwrap_or_default()
        );
    } else {
        eprintln!("{human}");
    }
}

/// Emit a failure in the selected mode.
pub fn emit_failure(cmd: &str, json_mode: bool, err: &CoreError) {
    if json_mode {
        let envelope = Envelope::failure(cmd, err);
        println!(
            "{}",
            serde_json::to_string_pretty(&envelope).unwrap_or_default()
        );
    } else {
        eprintln!("error [{}]: {}", err.kind(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_shape() {
        let envelope = Envelope::success("learn", json!({"rendered": true}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["api_version"], "v1");
        assert_eq!(value["cmd"], "learn");
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"]["rendered"], true);
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn failure_envelope_carries_the_taxonomy_tag() {
        let err = CoreError::State("markers missing".into());
        let envelope = Envelope::failure("apply", &err);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["errors"][0]["kind"], "StateError");
    }
}
