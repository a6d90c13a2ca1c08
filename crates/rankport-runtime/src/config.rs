use std::collections::HashMap;

use thiserror::Error;

pub const OUTPUT_NAME_KEY: &str = "onnx.output_name";
pub const PARSE_FEATURE_STRING_KEY: &str = "onnx.parse_feature_string";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value '{value}' for setting '{key}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings a ranker is constructed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankerConfig {
    /// Name of the model output whose elements become the ranked actions.
    pub output_name: String,
    /// `true`: features arrive as tensor notation. `false` selects the
    /// structured input path, which is not implemented.
    pub parse_feature_string: bool,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            output_name: "output".to_string(),
            parse_feature_string: true,
        }
    }
}

impl RankerConfig {
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            ..Self::default()
        }
    }

    pub fn with_parse_feature_string(mut self, parse_feature_string: bool) -> Self {
        self.parse_feature_string = parse_feature_string;
        self
    }

    /// Reads `onnx.output_name` (required) and `onnx.parse_feature_string`
    /// (defaults to `true`) from a flat property map.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let output_name = props
            .get(OUTPUT_NAME_KEY)
            .ok_or(ConfigError::Missing(OUTPUT_NAME_KEY))?;
        if output_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: OUTPUT_NAME_KEY,
                value: output_name.clone(),
            });
        }

        let parse_feature_string = match props.get(PARSE_FEATURE_STRING_KEY) {
            None => true,
            Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError::InvalidValue {
                key: PARSE_FEATURE_STRING_KEY,
                value: raw.clone(),
            })?,
        };

        Ok(Self {
            output_name: output_name.clone(),
            parse_feature_string,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
