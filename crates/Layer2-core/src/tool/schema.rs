//! Schema translation - canonical JSON Schema → consumer 형식
//!
//! | format    | envelope                                             |
//! |-----------|------------------------------------------------------|
//! | Anthropic | `{name, description, input_schema}`                  |
//! | OpenAi    | `{type: "function", function: {name, description, parameters}}` |
//! | Gemini    | `{name, description, parameters}` (키워드 제거)       |

use super::descriptor::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Gemini 가 거부하는 키워드
const GEMINI_UNSUPPORTED: &[&str] = &[
    "default",
    "additionalProperties",
    "anyOf",
    "oneOf",
    "allOf",
    "$schema",
    "$id",
    "$comment",
    "examples",
    "title",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFormat {
    Anthropic,
    OpenAi,
    Gemini,
}

impl std::str::FromStr for SchemaFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(format!("Unknown schema format: {}", other)),
        }
    }
}

pub struct SchemaTranslator;

impl SchemaTranslator {
    /// The descriptor's canonical schema is never modified.
    pub fn translate(descriptor: &ToolDescriptor, format: SchemaFormat) -> Value {
        let name = Self::consumer_name(&descriptor.id);
        match format {
            SchemaFormat::Anthropic => json!({
                "name": name,
                "description": descriptor.description,
                "input_schema": descriptor.schema,
            }),
            SchemaFormat::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": descriptor.description,
                    "parameters": descriptor.schema,
                }
            }),
            SchemaFormat::Gemini => json!({
                "name": name,
                "description": descriptor.description,
                "parameters": Self::strip_unsupported(&descriptor.schema),
            }),
        }
    }

    /// Consumer tool names allow `[A-Za-z0-9_-]` only
    pub fn consumer_name(id: &str) -> String {
        id.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Recursive copy without unsupported keywords, descending into
    /// `properties` and `items`
    pub fn strip_unsupported(schema: &Value) -> Value {
        let Value::Object(map) = schema else {
            return schema.clone();
        };

        let mut out = Map::new();
        for (key, value) in map {
            if GEMINI_UNSUPPORTED.contains(&key.as_str()) {
                continue;
            }
            let cleaned = match (key.as_str(), value) {
                ("properties", Value::Object(props)) => Value::Object(
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), Self::strip_unsupported(prop)))
                        .collect(),
                ),
                ("items", Value::Array(items)) => {
                    Value::Array(items.iter().map(Self::strip_unsupported).collect())
                }
                ("items", item) => Self::strip_unsupported(item),
                _ => value.clone(),
            };
            out.insert(key.clone(), cleaned);
        }
        Value::Object(out)
    }
}
