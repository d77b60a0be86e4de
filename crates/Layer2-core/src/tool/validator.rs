//! Argument validation against a tool's JSON Schema

use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Returns every violation; empty means valid.
pub trait Validator: Send + Sync {
    fn validate(&self, args: &Value, schema: &Value) -> Vec<String>;
}

/// `jsonschema` 기반 validator (컴파일된 스키마 캐시)
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: Mutex<HashMap<String, Arc<JSONSchema>>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, schema: &Value) -> Result<Arc<JSONSchema>, String> {
        let key = schema.to_string();
        if let Some(hit) = self.compiled.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let compiled = Arc::new(
            JSONSchema::compile(schema).map_err(|e| format!("schema is invalid: {}", e))?,
        );
        if let Ok(mut cache) = self.compiled.lock() {
            cache.insert(key, Arc::clone(&compiled));
        }
        Ok(compiled)
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, args: &Value, schema: &Value) -> Vec<String> {
        let compiled = match self.compile(schema) {
            Ok(c) => c,
            Err(e) => return vec![e],
        };

        let violations = match compiled.validate(args) {
            Ok(()) => vec![],
            Err(errors) => errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("path '{}' violated schema: {}", path, error)
                })
                .collect(),
        };
        violations
    }
}

/// Accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _args: &Value, _schema: &Value) -> Vec<String> {
        vec![]
    }
}
