//! Inbound task model and parsing.
//!
//! Producers are not consistent about field naming, so each logical
//! attribute of a task is looked up through an ordered list of accepted
//! names. The list is data ([`FieldAliases`]) rather than code, and is
//! resolved exactly once into a strongly typed [`Task`].

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::TaskId;

/// Ordered accepted field names per logical task attribute.
///
/// The first name that resolves to a non-empty value wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldAliases {
    /// Alias table version, bumped whenever an alias is added or removed.
    pub version: u32,
    pub task_id: Vec<String>,
    pub input_bucket: Vec<String>,
    pub input_object: Vec<String>,
    pub output_basename: Vec<String>,
}

impl FieldAliases {
    /// Alias table accepted by every worker in the fleet.
    pub fn v1() -> Self {
        Self {
            version: 1,
            task_id: vec!["task_id".into(), "TaskId".into()],
            input_bucket: vec!["input_bucket_name".into()],
            input_object: vec!["input_object_name".into(), "MinioFilePath".into()],
            output_basename: vec!["output_file_basename".into()],
        }
    }

    /// Canonical name of the required input object field.
    pub fn input_object_field(&self) -> &str {
        self.input_object
            .first()
            .map(String::as_str)
            .unwrap_or("input_object_name")
    }

    fn all_names(&self) -> impl Iterator<Item = &str> {
        self.task_id
            .iter()
            .chain(&self.input_bucket)
            .chain(&self.input_object)
            .chain(&self.output_basename)
            .map(String::as_str)
    }
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self::v1()
    }
}

/// One unit of work parsed from an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub task_id: TaskId,
    pub input_bucket: String,
    pub input_object: String,
    pub output_basename: String,
    /// Fields not consumed by the alias table, passed through to the tool.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Task {
    /// Extension of the input object including the leading dot, or empty.
    pub fn input_extension(&self) -> String {
        Path::new(&self.input_object)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// Local file name for the downloaded input.
    pub fn local_input_name(&self) -> String {
        format!("{}{}", self.task_id.sanitized(), self.input_extension())
    }
}

/// Resolves raw inbound payloads into [`Task`] values.
#[derive(Debug, Clone)]
pub struct TaskParser {
    aliases: FieldAliases,
    default_bucket: String,
}

impl TaskParser {
    pub fn new(aliases: FieldAliases, default_bucket: impl Into<String>) -> Self {
        Self {
            aliases,
            default_bucket: default_bucket.into(),
        }
    }

    /// Decode a message body into a JSON object.
    ///
    /// Anything that is not a JSON object is treated as malformed.
    pub fn decode(body: &[u8]) -> ModelResult<Map<String, Value>> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ModelError::malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ModelError::malformed(e.to_string())),
        }
    }

    /// Resolve the task identifier.
    ///
    /// Priority: broker correlation id, then a payload field, then a
    /// freshly generated id.
    pub fn resolve_task_id(
        &self,
        payload: &Map<String, Value>,
        correlation_id: Option<&str>,
    ) -> TaskId {
        if let Some(id) = correlation_id.map(str::trim).filter(|s| !s.is_empty()) {
            return TaskId::from_string(id);
        }

        lookup(payload, &self.aliases.task_id)
            .map(TaskId::from_string)
            .unwrap_or_default()
    }

    /// Build a typed task from a decoded payload.
    ///
    /// Fails only when no input object alias resolves.
    pub fn parse(&self, payload: &Map<String, Value>, task_id: TaskId) -> ModelResult<Task> {
        let input_object = match lookup(payload, &self.aliases.input_object) {
            Some(object) => object,
            None => {
                let field = self.aliases.input_object_field().to_string();
                return Err(ModelError::missing_field(task_id, field));
            }
        };

        let input_bucket = lookup(payload, &self.aliases.input_bucket)
            .unwrap_or_else(|| self.default_bucket.clone());

        let output_basename = lookup(payload, &self.aliases.output_basename)
            .or_else(|| {
                Path::new(&input_object)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| task_id.to_string());

        let consumed: Vec<&str> = self.aliases.all_names().collect();
        let params = payload
            .iter()
            .filter(|(key, _)| !consumed.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Task {
            task_id,
            input_bucket,
            input_object,
            output_basename,
            params,
        })
    }
}

/// First alias that resolves to a non-empty scalar.
fn lookup(payload: &Map<String, Value>, names: &[String]) -> Option<String> {
    names.iter().find_map(|name| match payload.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> TaskParser {
        TaskParser::new(FieldAliases::v1(), "audio-bucket")
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = TaskParser::decode(b"{not json").unwrap_err();
        assert!(matches!(err, ModelError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = TaskParser::decode(b"[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_task_id_priority() {
        let parser = parser();
        let payload = object(json!({"task_id": "from-body", "TaskId": "legacy"}));

        assert_eq!(
            parser.resolve_task_id(&payload, Some("from-broker")).as_str(),
            "from-broker"
        );
        assert_eq!(parser.resolve_task_id(&payload, None).as_str(), "from-body");
        assert_eq!(parser.resolve_task_id(&payload, Some("  ")).as_str(), "from-body");

        let legacy = object(json!({"TaskId": "legacy"}));
        assert_eq!(parser.resolve_task_id(&legacy, None).as_str(), "legacy");
    }

    #[test]
    fn test_task_id_generated_when_absent() {
        let parser = parser();
        let payload = object(json!({"task_id": ""}));
        let id = parser.resolve_task_id(&payload, None);
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn test_parse_applies_defaults() {
        let parser = parser();
        let payload = object(json!({"input_object_name": "uploads/song.wav"}));
        let task = parser
            .parse(&payload, TaskId::from_string("t1"))
            .unwrap();

        assert_eq!(task.input_bucket, "audio-bucket");
        assert_eq!(task.input_object, "uploads/song.wav");
        assert_eq!(task.output_basename, "song");
        assert!(task.params.is_empty());
        assert_eq!(task.local_input_name(), "t1.wav");
    }

    #[test]
    fn test_parse_accepts_legacy_alias() {
        let parser = parser();
        let payload = object(json!({
            "MinioFilePath": "a/b/take.mp3",
            "input_bucket_name": "other",
            "output_file_basename": "final",
            "language": "en"
        }));
        let task = parser.parse(&payload, TaskId::from_string("t2")).unwrap();

        assert_eq!(task.input_object, "a/b/take.mp3");
        assert_eq!(task.input_bucket, "other");
        assert_eq!(task.output_basename, "final");
        assert_eq!(task.params.get("language"), Some(&json!("en")));
        assert!(!task.params.contains_key("MinioFilePath"));
    }

    #[test]
    fn test_parse_missing_input_object() {
        let parser = parser();
        let payload = object(json!({"input_object_name": "   ", "task_id": "t3"}));
        let err = parser
            .parse(&payload, TaskId::from_string("t3"))
            .unwrap_err();

        match err {
            ModelError::MissingField { task_id, field } => {
                assert_eq!(task_id.as_str(), "t3");
                assert_eq!(field, "input_object_name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_basename_falls_back_to_task_id() {
        let parser = parser();
        let payload = object(json!({"input_object_name": "dir/"}));
        let task = parser.parse(&payload, TaskId::from_string("t4")).unwrap();
        assert_eq!(task.output_basename, "dir");

        let payload = object(json!({"input_object_name": ".."}));
        let task = parser.parse(&payload, TaskId::from_string("t5")).unwrap();
        assert_eq!(task.output_basename, "t5");
    }
}
