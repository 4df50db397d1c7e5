//! Validator: walks a parsed document and builds the model tree
//!
//! Parsing happens first (syntax errors carry line/column); the walk then
//! collects semantic issues with a JSON-pointer path for each.

use choreo_core::{
    CompilationIssue, CompileOutput, ElementTree, ModelTree, ObjectTree, SourcePosition,
};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Value type tags accepted for elements
pub const VALUE_TYPES: &[&str] = &[
    "string", "number", "integer", "boolean", "date", "binary", "json", "xml",
];

const MODEL_FIELDS: &[&str] = &["namespace", "name", "objects"];
const OBJECT_FIELDS: &[&str] = &["name", "elements"];
const ELEMENT_FIELDS: &[&str] = &["name", "type", "contentType", "collection"];

/// Content type assumed when an element does not declare one
pub fn default_content_type(value_type: &str) -> &'static str {
    match value_type {
        "binary" => "application/octet-stream",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "text/plain",
    }
}

pub(crate) fn compile_document(entity_name: &str, source: &[u8]) -> CompileOutput {
    let mut issues = Vec::new();

    let root: Value = match serde_json::from_slice(source) {
        Ok(v) => v,
        Err(e) => {
            issues.push(
                CompilationIssue::error("E_SYNTAX", format!("malformed document: {}", e)).at(
                    SourcePosition {
                        line: e.line(),
                        column: e.column(),
                        path: String::new(),
                    },
                ),
            );
            return CompileOutput {
                model: None,
                issues,
            };
        }
    };

    let Some(doc) = root.as_object() else {
        issues.push(issue_at("E_SHAPE", "document root must be an object", ""));
        return CompileOutput {
            model: None,
            issues,
        };
    };

    warn_unknown_fields(doc, MODEL_FIELDS, "", &mut issues);

    let namespace = required_string(doc, "namespace", "", &mut issues);
    let name = match doc.get("name") {
        None => {
            issues.push(
                CompilationIssue::warning(
                    "W_DEFAULT_NAME",
                    format!("model name missing, using entity name '{}'", entity_name),
                )
                .at(pointer("/name")),
            );
            Some(entity_name.to_string())
        }
        Some(_) => required_string(doc, "name", "", &mut issues),
    };

    let objects = compile_objects(doc.get("objects"), &mut issues);

    let model = match (namespace, name) {
        (Some(namespace), Some(name)) => Some(ModelTree {
            namespace,
            name,
            objects,
        }),
        _ => None,
    };

    CompileOutput { model, issues }
}

fn compile_objects(value: Option<&Value>, issues: &mut Vec<CompilationIssue>) -> Vec<ObjectTree> {
    let Some(list) = value.and_then(Value::as_array) else {
        issues.push(issue_at("E_SHAPE", "'objects' must be an array", "/objects"));
        return Vec::new();
    };
    if list.is_empty() {
        issues.push(issue_at(
            "E_EMPTY_MODEL",
            "a model needs at least one object",
            "/objects",
        ));
    }

    let mut seen = HashSet::new();
    let mut objects = Vec::with_capacity(list.len());
    for (i, raw) in list.iter().enumerate() {
        let path = format!("/objects/{}", i);
        let Some(obj) = raw.as_object() else {
            issues.push(issue_at("E_SHAPE", "object entry must be an object", &path));
            continue;
        };
        warn_unknown_fields(obj, OBJECT_FIELDS, &path, issues);

        let Some(name) = required_string(obj, "name", &path, issues) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            issues.push(issue_at(
                "E_DUPLICATE_OBJECT",
                format!("duplicate object name '{}'", name),
                &path,
            ));
            continue;
        }

        let elements = compile_elements(obj.get("elements"), &name, &path, issues);
        objects.push(ObjectTree { name, elements });
    }
    objects
}

fn compile_elements(
    value: Option<&Value>,
    object: &str,
    object_path: &str,
    issues: &mut Vec<CompilationIssue>,
) -> Vec<ElementTree> {
    let list_path = format!("{}/elements", object_path);
    let Some(list) = value.and_then(Value::as_array) else {
        issues.push(issue_at("E_SHAPE", "'elements' must be an array", &list_path));
        return Vec::new();
    };
    if list.is_empty() {
        issues.push(issue_at(
            "E_EMPTY_OBJECT",
            format!("object '{}' needs at least one element", object),
            &list_path,
        ));
    }

    let mut seen = HashSet::new();
    let mut elements = Vec::with_capacity(list.len());
    for (i, raw) in list.iter().enumerate() {
        let path = format!("{}/{}", list_path, i);
        let Some(el) = raw.as_object() else {
            issues.push(issue_at("E_SHAPE", "element entry must be an object", &path));
            continue;
        };
        warn_unknown_fields(el, ELEMENT_FIELDS, &path, issues);

        let name = required_string(el, "name", &path, issues);
        let value_type = required_string(el, "type", &path, issues);

        if let Some(t) = &value_type {
            if !VALUE_TYPES.contains(&t.as_str()) {
                issues.push(issue_at(
                    "E_UNKNOWN_TYPE",
                    format!("unknown value type '{}'", t),
                    &format!("{}/type", path),
                ));
            }
        }

        let is_collection = match el.get("collection") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                issues.push(issue_at(
                    "E_SHAPE",
                    "'collection' must be a boolean",
                    &format!("{}/collection", path),
                ));
                false
            }
        };

        let content_type = match el.get("contentType") {
            None => None,
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(_) => {
                issues.push(issue_at(
                    "E_SHAPE",
                    "'contentType' must be a non-empty string",
                    &format!("{}/contentType", path),
                ));
                None
            }
        };

        let (Some(name), Some(value_type)) = (name, value_type) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            issues.push(issue_at(
                "E_DUPLICATE_ELEMENT",
                format!("duplicate element name '{}' in object '{}'", name, object),
                &path,
            ));
            continue;
        }

        let content_type =
            content_type.unwrap_or_else(|| default_content_type(&value_type).to_string());
        elements.push(ElementTree {
            name,
            value_type,
            content_type,
            is_collection,
        });
    }
    elements
}

fn required_string(
    map: &Map<String, Value>,
    field: &str,
    parent: &str,
    issues: &mut Vec<CompilationIssue>,
) -> Option<String> {
    let path = format!("{}/{}", parent, field);
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            issues.push(issue_at(
                "E_EMPTY_NAME",
                format!("'{}' must not be blank", field),
                &path,
            ));
            None
        }
        Some(_) => {
            issues.push(issue_at(
                "E_SHAPE",
                format!("'{}' must be a string", field),
                &path,
            ));
            None
        }
        None => {
            issues.push(issue_at(
                "E_MISSING_FIELD",
                format!("missing required field '{}'", field),
                &path,
            ));
            None
        }
    }
}

fn warn_unknown_fields(
    map: &Map<String, Value>,
    known: &[&str],
    parent: &str,
    issues: &mut Vec<CompilationIssue>,
) {
    for key in map.keys() {
        if !known.contains(&key.as_str()) {
            issues.push(
                CompilationIssue::warning("W_UNKNOWN_FIELD", format!("unknown field '{}'", key))
                    .at(pointer(&format!("{}/{}", parent, key))),
            );
        }
    }
}

fn pointer(path: &str) -> SourcePosition {
    SourcePosition {
        line: 0,
        column: 0,
        path: path.to_string(),
    }
}

fn issue_at(code: &str, message: impl Into<String>, path: &str) -> CompilationIssue {
    CompilationIssue::error(code, message).at(pointer(if path.is_empty() { "/" } else { path }))
}
