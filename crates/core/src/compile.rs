//! Compiler contract
//!
//! The core hands a serialized schema document to a [`SchemaCompiler`] and
//! receives a plain model tree plus the ordered list of issues found. The
//! tree carries names and types only; the engine turns it into registered
//! entities.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity of a compilation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Does not block compilation
    Warning,
    /// Compilation fails
    Error,
}

/// Location of an issue inside the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// 1-based line, 0 when unknown
    pub line: usize,
    /// 1-based column, 0 when unknown
    pub column: usize,
    /// Structural path to the offending node (e.g. `/objects/1/elements/0`)
    pub path: String,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "{}:{}", self.line, self.column)?;
            if !self.path.is_empty() {
                write!(f, " ({})", self.path)?;
            }
            Ok(())
        } else {
            f.write_str(&self.path)
        }
    }
}

/// One problem reported by the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationIssue {
    /// Severity
    pub severity: Severity,
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Where in the source, if known
    pub position: Option<SourcePosition>,
}

impl CompilationIssue {
    /// Create an error-severity issue
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            position: None,
        }
    }

    /// Create a warning-severity issue
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Attach a source position
    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Check if this issue fails compilation
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for CompilationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}[{}]: {}", sev, self.code, self.message)?;
        if let Some(pos) = &self.position {
            write!(f, " at {}", pos)?;
        }
        Ok(())
    }
}

/// Compiled DataElement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTree {
    /// Element name, unique within its object
    pub name: String,
    /// Value type tag
    pub value_type: String,
    /// MIME content type
    pub content_type: String,
    /// Whether instances hold a list of values
    pub is_collection: bool,
}

/// Compiled DataObject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTree {
    /// Object name, unique within its model
    pub name: String,
    /// Elements in declaration order
    pub elements: Vec<ElementTree>,
}

/// Compiled DataModel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTree {
    /// Target namespace
    pub namespace: String,
    /// Model name
    pub name: String,
    /// Objects in declaration order
    pub objects: Vec<ObjectTree>,
}

/// Result of one compiler invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    /// The model, when the document was well-formed enough to produce one
    pub model: Option<ModelTree>,
    /// Every issue found, in source order
    pub issues: Vec<CompilationIssue>,
}

impl CompileOutput {
    /// Check if any issue fails compilation
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(CompilationIssue::is_error)
    }
}

/// Turns a serialized schema document into a model tree
///
/// Errors returned through `Result` are collaborator failures (I/O and the
/// like); problems with the document itself are reported as issues.
pub trait SchemaCompiler: Send + Sync {
    /// Compile `source` on behalf of the entity `owner_id`
    fn compile(&self, owner_id: Uuid, entity_name: &str, source: &[u8]) -> Result<CompileOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail() {
        let out = CompileOutput {
            model: None,
            issues: vec![CompilationIssue::warning("W1", "unused")],
        };
        assert!(!out.has_errors());
    }

    #[test]
    fn test_errors_fail() {
        let out = CompileOutput {
            model: None,
            issues: vec![
                CompilationIssue::warning("W1", "unused"),
                CompilationIssue::error("E1", "broken"),
            ],
        };
        assert!(out.has_errors());
    }

    #[test]
    fn test_issue_display() {
        let issue = CompilationIssue::error("E_DUP", "duplicate object 'a'").at(SourcePosition {
            line: 3,
            column: 7,
            path: "/objects/1".into(),
        });
        assert_eq!(
            issue.to_string(),
            "error[E_DUP]: duplicate object 'a' at 3:7 (/objects/1)"
        );
    }
}
