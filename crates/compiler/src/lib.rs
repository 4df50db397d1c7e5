//! Reference schema compiler for choreodata
//!
//! Compiles a JSON data-dependency-graph document into a [`ModelTree`].
//!
//! # Document Syntax
//!
//! ```json
//! {
//!   "namespace": "http://example.org/billing",
//!   "name": "billing",
//!   "objects": [
//!     {
//!       "name": "invoice",
//!       "elements": [
//!         { "name": "total", "type": "number" },
//!         { "name": "lines", "type": "json", "collection": true },
//!         { "name": "scan", "type": "binary", "contentType": "application/pdf" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use choreo_compiler::JsonSchemaCompiler;
//! use choreo_core::SchemaCompiler;
//! use uuid::Uuid;
//!
//! let src = br#"{"namespace":"ns","name":"m","objects":[
//!     {"name":"o","elements":[{"name":"e","type":"string"}]}]}"#;
//! let out = JsonSchemaCompiler::new().compile(Uuid::new_v4(), "m", src).unwrap();
//! assert!(out.issues.is_empty());
//! assert_eq!(out.model.unwrap().objects[0].elements[0].content_type, "text/plain");
//! ```
//!
//! Every problem found is reported; compilation does not stop at the first.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod validator;

pub use validator::{default_content_type, VALUE_TYPES};

use choreo_core::{CompileOutput, Result, SchemaCompiler};
use tracing::debug;
use uuid::Uuid;

/// Compiler for the JSON document format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaCompiler;

impl JsonSchemaCompiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self
    }
}

impl SchemaCompiler for JsonSchemaCompiler {
    fn compile(&self, owner_id: Uuid, entity_name: &str, source: &[u8]) -> Result<CompileOutput> {
        let output = validator::compile_document(entity_name, source);
        debug!(
            target: "choreo::compile",
            owner = %owner_id,
            entity = entity_name,
            issues = output.issues.len(),
            "Compiled schema document"
        );
        Ok(output)
    }
}
