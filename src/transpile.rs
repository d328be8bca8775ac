//! Transpiler collaborator: typed source in, plain ES module text out.
//!
//! TypeScript syntax is stripped with the oxc transformer; plain JavaScript
//! passes through a parse/print round trip unchanged. Runs after the import
//! rewrite, over the already-wrapped module text.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};

use crate::error::BuildError;

pub(crate) fn source_type_for(file: &Path) -> SourceType {
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
    let mut source_type = SourceType::default().with_module(true);
    if matches!(ext, "ts" | "mts" | "cts" | "tsx") {
        source_type = source_type.with_typescript(true);
    }
    if matches!(ext, "tsx" | "jsx") {
        source_type = source_type.with_jsx(true);
    }
    source_type
}

/// Transpile one file to plain ES. Fails with a translation error naming the
/// file when the source cannot be parsed.
pub fn transpile(source: &str, file: &Path) -> Result<String, BuildError> {
    let file_name = file.to_string_lossy().to_string();
    let allocator = Allocator::default();
    let source_type = source_type_for(file);

    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(BuildError::translation(
            &file_name,
            ret.errors[0].to_string(),
        ));
    }

    let mut program = ret.program;
    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let transformed = Transformer::new(&allocator, file, &TransformOptions::default())
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(BuildError::translation(
            &file_name,
            transformed.errors[0].to_string(),
        ));
    }

    Ok(Codegen::new().build(&program).code)
}
