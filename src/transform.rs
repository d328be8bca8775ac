//! Source transform engine: the IMEX rewrite.
//!
//! Rewrites one module's import/export syntax into calls against the runtime
//! registry, wrapping everything in an immediately-invoked scope so
//! identifiers never collide across modules. Runs on the author's source,
//! before type stripping, so the line tags below see the original comments.
//! Runs as two phases over the top-level statements: first collect the
//! import/export facts and a plan per statement, then emit the rewritten
//! module from those facts. Import/export constructs are top-level-only in
//! ES, so no deep traversal is needed.
//!
//! Line tags: a statement whose first source line contains `__imex_omit` is
//! dropped entirely; `__imex_ignore` passes the statement's original text
//! through verbatim, even when it is shaped like an import or export.

use std::collections::HashMap;
use std::path::Path;

use lazy_static::lazy_static;
use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::{
    BindingPattern, Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier,
    ModuleExportName, Program, Statement, TSModuleReference,
};
use oxc_ast::AstBuilder;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, SPAN};
use regex::Regex;

use crate::error::BuildError;
use crate::module_key::module_key;

lazy_static! {
    static ref OMIT_RE: Regex = Regex::new(r"__imex_omit\b").unwrap();
    static ref IGNORE_RE: Regex = Regex::new(r"__imex_ignore\b").unwrap();
}

/// A reference one module makes into the registry: a whole bucket
/// (namespace) when `name` is absent, a single export otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub key: String,
    pub name: Option<String>,
}

/// Per-file transform output plus the metadata the assembler rehearses with.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    pub key: String,
    /// Root-relative source path, kept on the emitted script block.
    pub source_path: String,
    pub code: String,
    pub exports: Vec<String>,
    pub imports: Vec<ImportRef>,
    /// Whole-bucket merges from `export * from "X"`.
    pub merges: Vec<String>,
}

enum Plan {
    /// Construct fully rewritten into synthesized calls (or type-only).
    Drop,
    /// Untouched statement, re-printed in place.
    Keep,
    /// Ignore-tagged statement, original text.
    Verbatim(String),
    /// `export` modifier stripped, inner declaration kept.
    Declaration,
    /// Synthesized replacement text in body position.
    Replace(String),
    /// Import-map passthrough, hoisted above the module scope.
    Native,
}

#[derive(Default)]
struct Facts {
    plans: Vec<Plan>,
    import_lines: Vec<String>,
    export_lines: Vec<String>,
    imports: Vec<ImportRef>,
    exports: Vec<String>,
    merges: Vec<String>,
}

/// Rewrite one module. Returns `None` (the empty sentinel) when nothing
/// runtime-visible remains, e.g. a type-only file.
pub fn transform_module(
    root: &Path,
    file: &Path,
    import_map: Option<&HashMap<String, String>>,
    source: &str,
) -> Result<Option<TransformedModule>, BuildError> {
    let file_name = file.to_string_lossy().to_string();
    let own_specifier = format!(
        "./{}",
        file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
    let this_key = module_key(root, file, &own_specifier);

    let allocator = Allocator::default();
    // typescript on: a superset grammar, so plain transpiled output parses
    // and a surviving import-equals is still recognized
    let source_type = SourceType::default().with_module(true).with_typescript(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(BuildError::translation(&file_name, ret.errors[0].to_string()));
    }
    let program = ret.program;

    let facts = collect_facts(&program, source, root, file, &this_key, import_map);
    Ok(emit(
        &allocator,
        source_type,
        &program,
        facts,
        this_key,
        relative_source(root, file),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PHASE 1: FACT COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

fn collect_facts(
    program: &Program<'_>,
    source: &str,
    root: &Path,
    file: &Path,
    this_key: &str,
    import_map: Option<&HashMap<String, String>>,
) -> Facts {
    let mut facts = Facts::default();

    for stmt in &program.body {
        let span = stmt.span();
        let line = line_at(source, span.start as usize);
        if OMIT_RE.is_match(line) {
            facts.plans.push(Plan::Drop);
            continue;
        }
        if IGNORE_RE.is_match(line) {
            let text = source[span.start as usize..span.end as usize].to_string();
            facts.plans.push(Plan::Verbatim(text));
            continue;
        }

        let plan = match stmt {
            Statement::ImportDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                if import_map
                    .map(|m| m.contains_key(&specifier))
                    .unwrap_or(false)
                {
                    Plan::Native
                } else if decl.import_kind.is_type() {
                    Plan::Drop
                } else {
                    let key = module_key(root, file, &specifier);
                    if let Some(specifiers) = &decl.specifiers {
                        for item in specifiers {
                            match item {
                                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                    if s.import_kind.is_type() {
                                        continue;
                                    }
                                    let external = export_name(&s.imported);
                                    facts.bind_import(&s.local.name, &key, Some(&external));
                                }
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    facts.bind_import(&s.local.name, &key, Some("default"));
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    facts.bind_import(&s.local.name, &key, None);
                                }
                            }
                        }
                    }
                    // bare side-effect import: the graph already pulled the
                    // file into the bundle, nothing to bind here
                    Plan::Drop
                }
            }

            Statement::ExportNamedDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    Plan::Drop
                } else if let Some(declaration) = &decl.declaration {
                    match declared_names(declaration) {
                        Some(names) => {
                            for name in &names {
                                facts.register_export(this_key, name, name);
                            }
                            Plan::Declaration
                        }
                        None => Plan::Drop,
                    }
                } else if let Some(src) = &decl.source {
                    // re-export: import then export, without a local binding
                    let key = module_key(root, file, &src.value);
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        let external = export_name(&spec.local);
                        let public = export_name(&spec.exported);
                        let value = import_call(&key, Some(&external));
                        facts.register_export(this_key, &public, &value);
                        facts.imports.push(ImportRef {
                            key: key.clone(),
                            name: Some(external),
                        });
                    }
                    Plan::Drop
                } else {
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        let local = export_name(&spec.local);
                        let public = export_name(&spec.exported);
                        facts.register_export(this_key, &public, &local);
                    }
                    Plan::Drop
                }
            }

            Statement::ExportAllDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    Plan::Drop
                } else {
                    let key = module_key(root, file, &decl.source.value);
                    match &decl.exported {
                        Some(alias) => {
                            // live bucket object bound under the alias
                            let public = export_name(alias);
                            let value = import_call(&key, None);
                            facts.register_export(this_key, &public, &value);
                        }
                        None => {
                            facts.export_lines.push(format!(
                                "__imex_merge(__imex, {}, {});",
                                js_str(this_key),
                                js_str(&key)
                            ));
                            facts.merges.push(key.clone());
                        }
                    }
                    facts.imports.push(ImportRef { key, name: None });
                    Plan::Drop
                }
            }

            Statement::ExportDefaultDeclaration(decl) => {
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| (id.name.to_string(), f.span))
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| (id.name.to_string(), c.span))
                    }
                    _ => None,
                };
                match named {
                    Some((name, decl_span)) => {
                        // keep the named declaration, register it as "default"
                        facts.register_export(this_key, "default", &name);
                        Plan::Replace(
                            source[decl_span.start as usize..decl_span.end as usize].to_string(),
                        )
                    }
                    None => {
                        let expr_span = decl.declaration.span();
                        let value =
                            source[expr_span.start as usize..expr_span.end as usize].to_string();
                        facts.register_export(this_key, "default", &value);
                        Plan::Drop
                    }
                }
            }

            Statement::TSImportEqualsDeclaration(decl) => {
                // pinned to import semantics: the referenced module becomes a
                // whole-bucket lookup bound to the declared local name
                match &decl.module_reference {
                    TSModuleReference::ExternalModuleReference(reference) => {
                        let key = module_key(root, file, &reference.expression.value);
                        facts.bind_import(&decl.id.name, &key, None);
                        Plan::Drop
                    }
                    other => {
                        let span = other.span();
                        let target = &source[span.start as usize..span.end as usize];
                        Plan::Replace(format!("const {} = {};", decl.id.name, target))
                    }
                }
            }

            _ => Plan::Keep,
        };
        facts.plans.push(plan);
    }

    facts
}

impl Facts {
    fn bind_import(&mut self, local: &str, key: &str, external: Option<&str>) {
        self.import_lines
            .push(format!("const {} = {};", local, import_call(key, external)));
        self.imports.push(ImportRef {
            key: key.to_string(),
            name: external.map(str::to_string),
        });
    }

    fn register_export(&mut self, this_key: &str, public: &str, value: &str) {
        self.export_lines.push(format!(
            "__imex_export(__imex, {}, {}, {});",
            js_str(this_key),
            js_str(public),
            value
        ));
        self.exports.push(public.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PHASE 2: EMISSION
// ═══════════════════════════════════════════════════════════════════════════════

fn emit<'a>(
    allocator: &'a Allocator,
    source_type: SourceType,
    program: &Program<'a>,
    facts: Facts,
    this_key: String,
    source_path: String,
) -> Option<TransformedModule> {
    let mut native_imports = Vec::new();
    let mut body_lines = Vec::new();

    for (stmt, plan) in program.body.iter().zip(&facts.plans) {
        match plan {
            Plan::Drop => {}
            Plan::Keep => body_lines.push(print_statement(allocator, source_type, stmt)),
            Plan::Verbatim(text) => body_lines.push(text.clone()),
            Plan::Replace(text) => body_lines.push(text.clone()),
            Plan::Declaration => {
                if let Statement::ExportNamedDeclaration(decl) = stmt {
                    if let Some(declaration) = &decl.declaration {
                        let inner = Statement::from(declaration.clone_in(allocator));
                        body_lines.push(print_statement_owned(allocator, source_type, inner));
                    }
                }
            }
            Plan::Native => native_imports.push(print_statement(allocator, source_type, stmt)),
        }
    }

    // empty sentinel: nothing runtime-visible remains
    if body_lines.is_empty() && facts.export_lines.is_empty() && native_imports.is_empty() {
        return None;
    }

    let mut code = String::new();
    for import in &native_imports {
        code.push_str(import.trim_end());
        code.push('\n');
    }
    code.push_str("(() => {\n");
    for line in &facts.import_lines {
        code.push_str(line);
        code.push('\n');
    }
    for line in &body_lines {
        code.push_str(line.trim_end());
        code.push('\n');
    }
    for line in &facts.export_lines {
        code.push_str(line);
        code.push('\n');
    }
    code.push_str("})();\n");

    Some(TransformedModule {
        key: this_key,
        source_path,
        code,
        exports: facts.exports,
        imports: facts.imports,
        merges: facts.merges,
    })
}

fn print_statement<'a>(
    allocator: &'a Allocator,
    source_type: SourceType,
    stmt: &Statement<'a>,
) -> String {
    print_statement_owned(allocator, source_type, stmt.clone_in(allocator))
}

fn print_statement_owned<'a>(
    allocator: &'a Allocator,
    source_type: SourceType,
    stmt: Statement<'a>,
) -> String {
    let ast = AstBuilder::new(allocator);
    let mut body = ast.vec();
    body.push(stmt);
    let program = Program {
        span: SPAN,
        source_type,
        hashbang: None,
        directives: ast.vec(),
        body,
        source_text: "",
        comments: ast.vec(),
        scope_id: std::cell::Cell::new(None),
    };
    Codegen::new().build(&program).code
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn import_call(key: &str, name: Option<&str>) -> String {
    match name {
        Some(n) => format!("__imex_import(__imex, {}, {})", js_str(key), js_str(n)),
        None => format!("__imex_import(__imex, {})", js_str(key)),
    }
}

/// Quote as a JS string literal.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

/// Runtime-visible names declared by an exported declaration; `None` for
/// type-only declarations. Co-declared and destructured bindings each get
/// their own name.
fn declared_names(declaration: &Declaration) -> Option<Vec<String>> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var_decl) => {
            for decl in &var_decl.declarations {
                collect_binding_names(&decl.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            names.extend(func.id.as_ref().map(|id| id.name.to_string()));
        }
        Declaration::ClassDeclaration(class) => {
            names.extend(class.id.as_ref().map(|id| id.name.to_string()));
        }
        // enums are runtime-visible, unlike the other TS declarations
        Declaration::TSEnumDeclaration(ts_enum) => {
            names.push(ts_enum.id.name.to_string());
        }
        _ => return None,
    }
    Some(names)
}

fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        _ => {}
    }
}

fn line_at(source: &str, offset: usize) -> &str {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = source[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(source.len());
    &source[start..end]
}

fn relative_source(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Option<TransformedModule> {
        transform_module(Path::new("/p"), Path::new("/p/m.ts"), None, source).unwrap()
    }

    #[test]
    fn export_const_registers_value() {
        let out = run("export const x = 1;").unwrap();
        assert!(out.code.contains("const x = 1"));
        assert!(out.code.contains("__imex_export(__imex, \"m\", \"x\", x);"));
        assert!(!out.code.contains("export const"));
        assert_eq!(out.exports, vec!["x"]);
    }

    #[test]
    fn co_declared_bindings_each_register() {
        let out = run("export const a = 1, b = 2;").unwrap();
        assert!(out.code.contains("\"a\", a"));
        assert!(out.code.contains("\"b\", b"));
        assert_eq!(out.exports, vec!["a", "b"]);
    }

    #[test]
    fn aliased_named_import_binds_local_name() {
        let out = run("import { foo as bar } from './lib/util';\nconsole.log(bar);").unwrap();
        assert!(out
            .code
            .contains("const bar = __imex_import(__imex, \"lib/util\", \"foo\");"));
        assert!(!out.code.contains("const foo"));
        assert_eq!(
            out.imports,
            vec![ImportRef {
                key: "lib/util".to_string(),
                name: Some("foo".to_string())
            }]
        );
    }

    #[test]
    fn namespace_import_binds_whole_bucket() {
        let out = run("import * as ns from './math';\nns.sin(1);").unwrap();
        assert!(out
            .code
            .contains("const ns = __imex_import(__imex, \"math\");"));
    }

    #[test]
    fn named_export_list_with_alias() {
        let out = run("const a = 1;\nexport { a as b };").unwrap();
        assert!(out.code.contains("__imex_export(__imex, \"m\", \"b\", a);"));
    }

    #[test]
    fn re_export_has_no_local_binding() {
        let out = run("export { a as b } from './src';").unwrap();
        assert!(out.code.contains(
            "__imex_export(__imex, \"m\", \"b\", __imex_import(__imex, \"src\", \"a\"));"
        ));
        assert!(!out.code.contains("const "));
    }

    #[test]
    fn namespace_re_export_binds_bucket() {
        let out = run("export * as ns from './src';").unwrap();
        assert!(out
            .code
            .contains("__imex_export(__imex, \"m\", \"ns\", __imex_import(__imex, \"src\"));"));
    }

    #[test]
    fn star_re_export_merges_bucket() {
        let out = run("export * from './src';").unwrap();
        assert!(out.code.contains("__imex_merge(__imex, \"m\", \"src\");"));
        assert_eq!(out.merges, vec!["src"]);
    }

    #[test]
    fn default_export_registers_under_default() {
        let out = run("export default function main() { return 1; }").unwrap();
        assert!(out.code.contains("function main()"));
        assert!(out
            .code
            .contains("__imex_export(__imex, \"m\", \"default\", main);"));

        let out = run("export default 42;").unwrap();
        assert!(out
            .code
            .contains("__imex_export(__imex, \"m\", \"default\", 42);"));
    }

    #[test]
    fn default_import_looks_up_default() {
        let out = run("import widget from './widget';\nwidget();").unwrap();
        assert!(out
            .code
            .contains("const widget = __imex_import(__imex, \"widget\", \"default\");"));
    }

    #[test]
    fn import_map_entries_pass_through_natively() {
        let mut map = HashMap::new();
        map.insert("lit".to_string(), "https://cdn.example/lit.js".to_string());
        let out = transform_module(
            Path::new("/p"),
            Path::new("/p/m.ts"),
            Some(&map),
            "import { html } from 'lit';\nconsole.log(html);",
        )
        .unwrap()
        .unwrap();
        assert!(out.code.starts_with("import"));
        assert!(out.code.contains("\"lit\""));
        assert!(!out.code.contains("__imex_import(__imex, \"lit\""));
    }

    #[test]
    fn import_equals_uses_import_semantics() {
        let out = run("import legacy = require('./legacy');\nlegacy.boot();").unwrap();
        assert!(out
            .code
            .contains("const legacy = __imex_import(__imex, \"legacy\");"));
        assert!(out.exports.is_empty());
    }

    #[test]
    fn omit_tag_drops_line() {
        let out = run("const gone = 1; // __imex_omit\nexport const kept = 2;").unwrap();
        assert!(!out.code.contains("gone"));
        assert!(out.code.contains("kept"));
    }

    #[test]
    fn ignore_tag_passes_import_shape_verbatim() {
        let out = run("import real from './real'; // __imex_ignore\nexport const x = 1;").unwrap();
        assert!(out.code.contains("import real from './real';"));
        assert!(!out.code.contains("__imex_import(__imex, \"real\""));
    }

    #[test]
    fn type_only_module_is_the_empty_sentinel() {
        assert!(run("").is_none());
        assert!(run("import type { T } from './types';").is_none());
        assert!(run("export type { T } from './types';").is_none());
    }

    #[test]
    fn body_is_wrapped_in_private_scope() {
        let out = run("export const x = 1;").unwrap();
        assert!(out.code.starts_with("(() => {"));
        assert!(out.code.trim_end().ends_with("})();"));
    }

    #[test]
    fn parse_failure_names_the_file() {
        let err = transform_module(Path::new("/p"), Path::new("/p/bad.ts"), None, "const = ;")
            .unwrap_err();
        match err {
            BuildError::Translation { file, .. } => assert!(file.contains("bad.ts")),
            other => panic!("expected translation error, got {other}"),
        }
    }
}
