//! Module graph provider.
//!
//! Given an entry file, produces the ordered list of transitively-imported
//! local files: dependency-first, entry-last, with indirect dependencies
//! before direct ones. Third-party (bare) specifiers and declaration-only
//! files are excluded; import targets that cannot be located are collected
//! rather than fatal. The visited set terminates import cycles but makes no
//! ordering promise inside one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{Statement, TSModuleReference};
use oxc_parser::Parser;

use crate::error::BuildError;
use crate::fsio::FileAccess;
use crate::module_key::lexical_join;
use crate::transpile::source_type_for;

/// One entry's transitive dependency listing.
#[derive(Debug, Default)]
pub struct GraphListing {
    pub files: Vec<PathBuf>,
    pub unresolved: Vec<String>,
}

pub trait ModuleGraph {
    fn dependencies(&self, entry: &Path, root: &Path) -> Result<GraphListing, BuildError>;
}

/// Default provider: scans static import/export specifiers with oxc and
/// walks them depth-first.
pub struct SourceGraph<'f> {
    fs: &'f dyn FileAccess,
}

const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "mjs", "jsx"];

impl<'f> SourceGraph<'f> {
    pub fn new(fs: &'f dyn FileAccess) -> Self {
        Self { fs }
    }

    fn visit(
        &self,
        file: &Path,
        visited: &mut HashSet<PathBuf>,
        listing: &mut GraphListing,
    ) -> Result<(), BuildError> {
        if !visited.insert(file.to_path_buf()) {
            return Ok(());
        }

        let source = match self.fs.read(file) {
            Ok(s) => s,
            Err(_) => {
                listing
                    .unresolved
                    .push(file.to_string_lossy().to_string());
                return Ok(());
            }
        };

        for specifier in collect_import_specifiers(&source, file) {
            if !is_relative(&specifier) {
                // bare specifier: third-party or import-map territory
                continue;
            }
            if specifier.ends_with(".d.ts") {
                continue;
            }
            match self.locate(file, &specifier) {
                Some(target) => self.visit(&target, visited, listing)?,
                None => listing
                    .unresolved
                    .push(format!("{} (from {})", specifier, file.display())),
            }
        }

        // post-order: dependencies land before the file itself
        listing.files.push(file.to_path_buf());
        Ok(())
    }

    /// Probe the specifier against the file system: the literal path, the
    /// known code extensions, then a directory `index` file.
    fn locate(&self, from: &Path, specifier: &str) -> Option<PathBuf> {
        let dir = from.parent().unwrap_or_else(|| Path::new(""));
        let base = lexical_join(dir, Path::new(specifier));

        if base.extension().is_some() && self.fs.exists(&base) {
            return Some(base);
        }
        for ext in PROBE_EXTENSIONS {
            let candidate = base.with_extension(ext);
            if self.fs.exists(&candidate) {
                return Some(candidate);
            }
        }
        for ext in PROBE_EXTENSIONS {
            let candidate = base.join(format!("index.{}", ext));
            if self.fs.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

impl ModuleGraph for SourceGraph<'_> {
    fn dependencies(&self, entry: &Path, _root: &Path) -> Result<GraphListing, BuildError> {
        let mut listing = GraphListing::default();
        let mut visited = HashSet::new();
        self.visit(entry, &mut visited, &mut listing)?;
        Ok(listing)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Static import/export sources of one file, in statement order. The parser
/// is error-tolerant here; files that cannot be re-printed fail later in the
/// transform with the file named.
fn collect_import_specifiers(source: &str, file: &Path) -> Vec<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(file)).parse();

    let mut specifiers = Vec::new();
    for stmt in &ret.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if !decl.import_kind.is_type() {
                    specifiers.push(decl.source.value.to_string());
                }
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(src) = &decl.source {
                    if !decl.export_kind.is_type() {
                        specifiers.push(src.value.to_string());
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if !decl.export_kind.is_type() {
                    specifiers.push(decl.source.value.to_string());
                }
            }
            Statement::TSImportEqualsDeclaration(decl) => {
                if let TSModuleReference::ExternalModuleReference(reference) =
                    &decl.module_reference
                {
                    specifiers.push(reference.expression.value.to_string());
                }
            }
            _ => {}
        }
    }
    specifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::MemAccess;

    fn graph_fs() -> MemAccess {
        let fs = MemAccess::new();
        fs.insert("/p/a.ts", "import { b } from './b';\nexport const a = b;");
        fs.insert("/p/b.ts", "import { c } from './lib';\nexport const b = c;");
        fs.insert("/p/lib/index.ts", "export const c = 1;");
        fs
    }

    #[test]
    fn dependency_first_entry_last() {
        let fs = graph_fs();
        let graph = SourceGraph::new(&fs);
        let listing = graph
            .dependencies(Path::new("/p/a.ts"), Path::new("/p"))
            .unwrap();

        assert_eq!(
            listing.files,
            vec![
                PathBuf::from("/p/lib/index.ts"),
                PathBuf::from("/p/b.ts"),
                PathBuf::from("/p/a.ts"),
            ]
        );
        assert!(listing.unresolved.is_empty());
    }

    #[test]
    fn bare_specifiers_are_excluded() {
        let fs = MemAccess::new();
        fs.insert("/p/a.ts", "import lodash from 'lodash';\nexport const a = 1;");
        let graph = SourceGraph::new(&fs);
        let listing = graph
            .dependencies(Path::new("/p/a.ts"), Path::new("/p"))
            .unwrap();
        assert_eq!(listing.files, vec![PathBuf::from("/p/a.ts")]);
        assert!(listing.unresolved.is_empty());
    }

    #[test]
    fn missing_target_is_collected_not_fatal() {
        let fs = MemAccess::new();
        fs.insert("/p/a.ts", "import { gone } from './ghost';");
        let graph = SourceGraph::new(&fs);
        let listing = graph
            .dependencies(Path::new("/p/a.ts"), Path::new("/p"))
            .unwrap();
        assert_eq!(listing.files, vec![PathBuf::from("/p/a.ts")]);
        assert_eq!(listing.unresolved.len(), 1);
        assert!(listing.unresolved[0].contains("./ghost"));
    }

    #[test]
    fn import_cycle_terminates() {
        let fs = MemAccess::new();
        fs.insert("/p/x.ts", "import { y } from './y';\nexport const x = 1;");
        fs.insert("/p/y.ts", "import { x } from './x';\nexport const y = 2;");
        let graph = SourceGraph::new(&fs);
        let listing = graph
            .dependencies(Path::new("/p/x.ts"), Path::new("/p"))
            .unwrap();
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files.last(), Some(&PathBuf::from("/p/x.ts")));
    }

    #[test]
    fn re_export_sources_count_as_dependencies() {
        let fs = MemAccess::new();
        fs.insert("/p/a.ts", "export { util } from './util';");
        fs.insert("/p/util.ts", "export const util = 1;");
        let graph = SourceGraph::new(&fs);
        let listing = graph
            .dependencies(Path::new("/p/a.ts"), Path::new("/p"))
            .unwrap();
        assert_eq!(
            listing.files,
            vec![PathBuf::from("/p/util.ts"), PathBuf::from("/p/a.ts")]
        );
    }
}
