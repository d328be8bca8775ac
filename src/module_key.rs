//! Module path normalizer.
//!
//! A ModuleKey is the canonical identity of a source file inside the bundle:
//! root-relative, extension-free, `/` separators, with directory `index`
//! files collapsing to their parent directory. Normalizing an
//! already-normalized key is a no-op, which is what lets synthesized registry
//! calls and the dependency graph agree on identities.

use std::path::{Component, Path, PathBuf};

/// Map `specifier`, as written in `referencing_file`, to a ModuleKey under
/// `root`.
///
/// `./` and `../` specifiers resolve against the referencing file's
/// directory; absolute paths are taken as-is; everything else (including a
/// key produced by an earlier call) resolves against `root`.
pub fn module_key(root: &Path, referencing_file: &Path, specifier: &str) -> String {
    let spec_path = Path::new(specifier);

    let resolved = if spec_path.is_absolute() {
        spec_path.to_path_buf()
    } else if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = referencing_file.parent().unwrap_or(root);
        lexical_join(dir, spec_path)
    } else {
        lexical_join(root, spec_path)
    };

    let stripped = strip_extension(&resolved);
    let mut relative = stripped
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or(stripped);

    // index files collapse to their directory
    if relative
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case("index"))
        .unwrap_or(false)
    {
        relative = relative
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
    }

    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Join and normalize without touching the file system, so `../` hops inside
/// the project resolve the same way on every platform.
pub(crate) fn lexical_join(base: &Path, rel: &Path) -> PathBuf {
    let mut out: Vec<Component> = base.components().collect();
    for comp in rel.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.last(), None | Some(Component::RootDir)) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs"];

// only script extensions are stripped, so a dotted name like `jquery.min`
// keeps its key through repeated normalization
fn strip_extension(path: &Path) -> PathBuf {
    let is_script = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SCRIPT_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false);
    if is_script {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/proj")
    }

    #[test]
    fn relative_specifier_resolves_against_referencing_file() {
        let key = module_key(&root(), Path::new("/proj/app/main.ts"), "./util");
        assert_eq!(key, "app/util");

        let key = module_key(&root(), Path::new("/proj/app/main.ts"), "../lib/math.ts");
        assert_eq!(key, "lib/math");
    }

    #[test]
    fn index_collapses_to_parent() {
        let key = module_key(&root(), Path::new("/proj/main.ts"), "./lib/index.ts");
        assert_eq!(key, "lib");

        // case-insensitive
        let key = module_key(&root(), Path::new("/proj/main.ts"), "./lib/INDEX.ts");
        assert_eq!(key, "lib");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = module_key(&root(), Path::new("/proj/app/main.ts"), "./deep/thing.ts");
        let twice = module_key(&root(), Path::new("/proj/app/main.ts"), &once);
        assert_eq!(once, twice);

        let key = module_key(&root(), Path::new("/proj/x.ts"), "lib/util");
        assert_eq!(key, "lib/util");
    }

    #[test]
    fn root_level_index_is_empty_key() {
        let key = module_key(&root(), Path::new("/proj/main.ts"), "./index.ts");
        assert_eq!(key, "");
    }

    #[test]
    fn forward_slashes_always() {
        let key = module_key(&root(), Path::new("/proj/a/b/c.ts"), "./d/e.ts");
        assert!(!key.contains('\\'));
        assert_eq!(key, "a/b/d/e");
    }
}
