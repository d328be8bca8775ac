//! docpack packs a tree of ES/TS modules, style sheets, and a page template
//! into one self-contained HTML document.
//!
//! The pipeline: resolve the dependency closure from the entry points,
//! transpile each file, rewrite its import/export syntax into calls against
//! an inlined runtime registry, rehearse the registry replay to catch broken
//! ordering at build time, and fold everything into the page template.
//!
//! Module identity is positional: a module is addressed by its normalized
//! root-relative path with the extension stripped and trailing `index`
//! collapsed, so `./lib/util.ts`, `lib/util`, and `lib/util/index.ts` all
//! name the same registry bucket.

mod assemble;
mod document;
mod error;
mod fsio;
mod graph;
mod module_key;
mod project;
mod resolver;
mod runtime;
mod transform;
mod transpile;
mod watch;

pub use assemble::{assemble, Assembly, BlockKind, ScriptBlock};
pub use document::{build_document, HotReloadEndpoint};
pub use error::BuildError;
pub use fsio::{DiskAccess, FileAccess, MemAccess};
pub use graph::{GraphListing, ModuleGraph, SourceGraph};
pub use module_key::module_key;
pub use project::{BuildOptions, HookOutcome, Hooks, Project, ProjectConfig};
pub use resolver::{resolve, Resolution, SetList};
pub use runtime::{Registry, RegistryError, HOT_RELOAD_CLIENT, IMEX_BOOTSTRAP};
pub use transform::{transform_module, ImportRef, TransformedModule};
pub use transpile::transpile;
pub use watch::{BuildGate, HotReloadState};
