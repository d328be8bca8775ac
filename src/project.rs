//! Project definition and the build pipeline.
//!
//! A project names one page template, any number of style sheets, and the
//! code entry points. `build` resolves the dependency closure, transpiles
//! and rewrites every module, rehearses the registry replay, and folds the
//! result into a single HTML document written next to the project root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assemble::assemble;
use crate::document::{build_document, HotReloadEndpoint};
use crate::error::BuildError;
use crate::fsio::FileAccess;
use crate::graph::SourceGraph;
use crate::module_key::module_key;
use crate::resolver::resolve;
use crate::transform::{transform_module, TransformedModule};
use crate::transpile::transpile;
use crate::watch::{BuildGate, HotReloadState};

/// Fallback template for projects that bring no page of their own.
const DEFAULT_PAGE: &str =
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body></body></html>";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Bundle name; the output document is `<name>.html`.
    pub name: String,
    /// Page template path, relative to the project root.
    #[serde(default)]
    pub page: Option<PathBuf>,
    #[serde(default)]
    pub styles: Vec<PathBuf>,
    /// Code entry points; their transitive imports join the bundle.
    #[serde(default)]
    pub code: Vec<PathBuf>,
    /// Bare specifiers listed here pass through as native imports.
    #[serde(default)]
    pub import_map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub build: BuildOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub hot_reload: bool,
    pub host: String,
    pub port: u16,
    pub watch: bool,
    /// Passthrough mode: skip the import/export rewrite and emit each file
    /// as a plain module script. The page then needs a real module loader.
    pub disable_imex: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            hot_reload: false,
            host: "localhost".to_string(),
            port: 5174,
            watch: false,
            disable_imex: false,
        }
    }
}

/// What a stage hook decided about one input file.
pub enum HookOutcome {
    /// Use this text instead of the file content.
    Replace(String),
    /// Drop the file from the bundle.
    Skip,
    /// Fall through to default handling.
    UseDefault,
}

type Hook = Box<dyn Fn(&Path, &str) -> HookOutcome>;

/// Optional per-stage interception, e.g. a sass compiler on the style stage
/// or a template language on the page stage.
#[derive(Default)]
pub struct Hooks {
    pub page: Option<Hook>,
    pub style: Option<Hook>,
    pub code: Option<Hook>,
}

pub struct Project<'f> {
    config: ProjectConfig,
    base_dir: PathBuf,
    fs: &'f dyn FileAccess,
    hooks: Hooks,
}

impl<'f> Project<'f> {
    pub fn new(config: ProjectConfig, base_dir: impl Into<PathBuf>, fs: &'f dyn FileAccess) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            fs,
            hooks: Hooks::default(),
        }
    }

    pub fn from_json(
        json: &str,
        base_dir: impl Into<PathBuf>,
        fs: &'f dyn FileAccess,
    ) -> Result<Self, BuildError> {
        let config: ProjectConfig = serde_json::from_str(json)
            .map_err(|e| BuildError::page(format!("project config: {e}")))?;
        Ok(Self::new(config, base_dir, fs))
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn output_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.html", self.config.name))
    }

    /// Builds the bundle, writes `<name>.html`, and returns the document.
    pub fn build(&self) -> Result<String, BuildError> {
        println!("[docpack] building '{}'", self.config.name);

        let page = self.load_page()?;
        let styles = self.load_styles()?;
        let modules = self.load_modules()?;

        let assembly = assemble(&modules, self.config.import_map.as_ref())?;
        for warning in &assembly.warnings {
            eprintln!("[docpack] warning: {warning}");
        }

        let endpoint = self.config.build.hot_reload.then(|| HotReloadEndpoint {
            host: self.config.build.host.clone(),
            port: self.config.build.port,
        });
        let html = build_document(&page, &styles, &assembly, endpoint.as_ref())?;

        let out = self.output_path();
        self.fs.write(&out, &html)?;
        println!(
            "[docpack] wrote '{}' ({} modules, {} styles)",
            out.display(),
            modules.len(),
            styles.len()
        );
        Ok(html)
    }

    /// One watch cycle: claim the gate, build, bump the version clients poll.
    /// Returns `Ok(None)` when a build is already in flight; the change event
    /// is dropped, not queued.
    pub fn build_watched(
        &self,
        gate: &BuildGate,
        state: &HotReloadState,
    ) -> Result<Option<String>, BuildError> {
        if !gate.try_begin() {
            return Ok(None);
        }
        let result = self.build();
        gate.finish();
        let html = result?;
        state.bump();
        Ok(Some(html))
    }

    fn load_page(&self) -> Result<String, BuildError> {
        let Some(page) = &self.config.page else {
            return Ok(DEFAULT_PAGE.to_string());
        };
        let path = self.base_dir.join(page);
        let raw = self.fs.read(&path)?;
        match self.run_hook(&self.hooks.page, &path, &raw) {
            HookOutcome::Replace(text) => Ok(text),
            HookOutcome::Skip => Ok(DEFAULT_PAGE.to_string()),
            HookOutcome::UseDefault => Ok(raw),
        }
    }

    fn load_styles(&self) -> Result<Vec<String>, BuildError> {
        let mut styles = Vec::new();
        for style in &self.config.styles {
            let path = self.base_dir.join(style);
            let raw = self.fs.read(&path)?;
            match self.run_hook(&self.hooks.style, &path, &raw) {
                HookOutcome::Replace(text) => styles.push(text),
                HookOutcome::Skip => {}
                HookOutcome::UseDefault => styles.push(raw),
            }
        }
        Ok(styles)
    }

    fn load_modules(&self) -> Result<Vec<TransformedModule>, BuildError> {
        let entries: Vec<PathBuf> = self
            .config
            .code
            .iter()
            .map(|p| self.base_dir.join(p))
            .collect();
        let graph = SourceGraph::new(self.fs);
        let resolution = resolve(&entries, &self.base_dir, &graph)?;
        for target in resolution.unresolved.iter() {
            eprintln!("[docpack] warning: unresolved dependency {target}");
        }

        let mut modules = Vec::new();
        for file in resolution.files.iter() {
            let raw = self.fs.read(file)?;
            let source = match self.run_hook(&self.hooks.code, file, &raw) {
                HookOutcome::Replace(text) => text,
                HookOutcome::Skip => continue,
                HookOutcome::UseDefault => raw,
            };
            if self.config.build.disable_imex {
                let key = module_key(&self.base_dir, file, &file.to_string_lossy());
                let source_path = file
                    .strip_prefix(&self.base_dir)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .replace('\\', "/");
                modules.push(TransformedModule {
                    key,
                    source_path,
                    code: transpile(&source, file)?,
                    exports: Vec::new(),
                    imports: Vec::new(),
                    merges: Vec::new(),
                });
                continue;
            }
            // rewrite first, so line tags and spans refer to the author's
            // text; type stripping runs over the rewritten module
            match transform_module(
                &self.base_dir,
                file,
                self.config.import_map.as_ref(),
                &source,
            )? {
                Some(mut module) => {
                    module.code = transpile(&module.code, file)?;
                    modules.push(module);
                }
                None => println!("[docpack] skipping empty module '{}'", file.display()),
            }
        }
        Ok(modules)
    }

    fn run_hook(&self, hook: &Option<Hook>, path: &Path, content: &str) -> HookOutcome {
        match hook {
            Some(f) => f(path, content),
            None => HookOutcome::UseDefault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::MemAccess;

    fn config(name: &str, code: &[&str]) -> ProjectConfig {
        ProjectConfig {
            name: name.to_string(),
            page: None,
            styles: Vec::new(),
            code: code.iter().map(PathBuf::from).collect(),
            import_map: None,
            build: BuildOptions::default(),
        }
    }

    #[test]
    fn config_parses_camel_case_json() {
        let json = r#"{
            "name": "app",
            "page": "index.html",
            "styles": ["main.css"],
            "code": ["src/main.ts"],
            "importMap": { "lit": "https://cdn.example/lit.js" },
            "build": { "hotReload": true, "port": 8080 }
        }"#;
        let config: ProjectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "app");
        assert!(config.build.hot_reload);
        assert_eq!(config.build.port, 8080);
        assert_eq!(config.build.host, "localhost");
        assert_eq!(
            config.import_map.unwrap()["lit"],
            "https://cdn.example/lit.js"
        );
    }

    #[test]
    fn build_writes_named_document() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const answer = 42;");
        let project = Project::new(config("app", &["main.ts"]), "/proj", &fs);
        let html = project.build().unwrap();
        assert!(html.contains("data-imex-module=\"main\""));
        assert_eq!(fs.get(Path::new("/proj/app.html")).as_deref(), Some(html.as_str()));
    }

    #[test]
    fn style_hook_can_replace_content() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const x = 1;");
        fs.insert("/proj/site.scss", "$c: red; body { color: $c; }");
        let mut cfg = config("app", &["main.ts"]);
        cfg.styles.push(PathBuf::from("site.scss"));
        let hooks = Hooks {
            style: Some(Box::new(|_, _| {
                HookOutcome::Replace("body { color: red; }".to_string())
            })),
            ..Hooks::default()
        };
        let html = Project::new(cfg, "/proj", &fs).with_hooks(hooks).build().unwrap();
        assert!(html.contains("body { color: red; }"));
        assert!(!html.contains("$c"));
    }

    #[test]
    fn code_hook_can_drop_a_file() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const x = 1;");
        fs.insert("/proj/extra.ts", "export const y = 2;");
        let cfg = config("app", &["main.ts", "extra.ts"]);
        let hooks = Hooks {
            code: Some(Box::new(|path, _| {
                if path.ends_with("extra.ts") {
                    HookOutcome::Skip
                } else {
                    HookOutcome::UseDefault
                }
            })),
            ..Hooks::default()
        };
        let html = Project::new(cfg, "/proj", &fs).with_hooks(hooks).build().unwrap();
        assert!(html.contains("data-imex-module=\"main\""));
        assert!(!html.contains("data-imex-module=\"extra\""));
    }

    #[test]
    fn hot_reload_client_is_embedded_when_enabled() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const x = 1;");
        let mut cfg = config("app", &["main.ts"]);
        cfg.build.hot_reload = true;
        let html = Project::new(cfg, "/proj", &fs).build().unwrap();
        assert!(html.contains("__imex_hr"));
        assert!(html.contains("localhost:5174"));
    }

    #[test]
    fn passthrough_mode_keeps_native_imports() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "import { x } from './dep';\nconsole.log(x);");
        fs.insert("/proj/dep.ts", "export const x = 1;");
        let mut cfg = config("app", &["main.ts"]);
        cfg.build.disable_imex = true;
        let html = Project::new(cfg, "/proj", &fs).build().unwrap();
        assert!(html.contains("import { x } from \"./dep\""));
        assert!(html.contains("export const x = 1"));
        assert!(!html.contains("__imex"));
    }

    #[test]
    fn watched_build_bumps_version_and_drops_overlap() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const x = 1;");
        let project = Project::new(config("app", &["main.ts"]), "/proj", &fs);

        let gate = crate::watch::BuildGate::new();
        let state = crate::watch::HotReloadState::new();
        assert!(project.build_watched(&gate, &state).unwrap().is_some());
        assert_eq!(state.version(), 1);

        assert!(gate.try_begin()); // simulate a build in flight
        assert!(project.build_watched(&gate, &state).unwrap().is_none());
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn missing_page_template_is_fatal() {
        let fs = MemAccess::new();
        fs.insert("/proj/main.ts", "export const x = 1;");
        let mut cfg = config("app", &["main.ts"]);
        cfg.page = Some(PathBuf::from("missing.html"));
        let err = Project::new(cfg, "/proj", &fs).build().unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
