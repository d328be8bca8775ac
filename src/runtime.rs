//! Runtime module registry.
//!
//! The registry is the sole cross-module channel of the assembled script. It
//! is emitted as bootstrap code and constructed fresh on every page load; the
//! build tool never executes it. `Registry<V>` is the same contract in Rust:
//! the assembler rehearses registrations against it so statically visible
//! ordering or duplicate-export defects surface at build time, and the unit
//! tests pin the write-once and namespace semantics the emitted code must
//! keep.

use std::collections::HashMap;

/// Failures mirrored from the emitted registry. At page runtime these are
/// thrown inside the bundle; at build time the rehearsal reports them as
/// warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateExport { module: String, name: String },
    UnknownModule { module: String },
    UnknownExport { module: String, name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateExport { module, name } => {
                write!(f, "export '{}' in module '{}' already exists", name, module)
            }
            Self::UnknownModule { module } => write!(f, "module '{}' is not registered", module),
            Self::UnknownExport { module, name } => {
                write!(f, "module '{}' has no export '{}'", module, name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Write-once key/value store keyed by (ModuleKey, export name).
#[derive(Debug, Default)]
pub struct Registry<V> {
    buckets: HashMap<String, HashMap<String, V>>,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    /// `export(moduleKey, name, value)`: lazily creates the bucket, fails if
    /// the name is already present. The first value is never overwritten.
    pub fn register(&mut self, module: &str, name: &str, value: V) -> Result<(), RegistryError> {
        let bucket = self.buckets.entry(module.to_string()).or_default();
        if bucket.contains_key(name) {
            return Err(RegistryError::DuplicateExport {
                module: module.to_string(),
                name: name.to_string(),
            });
        }
        bucket.insert(name.to_string(), value);
        Ok(())
    }

    /// `import(moduleKey, name)`: fails if the module has no bucket yet or
    /// the name is absent.
    pub fn lookup(&self, module: &str, name: &str) -> Result<&V, RegistryError> {
        let bucket = self.namespace(module)?;
        bucket.get(name).ok_or_else(|| RegistryError::UnknownExport {
            module: module.to_string(),
            name: name.to_string(),
        })
    }

    /// `import(moduleKey)`: the whole export bucket.
    pub fn namespace(&self, module: &str) -> Result<&HashMap<String, V>, RegistryError> {
        self.buckets
            .get(module)
            .ok_or_else(|| RegistryError::UnknownModule {
                module: module.to_string(),
            })
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.buckets.contains_key(module)
    }
}

impl<V: Clone> Registry<V> {
    /// `export * from "X"`: merge the source bucket name-by-name through the
    /// write-once register, so a collision is still a duplicate export.
    pub fn merge(&mut self, into: &str, from: &str) -> Result<(), RegistryError> {
        let source = self.namespace(from)?.clone();
        for (name, value) in source {
            self.register(into, &name, value)?;
        }
        Ok(())
    }
}

/// Registry bootstrap emitted ahead of every module block. The registry is an
/// explicit instance threaded into each synthesized call by reference, so a
/// page embedding two bundles gets two independent registries.
pub const IMEX_BOOTSTRAP: &str = r#"const __imex = { modules: Object.create(null) };
function __imex_bucket(reg, m) {
	return reg.modules[m] ?? (reg.modules[m] = Object.create(null));
}
function __imex_export(reg, m, k, value) {
	const bucket = __imex_bucket(reg, m);
	if (k in bucket) throw new Error(`export '${k}' in module '${m}' already exists`);
	bucket[k] = value;
}
function __imex_import(reg, m, k) {
	const bucket = reg.modules[m];
	if (bucket === undefined) throw new Error(`module '${m}' is not registered`);
	if (k === undefined) return bucket;
	if (!(k in bucket)) throw new Error(`module '${m}' has no export '${k}'`);
	return bucket[k];
}
function __imex_merge(reg, into, from) {
	const source = __imex_import(reg, from);
	for (const k of Object.keys(source)) __imex_export(reg, into, k, source[k]);
}"#;

/// Hot-reload client. `$HOST` and `$PORT` are substituted by the document
/// builder; the serving collaborator answers `/__imex_version` with
/// `session.version` and the client reloads on any mismatch against the
/// values it first saw.
pub const HOT_RELOAD_CLIENT: &str = r#"const __imex_hr = { session: -1, version: -1 };
async function __imex_poll() {
	try {
		const res = await fetch(`http://$HOST:$PORT/__imex_version`);
		const { session, version } = await res.json();
		if (__imex_hr.session === -1) {
			__imex_hr.session = session;
			__imex_hr.version = version;
			console.log(`HR#${session}.${version}`);
			return;
		}
		if (session !== __imex_hr.session || version !== __imex_hr.version) window.location.reload();
	} catch {}
}
setInterval(__imex_poll, 5000);
__imex_poll();"#;
