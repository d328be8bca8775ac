//! Bundle assembler: orders the emitted script blocks and rehearses the
//! registry replay at build time so broken import ordering and duplicate
//! exports surface as warnings before a browser ever runs the page.

use std::collections::HashMap;

use crate::error::BuildError;
use crate::runtime::{Registry, RegistryError, IMEX_BOOTSTRAP};
use crate::transform::TransformedModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `type="importmap"` block, emitted first when an import map is set.
    ImportMap,
    /// The inline registry runtime.
    Bootstrap,
    /// One transformed module.
    Module,
}

#[derive(Debug, Clone)]
pub struct ScriptBlock {
    pub kind: BlockKind,
    pub module_key: Option<String>,
    pub source_path: Option<String>,
    pub code: String,
}

#[derive(Debug, Default)]
pub struct Assembly {
    pub blocks: Vec<ScriptBlock>,
    /// Non-fatal findings from the rehearsal, one message per finding.
    pub warnings: Vec<String>,
}

/// Assemble script blocks in registration order: import map, bootstrap, then
/// the modules exactly as the resolver ordered them (dependencies first,
/// entry last).
pub fn assemble(
    modules: &[TransformedModule],
    import_map: Option<&HashMap<String, String>>,
) -> Result<Assembly, BuildError> {
    let mut assembly = Assembly::default();

    // passthrough bundles never touch the registry, so skip the bootstrap
    let uses_registry = modules
        .iter()
        .any(|m| !m.exports.is_empty() || !m.imports.is_empty() || !m.merges.is_empty());
    if uses_registry {
        assembly.blocks.push(ScriptBlock {
            kind: BlockKind::Bootstrap,
            module_key: None,
            source_path: None,
            code: IMEX_BOOTSTRAP.to_string(),
        });
    }

    // classic bootstrap script first is fine; the map only has to precede
    // the module scripts
    if let Some(map) = import_map {
        let json = serde_json::to_string_pretty(&serde_json::json!({ "imports": map }))
            .map_err(|e| BuildError::page(format!("import map serialization: {e}")))?;
        assembly.blocks.push(ScriptBlock {
            kind: BlockKind::ImportMap,
            module_key: None,
            source_path: None,
            code: json,
        });
    }

    assembly.warnings = rehearse(modules);

    for module in modules {
        assembly.blocks.push(ScriptBlock {
            kind: BlockKind::Module,
            module_key: Some(module.key.clone()),
            source_path: Some(module.source_path.clone()),
            code: module.code.clone(),
        });
    }

    Ok(assembly)
}

/// Replay registrations against a value-free registry in emission order.
fn rehearse(modules: &[TransformedModule]) -> Vec<String> {
    let mut registry: Registry<()> = Registry::new();
    let mut warnings = Vec::new();

    for module in modules {
        for import in &module.imports {
            if !registry.has_module(&import.key) {
                warnings.push(format!(
                    "module \"{}\" imports \"{}\" before it is registered",
                    module.key, import.key
                ));
                continue;
            }
            if let Some(name) = &import.name {
                if let Err(RegistryError::UnknownExport { .. }) =
                    registry.lookup(&import.key, name)
                {
                    warnings.push(format!(
                        "module \"{}\" imports \"{}\" from \"{}\", which does not export it",
                        module.key, name, import.key
                    ));
                }
            }
        }

        for name in &module.exports {
            if let Err(err) = registry.register(&module.key, name, ()) {
                warnings.push(err.to_string());
            }
        }
        for from in &module.merges {
            if !registry.has_module(from) {
                continue; // already warned via imports
            }
            if let Err(err) = registry.merge(&module.key, from) {
                warnings.push(err.to_string());
            }
        }
    }

    warnings
}
