//! Symbol resolution.
//!
//! Thread awareness declares the symbols it needs as [`SymbolRequirement`]s.
//! Any [`SymbolResolver`] can fill them in; [`SymbolManager`] does it from
//! the firmware ELF's symbol table.

use anyhow::{Context, Result};
use object::{Object, ObjectSymbol};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One named target symbol the engine depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRequirement {
    /// Linker name of the symbol.
    pub name: &'static str,
    /// Resolved address, `None` until a resolver ran or if it was absent.
    pub address: Option<u64>,
    /// Whether the engine refuses to run without it.
    pub required: bool,
}

impl SymbolRequirement {
    /// A symbol the engine cannot run without.
    pub const fn required(name: &'static str) -> Self {
        Self { name, address: None, required: true }
    }

    /// A symbol whose absence only degrades output.
    pub const fn optional(name: &'static str) -> Self {
        Self { name, address: None, required: false }
    }

    /// Resolved, non-zero address.
    pub fn resolved(&self) -> Option<u64> {
        self.address.filter(|&a| a != 0)
    }
}

/// Maps a symbol name to its address in the target.
pub trait SymbolResolver {
    /// Address of `name`, if the symbol exists.
    fn resolve(&self, name: &str) -> Option<u64>;
}

impl SymbolResolver for HashMap<String, u64> {
    fn resolve(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

impl SymbolResolver for BTreeMap<String, u64> {
    fn resolve(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

/// Fill in the address of every requirement from `resolver`.
pub fn resolve_requirements(
    requirements: &[SymbolRequirement],
    resolver: &dyn SymbolResolver,
) -> Vec<SymbolRequirement> {
    requirements
        .iter()
        .map(|req| {
            let address = resolver.resolve(req.name);
            if address.is_none() {
                if req.required {
                    log::warn!("Required symbol `{}` not found", req.name);
                } else {
                    log::debug!("Optional symbol `{}` not found", req.name);
                }
            }
            SymbolRequirement { address, ..req.clone() }
        })
        .collect()
}

/// Symbol table loaded from an ELF file.
pub struct SymbolManager {
    symbols: HashMap<String, u64>,
}

impl SymbolManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self { symbols: HashMap::new() }
    }

    /// Load symbols from an ELF file on disk.
    pub fn load_elf(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read ELF {}", path.display()))?;
        self.load_elf_bytes(&data)?;
        log::info!("Loaded {} symbols from {}", self.symbols.len(), path.display());
        Ok(())
    }

    /// Load symbols from an in-memory ELF image.
    pub fn load_elf_bytes(&mut self, data: &[u8]) -> Result<()> {
        let obj = object::File::parse(data).context("Failed to parse ELF")?;
        self.symbols = obj
            .symbols()
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                (!name.is_empty()).then(|| (name.to_string(), sym.address()))
            })
            .collect();
        Ok(())
    }

    /// Whether an ELF has been loaded.
    pub fn has_symbols(&self) -> bool {
        !self.symbols.is_empty()
    }

    /// Lookup a symbol address by name.
    pub fn lookup_symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
}

impl SymbolResolver for SymbolManager {
    fn resolve(&self, name: &str) -> Option<u64> {
        self.lookup_symbol(name)
    }
}

impl Default for SymbolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_manager_initial_state() {
        let mgr = SymbolManager::new();
        assert!(!mgr.has_symbols());
        assert!(mgr.lookup_symbol("sched_threads").is_none());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut mgr = SymbolManager::new();
        assert!(mgr.load_elf_bytes(b"definitely not an elf").is_err());
        assert!(!mgr.has_symbols());
    }

    #[test]
    fn test_resolve_requirements_fills_addresses() {
        let decl = [SymbolRequirement::required("a"), SymbolRequirement::optional("b")];
        let mut map = HashMap::new();
        map.insert("a".to_string(), 0x2000_0000);

        let resolved = resolve_requirements(&decl, &map);
        assert_eq!(resolved[0].resolved(), Some(0x2000_0000));
        assert!(resolved[0].required);
        assert_eq!(resolved[1].address, None);
        assert!(!resolved[1].required);
    }

    #[test]
    fn test_zero_address_is_unresolved() {
        let req = SymbolRequirement { address: Some(0), ..SymbolRequirement::required("x") };
        assert_eq!(req.resolved(), None);
    }
}
