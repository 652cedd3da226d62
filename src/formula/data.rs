//! Data-section bookkeeping for both backends.
//!
//! Every double the generated text references lives in `.data` and is
//! reached through a RIP-relative load. The table hands out one label
//! per distinct constant and one per named symbol, then writes all the
//! payloads in a single pass once text emission is finished.

use std::collections::BTreeMap;

use tracing::trace;

use crate::x86_64::{CodeHolder, CodeResult, Label, SectionKind};

use super::ast::SymbolTable;

/// Deduplicating maps from emitted values to their `.data` labels.
///
/// Constants are keyed by the exact bit pattern of the double, so
/// `0.0` and `-0.0` get distinct slots and NaN payloads survive.
pub struct DataTable {
    constants: BTreeMap<u64, Label>,
    symbols: BTreeMap<String, Label>,
}

impl DataTable {
    pub fn new() -> Self {
        Self {
            constants: BTreeMap::new(),
            symbols: BTreeMap::new(),
        }
    }

    /// Label of the `.data` slot holding `value`, created on first use
    pub fn constant(&mut self, code: &mut CodeHolder, value: f64) -> Label {
        *self
            .constants
            .entry(value.to_bits())
            .or_insert_with(|| code.new_label())
    }

    /// Label of the `.data` slot for the named symbol, created on first use
    pub fn symbol(&mut self, code: &mut CodeHolder, name: &str) -> Label {
        *self
            .symbols
            .entry(name.to_owned())
            .or_insert_with(|| code.new_label())
    }

    /// Write every pending slot into the holder's `.data` section.
    ///
    /// Symbol slots take a snapshot of the current binding (`0.0` when a
    /// name is unbound); constant slots embed their exact bit pattern.
    pub fn drain(self, code: &mut CodeHolder, symbols: &SymbolTable) -> CodeResult<()> {
        code.select(SectionKind::Data);
        code.align(8);
        for (name, label) in self.symbols {
            let value = symbols.get(&name).copied().unwrap_or(0.0);
            trace!("data slot L{} = {name} ({value})", label.id());
            code.bind(label)?;
            code.embed_f64(value);
        }
        for (bits, label) in self.constants {
            trace!("data slot L{} = {}", label.id(), f64::from_bits(bits));
            code.bind(label)?;
            code.embed_u64(bits);
        }
        Ok(())
    }
}

impl Default for DataTable {
    fn default() -> Self {
        Self::new()
    }
}
