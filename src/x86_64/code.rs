//! Two-section code container with late-bound labels.
//!
//! Emission appends encoded instructions to the `.text` section and raw
//! 8-byte payloads to the `.data` section. Labels may be referenced (via
//! RIP-relative displacement fixups) before they are bound; `finalize`
//! lays `.text` first, `.data` 8-byte aligned behind it, and patches
//! every displacement. An unresolved reference at that point is an error.

use snafu::Snafu;
use tracing::trace;

use super::instruction::Instruction;

/// A symbolic address, resolved to a concrete offset during finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Section selector for the holder's append cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
}

#[derive(Debug, Clone, Copy)]
struct Reloc {
    /// Offset of the disp32 field within `.text`
    offset: usize,
    label: Label,
}

pub type CodeResult<T> = Result<T, CodeError>;

/// Errors raised by the code holder
#[derive(Debug, Snafu)]
pub enum CodeError {
    #[snafu(display("label L{id} referenced but never bound"))]
    UnboundLabel { id: u32 },

    #[snafu(display("label L{id} bound twice"))]
    AlreadyBound { id: u32 },

    #[snafu(display("displacement to label L{id} does not fit in 32 bits"))]
    DisplacementOverflow { id: u32 },

    #[snafu(display("virtual register v{id} used before definition"))]
    UndefinedVirtualRegister { id: u32 },

    #[snafu(display("function has no return value"))]
    MissingReturn,
}

/// Accumulates emitted text and data until `finalize` produces the flat
/// code image.
pub struct CodeHolder {
    text: Vec<u8>,
    data: Vec<u8>,
    current: SectionKind,
    labels: Vec<Option<(SectionKind, usize)>>,
    relocs: Vec<Reloc>,
}

impl CodeHolder {
    pub fn new() -> Self {
        Self {
            text: Vec::new(),
            data: Vec::new(),
            current: SectionKind::Text,
            labels: Vec::new(),
            relocs: Vec::new(),
        }
    }

    /// Create a fresh, unbound label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Switch the append cursor to the given section
    pub fn select(&mut self, section: SectionKind) {
        self.current = section;
    }

    fn current_buf(&mut self) -> &mut Vec<u8> {
        match self.current {
            SectionKind::Text => &mut self.text,
            SectionKind::Data => &mut self.data,
        }
    }

    /// Bind a label to the current position in the current section
    pub fn bind(&mut self, label: Label) -> CodeResult<()> {
        let section = self.current;
        let offset = self.current_buf().len();
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(CodeError::AlreadyBound { id: label.0 });
        }
        *slot = Some((section, offset));
        trace!("bind L{} at {:?}+{:#x}", label.0, section, offset);
        Ok(())
    }

    /// Append an encoded instruction to the current section, recording a
    /// relocation when it carries a displacement fixup.
    ///
    /// Displacement fixups are only meaningful in `.text`; the formula
    /// backends never emit instructions into `.data`.
    pub fn emit(&mut self, instr: Instruction) {
        debug_assert_eq!(self.current, SectionKind::Text);
        let base = self.text.len();
        self.text.extend_from_slice(instr.as_bytes());
        if let Some(fixup) = instr.fixup() {
            self.relocs.push(Reloc {
                offset: base + fixup.offset as usize,
                label: fixup.label,
            });
        }
        trace!("emit {}", instr);
    }

    /// Append the raw bit pattern of a double to the current section
    pub fn embed_u64(&mut self, bits: u64) {
        self.current_buf().extend_from_slice(&bits.to_le_bytes());
    }

    /// Append a double to the current section
    pub fn embed_f64(&mut self, value: f64) {
        self.embed_u64(value.to_bits());
    }

    /// Pad the current section with zero bytes up to the given alignment
    pub fn align(&mut self, alignment: usize) {
        let buf = self.current_buf();
        while buf.len() % alignment != 0 {
            buf.push(0);
        }
    }

    /// Number of bytes emitted into `.text` so far
    pub fn text_size(&self) -> usize {
        self.text.len()
    }

    /// Lay out the sections and resolve every displacement.
    ///
    /// `.text` starts at offset 0 so the finalized image is directly
    /// callable; `.data` follows, aligned to 8 bytes.
    pub fn finalize(self) -> CodeResult<Vec<u8>> {
        let data_base = (self.text.len() + 7) & !7;
        let mut image = self.text;
        image.resize(data_base, 0);
        image.extend_from_slice(&self.data);

        for reloc in &self.relocs {
            let target = match self.labels[reloc.label.0 as usize] {
                Some((SectionKind::Text, offset)) => offset,
                Some((SectionKind::Data, offset)) => data_base + offset,
                None => return Err(CodeError::UnboundLabel { id: reloc.label.0 }),
            };
            // RIP points past the disp32 field, which ends the instruction
            let next = reloc.offset + 4;
            let disp = target as i64 - next as i64;
            let disp = i32::try_from(disp).map_err(|_| CodeError::DisplacementOverflow {
                id: reloc.label.0,
            })?;
            image[reloc.offset..next].copy_from_slice(&disp.to_le_bytes());
        }

        trace!(
            "finalized image: {} text, {} data bytes",
            data_base,
            image.len() - data_base
        );
        Ok(image)
    }
}

impl Default for CodeHolder {
    fn default() -> Self {
        Self::new()
    }
}
