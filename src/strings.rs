use std::collections::HashMap;

use crate::error::{MmvError, MmvResult};

/// Every entry in the string section occupies one fixed null-terminated cell.
pub const STRING_CELL_LEN: usize = 256;
/// Longest text that fits a cell alongside its terminating null byte.
pub const STRING_TEXT_LIMIT: usize = STRING_CELL_LEN - 1;

/// Index of an interned string within the table.
///
/// Handles stay valid until `reset()`; the cell's absolute byte offset is
/// assigned by the layout pass and looked up through the table at
/// serialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringHandle(u32);

#[derive(Debug)]
struct StringCell {
    text: String,
    offset: u64,
}

/// Interns variable-length text into the contiguous string section.
#[derive(Debug)]
pub struct StringTable {
    cells: Vec<StringCell>,
    interned: HashMap<String, StringHandle>,
    capacity_bytes: usize,
}

impl StringTable {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            cells: Vec::new(),
            interned: HashMap::new(),
            capacity_bytes,
        }
    }

    /// Intern `text`, returning the existing handle for byte-identical text.
    pub fn intern(&mut self, text: &str) -> MmvResult<StringHandle> {
        if let Some(handle) = self.interned.get(text) {
            return Ok(*handle);
        }
        let handle = self.push(text)?;
        self.interned.insert(text.to_string(), handle);
        Ok(handle)
    }

    /// Claim a dedicated cell that is never shared, for text that will be
    /// rewritten in place after `start()` (string-typed metric values).
    pub fn reserve(&mut self, text: &str) -> MmvResult<StringHandle> {
        self.push(text)
    }

    fn push(&mut self, text: &str) -> MmvResult<StringHandle> {
        if text.len() > STRING_TEXT_LIMIT {
            return Err(MmvError::capacity(format!(
                "string of {} bytes exceeds the {STRING_TEXT_LIMIT} byte cell limit",
                text.len()
            )));
        }
        let used = (self.cells.len() + 1) * STRING_CELL_LEN;
        if used > self.capacity_bytes {
            return Err(MmvError::capacity(format!(
                "string section would grow to {used} bytes, limit is {}",
                self.capacity_bytes
            )));
        }
        let handle = StringHandle(self.cells.len() as u32);
        self.cells.push(StringCell {
            text: text.to_string(),
            offset: 0,
        });
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Total bytes the string section occupies on disk.
    pub fn byte_size(&self) -> usize {
        self.cells.len() * STRING_CELL_LEN
    }

    pub fn text(&self, handle: StringHandle) -> &str {
        &self.cells[handle.0 as usize].text
    }

    pub fn offset(&self, handle: StringHandle) -> u64 {
        self.cells[handle.0 as usize].offset
    }

    /// Assign each cell its absolute offset, starting at the section base.
    pub fn assign_offsets(&mut self, section_offset: u64) {
        for (index, cell) in self.cells.iter_mut().enumerate() {
            cell.offset = section_offset + (index * STRING_CELL_LEN) as u64;
        }
    }

    /// Serialize one cell: the text bytes followed by zero padding out to the
    /// full cell length.
    pub fn encode_cell(&self, handle: StringHandle) -> [u8; STRING_CELL_LEN] {
        let mut cell = [0u8; STRING_CELL_LEN];
        let text = self.cells[handle.0 as usize].text.as_bytes();
        cell[..text.len()].copy_from_slice(text);
        cell
    }

    pub fn handles(&self) -> impl Iterator<Item = StringHandle> + '_ {
        (0..self.cells.len()).map(|index| StringHandle(index as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_identical_text_reuses_the_cell() {
        let mut table = StringTable::new(4096);
        let first = table.intern("per-disk read count").expect("intern");
        let second = table.intern("per-disk read count").expect("intern");
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
        assert_eq!(table.byte_size(), STRING_CELL_LEN);
    }

    #[test]
    fn reserve_never_dedups() {
        let mut table = StringTable::new(4096);
        let first = table.reserve("initial").expect("reserve");
        let second = table.reserve("initial").expect("reserve");
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn oversized_text_is_a_capacity_error() {
        let mut table = StringTable::new(4096);
        let long = "x".repeat(STRING_TEXT_LIMIT + 1);
        let err = table.intern(&long).expect_err("over limit");
        assert!(matches!(err, MmvError::Capacity(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn section_capacity_is_enforced() {
        let mut table = StringTable::new(STRING_CELL_LEN);
        table.intern("fits").expect("first cell");
        let err = table.intern("does not").expect_err("section full");
        assert!(matches!(err, MmvError::Capacity(_)));
    }

    #[test]
    fn offsets_advance_by_the_cell_length() {
        let mut table = StringTable::new(4096);
        let first = table.intern("one").expect("intern");
        let second = table.intern("two").expect("intern");
        table.assign_offsets(1000);
        assert_eq!(table.offset(first), 1000);
        assert_eq!(table.offset(second), 1000 + STRING_CELL_LEN as u64);
    }

    #[test]
    fn encoded_cell_is_null_terminated_and_padded() {
        let mut table = StringTable::new(4096);
        let handle = table.intern("abc").expect("intern");
        let cell = table.encode_cell(handle);
        assert_eq!(&cell[..3], b"abc");
        assert!(cell[3..].iter().all(|byte| *byte == 0));
    }
}
