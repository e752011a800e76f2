//! Text stores backing each variant

use crate::registry::RegistryError;
use crate::variant::{Variant, VariantMap};
use std::collections::BTreeMap;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer {0} is read-only")]
    ReadOnly(String),
    #[error("buffer {0} no longer exists")]
    Dead(String),
    #[error("range {start}..{end} is outside buffer {name} (length {len})")]
    OutOfBounds {
        name: String,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Buffer properties saved when a session starts and put back when it quits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedVariables {
    pub read_only: bool,
    pub properties: BTreeMap<String, String>,
}

/// A variant's live text, owned by the host.
///
/// `replace` must be all-or-nothing: when it returns an error the text is
/// untouched. Every successful mutation bumps `revision`.
pub trait VariantBuffer {
    fn name(&self) -> &str;

    fn text(&self) -> &str;

    fn replace(&mut self, range: Range<usize>, text: &str) -> Result<(), BufferError>;

    fn is_read_only(&self) -> bool;

    fn set_read_only(&mut self, read_only: bool);

    fn is_modified(&self) -> bool;

    fn revision(&self) -> u64;

    fn snapshot(&self) -> ProtectedVariables;

    fn restore(&mut self, saved: ProtectedVariables);

    fn is_alive(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        self.text().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn content(&self, range: Range<usize>) -> Result<String, BufferError> {
        self.text()
            .get(range.clone())
            .map(str::to_string)
            .ok_or_else(|| BufferError::OutOfBounds {
                name: self.name().to_string(),
                start: range.start,
                end: range.end,
                len: self.len(),
            })
    }

    /// 0-based line holding `pos`
    fn line_of(&self, pos: usize) -> usize {
        line_of(self.text(), pos)
    }

    fn line_count(&self) -> usize {
        line_count(self.text())
    }
}

/// Number of line breaks before `pos`
pub fn line_of(text: &str, pos: usize) -> usize {
    let end = pos.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

/// Lines in `text`, counting a trailing partial line
pub fn line_count(text: &str) -> usize {
    let breaks = text.bytes().filter(|&b| b == b'\n').count();
    if text.is_empty() || text.ends_with('\n') {
        breaks
    } else {
        breaks + 1
    }
}

/// Byte offsets of line starts, for mapping line ranges to positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        if starts.last() == Some(&text.len()) && starts.len() > 1 {
            starts.pop();
        }
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Offset of the start of `line`, or the text length past the last line
    pub fn offset(&self, line: usize) -> usize {
        self.starts.get(line).copied().unwrap_or(self.len)
    }

    pub fn lines(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            self.starts.len()
        }
    }
}

/// In-memory buffer used by hosts without their own text store
#[derive(Debug, Clone)]
pub struct MemoryBuffer {
    name: String,
    text: String,
    read_only: bool,
    modified: bool,
    alive: bool,
    revision: u64,
    properties: BTreeMap<String, String>,
}

impl MemoryBuffer {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            read_only: false,
            modified: false,
            alive: true,
            revision: 0,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Simulate the backing store going away
    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), BufferError> {
        let valid = range.start <= range.end
            && range.end <= self.text.len()
            && self.text.is_char_boundary(range.start)
            && self.text.is_char_boundary(range.end);
        if valid {
            Ok(())
        } else {
            Err(BufferError::OutOfBounds {
                name: self.name.clone(),
                start: range.start,
                end: range.end,
                len: self.text.len(),
            })
        }
    }
}

impl VariantBuffer for MemoryBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn replace(&mut self, range: Range<usize>, text: &str) -> Result<(), BufferError> {
        if !self.alive {
            return Err(BufferError::Dead(self.name.clone()));
        }
        if self.read_only {
            return Err(BufferError::ReadOnly(self.name.clone()));
        }
        self.check_range(&range)?;

        // Insert first, then drop the old text now sitting after the insertion
        self.text.insert_str(range.start, text);
        let old_start = range.start + text.len();
        let old_end = range.end + text.len();
        self.text.replace_range(old_start..old_end, "");

        self.modified = true;
        self.revision += 1;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn snapshot(&self) -> ProtectedVariables {
        ProtectedVariables {
            read_only: self.read_only,
            properties: self.properties.clone(),
        }
    }

    fn restore(&mut self, saved: ProtectedVariables) {
        self.read_only = saved.read_only;
        self.properties = saved.properties;
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

/// The buffers of one session, keyed by variant
#[derive(Default)]
pub struct Buffers {
    slots: VariantMap<Box<dyn VariantBuffer>>,
}

impl Buffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variant: Variant, buffer: Box<dyn VariantBuffer>) {
        self.slots.insert(variant, buffer);
    }

    pub fn take(&mut self, variant: Variant) -> Option<Box<dyn VariantBuffer>> {
        self.slots.remove(variant)
    }

    pub fn contains(&self, variant: Variant) -> bool {
        self.slots.contains(variant)
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.slots.variants()
    }

    /// Live buffer for `variant`
    pub fn get(&self, variant: Variant) -> Result<&dyn VariantBuffer, RegistryError> {
        match self.slots.get(variant) {
            Some(buffer) if buffer.is_alive() => Ok(buffer.as_ref()),
            _ => Err(RegistryError::VariantUnavailable(variant)),
        }
    }

    pub fn get_mut(&mut self, variant: Variant) -> Result<&mut dyn VariantBuffer, RegistryError> {
        match self.slots.get_mut(variant) {
            Some(buffer) if buffer.is_alive() => Ok(buffer.as_mut()),
            _ => Err(RegistryError::VariantUnavailable(variant)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_bumps_revision() {
        let mut buf = MemoryBuffer::new("a", "one\ntwo\nthree\n");
        buf.replace(4..7, "TWO").unwrap();
        assert_eq!(buf.text(), "one\nTWO\nthree\n");
        assert_eq!(buf.revision(), 1);
        assert!(buf.is_modified());
    }

    #[test]
    fn test_read_only_replace_leaves_text() {
        let mut buf = MemoryBuffer::new("a", "abc").with_read_only(true);
        let err = buf.replace(0..1, "x").unwrap_err();
        assert_eq!(err, BufferError::ReadOnly("a".to_string()));
        assert_eq!(buf.text(), "abc");
        assert_eq!(buf.revision(), 0);
    }

    #[test]
    fn test_out_of_bounds_and_char_boundaries() {
        let mut buf = MemoryBuffer::new("a", "héllo");
        assert!(matches!(
            buf.replace(2..3, "e"),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert!(buf.content(0..99).is_err());
        assert_eq!(buf.text(), "héllo");
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a\nbb\nccc\n");
        assert_eq!(index.lines(), 3);
        assert_eq!(index.offset(0), 0);
        assert_eq!(index.offset(1), 2);
        assert_eq!(index.offset(2), 5);
        assert_eq!(index.offset(3), 9);

        let partial = LineIndex::new("a\nb");
        assert_eq!(partial.lines(), 2);
        assert_eq!(partial.offset(2), 3);
    }

    #[test]
    fn test_line_helpers() {
        assert_eq!(line_of("a\nb\nc", 4), 2);
        assert_eq!(line_count("a\nb\nc"), 3);
        assert_eq!(line_count("a\nb\n"), 2);
        assert_eq!(line_count(""), 0);
    }

    #[test]
    fn test_dead_buffer_is_unavailable() {
        let mut buffers = Buffers::new();
        let mut buf = MemoryBuffer::new("a", "x");
        buf.kill();
        buffers.insert(Variant::A, Box::new(buf));
        assert!(matches!(
            buffers.get(Variant::A),
            Err(RegistryError::VariantUnavailable(Variant::A))
        ));
        assert!(buffers.get(Variant::B).is_err());
    }
}
