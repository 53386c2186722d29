use crate::slim::SetSlim;

/// Deduplicating, append-only string table.
///
/// String-valued fields store the index of their text here, so repeated
/// values cost a small integer per version.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    strings: SetSlim<String>,
}

impl TextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TextTable {
            strings: SetSlim::with_capacity(capacity),
        }
    }

    /// Index of `s`, appending it first if it is new.
    pub fn add(&mut self, s: &str) -> usize {
        match self.strings.index_of(s) {
            Some(i) => i,
            None => self.strings.add(s.to_owned()),
        }
    }

    pub fn index_of(&self, s: &str) -> Option<usize> {
        self.strings.index_of(s)
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.strings.get(i).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.strings.iter().map(String::as_str)
    }
}
