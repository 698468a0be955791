//! Flat byte arrays backing RAM-like regions.
//!
//! Addresses must already be reduced by the owning router. Indexing out of
//! range is a router bug and panics like any slice index.

/// A fixed-size block of read/write memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    data: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    #[inline]
    pub fn write(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// `len` bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
