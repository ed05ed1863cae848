//! File abstraction consumed by the VM subsystem
//!
//! Executables and swap files are only ever accessed as byte-addressable
//! files. The in-memory implementations back the tests and hosts that have
//! no disk.

use crate::{Error, Result};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Byte-addressable open file
pub trait OpenFile: fmt::Debug {
    /// Read up to `buf.len()` bytes starting at `position`.
    /// Returns the number of bytes read; short at end of file.
    fn read_at(&self, buf: &mut [u8], position: usize) -> usize;

    /// Write `buf` starting at `position`. Returns the number of bytes
    /// written.
    fn write_at(&mut self, buf: &[u8], position: usize) -> usize;

    /// Length of the file in bytes
    fn length(&self) -> usize;
}

/// The part of a file system the VM subsystem needs: swap files
pub trait FileSystem: fmt::Debug {
    /// Create a file of `size` zero bytes and open it
    fn create(&mut self, name: &str, size: usize) -> Result<Box<dyn OpenFile>>;

    /// Remove a file by name
    fn remove(&mut self, name: &str) -> Result<()>;
}

/// File held in host memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemFile {
    data: Vec<u8>,
}

impl MemFile {
    /// A file of `len` zero bytes
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// File contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for MemFile {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl OpenFile for MemFile {
    fn read_at(&self, buf: &mut [u8], position: usize) -> usize {
        if position >= self.data.len() {
            return 0;
        }
        let count = buf.len().min(self.data.len() - position);
        buf[..count].copy_from_slice(&self.data[position..position + count]);
        count
    }

    fn write_at(&mut self, buf: &[u8], position: usize) -> usize {
        let end = position + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[position..end].copy_from_slice(buf);
        buf.len()
    }

    fn length(&self) -> usize {
        self.data.len()
    }
}

/// File system whose files live in host memory.
///
/// Only names are tracked; the opened file is handed to the creator.
#[derive(Debug, Default)]
pub struct MemFileSystem {
    names: BTreeSet<String>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FileSystem for MemFileSystem {
    fn create(&mut self, name: &str, size: usize) -> Result<Box<dyn OpenFile>> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::AlreadyExists);
        }
        Ok(Box::new(MemFile::zeroed(size)))
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        if self.names.remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }
}
