//! Byte-level adapters between blocks and sequential files.
//!
//! [`BlockFileReader`] and [`BlockFileWriter`] are the only places in the
//! engine that touch the record wire format: a flat concatenation of
//! fixed-width records with no header or framing. The streams drive them
//! from their background threads.

use crate::block::Block;
use crate::errors::{Result, SortError};
use crate::record::Record;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Reads blocks of records from a file.
///
/// When constructed with `rm_when_done`, the file is unlinked on close;
/// a failed unlink is reported at warn level and never propagates.
pub struct BlockFileReader<T> {
    path: PathBuf,
    file: Option<BufReader<File>>,
    rm_when_done: bool,
    exhausted: bool,
    position: u64,
    scratch: Vec<u8>,
    _record: PhantomData<T>,
}

impl<T: Record> BlockFileReader<T> {
    /// Create a reader over `path`. No file is touched until [`open`](Self::open).
    #[must_use]
    pub fn new(path: PathBuf, rm_when_done: bool) -> Self {
        Self {
            path,
            file: None,
            rm_when_done,
            exhausted: false,
            position: 0,
            scratch: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Acquire the file for reading.
    pub fn open(&mut self) -> Result<()> {
        debug!("opening {} for read", self.path.display());
        let file = File::open(&self.path)
            .map_err(|source| SortError::OpenFailed { path: self.path.clone(), source })?;
        self.file = Some(BufReader::new(file));
        self.exhausted = false;
        self.position = 0;
        Ok(())
    }

    /// Fill `block` with up to `capacity` records from the current position.
    ///
    /// Sets `block.len()` to the number of records actually read; the last
    /// block of a file may be short. Exhaustion is not an error. Trailing
    /// bytes shorter than one record are ignored.
    pub fn read(&mut self, block: &mut Block<T>) -> Result<()> {
        let reader = self.file.as_mut().expect("read on an unopened source");
        let want = block.capacity() * T::SIZE;
        self.scratch.resize(want, 0);

        let mut filled = 0;
        while filled < want {
            match reader.read(&mut self.scratch[filled..want]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(source) => {
                    self.exhausted = true;
                    return Err(SortError::IoFailed {
                        path: self.path.clone(),
                        position: self.position + filled as u64,
                        source,
                    });
                }
            }
        }

        for chunk in self.scratch[..filled].chunks_exact(T::SIZE) {
            block.push(T::decode(chunk));
        }
        self.position += filled as u64;
        Ok(())
    }

    /// True once the source has no more bytes to yield.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Change whether close unlinks the file. A stream that did not read
    /// its source to completion clears this before closing.
    pub fn set_rm_when_done(&mut self, rm: bool) {
        self.rm_when_done = rm;
    }

    /// Release the file, unlinking it when configured to.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closing {} (read)", self.path.display());
            if self.rm_when_done {
                if let Err(source) = fs::remove_file(&self.path) {
                    let err = SortError::RemoveFailed { path: self.path.clone(), source };
                    warn!("{err}");
                }
            }
        }
    }

    /// Path this reader was bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes blocks of records to a file, appending at the current position.
pub struct BlockFileWriter<T> {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    position: u64,
    scratch: Vec<u8>,
    _record: PhantomData<T>,
}

impl<T: Record> BlockFileWriter<T> {
    /// Create a writer over `path`. No file is touched until [`open`](Self::open).
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None, position: 0, scratch: Vec::new(), _record: PhantomData }
    }

    /// Create (truncating) the file for writing.
    pub fn open(&mut self) -> Result<()> {
        debug!("opening {} for write", self.path.display());
        let file = File::create(&self.path)
            .map_err(|source| SortError::OpenFailed { path: self.path.clone(), source })?;
        self.file = Some(BufWriter::new(file));
        self.position = 0;
        Ok(())
    }

    /// Append `block.len()` records. Empty blocks are no-ops.
    pub fn write(&mut self, block: &Block<T>) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        let writer = self.file.as_mut().expect("write on an unopened sink");

        self.scratch.resize(block.len() * T::SIZE, 0);
        for (record, chunk) in block.records().iter().zip(self.scratch.chunks_exact_mut(T::SIZE)) {
            record.encode(chunk);
        }
        writer.write_all(&self.scratch).map_err(|source| SortError::IoFailed {
            path: self.path.clone(),
            position: self.position,
            source,
        })?;
        self.position += self.scratch.len() as u64;
        Ok(())
    }

    /// Flush and release the file.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            debug!("closing {} (write)", self.path.display());
            file.flush().map_err(|source| SortError::IoFailed {
                path: self.path.clone(),
                position: self.position,
                source,
            })?;
        }
        Ok(())
    }

    /// Path this writer was bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_u32s(path: &Path, values: &[u32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_read_short_last_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.bin");
        write_u32s(&path, &[1, 2, 3, 4, 5]);

        let mut reader = BlockFileReader::<u32>::new(path, false);
        reader.open().unwrap();

        let mut block = Block::with_capacity(3);
        reader.read(&mut block).unwrap();
        assert_eq!(block.records(), &[1, 2, 3]);
        assert!(!reader.is_exhausted());

        let mut block = Block::with_capacity(3);
        reader.read(&mut block).unwrap();
        assert_eq!(block.records(), &[4, 5]);
        assert!(reader.is_exhausted());
        reader.close();
    }

    #[test]
    fn test_read_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let mut reader = BlockFileReader::<u32>::new(path, false);
        reader.open().unwrap();
        let mut block = Block::with_capacity(4);
        reader.read(&mut block).unwrap();
        assert!(block.is_empty());
        assert!(reader.is_exhausted());
        reader.close();
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut reader = BlockFileReader::<u32>::new(dir.path().join("missing.bin"), false);
        assert!(matches!(reader.open(), Err(SortError::OpenFailed { .. })));
    }

    #[test]
    fn test_rm_when_done_unlinks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consumed.bin");
        write_u32s(&path, &[9]);

        let mut reader = BlockFileReader::<u32>::new(path.clone(), true);
        reader.open().unwrap();
        let mut block = Block::with_capacity(2);
        reader.read(&mut block).unwrap();
        reader.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");

        let mut writer = BlockFileWriter::<u32>::new(path.clone());
        writer.open().unwrap();
        let mut block = Block::with_capacity(4);
        for v in [10, 20, 30] {
            block.push(v);
        }
        writer.write(&block).unwrap();
        writer.close().unwrap();

        let mut reader = BlockFileReader::<u32>::new(path, false);
        reader.open().unwrap();
        let mut got = Block::with_capacity(4);
        reader.read(&mut got).unwrap();
        assert_eq!(got.records(), &[10, 20, 30]);
        reader.close();
    }

    #[test]
    fn test_write_empty_block_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");

        let mut writer = BlockFileWriter::<u32>::new(path.clone());
        writer.open().unwrap();
        let block: Block<u32> = Block::with_capacity(4);
        writer.write(&block).unwrap();
        writer.close().unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_trailing_partial_record_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.bin");
        let mut bytes: Vec<u8> = 7u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&[0xAB, 0xCD]); // half a record
        fs::write(&path, bytes).unwrap();

        let mut reader = BlockFileReader::<u32>::new(path, false);
        reader.open().unwrap();
        let mut block = Block::with_capacity(4);
        reader.read(&mut block).unwrap();
        assert_eq!(block.records(), &[7]);
        reader.close();
    }
}
