//! Output stream: a writer thread that drains filled blocks to a file.
//!
//! Pushed records accumulate in a current block; a full block is enqueued
//! for the writer thread, which writes it and releases it back to the
//! pool. Closing flushes the partial block, drops the queue's sender (the
//! stop signal) and joins the writer, after which every record ever pushed
//! is on disk and every allocated block is back in the pool.

use crate::block::{Block, BlockPool};
use crate::errors::{Result, SortError};
use crate::io::BlockFileWriter;
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A logical ordered consumer of records backed by one file and one
/// background writer thread.
///
/// Records are written in the order pushed. The producer side must be
/// driven from a single thread.
pub struct BlockOutputStream<T: Record> {
    path: PathBuf,
    pool: Arc<BlockPool<T>>,
    error: Arc<Mutex<Option<SortError>>>,
    queue: Option<Sender<Block<T>>>,
    handle: Option<JoinHandle<()>>,
    current: Option<Block<T>>,
}

impl<T: Record> BlockOutputStream<T> {
    /// Bind a stream to a file and the pool its blocks will come from.
    #[must_use]
    pub fn new(path: PathBuf, pool: Arc<BlockPool<T>>) -> Self {
        Self {
            path,
            pool,
            error: Arc::new(Mutex::new(None)),
            queue: None,
            handle: None,
            current: None,
        }
    }

    /// Create the file and start the writer thread.
    pub fn open(&mut self) -> Result<()> {
        debug_assert!(self.handle.is_none(), "open on an already-opened stream");
        let mut writer = BlockFileWriter::<T>::new(self.path.clone());
        writer.open()?;

        let (tx, rx) = unbounded();
        let pool = Arc::clone(&self.pool);
        let error = Arc::clone(&self.error);
        self.queue = Some(tx);
        self.handle = Some(thread::spawn(move || write_loop(writer, &pool, &rx, &error)));
        Ok(())
    }

    /// Append one record, allocating a block from the pool when none is
    /// in progress and enqueueing it for the writer once full.
    pub fn push(&mut self, value: T) {
        if self.current.is_none() {
            self.current = Some(self.pool.allocate());
        }
        let block = self.current.as_mut().expect("current block present");
        block.push(value);
        if block.is_full() {
            self.enqueue_current();
        }
    }

    /// Enqueue a pre-filled block directly, after any partial current
    /// block. The block must belong to this stream's pool.
    pub fn push_block(&mut self, block: Block<T>) {
        self.enqueue_current();
        self.enqueue(block);
    }

    /// Flush the current block, stop and join the writer, and surface any
    /// write error. After a successful close every pushed record has been
    /// written. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.enqueue_current();
        drop(self.queue.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(SortError::TaskPanicked {
                    message: format!("writer thread for '{}' panicked", self.path.display()),
                });
            }
        }
        self.error.lock().take().map_or(Ok(()), Err)
    }

    /// Path of the file this stream writes to.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.path
    }

    /// The pool this stream's blocks belong to.
    #[must_use]
    pub fn pool(&self) -> &Arc<BlockPool<T>> {
        &self.pool
    }

    fn enqueue_current(&mut self) {
        if let Some(block) = self.current.take() {
            self.enqueue(block);
        }
    }

    fn enqueue(&mut self, block: Block<T>) {
        let queue = self.queue.as_ref().expect("push on a stream that is not open");
        if let Err(send) = queue.send(block) {
            // Writer gone; the error slot already explains why.
            self.pool.release(send.0);
        }
    }
}

impl<T: Record> Drop for BlockOutputStream<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn write_loop<T: Record>(
    mut writer: BlockFileWriter<T>,
    pool: &BlockPool<T>,
    rx: &Receiver<Block<T>>,
    error: &Mutex<Option<SortError>>,
) {
    for block in rx.iter() {
        // After the first failure, keep draining so every block still
        // finds its way back to the pool.
        if error.lock().is_none() {
            if let Err(e) = writer.write(&block) {
                *error.lock() = Some(e);
            }
        }
        pool.release(block);
    }
    if let Err(e) = writer.close() {
        let mut slot = error.lock();
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}
