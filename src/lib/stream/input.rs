//! Input stream: a reader thread that prefetches blocks from a file.
//!
//! The reader loop allocates a block from the pool (suspending when the
//! pool is dry — this is what bounds read-ahead), fills it from the file
//! and sends it down an internal queue. Dropping the queue's sender is the
//! end-of-file signal to the consumer. An I/O error ends the stream early:
//! the error is parked in a slot, the consumer observes a premature
//! end-of-stream, and [`BlockInputStream::close`] surfaces the error.

use crate::block::{Block, BlockPool};
use crate::errors::{Result, SortError};
use crate::io::BlockFileReader;
use crate::record::Record;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// A logical ordered producer of records backed by one file and one
/// background reader thread.
///
/// Records are surfaced in the exact order the file stores them, either
/// one at a time (`empty`/`front`/`pop`) or a whole block at a time
/// (`front_block`/`pop_block`). The consumer side must be driven from a
/// single thread.
pub struct BlockInputStream<T: Record> {
    path: PathBuf,
    pool: Arc<BlockPool<T>>,
    rm_input: bool,
    stop: Arc<AtomicBool>,
    error: Arc<Mutex<Option<SortError>>>,
    queue: Option<Receiver<Block<T>>>,
    handle: Option<JoinHandle<()>>,
    current: Option<Block<T>>,
    pos: usize,
}

impl<T: Record> BlockInputStream<T> {
    /// Bind a stream to a file and the pool its blocks will come from.
    #[must_use]
    pub fn new(path: PathBuf, pool: Arc<BlockPool<T>>, rm_input: bool) -> Self {
        Self {
            path,
            pool,
            rm_input,
            stop: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
            queue: None,
            handle: None,
            current: None,
            pos: 0,
        }
    }

    /// Open the file and start the reader thread.
    pub fn open(&mut self) -> Result<()> {
        debug_assert!(self.handle.is_none(), "open on an already-opened stream");
        let mut reader = BlockFileReader::<T>::new(self.path.clone(), self.rm_input);
        reader.open()?;

        self.stop.store(false, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        let pool = Arc::clone(&self.pool);
        let stop = Arc::clone(&self.stop);
        let error = Arc::clone(&self.error);
        self.queue = Some(rx);
        self.handle = Some(thread::spawn(move || read_loop(reader, &pool, &tx, &stop, &error)));
        Ok(())
    }

    /// False as long as a record is available. Suspends until the reader
    /// delivers the next block or signals end-of-stream.
    ///
    /// Must be called before [`front`](Self::front) or [`pop`](Self::pop).
    pub fn empty(&mut self) -> bool {
        if self.current.is_none() {
            self.fetch_block();
        }
        self.current.is_none()
    }

    /// The current record. A preceding [`empty`](Self::empty) must have
    /// returned false.
    #[must_use]
    pub fn front(&self) -> &T {
        let block = self.current.as_ref().expect("front without a prior empty() check");
        &block.records()[self.pos]
    }

    /// Advance past the current record, releasing the block back to the
    /// pool once it is exhausted.
    pub fn pop(&mut self) {
        let block = self.current.as_ref().expect("pop without a prior empty() check");
        self.pos += 1;
        if self.pos >= block.len() {
            let done = self.current.take().expect("current block present");
            self.pool.release(done);
            self.pos = 0;
        }
    }

    /// The current block. A preceding [`empty`](Self::empty) must have
    /// returned false.
    #[must_use]
    pub fn front_block(&self) -> &Block<T> {
        self.current.as_ref().expect("front_block without a prior empty() check")
    }

    /// Hand the entire current block to the caller, transferring ownership
    /// out of the stream. The caller must eventually release it to this
    /// stream's pool.
    #[must_use]
    pub fn pop_block(&mut self) -> Block<T> {
        debug_assert_eq!(self.pos, 0, "pop_block after partial record consumption");
        self.pos = 0;
        self.current.take().expect("pop_block without a prior empty() check")
    }

    /// Stop the reader, return all in-flight blocks to the pool, join the
    /// thread and surface any error the reader hit. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.stop.store(true, Ordering::Relaxed);

        if let Some(block) = self.current.take() {
            self.pool.release(block);
            self.pos = 0;
        }
        // Draining keeps the pool turning over, so a reader parked in
        // allocate() always makes progress toward the stop flag.
        if let Some(queue) = self.queue.take() {
            for block in queue.iter() {
                self.pool.release(block);
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(SortError::TaskPanicked {
                    message: format!("reader thread for '{}' panicked", self.path.display()),
                });
            }
        }
        self.error.lock().take().map_or(Ok(()), Err)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pool this stream's blocks belong to.
    #[must_use]
    pub fn pool(&self) -> &Arc<BlockPool<T>> {
        &self.pool
    }

    fn fetch_block(&mut self) {
        if let Some(queue) = &self.queue {
            if let Ok(block) = queue.recv() {
                self.current = Some(block);
                self.pos = 0;
            }
        }
    }
}

impl<T: Record> Drop for BlockInputStream<T> {
    fn drop(&mut self) {
        // Closing is the owner's job; this is a best-effort backstop so a
        // dropped stream never leaks its thread.
        let _ = self.close();
    }
}

fn read_loop<T: Record>(
    mut reader: BlockFileReader<T>,
    pool: &BlockPool<T>,
    tx: &Sender<Block<T>>,
    stop: &AtomicBool,
    error: &Mutex<Option<SortError>>,
) {
    while !stop.load(Ordering::Relaxed) && !reader.is_exhausted() {
        let mut block = pool.allocate();
        match reader.read(&mut block) {
            Ok(()) => {
                if block.is_empty() {
                    pool.release(block);
                } else if let Err(send) = tx.send(block) {
                    pool.release(send.0);
                    break;
                }
            }
            Err(e) => {
                pool.release(block);
                *error.lock() = Some(e);
                break;
            }
        }
    }

    // Only a complete, error-free pass consumes the input file.
    let complete =
        reader.is_exhausted() && !stop.load(Ordering::Relaxed) && error.lock().is_none();
    if !complete {
        reader.set_rm_when_done(false);
    }
    reader.close();
    // Dropping the sender signals end-of-stream to the consumer.
}
