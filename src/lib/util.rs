//! Data generation and sortedness verification.
//!
//! Both are plain sequential loops over the streams: `generate` pushes
//! records from a caller-supplied source, `check` walks a file comparing
//! adjacent records. They double as end-to-end exercises of the stream
//! push and pop paths.

use crate::block::BlockPool;
use crate::errors::Result;
use crate::record::Record;
use crate::sort::{CheckParams, GenerateParams};
use crate::stream::{BlockInputStream, BlockOutputStream};
use log::{info, warn};
use std::fmt::Display;
use std::sync::Arc;

/// How many out-of-order pairs `check` reports before going quiet.
const MAX_REPORTED_VIOLATIONS: u64 = 10;

/// Fill the output file with records drawn from `next`, `size` (scaled by
/// the memory unit) bytes in total.
pub fn generate<T, F>(params: &GenerateParams, mut next: F) -> Result<()>
where
    T: Record,
    F: FnMut() -> T,
{
    let count = params.mem.unit.scale(params.size) / T::SIZE;
    info!("generating {} records into {}", count, params.output.display());

    let pool = Arc::new(BlockPool::<T>::new(params.mem.bytes(), params.mem.blocks)?);
    let mut out = BlockOutputStream::new(params.output.clone(), pool);
    out.open()?;
    for _ in 0..count {
        out.push(next());
    }
    out.close()
}

/// Verify that the file's records are non-decreasing.
///
/// Logs the extremes and the first few out-of-order pairs, and returns
/// whether the file is sorted.
pub fn check<T>(params: &CheckParams) -> Result<bool>
where
    T: Record + Display,
{
    let pool = Arc::new(BlockPool::<T>::new(params.mem.bytes(), params.mem.blocks)?);
    let mut stream = BlockInputStream::<T>::new(params.input.clone(), pool, false);
    stream.open()?;

    let mut count: u64 = 0;
    let mut reported: u64 = 0;
    let mut sorted = true;

    if !stream.empty() {
        let first = stream.front().clone();
        let mut prev = first.clone();
        let mut min = first.clone();
        let mut max = first.clone();
        stream.pop();
        count = 1;

        while !stream.empty() {
            let curr = stream.front().clone();
            if T::less(&curr, &prev) {
                sorted = false;
                if reported < MAX_REPORTED_VIOLATIONS {
                    warn!("out of order at record {count}: prev = {prev}, curr = {curr}");
                    reported += 1;
                }
            }
            if T::less(&curr, &min) {
                min = curr.clone();
            }
            if T::less(&max, &curr) {
                max = curr.clone();
            }
            prev = curr;
            stream.pop();
            count += 1;
        }
        info!("  min = {min}, max = {max}");
        info!("  first = {first}, last = {prev}");
    }
    info!("  sorted = {sorted}, records = {count}");
    stream.close()?;
    Ok(sorted)
}
