//! k-way tournament merge of sorted input streams into one output stream.
//!
//! The algorithm is selected by the number of live streams: a single
//! stream is copied, two to four streams use hand-unrolled find-min
//! comparisons, and five or more go through a binary min-heap keyed by the
//! streams' current front values. As streams drain they fall out of the
//! tournament, the heap hands off to the unrolled path at four, and the
//! last survivor is copied.

use crate::errors::{Result, SortError};
use crate::record::{Record, ordering};
use crate::stream::{BlockInputStream, BlockOutputStream};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;

/// Merge a set of sorted input streams into `output`.
///
/// Opens every input, drops the ones with no records, runs the
/// tournament and closes everything on all exit paths. Returns the
/// output file's path. Fails with [`SortError::EmptyMerge`] when no
/// input stream contains any records.
pub fn merge_streams<T: Record>(
    inputs: Vec<BlockInputStream<T>>,
    mut output: BlockOutputStream<T>,
) -> Result<PathBuf> {
    let mut live: Vec<BlockInputStream<T>> = Vec::with_capacity(inputs.len());
    let mut pending: Vec<BlockInputStream<T>> = inputs;

    while let Some(mut stream) = pending.pop() {
        if let Err(e) = stream.open() {
            close_all(&mut live);
            close_all(&mut pending);
            return Err(e);
        }
        if stream.empty() {
            if let Err(e) = stream.close() {
                close_all(&mut live);
                close_all(&mut pending);
                return Err(e);
            }
        } else {
            live.push(stream);
        }
    }

    if live.is_empty() {
        return Err(SortError::EmptyMerge);
    }

    if let Err(e) = output.open() {
        close_all(&mut live);
        return Err(e);
    }

    let merged = if live.len() > 4 {
        merge_heap(&mut live, &mut output)
    } else {
        merge_unrolled(&mut live, &mut output)
    };
    let flushed = output.close();

    if let Err(e) = merged {
        close_all(&mut live);
        return Err(e);
    }
    flushed?;
    Ok(output.output_path().to_path_buf())
}

/// Drain the single remaining stream into the output.
fn copy_stream<T: Record>(sin: &mut BlockInputStream<T>, sout: &mut BlockOutputStream<T>) {
    while !sin.empty() {
        sout.push(sin.front().clone());
        sin.pop();
    }
}

/// Tournament over at most four streams, with the find-min unrolled per
/// stream count. Streams leave the vector (and are closed) as they drain.
fn merge_unrolled<T: Record>(
    streams: &mut Vec<BlockInputStream<T>>,
    out: &mut BlockOutputStream<T>,
) -> Result<()> {
    debug_assert!((1..=4).contains(&streams.len()));

    while streams.len() > 1 {
        let min = match streams.len() {
            2 => min_of_two(streams),
            3 => min_of_three(streams),
            _ => min_of_four(streams),
        };
        out.push(streams[min].front().clone());
        streams[min].pop();
        if streams[min].empty() {
            let mut done = streams.remove(min);
            done.close()?;
        }
    }

    copy_stream(&mut streams[0], out);
    let mut last = streams.remove(0);
    last.close()
}

fn min_of_two<T: Record>(s: &[BlockInputStream<T>]) -> usize {
    if T::less(s[0].front(), s[1].front()) { 0 } else { 1 }
}

fn min_of_three<T: Record>(s: &[BlockInputStream<T>]) -> usize {
    if T::less(s[0].front(), s[1].front()) {
        if T::less(s[0].front(), s[2].front()) { 0 } else { 2 }
    } else if T::less(s[1].front(), s[2].front()) {
        1
    } else {
        2
    }
}

fn min_of_four<T: Record>(s: &[BlockInputStream<T>]) -> usize {
    if T::less(s[0].front(), s[1].front()) {
        if T::less(s[2].front(), s[3].front()) {
            if T::less(s[0].front(), s[2].front()) { 0 } else { 2 }
        } else if T::less(s[0].front(), s[3].front()) {
            0
        } else {
            3
        }
    } else if T::less(s[2].front(), s[3].front()) {
        if T::less(s[1].front(), s[2].front()) { 1 } else { 2 }
    } else if T::less(s[1].front(), s[3].front()) {
        1
    } else {
        3
    }
}

/// A non-empty stream inside the merge heap, ordered by its current front
/// value. Stream identity never participates in the ordering.
struct HeapedStream<T: Record>(BlockInputStream<T>);

impl<T: Record> PartialEq for HeapedStream<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Record> Eq for HeapedStream<T> {}

impl<T: Record> PartialOrd for HeapedStream<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Record> Ord for HeapedStream<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        ordering(self.0.front(), other.0.front())
    }
}

/// Heap-based tournament for five or more streams; hands off to the
/// unrolled path once four remain.
fn merge_heap<T: Record>(
    streams: &mut Vec<BlockInputStream<T>>,
    out: &mut BlockOutputStream<T>,
) -> Result<()> {
    let mut heap: BinaryHeap<Reverse<HeapedStream<T>>> =
        streams.drain(..).map(|s| Reverse(HeapedStream(s))).collect();

    while heap.len() > 4 {
        let Reverse(HeapedStream(mut stream)) = heap.pop().expect("heap has more than 4 streams");
        out.push(stream.front().clone());
        stream.pop();
        if !stream.empty() {
            heap.push(Reverse(HeapedStream(stream)));
        } else if let Err(e) = stream.close() {
            streams.extend(heap.into_iter().map(|Reverse(HeapedStream(s))| s));
            return Err(e);
        }
    }

    streams.extend(heap.into_iter().map(|Reverse(HeapedStream(s))| s));
    merge_unrolled(streams, out)
}

fn close_all<T: Record>(streams: &mut Vec<BlockInputStream<T>>) {
    for stream in streams.iter_mut() {
        let _ = stream.close();
    }
    streams.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPool;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_u32s(path: &Path, values: &[u32]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        fs::write(path, bytes).unwrap();
    }

    fn read_u32s(path: &Path) -> Vec<u32> {
        fs::read(path)
            .unwrap()
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn input_stream(path: PathBuf) -> BlockInputStream<u32> {
        let pool = Arc::new(BlockPool::new(16, 2).unwrap()); // 2-record blocks
        BlockInputStream::new(path, pool, false)
    }

    fn merge_files(dir: &TempDir, runs: &[&[u32]]) -> Vec<u32> {
        let inputs: Vec<BlockInputStream<u32>> = runs
            .iter()
            .enumerate()
            .map(|(i, run)| {
                let path = dir.path().join(format!("run.{i:03}"));
                write_u32s(&path, run);
                input_stream(path)
            })
            .collect();

        let out_path = dir.path().join("merged.bin");
        let out_pool = Arc::new(BlockPool::new(24, 3).unwrap());
        let output = BlockOutputStream::new(out_path, Arc::clone(&out_pool));

        let path = merge_streams(inputs, output).unwrap();
        assert_eq!(out_pool.outstanding(), 0);
        read_u32s(&path)
    }

    #[test]
    fn test_single_stream_copy() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_files(&dir, &[&[1, 3, 5, 7]]), vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_two_streams() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_files(&dir, &[&[1, 4, 6], &[2, 3, 5]]), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_three_streams() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            merge_files(&dir, &[&[1, 9], &[2, 8], &[3, 7]]),
            vec![1, 2, 3, 7, 8, 9]
        );
    }

    #[test]
    fn test_four_streams_uneven_lengths() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            merge_files(&dir, &[&[10], &[1, 2, 3, 4, 5], &[6, 7], &[0, 8, 9]]),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]
        );
    }

    #[test]
    fn test_heap_path_many_streams() {
        let dir = TempDir::new().unwrap();
        let runs: Vec<Vec<u32>> = (0..7).map(|i| vec![i, i + 10, i + 20, i + 30]).collect();
        let run_refs: Vec<&[u32]> = runs.iter().map(Vec::as_slice).collect();

        let merged = merge_files(&dir, &run_refs);
        let mut expected: Vec<u32> = runs.into_iter().flatten().collect();
        expected.sort_unstable();
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_duplicates_preserved() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_files(&dir, &[&[2, 4, 4], &[2, 4]]), vec![2, 2, 4, 4, 4]);
    }

    #[test]
    fn test_all_equal_records() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_files(&dir, &[&[5, 5], &[5], &[5, 5, 5]]), vec![5; 6]);
    }

    #[test]
    fn test_empty_runs_are_skipped() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_files(&dir, &[&[], &[1, 2], &[]]), vec![1, 2]);
    }

    #[test]
    fn test_all_empty_is_an_error() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        write_u32s(&a, &[]);
        write_u32s(&b, &[]);

        let inputs = vec![input_stream(a), input_stream(b)];
        let out_pool = Arc::new(BlockPool::new(16, 2).unwrap());
        let output = BlockOutputStream::new(dir.path().join("out.bin"), out_pool);

        assert!(matches!(merge_streams(inputs, output), Err(SortError::EmptyMerge)));
    }

    #[test]
    fn test_missing_input_fails_and_closes_others() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.bin");
        write_u32s(&good, &[1, 2]);

        let inputs = vec![input_stream(good), input_stream(dir.path().join("missing.bin"))];
        let out_pool = Arc::new(BlockPool::new(16, 2).unwrap());
        let output = BlockOutputStream::new(dir.path().join("out.bin"), out_pool);

        assert!(matches!(merge_streams(inputs, output), Err(SortError::OpenFailed { .. })));
    }
}
