//! The two-phase sort pipeline: split-and-sort, then rounds of k-way merges.
//!
//! Phase 1 streams the input through a single shared block pool, sorts each
//! block on a worker and writes it out as a run. Phase 2 repeatedly merges
//! up to `kmerge` runs per task, with up to `tasks` merges in flight, until
//! one file remains; that file is renamed to the destination. A run
//! produced while other merges are still running feeds straight into the
//! next round.
//!
//! # Memory model
//!
//! Phase 1 shares one pool of `blocks` blocks between the input stream and
//! every run writer, so in-flight memory never exceeds the budget: when all
//! blocks are out, the input stream's next allocation suspends until a
//! sorter finishes and its writer releases one.
//!
//! Phase 2 gives each merge task an independent slice of the budget:
//! `mem / tasks` per task, half of it to the task's output stream and the
//! rest split evenly across its `kmerge` input streams, each subdivided
//! into `stream_blocks` blocks.

use crate::block::{Block, BlockPool};
use crate::errors::{Result, SortError};
use crate::merge::merge_streams;
use crate::record::{Record, ordering};
use crate::stream::{BlockInputStream, BlockOutputStream};
use crate::task::TaskPool;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix of Phase-1 run files: `<prefix>.split.NNN`.
pub const SPLIT_SUFFIX: &str = "split";
/// Suffix of Phase-2 intermediates: `<prefix>.merge.NNN`.
pub const MERGE_SUFFIX: &str = "merge";

/// Memory budget units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemUnit {
    /// Bytes
    B,
    /// Kibibytes
    Kb,
    /// Mebibytes
    Mb,
}

impl MemUnit {
    /// Scale `size` into bytes.
    #[must_use]
    pub fn scale(self, size: usize) -> usize {
        match self {
            MemUnit::B => size,
            MemUnit::Kb => size << 10,
            MemUnit::Mb => size << 20,
        }
    }
}

/// Memory budget shared by both phases.
#[derive(Debug, Clone)]
pub struct MemoryParams {
    /// Budget before unit scaling
    pub size: usize,
    /// Unit the budget is expressed in
    pub unit: MemUnit,
    /// Number of blocks the Phase-1 pool divides the budget into
    pub blocks: usize,
}

impl MemoryParams {
    /// The budget in bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.unit.scale(self.size)
    }
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self { size: 1, unit: MemUnit::Mb, blocks: 2 }
    }
}

/// Parameters for Phase 1.
#[derive(Debug, Clone)]
pub struct SplitParams {
    /// Memory budget
    pub mem: MemoryParams,
    /// File to split into sorted runs
    pub input: PathBuf,
    /// Prefix for run files (`<prefix>.split.NNN`)
    pub output_prefix: PathBuf,
    /// Delete the input file once fully read
    pub rm_input: bool,
}

/// Parameters for Phase 2.
#[derive(Debug, Clone)]
pub struct MergeParams {
    /// Memory budget
    pub mem: MemoryParams,
    /// Maximum concurrent merge tasks
    pub tasks: usize,
    /// Streams merged per task
    pub kmerge: usize,
    /// Blocks per stream pool
    pub stream_blocks: usize,
    /// Sorted runs to merge
    pub inputs: Vec<PathBuf>,
    /// Final output path; intermediates are `<output>.merge.NNN`
    pub output: PathBuf,
    /// Delete each consumed run once fully read
    pub rm_input: bool,
}

/// Parameters for sortedness verification.
#[derive(Debug, Clone)]
pub struct CheckParams {
    /// Memory budget
    pub mem: MemoryParams,
    /// File to verify
    pub input: PathBuf,
}

/// Parameters for random-data generation.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    /// Memory budget
    pub mem: MemoryParams,
    /// Amount of data to generate, scaled by the memory unit
    pub size: usize,
    /// File to write
    pub output: PathBuf,
}

/// Build the name of a temporary run or intermediate.
#[must_use]
pub fn tmp_filename(prefix: &Path, suffix: &str, index: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!(".{suffix}.{index:03}"));
    PathBuf::from(name)
}

/// Phase 1: partition the input into sorted runs.
///
/// Returns the run paths, in completion order. On failure all runs
/// written so far are unlinked.
pub fn split<T: Record>(params: &SplitParams) -> Result<Vec<PathBuf>> {
    let pool = Arc::new(BlockPool::<T>::new(params.mem.bytes(), params.mem.blocks)?);
    info!(
        "splitting {} into runs of {} records",
        params.input.display(),
        pool.block_capacity()
    );

    let mut input =
        BlockInputStream::<T>::new(params.input.clone(), Arc::clone(&pool), params.rm_input);
    input.open()?;

    let mut tasks: TaskPool<PathBuf> = TaskPool::new();
    let mut runs: Vec<PathBuf> = Vec::new();
    let mut file_cnt = 0usize;
    let mut failure: Option<SortError> = None;

    while !input.empty() {
        let block = input.pop_block();
        file_cnt += 1;
        let path = tmp_filename(&params.output_prefix, SPLIT_SUFFIX, file_cnt);
        let out = BlockOutputStream::new(path, Arc::clone(&pool));
        tasks.submit(move || sort_and_write(block, out));

        // Collect opportunistically: whatever is ready now, and everything
        // still running once the input has drained.
        while !tasks.is_empty()
            && (tasks.ready() > 0 || (tasks.running() > 0 && input.empty()))
        {
            match tasks.get_any() {
                Ok(path) => runs.push(path),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_some() {
            break;
        }
    }

    while !tasks.is_empty() {
        match tasks.get_any() {
            Ok(path) => runs.push(path),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    let closed = input.close();
    let failure = failure.or(closed.err());
    if let Some(e) = failure {
        remove_files(&runs);
        return Err(e);
    }
    info!("split produced {} runs", runs.len());
    Ok(runs)
}

/// Sort one block in place and write it out as a single-run file.
///
/// The block belongs to the shared Phase-1 pool; it must find its way
/// back even if this task panics, or the input stream starves.
fn sort_and_write<T: Record>(block: Block<T>, mut out: BlockOutputStream<T>) -> Result<PathBuf> {
    let mut block = BlockReturn { block: Some(block), pool: Arc::clone(out.pool()) };
    block.get_mut().records_mut().par_sort_unstable_by(ordering);

    out.open()?;
    out.push_block(block.take());
    match out.close() {
        Ok(()) => Ok(out.output_path().to_path_buf()),
        Err(e) => {
            remove_file_quiet(out.output_path());
            Err(e)
        }
    }
}

/// Returns a held block to its pool on drop unless it was handed on.
struct BlockReturn<T: Record> {
    block: Option<Block<T>>,
    pool: Arc<BlockPool<T>>,
}

impl<T: Record> BlockReturn<T> {
    fn get_mut(&mut self) -> &mut Block<T> {
        self.block.as_mut().expect("block not yet taken")
    }

    fn take(&mut self) -> Block<T> {
        self.block.take().expect("block not yet taken")
    }
}

impl<T: Record> Drop for BlockReturn<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.pool.release(block);
        }
    }
}

/// Phase 2: merge runs until one file remains, then rename it to the
/// destination.
///
/// An empty input list succeeds with an empty output file; a single input
/// with no tasks in flight is a pure rename. On failure, intermediates
/// created by this call are unlinked best-effort.
pub fn merge<T: Record>(params: &MergeParams) -> Result<PathBuf> {
    if params.kmerge < 2 {
        return Err(SortError::InvalidConfig {
            reason: format!("merge fan-in must be at least 2, got {}", params.kmerge),
        });
    }
    if params.tasks == 0 {
        return Err(SortError::InvalidConfig {
            reason: "at least one merge task is required".to_string(),
        });
    }

    let mut files: VecDeque<PathBuf> = params.inputs.iter().cloned().collect();
    if files.is_empty() {
        info!("nothing to merge; writing empty output {}", params.output.display());
        fs::File::create(&params.output)
            .map_err(|source| SortError::OpenFailed { path: params.output.clone(), source })?;
        return Ok(params.output.clone());
    }
    if files.len() == 1 {
        let src = files.pop_front().expect("one file");
        rename_into(&src, &params.output)?;
        return Ok(params.output.clone());
    }

    // Per-task budget: half to the output stream, the rest split across
    // the input streams.
    let task_mem = params.mem.bytes() / params.tasks;
    let out_mem = task_mem / 2;
    let in_mem = (task_mem - out_mem) / params.kmerge;

    let mut tasks: TaskPool<PathBuf> = TaskPool::new();
    let mut file_cnt = 0usize;
    let mut created: Vec<PathBuf> = Vec::new();
    let mut failure: Option<SortError> = None;

    while !(files.len() == 1 && tasks.is_empty()) {
        info!("{} files left to merge, {} merges running", files.len(), tasks.running());

        match submit_merge::<T>(
            &mut files,
            &mut tasks,
            params,
            in_mem,
            out_mem,
            &mut file_cnt,
            &mut created,
        ) {
            Ok(()) => {}
            Err(e) => {
                failure = Some(e);
                break;
            }
        }

        // Collect whenever too few files remain for a full fan-in, a
        // result is ready, or the task cap is reached.
        while !tasks.is_empty()
            && (files.len() < params.kmerge
                || tasks.ready() > 0
                || tasks.running() >= params.tasks)
        {
            match tasks.get_any() {
                Ok(path) => files.push_back(path),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_some() {
            break;
        }
    }

    while !tasks.is_empty() {
        match tasks.get_any() {
            Ok(path) => files.push_back(path),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        let leftovers: Vec<PathBuf> = created.into_iter().filter(|p| p.exists()).collect();
        remove_files(&leftovers);
        return Err(e);
    }

    let last = files.pop_front().expect("exactly one file remains");
    rename_into(&last, &params.output)?;
    Ok(params.output.clone())
}

/// Build one merge task from the head of the file list and submit it.
fn submit_merge<T: Record>(
    files: &mut VecDeque<PathBuf>,
    tasks: &mut TaskPool<PathBuf>,
    params: &MergeParams,
    in_mem: usize,
    out_mem: usize,
    file_cnt: &mut usize,
    created: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut inputs = Vec::with_capacity(params.kmerge);
    while inputs.len() < params.kmerge && !files.is_empty() {
        let path = files.pop_front().expect("non-empty file list");
        let pool = Arc::new(BlockPool::<T>::new(in_mem, params.stream_blocks)?);
        inputs.push(BlockInputStream::new(path, pool, params.rm_input));
    }

    *file_cnt += 1;
    let out_path = tmp_filename(&params.output, MERGE_SUFFIX, *file_cnt);
    created.push(out_path.clone());
    let out_pool = Arc::new(BlockPool::<T>::new(out_mem, params.stream_blocks)?);
    let output = BlockOutputStream::new(out_path, out_pool);

    tasks.submit(move || merge_streams(inputs, output));
    Ok(())
}

/// Sort `input` into `output`: Phase 1 runs under `tmp_prefix`, Phase 2
/// merges them. Runs are always deleted as they are consumed.
pub fn sort<T: Record>(
    mem: &MemoryParams,
    input: &Path,
    output: &Path,
    tmp_prefix: &Path,
    tasks: usize,
    kmerge: usize,
    stream_blocks: usize,
) -> Result<PathBuf> {
    let split_params = SplitParams {
        mem: mem.clone(),
        input: input.to_path_buf(),
        output_prefix: tmp_prefix.to_path_buf(),
        rm_input: false,
    };
    let runs = split::<T>(&split_params)?;

    let merge_params = MergeParams {
        mem: mem.clone(),
        tasks,
        kmerge,
        stream_blocks,
        inputs: runs,
        output: output.to_path_buf(),
        rm_input: true,
    };
    merge::<T>(&merge_params)
}

fn rename_into(src: &Path, dst: &Path) -> Result<()> {
    if src == dst {
        return Ok(());
    }
    fs::rename(src, dst).map_err(|source| SortError::RenameFailed {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        source,
    })?;
    info!("output file: {}", dst.display());
    Ok(())
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        remove_file_quiet(path);
    }
}

fn remove_file_quiet(path: &Path) {
    if let Err(source) = fs::remove_file(path) {
        let err = SortError::RemoveFailed { path: path.to_path_buf(), source };
        warn!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
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

    fn mem(bytes: usize, blocks: usize) -> MemoryParams {
        MemoryParams { size: bytes, unit: MemUnit::B, blocks }
    }

    #[test]
    fn test_mem_unit_scaling() {
        assert_eq!(MemUnit::B.scale(123), 123);
        assert_eq!(MemUnit::Kb.scale(2), 2048);
        assert_eq!(MemUnit::Mb.scale(1), 1 << 20);
    }

    #[test]
    fn test_tmp_filename_zero_padded() {
        let name = tmp_filename(Path::new("/tmp/data.bin"), SPLIT_SUFFIX, 7);
        assert_eq!(name, PathBuf::from("/tmp/data.bin.split.007"));
        let name = tmp_filename(Path::new("out"), MERGE_SUFFIX, 123);
        assert_eq!(name, PathBuf::from("out.merge.123"));
    }

    #[test]
    fn test_split_two_runs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        // 16 bytes / 2 blocks / 4 bytes = 2 records per block
        write_u32s(&input, &[4, 3, 2, 1]);

        let params = SplitParams {
            mem: mem(16, 2),
            input,
            output_prefix: dir.path().join("input.bin"),
            rm_input: false,
        };
        let mut runs = split::<u32>(&params).unwrap();
        runs.sort();
        assert_eq!(runs.len(), 2);

        let mut all: Vec<u32> = Vec::new();
        for run in &runs {
            let records = read_u32s(run);
            let mut sorted = records.clone();
            sorted.sort_unstable();
            assert_eq!(records, sorted, "run {} is not sorted", run.display());
            all.extend(records);
        }
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_split_empty_input_produces_no_runs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.bin");
        fs::write(&input, b"").unwrap();

        let params = SplitParams {
            mem: mem(16, 2),
            input,
            output_prefix: dir.path().join("empty.bin"),
            rm_input: false,
        };
        assert!(split::<u32>(&params).unwrap().is_empty());
    }

    #[test]
    fn test_split_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let params = SplitParams {
            mem: mem(16, 2),
            input: dir.path().join("missing.bin"),
            output_prefix: dir.path().join("missing.bin"),
            rm_input: false,
        };
        assert!(matches!(split::<u32>(&params), Err(SortError::OpenFailed { .. })));
    }

    #[test]
    fn test_merge_empty_input_list_writes_empty_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("sorted.bin");
        let params = MergeParams {
            mem: mem(64, 2),
            tasks: 2,
            kmerge: 4,
            stream_blocks: 2,
            inputs: vec![],
            output: output.clone(),
            rm_input: true,
        };
        merge::<u32>(&params).unwrap();
        assert_eq!(fs::metadata(&output).unwrap().len(), 0);
    }

    #[test]
    fn test_merge_single_input_is_renamed() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("only.run");
        write_u32s(&run, &[1, 2, 3]);
        let output = dir.path().join("sorted.bin");

        let params = MergeParams {
            mem: mem(64, 2),
            tasks: 2,
            kmerge: 4,
            stream_blocks: 2,
            inputs: vec![run.clone()],
            output: output.clone(),
            rm_input: true,
        };
        merge::<u32>(&params).unwrap();
        assert!(!run.exists());
        assert_eq!(read_u32s(&output), vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_rejects_fan_in_of_one() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.run");
        let b = dir.path().join("b.run");
        write_u32s(&a, &[1]);
        write_u32s(&b, &[2]);
        let params = MergeParams {
            mem: mem(64, 2),
            tasks: 1,
            kmerge: 1,
            stream_blocks: 2,
            inputs: vec![a, b],
            output: dir.path().join("out.bin"),
            rm_input: false,
        };
        assert!(matches!(merge::<u32>(&params), Err(SortError::InvalidConfig { .. })));
    }

    #[test]
    fn test_merge_two_presorted_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.run");
        let b = dir.path().join("b.run");
        write_u32s(&a, &[1, 4, 6]);
        write_u32s(&b, &[2, 3, 5]);
        let output = dir.path().join("sorted.bin");

        let params = MergeParams {
            mem: mem(256, 2),
            tasks: 2,
            kmerge: 2,
            stream_blocks: 2,
            inputs: vec![a, b],
            output: output.clone(),
            rm_input: true,
        };
        merge::<u32>(&params).unwrap();
        assert_eq!(read_u32s(&output), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_merge_more_files_than_fan_in() {
        let dir = TempDir::new().unwrap();
        let mut inputs = Vec::new();
        for (i, run) in [[9u32, 10], [1, 8], [2, 7], [3, 6], [4, 5]].iter().enumerate() {
            let path = dir.path().join(format!("run.{i:03}"));
            write_u32s(&path, run);
            inputs.push(path);
        }
        let output = dir.path().join("sorted.bin");

        // kmerge=2 forces several rounds, tasks=2 keeps them overlapping.
        let params = MergeParams {
            mem: mem(1024, 2),
            tasks: 2,
            kmerge: 2,
            stream_blocks: 2,
            inputs,
            output: output.clone(),
            rm_input: true,
        };
        merge::<u32>(&params).unwrap();
        assert_eq!(read_u32s(&output), (1..=10).collect::<Vec<u32>>());

        // Consumed runs and intermediates are gone.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "sorted.bin")
            .collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }

    #[test]
    fn test_sort_end_to_end() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        let output = dir.path().join("sorted.bin");
        write_u32s(&input, &[9, 7, 5, 3, 1, 2, 4, 6, 8, 0]);

        // 64 B / 2 blocks / 4 B = 8 records per block: two Phase-1 runs.
        sort::<u32>(&mem(64, 2), &input, &output, &input, 1, 2, 2).unwrap();
        assert_eq!(read_u32s(&output), (0..10).collect::<Vec<u32>>());
        assert!(input.exists(), "sort must not consume its input");
    }
}
