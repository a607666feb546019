//! Run the full demo cycle: generate, split, merge, check.

use anyhow::{Result, bail};
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use exsort_lib::sort::{CheckParams, GenerateParams, MergeParams, SplitParams};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::{MemoryOptions, MergeOptions};
use crate::commands::SortRecord;

/// Generate random data, sort it, and verify the result.
#[derive(Debug, Parser)]
#[command(name = "all", about = "Generate, sort and verify in one go")]
pub struct All {
    /// Data file to generate and then sort
    #[arg(short = 'f', long = "file", default_value = "generated")]
    pub file: PathBuf,

    /// Sorted output; defaults to <file>.sorted
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Amount of data to generate, in units of --mem-unit
    #[arg(short = 's', long = "size")]
    pub size: usize,

    /// Seed for reproducible data
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,

    /// Merge scheduling options
    #[command(flatten)]
    pub merge: MergeOptions,
}

impl Command for All {
    fn execute(&self) -> Result<()> {
        let mem = self.mem.to_params();
        let output = self.output.clone().unwrap_or_else(|| {
            let mut name = self.file.as_os_str().to_os_string();
            name.push(".sorted");
            PathBuf::from(name)
        });

        info!("*** Generating random data");
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let gen_params =
            GenerateParams { mem: mem.clone(), size: self.size, output: self.file.clone() };
        exsort_lib::generate::<SortRecord, _>(&gen_params, || rng.random())?;

        info!("*** Phase 1: splitting and sorting");
        let timer = OperationTimer::new("Sorting");
        let split_params = SplitParams {
            mem: mem.clone(),
            input: self.file.clone(),
            output_prefix: self.file.clone(),
            rm_input: false,
        };
        let runs = exsort_lib::split::<SortRecord>(&split_params)?;

        info!("*** Phase 2: merging");
        let merge_params = MergeParams {
            mem: mem.clone(),
            tasks: self.merge.merge_tasks,
            kmerge: self.merge.merge_streams,
            stream_blocks: self.merge.stream_blocks,
            inputs: runs,
            output: output.clone(),
            rm_input: true,
        };
        exsort_lib::merge::<SortRecord>(&merge_params)?;
        let records = mem.unit.scale(self.size) / size_of::<SortRecord>();
        timer.log_completion(records as u64);

        info!("*** Checking the result");
        let check_params = CheckParams { mem, input: output.clone() };
        if !exsort_lib::check::<SortRecord>(&check_params)? {
            bail!("'{}' is not sorted", output.display());
        }
        Ok(())
    }
}
