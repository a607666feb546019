//! Generate a file of random records.

use anyhow::Result;
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use exsort_lib::sort::GenerateParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::MemoryOptions;
use crate::commands::SortRecord;

/// Generate a file of random fixed-width records.
#[derive(Debug, Parser)]
#[command(name = "generate", about = "Generate a file of random records")]
pub struct Generate {
    /// Output file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Amount of data to generate, in units of --mem-unit
    #[arg(short = 's', long = "size")]
    pub size: usize,

    /// Seed for reproducible output
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,
}

impl Command for Generate {
    fn execute(&self) -> Result<()> {
        let params = GenerateParams {
            mem: self.mem.to_params(),
            size: self.size,
            output: self.output.clone(),
        };

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let timer = OperationTimer::new("Generating random data");
        exsort_lib::generate::<SortRecord, _>(&params, || rng.random())?;

        let records = params.mem.unit.scale(self.size) / size_of::<SortRecord>();
        timer.log_completion(records as u64);
        Ok(())
    }
}
