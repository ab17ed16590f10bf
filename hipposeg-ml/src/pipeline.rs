//! End-to-end driver: load, split, train, test, report.

use crate::config::Config;
use crate::data::{DatasetLoader, HippocampusDataset};
use crate::error::MlError;
use crate::report::{ResultsReport, attach_config, write_results};
use crate::split::{Split, SplitSizes, build_split_seeded};
use crate::training::experiment::ExperimentRunner;
use std::path::PathBuf;
use tracing::info;

/// Per-invocation settings that are not part of the reported config.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Fixed seed for the split; entropy when unset.
    pub seed: Option<u64>,
    /// Skip training and test with parameters from this `model.json`.
    pub load_parameters: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub out_dir: PathBuf,
    pub results_path: PathBuf,
    pub results: ResultsReport,
}

/// Run one experiment and write `results.json` into the runner's output directory.
///
/// `make_runner` receives the dataset by value; nothing else keeps a handle to it.
pub fn run_pipeline<L, R, F>(
    config: &Config,
    loader: &L,
    options: &PipelineOptions,
    make_runner: F,
) -> Result<PipelineOutcome, MlError>
where
    L: DatasetLoader + ?Sized,
    R: ExperimentRunner,
    F: FnOnce(&Config, Split, HippocampusDataset) -> Result<R, MlError>,
{
    config.validate()?;

    info!(root_dir = %config.root_dir.display(), "Loading data");
    let dataset = loader.load(&config.root_dir, config.patch_size, config.patch_size)?;

    let n = dataset.len();
    let sizes = SplitSizes::for_population(n);
    let split = build_split_seeded(n, options.seed)?;
    info!(
        volumes = n,
        train = split.train.len(),
        val = split.val.len(),
        test = split.test.len(),
        nominal_test = sizes.nominal_test,
        "Split built"
    );

    let mut runner = make_runner(config, split, dataset)?;

    match &options.load_parameters {
        Some(path) => runner.load_model_parameters(path)?,
        None => runner.run()?,
    }

    let mut results = runner.run_test()?;
    attach_config(&mut results, config)?;

    let out_dir = runner.out_dir().to_path_buf();
    let results_path = write_results(&out_dir, &results)?;
    info!(path = %results_path.display(), "Results written");

    Ok(PipelineOutcome {
        out_dir,
        results_path,
        results,
    })
}
