//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::RunArgs;
use anyhow::Context;
use hipposeg_ml::NiftiLoader;
use hipposeg_ml::config::{ConfigOverrides, load_config, write_default_config};
use hipposeg_ml::pipeline::{PipelineOptions, PipelineOutcome, run_pipeline};
use hipposeg_ml::split::{SplitSizes, build_split_seeded};
use hipposeg_ml::training::{ExperimentOptions, SegmentationExperiment};
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, config_file: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => {
            let outcome = handle_run(args, config_file)?;
            println!("Results written to {}", outcome.results_path.display());
            if let Some(dice) = outcome.results["overall"]["mean_dice"].as_f64() {
                println!("Mean Dice: {dice:.4}");
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, config_file),
        Commands::Split { count, seed } => {
            println!("{}", split_json(count, seed)?);
            Ok(())
        }
    }
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            name: self.name.clone(),
            root_dir: self.root_dir.clone(),
            n_epochs: self.n_epochs,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            patch_size: self.patch_size,
            test_results_dir: self.test_results_dir.clone(),
        }
    }
}

fn handle_run(args: RunArgs, config_file: Option<&Path>) -> anyhow::Result<PipelineOutcome> {
    let config =
        load_config(config_file, &args.overrides()).context("Failed to load configuration")?;
    tracing::debug!(?config, "Effective configuration");

    let experiment_options = ExperimentOptions {
        seed: args.seed,
        early_stopping_patience: args.early_stopping_patience,
        checkpoint_every: args.checkpoint_every,
        ..Default::default()
    };
    let options = PipelineOptions {
        seed: args.seed,
        load_parameters: args.load_parameters,
    };

    let outcome = run_pipeline(&config, &NiftiLoader, &options, |config, split, dataset| {
        SegmentationExperiment::new(config, split, dataset, experiment_options)
    })
    .with_context(|| format!("Experiment '{}' failed", config.name))?;
    Ok(outcome)
}

fn handle_config(action: ConfigAction, config_file: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { path } => {
            write_default_config(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(config_file, &ConfigOverrides::default())
                .context("Failed to load configuration")?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn split_json(count: usize, seed: Option<u64>) -> anyhow::Result<String> {
    let split = build_split_seeded(count, seed)?;
    let sizes = SplitSizes::for_population(count);
    let value = serde_json::json!({
        "sizes": sizes,
        "split": split,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hipposeg.toml");

        let command = Commands::Config {
            action: ConfigAction::Init { path: path.clone() },
        };
        handle_command(command, None).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: hipposeg_ml::Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed, hipposeg_ml::Config::default());
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hipposeg.toml");
        std::fs::write(&path, "name = \"mine\"\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init { path: path.clone() },
        };
        assert!(handle_command(command, None).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name = \"mine\"\n");
    }

    #[test]
    fn test_config_show_missing_file() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        let result = handle_command(command, Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_split_json() {
        let text = split_json(7, Some(3)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["split"]["train"].as_array().unwrap().len(), 5);
        assert_eq!(value["split"]["val"].as_array().unwrap().len(), 1);
        assert_eq!(value["split"]["test"].as_array().unwrap().len(), 1);
        assert_eq!(text, split_json(7, Some(3)).unwrap());
    }

    #[test]
    fn test_run_overrides_map_every_field() {
        let args = RunArgs {
            name: Some("quick".into()),
            n_epochs: Some(2),
            patch_size: Some(32),
            ..Default::default()
        };
        let overrides = args.overrides();
        assert_eq!(overrides.name.as_deref(), Some("quick"));
        assert_eq!(overrides.n_epochs, Some(2));
        assert_eq!(overrides.patch_size, Some(32));
        assert_eq!(overrides.batch_size, None);
    }

    #[test]
    fn test_run_with_missing_dataset_fails() {
        Jail::expect_with(|jail| {
            let args = RunArgs {
                root_dir: Some(jail.directory().join("no_data")),
                test_results_dir: Some(jail.directory().join("out")),
                ..Default::default()
            };
            let err = handle_run(args, None).unwrap_err();
            assert!(err.to_string().contains("failed"));
            assert!(!jail.directory().join("out").exists());
            Ok(())
        });
    }

    #[test]
    fn test_run_reads_config_file_in_jail() {
        Jail::expect_with(|jail| {
            jail.create_file("hipposeg.toml", "name = \"from_file\"\n")?;
            let err = handle_run(
                RunArgs {
                    root_dir: Some(jail.directory().join("no_data")),
                    ..Default::default()
                },
                None,
            )
            .unwrap_err();
            assert!(err.to_string().contains("'from_file'"));
            Ok(())
        });
    }
}
