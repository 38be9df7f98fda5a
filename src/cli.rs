// Command-line interface for the proform binary

use crate::core::config::Config;
use crate::models::analysis::AnalysisResponse;
use crate::models::features::Label;
use crate::AppState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Exercise form analysis from pose landmarks
#[derive(Parser, Debug)]
#[command(name = "proform")]
#[command(author, version, about = "Compare exercise videos against a reference and score form")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: ~/.proform_data/config/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "proform_lib=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare a user video against a reference video
    Compare {
        /// User video: keypoint track (.json) or directory of frames
        #[arg(long)]
        user: PathBuf,

        /// Reference video: keypoint track (.json) or directory of frames
        #[arg(long)]
        reference: PathBuf,

        /// Write annotated frames under this directory
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
    },

    /// Train the form classifier from labeled video directories
    Train {
        /// One per class, e.g. --class 1=videos/good --class 0=videos/bad
        #[arg(
            long = "class",
            value_name = "LABEL=DIR",
            value_parser = parse_class_arg,
            required = true
        )]
        classes: Vec<(Label, PathBuf)>,

        /// Write the trained model here instead of the models directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score a video with a trained classifier
    Predict {
        #[arg(long)]
        video: PathBuf,

        /// Model file (default: the last model saved by `train`)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Write annotated frames, with a score bar, under this directory
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
    },

    /// Show, set or reset the configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Inspect or clear the stored models
    #[command(subcommand)]
    Models(ModelsCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the active configuration
    Show,
    /// Validate and save a configuration read from a JSON file
    Set {
        #[arg(long)]
        file: PathBuf,
    },
    /// Restore and save the default configuration
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List stored models and their total size
    List,
    /// Delete every stored model
    Clear,
}

/// Parse `LABEL=DIR`
pub fn parse_class_arg(arg: &str) -> Result<(Label, PathBuf), String> {
    let (label, dir) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=DIR, got '{}'", arg))?;
    let label: Label = label
        .trim()
        .parse()
        .map_err(|e| format!("invalid label '{}': {}", label, e))?;
    if dir.is_empty() {
        return Err(format!("missing directory for label {}", label));
    }
    Ok((label, PathBuf::from(dir)))
}

/// Run a parsed command; returns `false` when an analysis failed
pub async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let state = AppState::initialize(cli.config)?;

    let response = match cli.command {
        Commands::Compare {
            user,
            reference,
            annotate_dir,
        } => crate::compare_videos(&state, user, reference, annotate_dir).await,

        Commands::Train { classes, output } => {
            crate::train_classifier(&state, classes, output).await
        }

        Commands::Predict {
            video,
            model,
            annotate_dir,
        } => {
            // A missing default model is reported by the classification itself
            match crate::load_model(&state, model.as_deref()) {
                Ok(model_id) => info!("Loaded model {}", model_id),
                Err(e) if model.is_some() => return Err(e.into()),
                Err(e) => info!("No stored model available: {}", e),
            }
            crate::classify_video(&state, video, annotate_dir).await
        }

        Commands::Config(ConfigCommand::Show) => {
            print_json(&crate::get_config(&state))?;
            return Ok(true);
        }

        Commands::Config(ConfigCommand::Set { file }) => {
            let config: Config = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            crate::update_config(config.clone(), &state).map_err(anyhow::Error::msg)?;
            print_json(&config)?;
            return Ok(true);
        }

        Commands::Config(ConfigCommand::Reset) => {
            let config: Config = crate::reset_config(&state).map_err(anyhow::Error::msg)?;
            print_json(&config)?;
            return Ok(true);
        }

        Commands::Models(ModelsCommand::List) => {
            print_json(&crate::list_stored_models(&state)?)?;
            return Ok(true);
        }

        Commands::Models(ModelsCommand::Clear) => {
            print_json(&crate::clear_stored_models(&state)?)?;
            return Ok(true);
        }
    };

    print_json::<AnalysisResponse>(&response)?;
    Ok(response.is_success())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
