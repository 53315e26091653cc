//! drug-capture command line
//!
//! Runs the capture check or full recognition on an image file and prints
//! the result as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use drug_capture::ocr::{BaiduOcr, DrugExtractor, DrugRecord, OcrEngine, StaticOcr, condition_image};
use drug_capture::validation::{ValidationResult, validate};
use drug_capture::{AppConfig, analyze_capture, logging, paths, recognize};

#[derive(Parser)]
#[command(name = "drug-capture")]
#[command(about = "Medicine package photo check and label recognition")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check lighting, sharpness and visible drug text before recognizing
    Analyze {
        image: PathBuf,
        /// Use OCR blocks from a JSON file instead of the OCR service
        #[arg(long)]
        blocks: Option<PathBuf>,
    },
    /// Full recognition: preprocess, OCR, extract, validate, guide
    Recognize {
        image: PathBuf,
        /// Use OCR blocks from a JSON file instead of the OCR service
        #[arg(long)]
        blocks: Option<PathBuf>,
    },
    /// Write the OCR-ready version of an image
    Preprocess {
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract and validate a drug record from saved OCR blocks
    Extract {
        #[arg(long)]
        blocks: PathBuf,
    },
    /// Write a config file with every default filled in
    InitConfig {
        /// Destination (defaults to the user config directory)
        path: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ExtractOutput {
    drug_record: DrugRecord,
    validation: ValidationResult,
}

fn ocr_engine(blocks: Option<&Path>, config: &AppConfig) -> Result<Box<dyn OcrEngine>> {
    match blocks {
        Some(path) => Ok(Box::new(
            StaticOcr::from_json_file(path)
                .with_context(|| format!("Failed to load OCR blocks from {}", path.display()))?,
        )),
        None => Ok(Box::new(BaiduOcr::new(config.ocr.clone())?)),
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.log_level.as_deref().unwrap_or("info"));
    logging::install_panic_hook();

    let config_path = cli.config.clone().unwrap_or_else(paths::get_default_config_path);
    let config = AppConfig::load(&config_path);
    if cli.log_level.is_none() {
        logging::set_level(&config.log_level);
    }
    log::debug!("Using config {}", config_path.display());

    match cli.command {
        Commands::Analyze { image, blocks } => {
            let bytes = read_image(&image)?;
            let engine = ocr_engine(blocks.as_deref(), &config)?;
            let analysis = analyze_capture(&bytes, engine.as_ref(), &config)?;
            print_json(&analysis)?;
        }
        Commands::Recognize { image, blocks } => {
            let bytes = read_image(&image)?;
            let engine = ocr_engine(blocks.as_deref(), &config)?;
            let report = recognize(&bytes, engine.as_ref(), &config)?;
            print_json(&report)?;
        }
        Commands::Preprocess { image, output } => {
            let bytes = read_image(&image)?;
            let png = condition_image(&bytes, &config.preprocess)?;
            fs::write(&output, png)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            log::info!("Preprocessed image saved to {}", output.display());
        }
        Commands::Extract { blocks } => {
            let engine = StaticOcr::from_json_file(&blocks)?;
            let blocks = engine.recognize(&[])?;
            let drug_record = DrugExtractor::new(&config.vocabulary).extract(&blocks);
            if drug_record.is_failed() {
                log::warn!("No drug fields extracted from {} blocks", blocks.len());
            }
            let validation = validate(&drug_record, &config.required_fields);
            print_json(&ExtractOutput {
                drug_record,
                validation,
            })?;
        }
        Commands::InitConfig { path } => {
            let path = path.unwrap_or(config_path);
            AppConfig::save_default(&path)?;
            log::info!("Default config written to {}", path.display());
        }
    }

    Ok(())
}
