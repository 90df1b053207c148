//! Quire CLI: process images, publish staged media and resolve documents.
//!
//! Configuration comes from the environment (see `QuireConfig::from_env`).

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use quire_cli::{
    build_pipeline, build_session, content_type_for, full_frame, init_tracing, load_environment,
    parse_rotation,
};
use quire_content::{resolve, Block, ContentDocument, UploadResultMap};
use quire_core::{
    AppError, CropRegion, ErrorMetadata, LogLevel, MediaKind, OutputFormat, QuireConfig, Rotation,
};
use quire_processing::{decode_source, MediaValidator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "quire", about = "Deferred media processing and publishing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop, rotate, watermark and compress one image
    Process {
        /// Source image
        input: PathBuf,
        /// Crop rectangle as x,y,width,height (defaults to the whole image)
        #[arg(long)]
        crop: Option<CropRegion>,
        /// Rotation in degrees, within [-180, 180]
        #[arg(long, default_value = "0", value_parser = parse_rotation, allow_hyphen_values = true)]
        rotation: Rotation,
        /// Output format: jpeg, png or webp (defaults to OUTPUT_FORMAT)
        #[arg(long)]
        format: Option<String>,
        /// Where to write the processed asset
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Stage files, upload them and print the resolved document
    Publish {
        /// Images or videos to stage, in document order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Crop applied to every image (defaults to each whole image)
        #[arg(long)]
        crop: Option<CropRegion>,
        #[arg(long, default_value = "0", value_parser = parse_rotation, allow_hyphen_values = true)]
        rotation: Rotation,
        /// Existing document to append the media blocks to
        #[arg(long)]
        document: Option<PathBuf>,
        /// Write the resolved document here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Fail when any reference stays unresolved
        #[arg(long)]
        strict: bool,
    },
    /// Rewrite pending references in a document from an upload result map
    Resolve {
        /// Document JSON
        #[arg(long)]
        document: PathBuf,
        /// Upload result map JSON
        #[arg(long)]
        results: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
    },
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_document(path: &Path) -> anyhow::Result<ContentDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ContentDocument::from_json(&raw)
        .with_context(|| format!("Invalid document {}", path.display()))
}

fn write_document(document: &ContentDocument, output: Option<&Path>) -> anyhow::Result<()> {
    let json = document.to_json().context("Serialize document")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

fn require_content_type(path: &Path) -> anyhow::Result<&'static str> {
    content_type_for(path)
        .with_context(|| format!("Unsupported file type: {}", path.display()))
}

/// Token cancelled on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

/// Print domain failures with their code and hint instead of a bare chain.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            match app.log_level() {
                LogLevel::Error => tracing::error!(code = app.error_code(), error = %app.detailed_message(), "Command failed"),
                LogLevel::Warn => tracing::warn!(code = app.error_code(), error = %app, "Command failed"),
                LogLevel::Debug => tracing::debug!(code = app.error_code(), error = %app, "Command failed"),
            }
            eprintln!("error[{}]: {}", app.error_code(), app.client_message());
            if let Some(hint) = app.suggested_action() {
                eprintln!("  hint: {}", hint);
            }
            if app.is_recoverable() {
                eprintln!("  this failure is recoverable; staged media was kept");
            }
        }
        None => eprintln!("error: {:#}", err),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(load_environment(None));

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Process {
            input,
            crop,
            rotation,
            format,
            output,
        } => {
            let config = QuireConfig::from_env().context("Invalid configuration")?;
            let mut options = config.processing_options();
            if let Some(format) = format {
                options.output_format = OutputFormat::parse(&format)?;
            }

            let data = read_file(&input)?;
            let content_type = require_content_type(&input)?;
            let kind = MediaValidator::new(config.max_input_bytes as usize)
                .validate(content_type, &data)
                .map_err(AppError::from)?;
            if kind != MediaKind::Image {
                anyhow::bail!("{} is not an image", input.display());
            }

            let source = decode_source(&data).map_err(AppError::from)?;
            let crop = crop.unwrap_or_else(|| CropRegion::full(source.width(), source.height()));
            let asset = build_pipeline(&config)?
                .process(&source, &crop, rotation, &options, &cancel_on_interrupt())
                .await
                .map_err(AppError::from)?;

            std::fs::write(&output, &asset.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "output": output.display().to_string(),
                    "contentType": asset.content_type(),
                    "width": asset.final_width,
                    "height": asset.final_height,
                    "originalByteSize": asset.original_byte_size,
                    "compressedByteSize": asset.compressed_byte_size,
                    "compressionRatio": asset.compression_ratio,
                    "budgetExceeded": asset.budget_exceeded,
                    "degraded": asset.degraded,
                }))?
            );
        }
        Commands::Publish {
            files,
            crop,
            rotation,
            document,
            output,
            strict,
        } => {
            let config = QuireConfig::from_env().context("Invalid configuration")?;
            let mut session = build_session(&config).await?;
            let cancel = cancel_on_interrupt();

            let mut doc = match document {
                Some(path) => read_document(&path)?,
                None => ContentDocument::default(),
            };

            for path in &files {
                let data = read_file(path)?;
                let content_type = require_content_type(path)?;
                let block = match MediaKind::from_content_type(content_type) {
                    Some(MediaKind::Image) => {
                        let crop = match crop {
                            Some(crop) => crop,
                            None => full_frame(&data)?,
                        };
                        let staged = session
                            .stage_image(&data, content_type, &crop, rotation, &cancel)
                            .await
                            .map_err(AppError::from)
                            .with_context(|| format!("Failed to stage {}", path.display()))?;
                        Block::pending_image(&staged.media)
                    }
                    _ => {
                        let staged = session
                            .stage_video(Bytes::from(data), content_type)
                            .map_err(AppError::from)
                            .with_context(|| format!("Failed to stage {}", path.display()))?;
                        Block::pending_video(&staged)
                    }
                };
                doc.blocks.push(block);
            }

            let report = session.save(&doc, &cancel).await.map_err(AppError::from)?;
            if strict {
                if let Some(first) = report.warnings.first() {
                    return Err(AppError::UnresolvedReference(first.pending_id.clone()).into());
                }
            }
            write_document(&report.document, output.as_deref())?;
        }
        Commands::Resolve {
            document,
            results,
            output,
            strict,
        } => {
            let doc = read_document(&document)?;
            let raw = std::fs::read_to_string(&results)
                .with_context(|| format!("Failed to read {}", results.display()))?;
            let map: UploadResultMap = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid result map {}", results.display()))?;

            let resolution = resolve(&doc, &map);
            let resolved = if strict {
                resolution.into_strict().map_err(AppError::from)?
            } else {
                resolution.document
            };
            write_document(&resolved, output.as_deref())?;
        }
    }

    Ok(())
}
