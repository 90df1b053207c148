//! Composition root for the `quire` binary: builds the pipeline, storage and
//! editing session from configuration.

use anyhow::Context;
use quire_content::{EditingSession, PendingMediaRegistry, UploadCoordinator};
use quire_core::{CropRegion, QuireConfig, Rotation};
use quire_processing::{
    AdaptiveCompressor, FontRasterizer, MediaPipeline, MediaValidator, WatermarkEngine,
    WatermarkStyle,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "quire=info";

/// Load `.env` (or `dotenv_file`) into the environment, then build the log
/// filter so a `RUST_LOG` set in the file is honoured.
pub fn load_environment(dotenv_file: Option<&Path>) -> EnvFilter {
    match dotenv_file {
        Some(path) => {
            dotenvy::from_path(path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing(filter: EnvFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// clap value parser for `--rotation`.
pub fn parse_rotation(s: &str) -> Result<Rotation, String> {
    let degrees: f32 = s
        .trim()
        .parse()
        .map_err(|_| format!("\"{}\" is not a number of degrees", s))?;
    Rotation::new(degrees).map_err(|e| e.to_string())
}

/// Guess a content type from the file extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(content_type)
}

/// Crop covering the whole image, read from the header only.
pub fn full_frame(data: &[u8]) -> anyhow::Result<CropRegion> {
    let (width, height) = image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .context("Failed to read image header")?
        .into_dimensions()
        .context("Failed to read image dimensions")?;
    Ok(CropRegion::full(width, height))
}

/// Pipeline with the watermark engine wired in when watermarking is enabled.
pub fn build_pipeline(config: &QuireConfig) -> anyhow::Result<MediaPipeline> {
    let style = WatermarkStyle::from_settings(&config.watermark)
        .context("Invalid watermark settings")?;

    let engine = if config.watermark.enabled {
        let font_path = config
            .watermark
            .font_path
            .as_deref()
            .context("WATERMARK_FONT_PATH must be set when WATERMARK_ENABLED=true")?;
        let rasterizer = FontRasterizer::from_file(font_path)?;
        tracing::debug!(font = %font_path.display(), "Watermark font loaded");
        Some(WatermarkEngine::new(Arc::new(rasterizer)))
    } else {
        None
    };

    Ok(MediaPipeline::new(
        AdaptiveCompressor::with_defaults(),
        engine,
        style,
    ))
}

pub async fn build_session(config: &QuireConfig) -> anyhow::Result<EditingSession> {
    let storage = quire_storage::create_storage(config)
        .await
        .context("Failed to initialize upload storage")?;
    let registry = PendingMediaRegistry::new(&config.preview_dir)?;

    tracing::info!(
        backend = %config.storage_backend(),
        folder = config.upload_folder(),
        preview_dir = %config.preview_dir.display(),
        "Editing session ready"
    );

    Ok(EditingSession::new(
        registry,
        build_pipeline(config)?,
        MediaValidator::new(config.max_input_bytes as usize),
        config.processing_options(),
        UploadCoordinator::new(storage, config.upload_folder()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_rotation_bounds() {
        assert_eq!(parse_rotation("-45").unwrap().degrees(), -45.0);
        assert_eq!(parse_rotation(" 180 ").unwrap().degrees(), 180.0);
        assert!(parse_rotation("181").unwrap_err().contains("outside [-180, 180]"));
        assert!(parse_rotation("NaN").is_err());
        assert!(parse_rotation("left").is_err());
    }

    #[test]
    fn test_content_type_for_extensions() {
        assert_eq!(content_type_for(&PathBuf::from("a/b.JPG")), Some("image/jpeg"));
        assert_eq!(content_type_for(&PathBuf::from("clip.mov")), Some("video/quicktime"));
        assert_eq!(content_type_for(&PathBuf::from("notes.txt")), None);
        assert_eq!(content_type_for(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn test_full_frame_reads_dimensions() {
        let img = image::RgbaImage::new(37, 21);
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();

        assert_eq!(full_frame(out.get_ref()).unwrap(), CropRegion::new(0, 0, 37, 21));
        assert!(full_frame(b"nope").is_err());
    }

    #[test]
    fn test_log_filter_comes_from_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv = dir.path().join(".env");
        std::fs::write(&dotenv, "RUST_LOG=quire_content=trace\n").unwrap();
        std::env::remove_var("RUST_LOG");

        let filter = load_environment(Some(&dotenv));
        std::env::remove_var("RUST_LOG");

        assert_eq!(filter.to_string(), "quire_content=trace");
    }
}
