// ABOUTME: Save pipeline: export an image to a file, or unpack it into a directory.
// ABOUTME: Directory formats stage the archive in a temp file removed on every path.

use super::error::EngineError;
use super::options::SaveOptions;
use crate::runtime::{ImageTransport, TransportError};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const STAGING_PREFIX: &str = "picha-save-";

/// Where the exported archive is written first.
enum Target {
    /// The user's output file.
    Archive(PathBuf),
    /// A temp file unpacked into the output directory afterwards.
    Staged(TempPath),
}

pub(crate) async fn save<T>(
    transport: &T,
    options: &SaveOptions,
    staging_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), EngineError>
where
    T: ImageTransport + ?Sized,
{
    let (mut file, target) = open_target(options, staging_dir).await?;

    let exported = race(
        cancel,
        transport.export(
            options.source.as_str(),
            &mut file,
            options.format,
            options.compress,
        ),
    )
    .await;
    let closed = close(file).await;
    settle(&target, exported, closed).await?;

    let Target::Staged(archive) = target else {
        tracing::debug!(output = %options.output.display(), "saved image archive");
        return Ok(());
    };

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    prepare_directory(&options.output).await?;
    let unpacked = unpack(archive.to_path_buf(), options.output.clone()).await;

    if let Err(e) = archive.close() {
        tracing::warn!("failed to remove staging archive: {}", e);
    }
    unpacked?;

    tracing::debug!(output = %options.output.display(), format = %options.format, "unpacked image directory");
    Ok(())
}

async fn open_target(
    options: &SaveOptions,
    staging_dir: &Path,
) -> Result<(File, Target), EngineError> {
    if !options.format.is_directory() {
        let file = File::create(&options.output)
            .await
            .map_err(EngineError::io(format!(
                "failed to create {}",
                options.output.display()
            )))?;
        return Ok((file, Target::Archive(options.output.clone())));
    }

    let staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tar")
        .tempfile_in(staging_dir)
        .map_err(EngineError::io(format!(
            "failed to create staging archive in {}",
            staging_dir.display()
        )))?;
    let (file, path) = staged.into_parts();
    tracing::debug!(staging = %path.display(), "staging directory export");

    Ok((File::from_std(file), Target::Staged(path)))
}

/// Run a transport call unless `cancel` fires first.
async fn race<F>(cancel: &CancellationToken, call: F) -> Result<(), EngineError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = call => result.map_err(EngineError::from),
    }
}

async fn close(mut file: File) -> Result<(), EngineError> {
    file.shutdown()
        .await
        .map_err(EngineError::io("failed to close exported archive"))
}

/// Keep an exported archive only when both the export and the close succeeded.
///
/// A staged archive needs no handling here; its `TempPath` removes it on drop.
async fn settle(
    target: &Target,
    exported: Result<(), EngineError>,
    closed: Result<(), EngineError>,
) -> Result<(), EngineError> {
    let written = exported.and(closed);
    if written.is_err() {
        if let Target::Archive(path) = target {
            discard_partial(path).await;
        }
    }
    written
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove partial archive: {}", e),
    }
}

/// Make sure `output` can receive the unpacked archive.
///
/// A directory is reused as is; a missing path becomes a new 0755 directory.
async fn prepare_directory(output: &Path) -> Result<(), EngineError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() => Err(EngineError::AlreadyExistsAsFile(output.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.mode(0o755);
            builder
                .create(output)
                .await
                .map_err(EngineError::io(format!("failed to create {}", output.display())))
        }
        Err(e) => Err(EngineError::Io {
            context: format!("failed to stat {}", output.display()),
            source: e,
        }),
    }
}

async fn unpack(archive: PathBuf, output: PathBuf) -> Result<(), EngineError> {
    let context = format!("failed to unpack into {}", output.display());
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive)?;
        tar::Archive::new(file).unpack(&output)
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|unpacked| unpacked)
    .map_err(EngineError::io(context))
}
