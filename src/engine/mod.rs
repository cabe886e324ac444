// ABOUTME: The image engine: one façade over every image operation.
// ABOUTME: Parses references, drives the transport, and normalizes what it returns.

//! [`ImageEngine`] is what commands and other callers program against. It is
//! generic over the [`ImageTransport`] it drives, holds no per-call state and
//! can be shared between concurrent callers.
//!
//! Every operation takes a [`CancellationToken`]. Transport calls race the
//! token, and multi-step operations check it between steps; a fired token
//! ends the call with [`EngineError::Cancelled`] after local resources are
//! released.

mod error;
mod mode;
mod options;
mod project;
mod reports;
mod save;

pub use error::{EngineError, EngineErrorKind};
pub use mode::{EngineMode, connect};
pub use options::{
    DeleteOptions, ImportOptions, InspectOptions, ListOptions, LoadOptions, PruneOptions,
    SaveOptions,
};
pub use reports::{
    ChangeKind, DeleteReport, DiffChange, DiffReport, HistoryReport, ImageConfig,
    ImageHistoryLayer, ImageInspect, ImageSummary, ImportReport, InspectReport, LoadReport,
    PruneReport, PullReport, RootFs, SearchResult,
};

use crate::config::Config;
use crate::runtime::{
    ArchiveReader, BollardTransport, ImageTransport, ImportParams, ImportSource, PullOptions,
    PushOptions, RuntimeError, SearchOptions, TransportError,
};
use crate::types::{ImageId, ImageRef, reference};
use project::{project, project_all};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Image operations against one container service.
pub struct ImageEngine<T> {
    transport: T,
    mode: EngineMode,
    config: Arc<Config>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for ImageEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEngine")
            .field("mode", &self.mode)
            .field("transport", &self.transport)
            .finish()
    }
}

impl<T: ImageTransport> ImageEngine<T> {
    pub fn new(transport: T, mode: EngineMode, config: Arc<Config>) -> Self {
        Self {
            transport,
            mode,
            config,
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The configuration snapshot the engine was built with.
    ///
    /// Never touches the transport.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Whether the image is present. A missing image is `Ok(false)`, not an error.
    pub async fn exists(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        self.call("exists", cancel, self.transport.exists(image.as_str()))
            .await
    }

    pub async fn list(
        &self,
        options: &ListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageSummary>, EngineError> {
        let rows = self
            .call(
                "list",
                cancel,
                self.transport.list(options.all, &options.filters),
            )
            .await?;
        project_all("image summary", &rows)
    }

    /// Inspect each image in turn.
    ///
    /// Lookups the service rejects are collected per input; only a broken
    /// connection or cancellation fails the whole call.
    pub async fn inspect(
        &self,
        images: &[ImageRef],
        options: &InspectOptions,
        cancel: &CancellationToken,
    ) -> Result<InspectReport, EngineError> {
        let mut report = InspectReport::default();

        for image in images {
            let lookup = self
                .call(
                    "get_image",
                    cancel,
                    self.transport.get_image(image.as_str(), options.size),
                )
                .await;

            let inspected = lookup.and_then(|details| project("image", &details));
            match inspected {
                Ok(found) => report.images.push(Some(found)),
                Err(e) if is_per_image_failure(&e) => {
                    tracing::debug!(image = %image, "inspect failed: {}", e);
                    report.errors.insert(image.to_string(), e.to_string());
                    report.images.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Layers in the order the service reports them, newest first.
    pub async fn history(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> Result<HistoryReport, EngineError> {
        let records = self
            .call("history", cancel, self.transport.history(image.as_str()))
            .await?;
        Ok(HistoryReport {
            layers: project_all("history layer", &records)?,
        })
    }

    /// Pull an image; reports the names the service now holds for it.
    pub async fn pull(
        &self,
        image: &ImageRef,
        options: &PullOptions,
        cancel: &CancellationToken,
    ) -> Result<PullReport, EngineError> {
        let names = self
            .call("pull", cancel, self.transport.pull(image.as_str(), options))
            .await?;
        Ok(PullReport { names })
    }

    /// Push `source` to `destination`; an empty destination pushes `source` under its own name.
    pub async fn push(
        &self,
        source: &ImageRef,
        destination: &str,
        options: &PushOptions,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.call(
            "push",
            cancel,
            self.transport.push(source.as_str(), destination, options),
        )
        .await
    }

    /// Add each of `tags` to the image, in order, stopping at the first error.
    pub async fn tag(
        &self,
        image: &ImageRef,
        tags: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for raw in tags {
            let (repo, tag) = split_reference(raw)?;
            checkpoint(cancel)?;
            self.call(
                "tag",
                cancel,
                self.transport.tag(image.as_str(), &tag, &repo),
            )
            .await?;
        }
        Ok(())
    }

    /// Remove each of `tags` from the image, with the same rules as [`ImageEngine::tag`].
    pub async fn untag(
        &self,
        image: &ImageRef,
        tags: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for raw in tags {
            let (repo, tag) = split_reference(raw)?;
            checkpoint(cancel)?;
            self.call(
                "untag",
                cancel,
                self.transport.untag(image.as_str(), &tag, &repo),
            )
            .await?;
        }
        Ok(())
    }

    /// Load images from an archive on disk.
    pub async fn load(
        &self,
        options: &LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<LoadReport, EngineError> {
        let input = open_archive(&options.input).await?;
        let record = self
            .call(
                "load",
                cancel,
                self.transport.load(input, options.name.as_deref()),
            )
            .await?;
        project("load report", &record)
    }

    /// Create an image from a root filesystem tarball, local or remote.
    pub async fn import(
        &self,
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, EngineError> {
        let (repo, tag) = match options.reference.as_deref().filter(|r| !r.is_empty()) {
            Some(raw) => split_reference(raw)?,
            None => (String::new(), String::new()),
        };

        let params = ImportParams {
            changes: options.changes.clone(),
            message: options.message.clone(),
            repo,
            tag,
        };

        // The service fetches URLs itself; only local sources are opened here.
        let source = if options.source_is_url {
            ImportSource::Url(options.source.clone())
        } else {
            ImportSource::Archive(open_archive(std::path::Path::new(&options.source)).await?)
        };

        let record = self
            .call("import", cancel, self.transport.import(&params, source))
            .await?;
        project("import report", &record)
    }

    /// Write an image to `options.output` in the requested format.
    pub async fn save(
        &self,
        options: &SaveOptions,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let staging_dir = self
            .config
            .images
            .tmp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        tracing::debug!(image = %options.source, format = %options.format, "saving image");
        save::save(&self.transport, options, &staging_dir, cancel).await
    }

    /// Filesystem changes the image's top layer makes.
    pub async fn diff(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> Result<DiffReport, EngineError> {
        let records = self
            .call("diff", cancel, self.transport.diff(image.as_str()))
            .await?;

        let changes = records
            .into_iter()
            .map(|record| {
                let kind =
                    ChangeKind::from_code(record.kind).ok_or_else(|| EngineError::Projection {
                        what: "diff change",
                        reason: format!("unknown change kind {} for {}", record.kind, record.path),
                    })?;
                Ok(DiffChange {
                    path: record.path,
                    kind,
                })
            })
            .collect::<Result<_, EngineError>>()?;

        Ok(DiffReport { changes })
    }

    pub async fn prune(
        &self,
        options: &PruneOptions,
        cancel: &CancellationToken,
    ) -> Result<PruneReport, EngineError> {
        let record = self
            .call(
                "prune",
                cancel,
                self.transport.prune(options.all, &options.filters),
            )
            .await?;

        Ok(PruneReport {
            pruned_ids: record.pruned_ids().into_iter().map(ImageId::new).collect(),
            size: u64::try_from(record.space_reclaimed).unwrap_or_default(),
        })
    }

    /// Remove images in input order.
    ///
    /// The first failure aborts the call and nothing gathered so far is returned.
    pub async fn delete(
        &self,
        images: &[ImageRef],
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<DeleteReport, EngineError> {
        let mut report = DeleteReport::default();

        for image in images {
            checkpoint(cancel)?;
            let records = self
                .call(
                    "remove",
                    cancel,
                    self.transport.remove(image.as_str(), options.force),
                )
                .await?;

            for record in records {
                if let Some(id) = record.deleted {
                    report.deleted.push(ImageId::new(id));
                }
                if let Some(name) = record.untagged {
                    report.untagged.push(name);
                }
            }
        }

        Ok(report)
    }

    /// Search registries; without a limit the configured one applies.
    pub async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let mut options = options.clone();
        options.limit.get_or_insert(self.config.images.search_limit);

        let rows = self
            .call("search", cancel, self.transport.search(term, &options))
            .await?;
        project_all("search result", &rows)
    }

    /// Await one transport call unless `cancel` fires first.
    async fn call<F, R>(
        &self,
        op: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<R, EngineError>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        tracing::debug!(op, "transport call");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = call => result.map_err(EngineError::from),
        }
    }
}

impl ImageEngine<BollardTransport> {
    /// Release the transport: closes the SSH tunnel in tunneled mode.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        self.transport.close().await
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Failures that mean the service cannot be reached at all.
fn is_connection_failure(e: &TransportError) -> bool {
    matches!(e, TransportError::Connection(_) | TransportError::Io(_))
}

/// Inspect failures that belong to one input rather than to the whole call.
fn is_per_image_failure(e: &EngineError) -> bool {
    match e {
        EngineError::Transport(e) => !is_connection_failure(e),
        EngineError::Projection { .. } => true,
        _ => false,
    }
}

/// Split `repo[:tag]` for the service, which wants the parts separately.
fn split_reference(raw: &str) -> Result<(String, String), EngineError> {
    let parsed = reference::parse(raw).map_err(|source| EngineError::InvalidReference {
        input: raw.to_string(),
        source,
    })?;

    match parsed.repo() {
        Some(repo) if !repo.is_empty() => Ok((
            repo.to_string(),
            parsed.tag().unwrap_or_default().to_string(),
        )),
        _ => Err(EngineError::InvalidImageName(raw.to_string())),
    }
}

async fn open_archive(path: &std::path::Path) -> Result<ArchiveReader, EngineError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(EngineError::io(format!("failed to open {}", path.display())))?;
    Ok(Box::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_registry_reference() {
        assert_eq!(
            split_reference("quay.io/x/y:v2").unwrap(),
            ("quay.io/x/y".to_string(), "v2".to_string())
        );
    }

    #[test]
    fn missing_tag_is_empty() {
        assert_eq!(
            split_reference("localhost/z").unwrap(),
            ("localhost/z".to_string(), String::new())
        );
    }

    #[test]
    fn tag_without_name_is_invalid_image_name() {
        let err = split_reference(":badtag").unwrap_err();
        assert!(matches!(err, EngineError::InvalidImageName(ref raw) if raw == ":badtag"));
        assert!(err.to_string().contains("invalid image name"));
    }

    #[test]
    fn malformed_reference_is_invalid_reference() {
        let err = split_reference("Alpine:3.19").unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Validation);
        assert!(matches!(err, EngineError::InvalidReference { .. }));
    }
}
