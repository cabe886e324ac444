// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup, a recording fake transport, and archive helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use picha::config::Config;
use picha::engine::{EngineMode, ImageEngine};
use picha::runtime::wire::{
    ChangeRecord, DeleteRecord, HistoryRecord, ImageDetails, ImageRecord, NamesRecord,
    PruneRecord, SearchRecord,
};
use picha::runtime::{
    ArchiveFormat, ArchiveReader, Filters, ImageTransport, ImportParams, ImportSource,
    PullOptions, PushOptions, SearchOptions, TransportError,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("picha=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A transport request as the fake saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    List { all: bool, filters: Filters },
    GetImage { name: String, with_size: bool },
    History(String),
    Pull(String),
    Push { source: String, destination: String },
    Tag { name: String, tag: String, repo: String },
    Untag { name: String, tag: String, repo: String },
    Remove { name: String, force: bool },
    Prune { all: bool },
    Load { name: Option<String>, bytes: usize },
    Import { repo: String, tag: String, message: String, changes: Vec<String>, source: String },
    Export { name: String, format: ArchiveFormat, compress: bool },
    Diff(String),
    Search { term: String, limit: Option<u32> },
}

/// In-memory transport that records every call and answers from its fields.
#[derive(Default)]
pub struct FakeTransport {
    /// Every request so far, in order.
    pub calls: Mutex<Vec<Call>>,
    /// Images answered by `exists` and `get_image`; anything else is not found.
    pub images: HashMap<String, ImageDetails>,
    pub rows: Vec<ImageRecord>,
    pub history: Vec<HistoryRecord>,
    /// Per-name answers for `remove`; unknown names are not found.
    pub removals: HashMap<String, Vec<DeleteRecord>>,
    pub pruned: PruneRecord,
    pub changes: Vec<ChangeRecord>,
    pub search_rows: Vec<SearchRecord>,
    /// Bytes `export` writes.
    pub export_payload: Vec<u8>,
    /// `export` writes the payload, then fails.
    pub fail_export: bool,
    /// `export` never completes.
    pub hang_export: bool,
    /// `tag`/`untag` against this repository fail.
    pub reject_repo: Option<String>,
    /// Every call fails as if the service were unreachable.
    pub unreachable: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, name: &str, details: ImageDetails) -> Self {
        self.images.insert(name.to_string(), details);
        self
    }

    pub fn with_removal(mut self, name: &str, records: Vec<DeleteRecord>) -> Self {
        self.removals.insert(name.to_string(), records);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) -> Result<(), TransportError> {
        self.calls.lock().push(call);
        if self.unreachable {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageTransport for FakeTransport {
    async fn exists(&self, name_or_id: &str) -> Result<bool, TransportError> {
        self.record(Call::Exists(name_or_id.to_string()))?;
        Ok(self.images.contains_key(name_or_id))
    }

    async fn list(&self, all: bool, filters: &Filters) -> Result<Vec<ImageRecord>, TransportError> {
        self.record(Call::List {
            all,
            filters: filters.clone(),
        })?;
        Ok(self.rows.clone())
    }

    async fn get_image(
        &self,
        name_or_id: &str,
        with_size: bool,
    ) -> Result<ImageDetails, TransportError> {
        self.record(Call::GetImage {
            name: name_or_id.to_string(),
            with_size,
        })?;
        self.images
            .get(name_or_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(name_or_id.to_string()))
    }

    async fn history(&self, name_or_id: &str) -> Result<Vec<HistoryRecord>, TransportError> {
        self.record(Call::History(name_or_id.to_string()))?;
        Ok(self.history.clone())
    }

    async fn pull(
        &self,
        reference: &str,
        _options: &PullOptions,
    ) -> Result<Vec<String>, TransportError> {
        self.record(Call::Pull(reference.to_string()))?;
        Ok(vec![format!("docker.io/library/{reference}")])
    }

    async fn push(
        &self,
        source: &str,
        destination: &str,
        _options: &PushOptions,
    ) -> Result<(), TransportError> {
        self.record(Call::Push {
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }

    async fn tag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError> {
        self.record(Call::Tag {
            name: name_or_id.to_string(),
            tag: tag.to_string(),
            repo: repo.to_string(),
        })?;
        self.check_repo(repo)
    }

    async fn untag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError> {
        self.record(Call::Untag {
            name: name_or_id.to_string(),
            tag: tag.to_string(),
            repo: repo.to_string(),
        })?;
        self.check_repo(repo)
    }

    async fn remove(
        &self,
        name_or_id: &str,
        force: bool,
    ) -> Result<Vec<DeleteRecord>, TransportError> {
        self.record(Call::Remove {
            name: name_or_id.to_string(),
            force,
        })?;
        self.removals
            .get(name_or_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(name_or_id.to_string()))
    }

    async fn prune(&self, all: bool, _filters: &Filters) -> Result<PruneRecord, TransportError> {
        self.record(Call::Prune { all })?;
        Ok(self.pruned.clone())
    }

    async fn load(
        &self,
        mut input: ArchiveReader,
        name: Option<&str>,
    ) -> Result<NamesRecord, TransportError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes).await?;
        self.record(Call::Load {
            name: name.map(str::to_string),
            bytes: bytes.len(),
        })?;

        let mut names = vec!["localhost/loaded:latest".to_string()];
        names.extend(name.map(str::to_string));
        Ok(NamesRecord { id: None, names })
    }

    async fn import(
        &self,
        params: &ImportParams,
        source: ImportSource,
    ) -> Result<NamesRecord, TransportError> {
        let source = match source {
            ImportSource::Url(url) => url,
            ImportSource::Archive(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await?;
                format!("<archive {} bytes>", bytes.len())
            }
        };
        self.record(Call::Import {
            repo: params.repo.clone(),
            tag: params.tag.clone(),
            message: params.message.clone(),
            changes: params.changes.clone(),
            source,
        })?;

        Ok(NamesRecord {
            id: Some("sha256:1mp0r7".to_string()),
            names: vec![format!("{}:{}", params.repo, params.tag)],
        })
    }

    async fn export(
        &self,
        name_or_id: &str,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        format: ArchiveFormat,
        compress: bool,
    ) -> Result<(), TransportError> {
        self.record(Call::Export {
            name: name_or_id.to_string(),
            format,
            compress,
        })?;

        if self.hang_export {
            std::future::pending::<()>().await;
        }

        output.write_all(&self.export_payload).await?;
        if self.fail_export {
            return Err(TransportError::Api {
                status: 500,
                message: "export interrupted".to_string(),
            });
        }
        Ok(())
    }

    async fn diff(&self, name_or_id: &str) -> Result<Vec<ChangeRecord>, TransportError> {
        self.record(Call::Diff(name_or_id.to_string()))?;
        Ok(self.changes.clone())
    }

    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchRecord>, TransportError> {
        self.record(Call::Search {
            term: term.to_string(),
            limit: options.limit,
        })?;
        Ok(self.search_rows.clone())
    }
}

impl FakeTransport {
    fn check_repo(&self, repo: &str) -> Result<(), TransportError> {
        match &self.reject_repo {
            Some(rejected) if rejected == repo => Err(TransportError::Api {
                status: 500,
                message: format!("cannot tag into {repo}"),
            }),
            _ => Ok(()),
        }
    }
}

/// An engine over `fake` with default configuration.
pub fn engine(fake: FakeTransport) -> ImageEngine<FakeTransport> {
    ImageEngine::new(fake, EngineMode::Local, Arc::new(Config::default()))
}

/// An engine whose directory saves stage in `tmp_dir`.
pub fn engine_staging_in(fake: FakeTransport, tmp_dir: &Path) -> ImageEngine<FakeTransport> {
    let mut config = Config::default();
    config.images.tmp_dir = Some(tmp_dir.to_path_buf());
    ImageEngine::new(fake, EngineMode::Local, Arc::new(config))
}

/// A tar archive holding `files`.
pub fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Image details with just an ID and names.
pub fn details(id: &str, names: &[&str]) -> ImageDetails {
    ImageDetails {
        id: id.to_string(),
        names: names.iter().map(|n| n.to_string()).collect(),
        ..Default::default()
    }
}

/// Entries of `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
