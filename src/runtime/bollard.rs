// ABOUTME: ImageTransport backed by bollard plus raw libpod/compat endpoints.
// ABOUTME: Talks to Docker or Podman over a local socket or an SSH-forwarded one.

use super::api::{ApiClient, Query};
use super::error::{RuntimeError, TunnelSnafu};
use super::transport::{
    ArchiveFormat, ArchiveReader, Filters, ImageTransport, ImportParams, ImportSource,
    PullOptions, PushOptions, RegistryAuth, SearchOptions, TransportError,
};
use super::types::{RuntimeInfo, RuntimeType};
use super::wire::{
    ChangeRecord, DeleteRecord, HistoryRecord, ImageDetails, ImageRecord, NamesRecord,
    PruneRecord, SearchRecord,
};
use crate::ssh::Session;
use crate::types::reference;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    CreateImageOptions, ListImagesOptions, PruneImagesOptions, PushImageOptions,
    RemoveImageOptions, TagImageOptions,
};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tokio::io::AsyncWrite;

/// Seconds bollard waits on a single API call.
const CLIENT_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_error(e: bollard::errors::Error) -> TransportError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => TransportError::Api {
            status: status_code,
            message,
        },
        other => TransportError::Connection(other.to_string()),
    }
}

fn map_not_found_error(e: bollard::errors::Error, name: &str) -> TransportError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => TransportError::NotFound(name.to_string()),
        _ => map_error(e),
    }
}

/// Re-read a bollard model as one of our wire records.
///
/// Bollard models serialize under the daemon's field names, which is exactly
/// what the wire records deserialize from.
fn from_model<M: Serialize, W: DeserializeOwned>(model: &M) -> Result<W, TransportError> {
    serde_json::to_value(model)
        .and_then(serde_json::from_value)
        .map_err(|e| TransportError::Decode(e.to_string()))
}

fn docker_credentials(auth: Option<&RegistryAuth>) -> Option<bollard::auth::DockerCredentials> {
    auth.map(|a| bollard::auth::DockerCredentials {
        username: Some(a.username.clone()),
        password: Some(a.password.clone()),
        serveraddress: a.server.clone(),
        ..Default::default()
    })
}

/// Split `name[:tag]` into `(repo, tag)`, defaulting the tag to `latest`.
fn repo_and_tag(name: &str) -> (String, String) {
    match reference::parse(name) {
        Ok(parsed) if parsed.repo().is_some() => {
            let (repo, tag) = parsed.split();
            let tag = if tag.is_empty() { "latest".to_string() } else { tag };
            (repo, tag)
        }
        _ => (name.to_string(), "latest".to_string()),
    }
}

/// Drop the default registry prefixes the daemon leaves out of `RepoTags`.
fn familiar_name(name: &str) -> &str {
    ["docker.io/library/", "index.docker.io/library/", "docker.io/", "index.docker.io/"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// Refuse a Docker untag that would touch another image or delete this one.
fn check_docker_untag(names: &[String], name: &str, image: &str) -> Result<(), TransportError> {
    let wanted = familiar_name(name);
    if !names.iter().any(|held| familiar_name(held) == wanted) {
        return Err(TransportError::NotFound(format!("{name} on image {image}")));
    }
    if names.len() < 2 {
        return Err(TransportError::Unsupported {
            operation: "untag of last name",
            runtime: RuntimeType::Docker.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// BollardTransport
// =============================================================================

/// Image transport speaking the Docker-compatible API, with libpod extras on Podman.
pub struct BollardTransport {
    client: Docker,
    api: ApiClient,
    runtime_type: RuntimeType,
    /// Keeps the SSH session (and its forwarded socket) alive in tunneled mode.
    tunnel: Option<Session>,
}

impl std::fmt::Debug for BollardTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BollardTransport")
            .field("runtime_type", &self.runtime_type)
            .field("socket", &self.api.socket_path())
            .field("tunneled", &self.tunnel.is_some())
            .finish()
    }
}

impl BollardTransport {
    /// Connect to a runtime socket reachable from this machine.
    pub fn connect(info: &RuntimeInfo) -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_unix(
            &info.socket_path,
            CLIENT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| RuntimeError::Connection {
            message: format!("{}: {}", info.socket_path, e),
        })?;

        Ok(Self {
            client,
            api: ApiClient::new(info.socket_path.clone()),
            runtime_type: info.runtime_type,
            tunnel: None,
        })
    }

    /// Forward the remote runtime socket through `session` and connect to it.
    ///
    /// The transport takes ownership of the session; [`BollardTransport::close`]
    /// tears the tunnel down.
    pub async fn connect_via_session(
        session: Session,
        remote: &RuntimeInfo,
    ) -> Result<Self, RuntimeError> {
        let local_socket = session
            .forward_socket(&remote.socket_path)
            .await
            .context(TunnelSnafu {
                host: session.host().to_string(),
            })?;

        tracing::debug!(
            remote = %remote.socket_path,
            local = %local_socket,
            "forwarded runtime socket"
        );

        let mut transport = Self::connect(&RuntimeInfo {
            runtime_type: remote.runtime_type,
            socket_path: local_socket,
        })?;
        transport.tunnel = Some(session);
        Ok(transport)
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    /// Check that the runtime answers.
    pub async fn ping(&self) -> Result<(), TransportError> {
        self.client.ping().await.map(|_| ()).map_err(map_error)
    }

    /// Release the transport, disconnecting the SSH tunnel if there is one.
    pub async fn close(self) -> Result<(), RuntimeError> {
        if let Some(session) = self.tunnel {
            let host = session.host().to_string();
            session.disconnect().await.context(TunnelSnafu { host })?;
        }
        Ok(())
    }

    async fn push_name(
        &self,
        repo: &str,
        tag: &str,
        source: &str,
        options: &PushOptions,
    ) -> Result<(), TransportError> {
        let opts = PushImageOptions {
            tag: Some(tag.to_string()),
            ..Default::default()
        };

        let credentials = docker_credentials(options.credentials.as_ref());
        let mut stream = self.client.push_image(repo, Some(opts), credentials);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| map_not_found_error(e, source))?;
            tracing::trace!(?info, "push progress");
        }
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> TransportError {
        TransportError::Unsupported {
            operation,
            runtime: self.runtime_type.to_string(),
        }
    }

    /// Names the daemon now holds for `reference` (or every tag of its repository).
    async fn resolve_names(&self, reference: &str, all_tags: bool) -> Result<Vec<String>, TransportError> {
        if all_tags {
            let mut filters = Filters::new();
            filters.insert("reference".to_string(), vec![reference.to_string()]);
            let rows = self.list(false, &filters).await?;
            return Ok(rows.into_iter().flat_map(|row| row.names).collect());
        }

        let details = self.get_image(reference, false).await?;
        if details.names.is_empty() {
            Ok(vec![reference.to_string()])
        } else {
            Ok(details.names)
        }
    }

    /// Pull with Podman's native API, which can skip TLS verification.
    async fn pull_libpod(
        &self,
        reference: &str,
        options: &PullOptions,
    ) -> Result<Vec<String>, TransportError> {
        let query = Query::new()
            .push("reference", reference)
            .push("tlsVerify", options.tls_verify.unwrap_or(true).to_string())
            .push("allTags", options.all_tags.to_string())
            .push_if(options.quiet, "quiet", "true");

        self.api
            .post_progress(&self.api.libpod("/images/pull", query))
            .await?;

        let repo = reference::parse(reference)
            .ok()
            .and_then(|p| p.repo().map(str::to_string))
            .unwrap_or_else(|| reference.to_string());
        let target = if options.all_tags { repo.as_str() } else { reference };
        self.resolve_names(target, options.all_tags).await
    }
}

#[async_trait]
impl ImageTransport for BollardTransport {
    async fn exists(&self, name_or_id: &str) -> Result<bool, TransportError> {
        match self.client.inspect_image(name_or_id).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(map_error(e)),
        }
    }

    async fn list(&self, all: bool, filters: &Filters) -> Result<Vec<ImageRecord>, TransportError> {
        let opts = ListImagesOptions {
            all,
            filters: Some(filters.clone()),
            ..Default::default()
        };

        let rows = self
            .client
            .list_images(Some(opts))
            .await
            .map_err(map_error)?;

        rows.iter().map(from_model).collect()
    }

    async fn get_image(
        &self,
        name_or_id: &str,
        with_size: bool,
    ) -> Result<ImageDetails, TransportError> {
        let inspect = self
            .client
            .inspect_image(name_or_id)
            .await
            .map_err(|e| map_not_found_error(e, name_or_id))?;

        let mut details: ImageDetails = from_model(&inspect)?;
        if !with_size {
            details.size = None;
            details.virtual_size = None;
        }
        Ok(details)
    }

    async fn history(&self, name_or_id: &str) -> Result<Vec<HistoryRecord>, TransportError> {
        let layers = self
            .client
            .image_history(name_or_id)
            .await
            .map_err(|e| map_not_found_error(e, name_or_id))?;

        layers.iter().map(from_model).collect()
    }

    async fn pull(
        &self,
        reference: &str,
        options: &PullOptions,
    ) -> Result<Vec<String>, TransportError> {
        if self.runtime_type == RuntimeType::Podman && options.tls_verify == Some(false) {
            return self.pull_libpod(reference, options).await;
        }

        let parsed = reference::parse(reference).ok();
        // An empty tag makes the daemon pull every tag, so name one unless asked not to.
        let (from_image, tag) = match &parsed {
            Some(p) if options.all_tags => (p.repo().unwrap_or(reference).to_string(), None),
            Some(p) if p.tag().is_none() && p.digest().is_none() => {
                (reference.to_string(), Some("latest".to_string()))
            }
            _ => (reference.to_string(), None),
        };

        let opts = CreateImageOptions {
            from_image: Some(from_image.clone()),
            tag: tag.clone(),
            ..Default::default()
        };

        let credentials = docker_credentials(options.credentials.as_ref());
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| map_not_found_error(e, reference))?;
            if !options.quiet {
                tracing::trace!(?info, "pull progress");
            }
        }

        let pulled = match tag {
            Some(tag) => format!("{from_image}:{tag}"),
            None => from_image,
        };
        self.resolve_names(&pulled, options.all_tags).await
    }

    async fn push(
        &self,
        source: &str,
        destination: &str,
        options: &PushOptions,
    ) -> Result<(), TransportError> {
        let destination = if destination.is_empty() { source } else { destination };
        let (repo, tag) = repo_and_tag(destination);

        // The daemon pushes local names only, so give the image its destination
        // name first and take it away again afterwards if it was new.
        let retag = destination != source;
        let added = retag && !self.exists(destination).await?;
        if retag {
            self.tag(source, &tag, &repo).await?;
        }

        let pushed = self.push_name(&repo, &tag, source, options).await;

        if added {
            if let Err(e) = self.untag(source, &tag, &repo).await {
                tracing::debug!(destination, "kept push name: {}", e);
            }
        }
        pushed
    }

    async fn tag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError> {
        let opts = TagImageOptions {
            repo: Some(repo.to_string()),
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            ..Default::default()
        };

        self.client
            .tag_image(name_or_id, Some(opts))
            .await
            .map_err(|e| map_not_found_error(e, name_or_id))
    }

    async fn untag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError> {
        let tag = if tag.is_empty() { "latest" } else { tag };

        if self.runtime_type == RuntimeType::Podman {
            let query = Query::new().push("repo", repo).push("tag", tag);
            let uri = self
                .api
                .libpod(&format!("/images/{}/untag", name_or_id), query);
            return self.api.post(&uri).await.map(|_| ());
        }

        // Docker has no untag endpoint. Removing a name only untags while the
        // image keeps another one, so check that before removing it.
        let name = format!("{repo}:{tag}");
        let details = self.get_image(name_or_id, false).await?;
        check_docker_untag(&details.names, &name, name_or_id)?;

        self.client
            .remove_image(&name, None::<RemoveImageOptions>, None)
            .await
            .map(|_| ())
            .map_err(|e| map_not_found_error(e, &name))
    }

    async fn remove(
        &self,
        name_or_id: &str,
        force: bool,
    ) -> Result<Vec<DeleteRecord>, TransportError> {
        let opts = RemoveImageOptions {
            force,
            ..Default::default()
        };

        let records = self
            .client
            .remove_image(name_or_id, Some(opts), None)
            .await
            .map_err(|e| map_not_found_error(e, name_or_id))?;

        records.iter().map(from_model).collect()
    }

    async fn prune(&self, all: bool, filters: &Filters) -> Result<PruneRecord, TransportError> {
        let mut filters = filters.clone();
        filters
            .entry("dangling".to_string())
            .or_insert_with(|| vec![(!all).to_string()]);

        let opts = PruneImagesOptions {
            filters: Some(filters),
            ..Default::default()
        };

        let response = self
            .client
            .prune_images(Some(opts))
            .await
            .map_err(map_error)?;

        from_model(&response)
    }

    async fn load(
        &self,
        input: ArchiveReader,
        name: Option<&str>,
    ) -> Result<NamesRecord, TransportError> {
        let uri = self.api.compat("/images/load", Query::new().push("quiet", "1"));
        let messages = self.api.post_archive(&uri, input).await?;

        let mut names: Vec<String> = messages
            .iter()
            .filter_map(|m| m.loaded_name().map(str::to_string))
            .collect();

        if let (Some(name), Some(first)) = (name, names.first().cloned()) {
            let (repo, tag) = repo_and_tag(name);
            self.tag(&first, &tag, &repo).await?;
            names.push(format!("{repo}:{tag}"));
        }

        Ok(NamesRecord { id: None, names })
    }

    async fn import(
        &self,
        params: &ImportParams,
        source: ImportSource,
    ) -> Result<NamesRecord, TransportError> {
        let from_src = match &source {
            ImportSource::Url(url) => url.as_str(),
            ImportSource::Archive(_) => "-",
        };

        let mut query = Query::new()
            .push("fromSrc", from_src)
            .push_if(!params.repo.is_empty(), "repo", &params.repo)
            .push_if(!params.tag.is_empty(), "tag", &params.tag)
            .push_if(!params.message.is_empty(), "message", &params.message);
        for change in &params.changes {
            query = query.push("changes", change);
        }
        let uri = self.api.compat("/images/create", query);

        let messages = match source {
            ImportSource::Url(_) => self.api.post_progress(&uri).await?,
            ImportSource::Archive(archive) => self.api.post_archive(&uri, archive).await?,
        };

        let id = messages
            .iter()
            .rev()
            .find_map(|m| m.status.clone().filter(|s| s.starts_with("sha256:")));

        let names = if params.repo.is_empty() {
            Vec::new()
        } else {
            let tag = if params.tag.is_empty() { "latest" } else { params.tag.as_str() };
            vec![format!("{}:{}", params.repo, tag)]
        };

        Ok(NamesRecord { id, names })
    }

    async fn export(
        &self,
        name_or_id: &str,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        format: ArchiveFormat,
        compress: bool,
    ) -> Result<(), TransportError> {
        let path = format!("/images/{}/get", name_or_id);
        let uri = match self.runtime_type {
            RuntimeType::Podman => {
                let query = Query::new()
                    .push("format", format.as_str())
                    .push("compress", compress.to_string());
                self.api.libpod(&path, query)
            }
            RuntimeType::Docker if !format.is_oci() => self.api.compat(&path, Query::new()),
            RuntimeType::Docker => return Err(self.unsupported("OCI export")),
        };

        let written = self.api.download(&uri, output).await?;
        tracing::debug!(image = name_or_id, %format, bytes = written, "exported image");
        Ok(())
    }

    async fn diff(&self, name_or_id: &str) -> Result<Vec<ChangeRecord>, TransportError> {
        if self.runtime_type != RuntimeType::Podman {
            return Err(self.unsupported("image diff"));
        }

        let uri = self
            .api
            .libpod(&format!("/images/{}/changes", name_or_id), Query::new());
        self.api.get_json(&uri).await
    }

    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchRecord>, TransportError> {
        let filters = serde_json::to_string(&options.filters)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        let query = Query::new()
            .push("term", term)
            .push_if(
                options.limit.is_some(),
                "limit",
                options.limit.unwrap_or_default().to_string(),
            )
            .push_if(!options.filters.is_empty(), "filters", filters);

        self.api
            .get_json(&self.api.compat("/images/search", query))
            .await
    }
}
