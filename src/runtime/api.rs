// ABOUTME: Minimal HTTP/1 client for daemon endpoints bollard does not cover.
// ABOUTME: One hyper connection per request over the daemon's Unix socket.

use super::transport::{ArchiveReader, TransportError};
use super::wire::{self, ProgressMessage};
use bytes::Bytes;
use futures::Stream;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

/// libpod API prefix; Podman serves every v4+ path under it.
const LIBPOD_PREFIX: &str = "/v4.0.0/libpod";

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "cause")]
    message: String,
}

/// Raw client for the daemon's HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    socket_path: String,
}

/// Query string builder that percent-encodes every value.
#[derive(Debug, Default)]
pub struct Query(Vec<String>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.0
            .push(format!("{}={}", key, urlencoding::encode(value.as_ref())));
        self
    }

    pub fn push_if(self, condition: bool, key: &str, value: impl AsRef<str>) -> Self {
        if condition { self.push(key, value) } else { self }
    }

    fn render(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("?{}", self.0.join("&"))
        }
    }
}

impl ApiClient {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Path on the Docker-compatible API, served by both runtimes.
    pub fn compat(&self, path: &str, query: Query) -> String {
        format!("{}{}", path, query.render())
    }

    /// Path on Podman's native API.
    pub fn libpod(&self, path: &str, query: Query) -> String {
        format!("{}{}{}", LIBPOD_PREFIX, path, query.render())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, TransportError> {
        let body = self.collect(Method::GET, uri, Empty::<Bytes>::new()).await?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(format!("{uri}: {e}")))
    }

    /// POST without a request body; returns the raw response body.
    pub async fn post(&self, uri: &str) -> Result<Bytes, TransportError> {
        self.collect(Method::POST, uri, Empty::<Bytes>::new()).await
    }

    /// POST a streamed archive and decode the progress messages it answers with.
    pub async fn post_archive(
        &self,
        uri: &str,
        archive: ArchiveReader,
    ) -> Result<Vec<ProgressMessage>, TransportError> {
        let body = self.collect(Method::POST, uri, archive_body(archive)).await?;
        progress(&body)
    }

    /// POST without a body to an endpoint that answers with progress messages.
    pub async fn post_progress(&self, uri: &str) -> Result<Vec<ProgressMessage>, TransportError> {
        let body = self.post(uri).await?;
        progress(&body)
    }

    /// Stream a GET response body into `output` without buffering it.
    pub async fn download(
        &self,
        uri: &str,
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError> {
        let response = self.send(Method::GET, uri, Empty::<Bytes>::new()).await?;
        let mut body = response.into_body();
        let mut written = 0u64;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| {
                TransportError::Connection(format!("{uri}: response body interrupted: {e}"))
            })?;
            if let Ok(data) = frame.into_data() {
                output.write_all(&data).await?;
                written += data.len() as u64;
            }
        }

        output.flush().await?;
        Ok(written)
    }

    async fn collect<B>(&self, method: Method, uri: &str, body: B) -> Result<Bytes, TransportError>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let response = self.send(method, uri, body).await?;
        read_body(response, uri).await
    }

    async fn send<B>(
        &self,
        method: Method,
        uri: &str,
        body: B,
    ) -> Result<Response<Incoming>, TransportError>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            TransportError::Connection(format!(
                "failed to connect to {}: {}",
                self.socket_path, e
            ))
        })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| TransportError::Connection(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!("daemon connection error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(hyper::header::HOST, "localhost")
            .header(hyper::header::CONTENT_TYPE, "application/x-tar")
            .body(body)
            .map_err(|e| TransportError::Connection(format!("failed to build request: {e}")))?;

        tracing::debug!(%method, uri, "daemon request");

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| TransportError::Connection(format!("{uri}: request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = read_body(response, uri).await?;
        Err(status_error(status, &body))
    }
}

async fn read_body(response: Response<Incoming>, uri: &str) -> Result<Bytes, TransportError> {
    response
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| TransportError::Connection(format!("{uri}: failed to read response: {e}")))
}

fn status_error(status: StatusCode, body: &[u8]) -> TransportError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    if status == StatusCode::NOT_FOUND {
        TransportError::NotFound(message)
    } else {
        TransportError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Decode progress messages, turning the first embedded error into a failure.
fn progress(body: &[u8]) -> Result<Vec<ProgressMessage>, TransportError> {
    let messages =
        wire::decode_progress(body).map_err(|e| TransportError::Decode(e.to_string()))?;

    if let Some(error) = messages.iter().find_map(|m| m.error.clone()) {
        return Err(TransportError::Api {
            status: StatusCode::OK.as_u16(),
            message: error,
        });
    }
    Ok(messages)
}

/// A request body that streams `reader` in fixed-size chunks.
fn archive_body(
    reader: ArchiveReader,
) -> StreamBody<impl Stream<Item = Result<Frame<Bytes>, std::io::Error>> + Send + 'static> {
    let chunks = futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Frame::data(Bytes::from(buf))), Some(reader)))
            }
            // Yield the error once, then end the stream.
            Err(e) => Some((Err(e), None)),
        }
    });
    StreamBody::new(chunks)
}
