// ABOUTME: Container runtime access: detection, transport contract and bindings.
// ABOUTME: The bollard-backed transport serves both local and SSH-tunneled sockets.

mod api;
mod bollard;
mod detection;
mod error;
mod transport;
mod types;
pub mod wire;

pub use self::bollard::BollardTransport;
pub use detection::{DetectionError, detect_local, detect_remote};
pub use error::{RuntimeError, RuntimeErrorKind, TunnelSnafu};
pub use transport::{
    ArchiveFormat, ArchiveReader, Filters, ImageTransport, ImportParams, ImportSource,
    PullOptions, PushOptions, RegistryAuth, SearchOptions, TransportError,
};
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};
