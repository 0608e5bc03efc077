//! Streaming sessions against the hosting panel backend.
//!
//! One reusable lifecycle drives both uses of the backend's streaming
//! endpoints: an interactive remote shell (global or rooted in a site's
//! directory) and a live log tail. Client-to-backend traffic is framed as
//! JSON control messages; backend output is raw passthrough written straight
//! into an [`OutputSink`].

pub mod codec;
pub mod controller;
pub mod error;
pub mod identity;
pub mod negotiator;
pub mod sink;
pub mod transport;
pub mod view;

pub use codec::{ControlFrame, OutputChunk};
pub use controller::{CloseCause, SessionController, SessionState};
pub use error::SessionError;
pub use identity::{
    api_base_url, ConnectTarget, Credential, CredentialSource, IdentityResolver, Intent,
    LogCategory, MountContext, ResolveError, ResourceId, SessionIdentity, SessionMode,
    StaticCredential,
};
pub use negotiator::DimensionNegotiator;
pub use sink::{Dimensions, MemorySink, OutputSink};
pub use transport::{
    Connector, Transport, TransportError, TransportEvent, TransportEventKind, TransportId,
};
pub use view::{StreamView, ViewCommand, ViewFlow};
