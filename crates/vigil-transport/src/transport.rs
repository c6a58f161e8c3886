//! Transport collaborators

use async_trait::async_trait;
use bytes::Bytes;
use vigil_core::{Subscription, VigilResult};
use vigil_voice::VolumeHandler;

use crate::{Credential, Part, TransportEvent};

/// Inbound event callback
pub type TransportHandler = Box<dyn Fn(&TransportEvent) + Send + Sync>;

/// Bidirectional realtime session link
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a session. Fails with `ConnectFailed`.
    async fn open(&self, credential: Option<Credential>) -> VigilResult<()>;

    /// Close the current session, if any. May emit `Close` synchronously.
    fn close(&self);

    /// Queue a client turn on the open session
    fn send(&self, parts: Vec<Part>) -> VigilResult<()>;

    fn subscribe(&self, handler: TransportHandler) -> Subscription;
}

/// Speaker-side PCM player
pub trait AudioOutput: Send + Sync {
    fn play_pcm16(&self, data: Bytes);

    /// Drop everything queued and go silent now
    fn stop(&self);

    /// Raw playback loudness. Outputs without a level meter report nothing.
    fn subscribe_volume(&self, _handler: VolumeHandler) -> Subscription {
        Subscription::empty()
    }
}
