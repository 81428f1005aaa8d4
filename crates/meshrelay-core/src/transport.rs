//! Mesh transport trait definition.
//!
//! The radio link itself lives outside this crate. A transport yields inbound
//! text messages and accepts outbound text for a destination.

use meshrelay_types::error::TransportError;
use meshrelay_types::message::{Destination, InboundMessage};

/// A bidirectional link to the mesh.
///
/// Implementations live in meshrelay-infra (e.g. `ConsoleTransport`).
pub trait Transport: Send + Sync {
    /// Node id of the relay itself, used to ignore echoes of its own sends.
    fn own_id(&self) -> &str;

    /// Wait for the next inbound message. `Ok(None)` means the link closed.
    fn receive(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<InboundMessage>, TransportError>> + Send;

    /// Transmit one already-sized text segment.
    fn send(
        &self,
        destination: &Destination,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
