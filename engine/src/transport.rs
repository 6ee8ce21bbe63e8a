//! The unreliable datagram transport the engine sends through.

/// Outbound transport seam.
///
/// The engine builds datagrams and hands them here; delivery is
/// best-effort (packets may be dropped or reordered) and the engine
/// never assumes otherwise. Inbound packets are pushed into the engine
/// by the integration layer via [`crate::ClientEngine::receive`].
pub trait Transport {
    /// Queues one unreliable datagram.
    fn send_unreliable(&mut self, bytes: &[u8]);

    /// Largest single unreliable datagram the link accepts.
    fn max_unreliable_packet_size(&self) -> u16;

    /// Hints the transport to flush queued datagrams now.
    fn trigger_update(&mut self) {}
}
