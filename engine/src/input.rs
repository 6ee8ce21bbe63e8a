//! The unacknowledged input queue and outbound input batching.

use std::collections::VecDeque;

use wire::{ByteWriter, PacketKind, HEADER_BYTE};

use crate::limits::EngineLimits;
use crate::pool::Pool;
use crate::tick::Tick;
use crate::transport::Transport;

/// One tick's input: the fixed header plus controller payload bytes.
#[derive(Debug)]
pub(crate) struct InputCommand {
    pub tick: Tick,
    pub data: Vec<u8>,
}

/// Queue of inputs the server has not yet consumed.
///
/// Invariant: holds exactly the inputs for ticks
/// `(current_tick - len + 1) ..= current_tick`, oldest first. The ack
/// path trims the head; a hard overflow clears the whole queue.
#[derive(Debug)]
pub(crate) struct InputQueue {
    commands: VecDeque<InputCommand>,
    pool: Pool<Vec<u8>>,
    scratch: ByteWriter,
    limits: EngineLimits,
}

impl InputQueue {
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            commands: VecDeque::new(),
            pool: Pool::new(limits.max_saved_state_diff),
            scratch: ByteWriter::new(),
            limits,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> {
        self.commands.iter()
    }

    /// Takes a pooled writer for building one tick's input.
    pub fn begin(&mut self) -> ByteWriter {
        match self.pool.take() {
            Some(buf) => ByteWriter::from_vec(buf),
            None => ByteWriter::new(),
        }
    }

    /// Enqueues a finished input. Past the safety rail the entire queue
    /// is cleared; under normal conditions the ack path trims it first.
    pub fn push(&mut self, tick: Tick, writer: ByteWriter) {
        if self.commands.len() >= self.limits.input_buffer_size {
            log::warn!(
                "input queue exceeded {} entries, clearing",
                self.limits.input_buffer_size
            );
            self.clear();
        }
        self.commands.push_back(InputCommand {
            tick,
            data: writer.finish(),
        });
    }

    /// Drops inputs the server has consumed (tick at or before
    /// `processed_tick`).
    pub fn drop_acked(&mut self, processed_tick: Tick) {
        while self
            .commands
            .front()
            .is_some_and(|front| front.tick.seq_diff(processed_tick) <= 0)
        {
            if let Some(command) = self.commands.pop_front() {
                self.pool.put(command.data);
            }
        }
    }

    /// Empties the queue, recycling buffers.
    pub fn clear(&mut self) {
        while let Some(command) = self.commands.pop_front() {
            self.pool.put(command.data);
        }
    }

    /// Packs pending inputs into `ClientSync` datagrams, oldest first.
    ///
    /// Inputs the server already received are skipped; packets split on
    /// the transport MTU; at most `max_saved_state_diff` inputs go out
    /// per flush.
    pub fn flush<T: Transport>(&mut self, transport: &mut T, last_received_tick: Tick) {
        let mtu = usize::from(transport.max_unreliable_packet_size());
        let mut sent_any = false;
        let mut packed = 0usize;
        self.scratch.clear();

        for command in &self.commands {
            if command.tick.seq_diff(last_received_tick) <= 0 {
                continue;
            }
            if packed >= self.limits.max_saved_state_diff {
                break;
            }

            let entry_len = 2 + command.data.len();
            if !self.scratch.is_empty() && self.scratch.len() + entry_len > mtu {
                transport.send_unreliable(self.scratch.as_slice());
                sent_any = true;
                self.scratch.clear();
            }
            if self.scratch.is_empty() {
                self.scratch.write_u8(HEADER_BYTE);
                self.scratch.write_u8(PacketKind::ClientSync.raw());
                self.scratch.write_u16(command.tick.raw());
            }
            self.scratch.write_u16(command.data.len() as u16);
            self.scratch.write_bytes(&command.data);
            packed += 1;
        }

        if !self.scratch.is_empty() {
            transport.send_unreliable(self.scratch.as_slice());
            sent_any = true;
            self.scratch.clear();
        }
        if sent_any {
            transport.trigger_update();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingTransport {
        mtu: u16,
        packets: Vec<Vec<u8>>,
        flushes: usize,
    }

    impl RecordingTransport {
        fn new(mtu: u16) -> Self {
            Self {
                mtu,
                packets: Vec::new(),
                flushes: 0,
            }
        }
    }

    impl Transport for RecordingTransport {
        fn send_unreliable(&mut self, bytes: &[u8]) {
            self.packets.push(bytes.to_vec());
        }

        fn max_unreliable_packet_size(&self) -> u16 {
            self.mtu
        }

        fn trigger_update(&mut self) {
            self.flushes += 1;
        }
    }

    fn queue_with_inputs(limits: EngineLimits, ticks: std::ops::RangeInclusive<u16>, payload_len: usize) -> InputQueue {
        let mut queue = InputQueue::new(limits);
        for tick in ticks {
            let mut writer = queue.begin();
            writer.write_bytes(&vec![tick as u8; payload_len]);
            queue.push(Tick::new(tick), writer);
        }
        queue
    }

    fn parse_packet(bytes: &[u8]) -> (u16, Vec<Vec<u8>>) {
        assert_eq!(bytes[0], HEADER_BYTE);
        assert_eq!(bytes[1], PacketKind::ClientSync.raw());
        let start_tick = u16::from_le_bytes([bytes[2], bytes[3]]);
        let mut entries = Vec::new();
        let mut pos = 4;
        while pos < bytes.len() {
            let len = usize::from(u16::from_le_bytes([bytes[pos], bytes[pos + 1]]));
            pos += 2;
            entries.push(bytes[pos..pos + len].to_vec());
            pos += len;
        }
        (start_tick, entries)
    }

    #[test]
    fn queue_holds_contiguous_ticks() {
        let queue = queue_with_inputs(EngineLimits::for_testing(), 10..=14, 2);
        let ticks: Vec<_> = queue.iter().map(|cmd| cmd.tick.raw()).collect();
        assert_eq!(ticks, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn drop_acked_trims_head_only() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 10..=14, 2);
        queue.drop_acked(Tick::new(12));
        let ticks: Vec<_> = queue.iter().map(|cmd| cmd.tick.raw()).collect();
        assert_eq!(ticks, vec![13, 14]);
    }

    #[test]
    fn drop_acked_handles_wraparound() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 65534..=65535, 2);
        let mut writer = queue.begin();
        writer.write_u8(0);
        queue.push(Tick::new(0), writer);

        queue.drop_acked(Tick::new(65535));
        let ticks: Vec<_> = queue.iter().map(|cmd| cmd.tick.raw()).collect();
        assert_eq!(ticks, vec![0]);
    }

    #[test]
    fn overflow_clears_entire_queue() {
        let limits = EngineLimits::for_testing();
        let mut queue = queue_with_inputs(limits, 0..=(limits.input_buffer_size as u16 - 1), 1);
        assert_eq!(queue.len(), limits.input_buffer_size);

        let mut writer = queue.begin();
        writer.write_u8(0);
        queue.push(Tick::new(99), writer);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn flush_packs_oldest_first() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 10..=12, 4);
        let mut transport = RecordingTransport::new(1200);
        queue.flush(&mut transport, Tick::new(9));

        assert_eq!(transport.packets.len(), 1);
        assert_eq!(transport.flushes, 1);
        let (start_tick, entries) = parse_packet(&transport.packets[0]);
        assert_eq!(start_tick, 10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], vec![10; 4]);
        assert_eq!(entries[2], vec![12; 4]);
    }

    #[test]
    fn flush_skips_already_received() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 10..=14, 2);
        let mut transport = RecordingTransport::new(1200);
        queue.flush(&mut transport, Tick::new(12));

        let (start_tick, entries) = parse_packet(&transport.packets[0]);
        assert_eq!(start_tick, 13);
        assert_eq!(entries.len(), 2);
        // Skipped inputs stay queued until acked.
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn flush_splits_on_mtu() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 10..=13, 30);
        // header (4) + two entries (2 + 30 each) = 68; three would be 100.
        let mut transport = RecordingTransport::new(70);
        queue.flush(&mut transport, Tick::new(9));

        assert_eq!(transport.packets.len(), 2);
        let (start_a, entries_a) = parse_packet(&transport.packets[0]);
        let (start_b, entries_b) = parse_packet(&transport.packets[1]);
        assert_eq!(start_a, 10);
        assert_eq!(entries_a.len(), 2);
        assert_eq!(start_b, 12);
        assert_eq!(entries_b.len(), 2);
    }

    #[test]
    fn flush_caps_total_inputs() {
        let limits = EngineLimits::for_testing();
        let count = limits.max_saved_state_diff as u16 + 3;
        let mut queue = queue_with_inputs(limits, 1..=count, 2);
        let mut transport = RecordingTransport::new(10_000);
        queue.flush(&mut transport, Tick::new(0));

        let (_, entries) = parse_packet(&transport.packets[0]);
        assert_eq!(entries.len(), limits.max_saved_state_diff);
    }

    #[test]
    fn flush_with_nothing_pending_sends_nothing() {
        let mut queue = queue_with_inputs(EngineLimits::for_testing(), 10..=12, 2);
        let mut transport = RecordingTransport::new(1200);
        queue.flush(&mut transport, Tick::new(12));
        assert!(transport.packets.is_empty());
        assert_eq!(transport.flushes, 0);
    }

    #[test]
    fn begin_reuses_recycled_buffers() {
        let mut queue = InputQueue::new(EngineLimits::for_testing());
        let mut writer = queue.begin();
        writer.write_bytes(&[0; 64]);
        queue.push(Tick::new(1), writer);
        queue.drop_acked(Tick::new(1));
        assert!(queue.is_empty());

        let writer = queue.begin();
        assert!(writer.is_empty());
    }
}
