//! Snapshot ingestion: fragment reassembly and the state pool.

use wire::ByteReader;

use crate::error::{ParseError, ParseResult};
use crate::jitter::JitterTracker;
use crate::limits::EngineLimits;
use crate::pool::Pool;
use crate::snapshot::ServerState;
use crate::tick::Tick;

/// Upper bound on a baseline's announced decompressed size.
const MAX_BASELINE_SIZE: usize = 16 * 1024 * 1024;

/// A decoded baseline: the installed state plus the player id the
/// server assigned to this client.
pub(crate) struct Baseline {
    pub state: ServerState,
    pub player_id: u8,
}

/// Owns snapshot reassembly, the bounded state pool, and the jitter
/// tracker fed by fragment arrivals.
#[derive(Debug)]
pub(crate) struct SnapshotStore {
    /// Incomplete diffs keyed by tick. Bounded linear map; at most
    /// `max_saved_state_diff` entries.
    reassembly: Vec<ServerState>,
    pool: Pool<ServerState>,
    pub jitter: JitterTracker,
    limits: EngineLimits,
}

impl SnapshotStore {
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            reassembly: Vec::new(),
            pool: Pool::new(limits.max_saved_state_diff),
            jitter: JitterTracker::new(),
            limits,
        }
    }

    /// Takes a cleared state from the pool, allocating only when empty.
    pub fn take_state(&mut self) -> ServerState {
        self.pool.take().unwrap_or_default()
    }

    /// Clears a consumed state and returns it to the pool.
    pub fn recycle(&mut self, mut state: ServerState) {
        state.reset();
        self.pool.put(state);
    }

    #[cfg(test)]
    pub fn reassembly_len(&self) -> usize {
        self.reassembly.len()
    }

    #[cfg(test)]
    pub fn reassembly_ticks(&self) -> Vec<Tick> {
        self.reassembly.iter().map(|state| state.tick).collect()
    }

    /// Ingests one diff fragment. Returns the completed snapshot when
    /// this was the final fragment of its tick.
    ///
    /// Fragment body: `u16 tick | u16 processed_tick |
    /// u16 last_received_tick | bytes`.
    pub fn ingest_diff(
        &mut self,
        reader: &mut ByteReader<'_>,
        is_last: bool,
        state_a_tick: Tick,
    ) -> Option<ServerState> {
        match self.try_ingest_diff(reader, is_last, state_a_tick) {
            Ok(completed) => completed,
            Err(err) => {
                log::error!("dropping diff fragment: {err}");
                None
            }
        }
    }

    fn try_ingest_diff(
        &mut self,
        reader: &mut ByteReader<'_>,
        is_last: bool,
        state_a_tick: Tick,
    ) -> ParseResult<Option<ServerState>> {
        let tick = Tick::new(reader.read_u16()?);
        let processed_tick = Tick::new(reader.read_u16()?);
        let last_received_tick = Tick::new(reader.read_u16()?);

        // Stale fragments are dropped without touching the jitter ring.
        if tick.seq_diff(state_a_tick) <= 0 {
            return Ok(None);
        }
        self.jitter.sample();

        let index = match self.find_or_create(tick) {
            Some(index) => index,
            None => return Ok(None),
        };

        let state = &mut self.reassembly[index];
        state.processed_tick = processed_tick;
        state.last_received_tick = last_received_tick;
        state.append_fragment(reader.rest());

        if is_last {
            return Ok(Some(self.reassembly.swap_remove(index)));
        }
        Ok(None)
    }

    fn find_or_create(&mut self, tick: Tick) -> Option<usize> {
        if let Some(index) = self.reassembly.iter().position(|state| state.tick == tick) {
            return Some(index);
        }

        if self.reassembly.len() >= self.limits.max_saved_state_diff {
            let oldest = self
                .reassembly
                .iter()
                .enumerate()
                .min_by_key(|(_, state)| state.tick.seq_diff(tick))
                .map(|(index, _)| index)?;
            if !tick.is_newer_than(self.reassembly[oldest].tick) {
                return None;
            }
            log::warn!(
                "reassembly map full, evicting tick {}",
                self.reassembly[oldest].tick.raw()
            );
            let evicted = self.reassembly.swap_remove(oldest);
            self.recycle(evicted);
        }

        let mut state = self.take_state();
        state.tick = tick;
        self.reassembly.push(state);
        Some(self.reassembly.len() - 1)
    }

    /// Decodes a baseline packet: `u32 decompressed_size | u8 player_id |
    /// lz4 block`. The decompressed payload is `u16 tick | records`.
    ///
    /// Any decode failure drops the packet with no partial mutation.
    pub fn decode_baseline(&mut self, reader: &mut ByteReader<'_>) -> Option<Baseline> {
        match self.try_decode_baseline(reader) {
            Ok(baseline) => Some(baseline),
            Err(err) => {
                log::error!("dropping baseline: {err}");
                None
            }
        }
    }

    fn try_decode_baseline(&mut self, reader: &mut ByteReader<'_>) -> ParseResult<Baseline> {
        let decompressed_size = reader.read_u32()? as usize;
        let player_id = reader.read_u8()?;
        if decompressed_size > MAX_BASELINE_SIZE {
            return Err(ParseError::BaselineTooLarge {
                size: decompressed_size,
            });
        }

        let decoded = lz4::block::decompress(reader.rest(), Some(decompressed_size as i32))
            .map_err(|_| ParseError::DecompressFailed)?;
        if decoded.len() != decompressed_size {
            return Err(ParseError::DecompressSizeMismatch {
                expected: decompressed_size,
                actual: decoded.len(),
            });
        }

        let mut payload = ByteReader::new(&decoded);
        let tick = Tick::new(payload.read_u16()?);

        let mut state = self.take_state();
        state.tick = tick;
        state.is_baseline = true;
        state.processed_tick = tick;
        state.last_received_tick = tick;
        state.set_payload(payload.rest());
        Ok(Baseline { state, player_id })
    }
}
