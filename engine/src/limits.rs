//! Engine limits and configuration.

/// Dense entity id bound; ids at or above this are rejected.
pub const MAX_SYNCED_ENTITY_COUNT: usize = 8192;

/// Bound on the snapshot reassembly map, the free pools, and the number
/// of inputs packed per flush.
pub const MAX_SAVED_STATE_DIFF: usize = 32;

/// Bound on the lerp buffer of completed snapshots awaiting consumption.
pub const INTERPOLATE_BUFFER_SIZE: usize = 10;

/// Safety rail on the unacknowledged input queue; exceeding it clears
/// the whole queue.
pub const INPUT_BUFFER_SIZE: usize = 128;

/// Bound on one tick's combined controller input payload.
pub const MAX_UNRELIABLE_DATA_SIZE: usize = 1024;

/// Number of inter-fragment arrival deltas kept for jitter estimation.
pub const JITTER_SAMPLES: usize = 10;

/// Runtime limits for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Dense entity id bound.
    pub max_synced_entities: usize,
    /// Reassembly map / pool / input packing bound.
    pub max_saved_state_diff: usize,
    /// Lerp buffer bound.
    pub interpolate_buffer_size: usize,
    /// Input queue safety rail.
    pub input_buffer_size: usize,
    /// Per-tick input payload bound.
    pub max_unreliable_data_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_synced_entities: MAX_SYNCED_ENTITY_COUNT,
            max_saved_state_diff: MAX_SAVED_STATE_DIFF,
            interpolate_buffer_size: INTERPOLATE_BUFFER_SIZE,
            input_buffer_size: INPUT_BUFFER_SIZE,
            max_unreliable_data_size: MAX_UNRELIABLE_DATA_SIZE,
        }
    }
}

impl EngineLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_synced_entities: 64,
            max_saved_state_diff: 4,
            interpolate_buffer_size: 4,
            input_buffer_size: 16,
            max_unreliable_data_size: 128,
        }
    }
}

/// Engine configuration: the shared fixed tick rate plus limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Fixed simulation rate in ticks per second, shared with the server.
    pub tick_rate: u16,
    pub limits: EngineLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            limits: EngineLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Fixed tick period in seconds.
    #[must_use]
    pub fn tick_period(&self) -> f32 {
        1.0 / f32::from(self.tick_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_constants() {
        let limits = EngineLimits::default();
        assert_eq!(limits.max_synced_entities, MAX_SYNCED_ENTITY_COUNT);
        assert_eq!(limits.max_saved_state_diff, MAX_SAVED_STATE_DIFF);
        assert_eq!(limits.interpolate_buffer_size, INTERPOLATE_BUFFER_SIZE);
        assert_eq!(limits.input_buffer_size, INPUT_BUFFER_SIZE);
        assert_eq!(limits.max_unreliable_data_size, MAX_UNRELIABLE_DATA_SIZE);
    }

    #[test]
    fn testing_limits_smaller() {
        let test = EngineLimits::for_testing();
        let default = EngineLimits::default();
        assert!(test.max_saved_state_diff < default.max_saved_state_diff);
        assert!(test.interpolate_buffer_size < default.interpolate_buffer_size);
        assert!(test.input_buffer_size < default.input_buffer_size);
    }

    #[test]
    fn tick_period() {
        let config = EngineConfig {
            tick_rate: 20,
            limits: EngineLimits::default(),
        };
        assert_eq!(config.tick_period(), 0.05);
    }

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_rate, 30);
    }
}
