//! The client engine: ingest, advance, predict, render.
//!
//! Single-threaded and cooperative. All mutation happens either on
//! [`ClientEngine::receive`] (snapshot ingest) or on
//! [`ClientEngine::update`] (frame/logic update); both must be called
//! from the same thread. Nothing here raises to the caller: malformed
//! packets are logged and dropped.

use std::collections::VecDeque;

use schema::{ClassId, ClassRegistry};
use wire::{InputHeader, PacketKind};

use crate::entity::{Controller, Entity, EntityFlags, EntityTable};
use crate::input::InputQueue;
use crate::limits::EngineConfig;
use crate::predict::{EngineMode, PredictionEngine};
use crate::reader::StateReader;
use crate::snapshot::{ServerState, ENTITY_RPC_FIELD_ID};
use crate::store::SnapshotStore;
use crate::tick::Tick;
use crate::transport::Transport;

/// Fraction of the lerp duration below which it is clamped, keeping the
/// advance arithmetic finite when snapshots arrive nearly together.
const MIN_LERP_DURATION: f32 = 1e-4;

/// Client-side core of the tick-synchronized entity system.
///
/// Maintains a locally simulated world synchronized against an
/// authoritative server: server-owned entities are interpolated between
/// buffered snapshots, locally controlled entities are predicted and
/// rolled back against acknowledgements.
pub struct ClientEngine<T: Transport> {
    config: EngineConfig,
    registry: ClassRegistry,
    transport: T,
    entities: EntityTable,
    controllers: Vec<Box<dyn Controller>>,
    store: SnapshotStore,
    reader: StateReader,
    predict: PredictionEngine,
    inputs: InputQueue,

    state_a: Option<ServerState>,
    state_b: Option<ServerState>,
    /// Completed snapshots awaiting consumption, ascending by tick.
    lerp_buffer: VecDeque<ServerState>,
    lerp_timer: f32,
    lerp_duration: f32,

    tick: Tick,
    flushed_tick: Tick,
    time_accumulator: f32,
    player_id: u8,
    remote_calls_tick: Tick,
    last_received_input_tick: Tick,
}

impl<T: Transport> ClientEngine<T> {
    /// Creates an engine over a validated class registry and a
    /// transport.
    #[must_use]
    pub fn new(registry: ClassRegistry, transport: T, config: EngineConfig) -> Self {
        let capacity = config.limits.max_synced_entities;
        Self {
            registry,
            transport,
            entities: EntityTable::new(capacity),
            controllers: Vec::new(),
            store: SnapshotStore::new(config.limits),
            reader: StateReader::new(),
            predict: PredictionEngine::new(capacity),
            inputs: InputQueue::new(config.limits),
            state_a: None,
            state_b: None,
            lerp_buffer: VecDeque::new(),
            lerp_timer: 0.0,
            lerp_duration: 0.0,
            tick: Tick::default(),
            flushed_tick: Tick::default(),
            time_accumulator: 0.0,
            player_id: 0,
            remote_calls_tick: Tick::default(),
            last_received_input_tick: Tick::default(),
            config,
        }
    }

    /// Registers a human input source.
    pub fn add_controller(&mut self, controller: Box<dyn Controller>) {
        self.controllers.push(controller);
    }

    /// Ingests one raw inbound datagram.
    pub fn receive(&mut self, bytes: &[u8]) {
        let (kind, mut reader) = match wire::route(bytes) {
            Ok(routed) => routed,
            // Not our protocol; someone else's traffic.
            Err(wire::PacketError::BadHeaderByte { .. }) => return,
            Err(err) => {
                log::debug!("ignoring datagram: {err}");
                return;
            }
        };
        match kind {
            PacketKind::BaselineSync => self.on_baseline(&mut reader),
            PacketKind::DiffSync => self.on_diff(&mut reader, false),
            PacketKind::DiffSyncLast => self.on_diff(&mut reader, true),
            PacketKind::ClientSync => {
                log::warn!("client sync packet received from server, dropping");
            }
        }
    }

    /// Advances the engine by `elapsed` wall-clock seconds: logic ticks,
    /// snapshot advance, interpolation, visual update, input flush.
    pub fn update(&mut self, elapsed: f32) {
        self.store.jitter.advance(elapsed);

        let dt = self.config.tick_period();
        self.time_accumulator += elapsed;
        while self.time_accumulator >= dt {
            self.tick = self.tick.advance(1);
            self.logic_tick();
            self.time_accumulator -= dt;
        }

        if self.state_b.is_none() {
            self.preload_next();
        }
        if self.state_b.is_some() {
            self.lerp_timer += elapsed;
            while self.state_b.is_some() && self.lerp_timer >= self.lerp_duration {
                self.go_to_next();
            }
        }

        self.interpolate_frame();
        self.visual_update();

        if self.tick != self.flushed_tick {
            self.inputs
                .flush(&mut self.transport, self.last_received_input_tick);
            self.flushed_tick = self.tick;
        }
    }

    /// Optimistically spawns a locally simulated entity of `class_id`,
    /// queued for destruction once the server acknowledges the spawn
    /// input (the authoritative copy arrives through a snapshot).
    pub fn spawn_predicted(&mut self, class_id: ClassId) -> Option<u16> {
        let class = self.registry.get(class_id)?;
        let entity_id = self.entities.free_id_from_top()?;
        let fields_size = class.fields_size();
        let interpolated_size = class.interpolated_size();
        self.entities.insert(Entity::new(
            entity_id,
            0,
            class_id,
            EntityFlags::predicted_spawn(),
            fields_size,
        ));
        self.predict.track_scratch(entity_id, interpolated_size);
        self.predict.push_pending_spawn(self.tick, entity_id);
        Some(entity_id)
    }

    /// The live entity table.
    #[must_use]
    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// One live entity.
    #[must_use]
    pub fn entity(&self, entity_id: u16) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Tick of the interpolation base snapshot, if one is installed.
    #[must_use]
    pub fn state_a_tick(&self) -> Option<Tick> {
        self.state_a.as_ref().map(|state| state.tick)
    }

    /// Tick of the interpolation target snapshot, if loaded.
    #[must_use]
    pub fn state_b_tick(&self) -> Option<Tick> {
        self.state_b.as_ref().map(|state| state.tick)
    }

    /// Number of completed snapshots received but not yet consumed,
    /// including a preloaded target.
    #[must_use]
    pub fn lerp_buffer_len(&self) -> usize {
        self.lerp_buffer.len() + usize::from(self.state_b.is_some())
    }

    /// The player id assigned by the last baseline.
    #[must_use]
    pub fn player_id(&self) -> u8 {
        self.player_id
    }

    /// The current local simulation tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of unacknowledged inputs.
    #[must_use]
    pub fn pending_input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Whether a rollback replay is in progress.
    #[must_use]
    pub fn mode(&self) -> EngineMode {
        self.predict.mode()
    }

    fn on_baseline(&mut self, reader: &mut wire::ByteReader<'_>) {
        let Some(baseline) = self.store.decode_baseline(reader) else {
            return;
        };
        let mut state = baseline.state;
        self.player_id = baseline.player_id;

        if let Some(old) = self.state_a.take() {
            self.store.recycle(old);
        }
        if let Some(old) = self.state_b.take() {
            self.store.recycle(old);
        }
        while let Some(old) = self.lerp_buffer.pop_front() {
            self.store.recycle(old);
        }
        self.inputs.clear();
        self.store.jitter.reset();
        self.lerp_timer = 0.0;
        self.lerp_duration = 0.0;
        self.remote_calls_tick = state.tick;

        if let Err(err) = state.preload(
            &self.registry,
            &self.entities,
            self.config.limits.max_synced_entities,
        ) {
            log::error!("baseline preload poisoned: {err}");
        }
        self.reader.apply_state(
            &state,
            &self.registry,
            &mut self.entities,
            &mut self.predict,
            self.player_id,
        );
        self.state_a = Some(state);
    }

    fn on_diff(&mut self, reader: &mut wire::ByteReader<'_>, is_last: bool) {
        // Diffs are meaningless without a baseline to diff against.
        let Some(state_a_tick) = self.state_a.as_ref().map(|state| state.tick) else {
            return;
        };
        if let Some(completed) = self.store.ingest_diff(reader, is_last, state_a_tick) {
            self.insert_completed(completed);
        }
    }

    fn insert_completed(&mut self, state: ServerState) {
        let duplicate = self.lerp_buffer.iter().any(|held| held.tick == state.tick)
            || self.state_b.as_ref().is_some_and(|b| b.tick == state.tick);
        if duplicate {
            self.store.recycle(state);
            return;
        }

        if self.lerp_buffer.len() >= self.config.limits.interpolate_buffer_size {
            let oldest_tick = match self.lerp_buffer.front() {
                Some(front) => front.tick,
                None => {
                    self.store.recycle(state);
                    return;
                }
            };
            if !state.tick.is_newer_than(oldest_tick) {
                self.store.recycle(state);
                return;
            }
            // Consume one buffered snapshot to make room.
            if self.state_b.is_none() {
                self.preload_next();
            }
            self.lerp_timer = self.lerp_duration;
            self.go_to_next();
        }

        let position = self
            .lerp_buffer
            .iter()
            .position(|held| held.tick.is_newer_than(state.tick))
            .unwrap_or(self.lerp_buffer.len());
        self.lerp_buffer.insert(position, state);
    }

    /// Pops the buffer minimum as the new target and recomputes the lerp
    /// window from buffer occupancy and measured jitter.
    fn preload_next(&mut self) -> bool {
        let Some(state_a_tick) = self.state_a.as_ref().map(|state| state.tick) else {
            return false;
        };
        let mut next = loop {
            let Some(candidate) = self.lerp_buffer.pop_front() else {
                return false;
            };
            // Anything at or behind the base is no longer a valid target.
            if candidate.tick.is_newer_than(state_a_tick) {
                break candidate;
            }
            self.store.recycle(candidate);
        };

        let tick_rate = f32::from(self.config.tick_rate);
        self.store.jitter.update_midpoint(tick_rate);
        let midpoint = self.store.jitter.midpoint();

        let diff = f32::from(next.tick.seq_diff(state_a_tick) as u16);
        let occupancy = self.lerp_buffer.len() as f32;
        self.lerp_duration = (diff
            * self.config.tick_period()
            * (1.0 - (occupancy - midpoint) * 0.02))
            .max(MIN_LERP_DURATION);

        if let Err(err) = next.preload(
            &self.registry,
            &self.entities,
            self.config.limits.max_synced_entities,
        ) {
            log::error!("snapshot preload poisoned: {err}");
        }

        self.inputs.drop_acked(next.processed_tick);
        if next
            .last_received_tick
            .is_newer_than(self.last_received_input_tick)
        {
            self.last_received_input_tick = next.last_received_tick;
        }

        self.state_b = Some(next);
        true
    }

    /// Promotes the target snapshot to the base: apply its records, roll
    /// predicted entities back and replay pending inputs, then try to
    /// line up the next target.
    fn go_to_next(&mut self) {
        let Some(next) = self.state_b.take() else {
            return;
        };
        if let Some(old) = self.state_a.replace(next) {
            self.store.recycle(old);
        }
        let old_duration = self.lerp_duration;

        if let Some(state) = self.state_a.as_ref() {
            self.reader.apply_state(
                state,
                &self.registry,
                &mut self.entities,
                &mut self.predict,
                self.player_id,
            );
        }
        // Remote calls the discrete logic ticks never reached still
        // belong to this snapshot's window; fire them before it retires.
        if let Some(state) = self.state_a.take() {
            self.dispatch_remote_calls_from(&state, state.tick);
            self.state_a = Some(state);
        }
        self.lerp_timer -= old_duration;

        self.rollback();

        if let Some(processed_tick) = self.state_a.as_ref().map(|state| state.processed_tick) {
            for entity_id in self.predict.drain_acked_spawns(processed_tick) {
                self.entities.remove(entity_id);
                self.predict.untrack(entity_id);
            }
        }

        if self.preload_next() && self.lerp_duration > 0.0 {
            self.lerp_timer *= old_duration / self.lerp_duration;
        }
    }

    /// Resets predicted entities to the last authoritative image and
    /// replays every buffered input over them.
    fn rollback(&mut self) {
        for entity in self.entities.iter_mut() {
            if !entity.flags.is_predicted() {
                continue;
            }
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            self.predict.reset_to_authoritative(entity, class);
        }

        self.predict.set_mode(EngineMode::PredictionRollback);
        for command in self.inputs.iter() {
            let payload = command.data.get(InputHeader::SIZE..).unwrap_or(&[]);
            for controller in &mut self.controllers {
                controller.read_input(&mut self.entities, payload);
            }
            for entity in self.entities.iter_mut() {
                if !entity.flags.is_predicted() {
                    continue;
                }
                let Some(class) = self.registry.get(entity.class_id) else {
                    continue;
                };
                if let Some(update) = class.update() {
                    update(entity.data_mut());
                }
            }
        }
        self.predict.set_mode(EngineMode::Normal);

        for entity in self.entities.iter() {
            if !entity.flags.is_predicted() {
                continue;
            }
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            if class.interpolated_count() > 0 {
                self.predict.capture_initial(entity, class);
            }
        }
    }

    fn logic_tick(&mut self) {
        let mut lerp_msec = 0u16;
        let window = self
            .state_a
            .as_ref()
            .map(|a| a.tick)
            .zip(self.state_b.as_ref().map(|b| b.tick));
        if let Some((a_tick, b_tick)) = window {
            let t = if self.lerp_duration > 0.0 {
                (self.lerp_timer / self.lerp_duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            lerp_msec = (self.lerp_timer * 1000.0).clamp(0.0, 65535.0) as u16;
            let span = f32::from(b_tick.seq_diff(a_tick) as u16);
            let server_tick = a_tick.advance((span * t).round() as u16);
            self.dispatch_remote_calls(server_tick);
        }

        // Local interpolation window rolls forward one tick.
        for entity in self.entities.iter() {
            if entity.flags.is_local() || entity.flags.is_local_controlled() {
                self.predict.rotate_scratch(entity.id);
            }
        }

        if self.state_a.is_some() {
            self.build_and_apply_input(lerp_msec);
        }

        for entity in self.entities.iter_mut() {
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            let Some(update) = class.update() else {
                continue;
            };
            let runs = entity.flags.is_local()
                || entity.flags.is_local_controlled()
                || (entity.flags.is_server_controlled() && class.update_on_client());
            if runs {
                update(entity.data_mut());
            }
        }

        for entity in self.entities.iter() {
            if !(entity.flags.is_local() || entity.flags.is_local_controlled()) {
                continue;
            }
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            if class.interpolated_count() > 0 {
                self.predict.capture_initial(entity, class);
            }
        }
    }

    fn build_and_apply_input(&mut self, lerp_msec: u16) {
        let state_a_tick = match self.state_a.as_ref() {
            Some(state) => state.tick,
            None => return,
        };
        let state_b_tick = self
            .state_b
            .as_ref()
            .map_or(state_a_tick, |state| state.tick);
        let header = InputHeader {
            state_a_tick: state_a_tick.raw(),
            state_b_tick: state_b_tick.raw(),
            lerp_msec,
        };

        let mut writer = self.inputs.begin();
        header.encode(&mut writer);
        let cap = self.config.limits.max_unreliable_data_size - 2;
        for controller in &mut self.controllers {
            controller.generate_input(&mut writer);
            if writer.len() > cap {
                log::error!(
                    "input payload {} bytes exceeds {cap}, skipping remaining controllers",
                    writer.len()
                );
                break;
            }
        }

        // Prediction consumes the same bytes the server will.
        let payload_start = InputHeader::SIZE.min(writer.len());
        for controller in &mut self.controllers {
            controller.read_input(&mut self.entities, &writer.as_slice()[payload_start..]);
        }

        self.inputs.push(self.tick, writer);
    }

    fn dispatch_remote_calls(&mut self, server_tick: Tick) {
        let Some(state_b) = self.state_b.take() else {
            return;
        };
        self.dispatch_remote_calls_from(&state_b, server_tick);
        self.state_b = Some(state_b);
    }

    /// Fires cached remote calls with tick in
    /// `(remote_calls_tick, server_tick]`, each exactly once, in cache
    /// order.
    fn dispatch_remote_calls_from(&mut self, state: &ServerState, server_tick: Tick) {
        let mut max_fired = self.remote_calls_tick;
        for rpc in &state.remote_calls {
            if rpc.tick.seq_diff(self.remote_calls_tick) <= 0 {
                continue;
            }
            if rpc.tick.seq_diff(server_tick) > 0 {
                continue;
            }

            let Some(entity) = self.entities.get(rpc.entity_id) else {
                log::warn!("remote call for missing entity {}", rpc.entity_id);
                continue;
            };
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            let handler = if rpc.field_id == ENTITY_RPC_FIELD_ID {
                class.rpc(rpc.rpc_id)
            } else {
                class
                    .syncables()
                    .get(usize::from(rpc.field_id))
                    .and_then(|syncable| syncable.rpc(rpc.rpc_id))
            };
            let payload = &state.payload()[rpc.data_offset..rpc.data_offset + rpc.payload_len];
            match handler {
                Some(def) => (def.handler)(rpc.entity_id, payload, rpc.count),
                None => log::warn!(
                    "unknown rpc {} (field {}) on entity {}",
                    rpc.rpc_id,
                    rpc.field_id,
                    rpc.entity_id
                ),
            }
            if rpc.tick.is_newer_than(max_fired) {
                max_fired = rpc.tick;
            }
        }
        self.remote_calls_tick = max_fired;
    }

    fn interpolate_frame(&mut self) {
        if let Some(state_b) = &self.state_b {
            let t = if self.lerp_duration > 0.0 {
                (self.lerp_timer / self.lerp_duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let payload = state_b.payload();
            for &entry_index in &state_b.interpolated_fields {
                let entry = &state_b.preload[entry_index];
                let Some(entity) = self.entities.get_mut(entry.entity_id) else {
                    continue;
                };
                if !entity.flags.is_server_controlled() {
                    continue;
                }
                let Some(class) = self.registry.get(entity.class_id) else {
                    continue;
                };
                let Some(initial) = self.predict.initial(entry.entity_id) else {
                    continue;
                };
                for cache in &entry.caches {
                    let field = &class.fields()[cache.field_index];
                    let Some(interpolate) = field.interpolator else {
                        continue;
                    };
                    let from = &initial[field.interp_offset..field.interp_offset + field.size];
                    let to = &payload[cache.data_offset..cache.data_offset + field.size];
                    interpolate(from, to, entity.field_mut(field), t);
                }
            }
        }

        let frac = (self.time_accumulator / self.config.tick_period()).clamp(0.0, 1.0);
        for entity in self.entities.iter_mut() {
            if !(entity.flags.is_local() || entity.flags.is_local_controlled()) {
                continue;
            }
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            if class.interpolated_count() == 0 {
                continue;
            }
            let (Some(prev), Some(initial)) = (
                self.predict.prev(entity.id),
                self.predict.initial(entity.id),
            ) else {
                continue;
            };
            for field in class.fields() {
                let Some(interpolate) = field.interpolator else {
                    continue;
                };
                let from = &prev[field.interp_offset..field.interp_offset + field.size];
                let to = &initial[field.interp_offset..field.interp_offset + field.size];
                interpolate(from, to, entity.field_mut(field), frac);
            }
        }
    }

    fn visual_update(&mut self) {
        for entity in self.entities.iter_mut() {
            let Some(class) = self.registry.get(entity.class_id) else {
                continue;
            };
            if let Some(visual) = class.visual_update() {
                visual(entity.data_mut());
            }
        }
    }
}
