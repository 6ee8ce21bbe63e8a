//! Client-side core of a tick-synchronized networked entity system.
//!
//! The engine keeps a locally simulated world in step with an
//! authoritative server while hiding round-trip latency:
//!
//! - **Snapshot interpolation** for server-controlled entities, consumed
//!   from a jitter-smoothed buffer of delta-compressed snapshots
//! - **Prediction with rollback-and-replay** for locally controlled
//!   entities: inputs apply immediately, and every snapshot advance
//!   resets predicted state to the acknowledged image and replays the
//!   inputs the server has not consumed yet
//!
//! # Design Principles
//!
//! - **Single-threaded and cooperative** - all mutation happens on
//!   `receive` or `update`, from one thread; there are no locks.
//! - **Never raises, never panics** - malformed packets are logged and
//!   dropped; the world converges on the next good snapshot.
//! - **Zero steady-state allocation** - snapshots, input buffers, and
//!   scratch images recycle through bounded pools and only grow.
//!
//! # Integration surface
//!
//! The engine is a library. It consumes an unreliable datagram
//! [`Transport`], a validated [`schema::ClassRegistry`] describing
//! entity layouts, and [`Controller`] implementations producing input
//! bytes; inbound datagrams are pushed into [`ClientEngine::receive`]
//! and the frame loop drives [`ClientEngine::update`].

mod client;
mod entity;
mod error;
mod input;
mod jitter;
mod limits;
mod pool;
mod predict;
mod reader;
mod snapshot;
mod store;
mod tick;
mod transport;

pub use client::ClientEngine;
pub use entity::{Controller, Entity, EntityFlags, EntityTable};
pub use error::{ParseError, ParseResult};
pub use limits::{
    EngineConfig, EngineLimits, INPUT_BUFFER_SIZE, INTERPOLATE_BUFFER_SIZE, JITTER_SAMPLES,
    MAX_SAVED_STATE_DIFF, MAX_SYNCED_ENTITY_COUNT, MAX_UNRELIABLE_DATA_SIZE,
};
pub use predict::EngineMode;
pub use reader::SERVER_OWNER;
pub use snapshot::ENTITY_RPC_FIELD_ID;
pub use tick::Tick;
pub use transport::Transport;
