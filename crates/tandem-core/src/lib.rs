//! Hybrid logical clock, event stamping, reconciliation, and resonance for
//! the Tandem paired event stream.
//!
//! Everything here is sans-IO: no task, socket, or timer lives in this
//! crate. The session controller owns one [`HybridClock`] and one
//! [`Reconciler`] per node and feeds them.
//!
//! # Modules
//!
//! - [`clock`] -- Hybrid logical clock with an injectable wall clock.
//! - [`packet`] -- Validating and stamping locally created events.
//! - [`presence`] -- Self-expiring flags for typing and nudges.
//! - [`reconciler`] -- Merge of durable snapshots, ephemeral pushes, and
//!   optimistic local events into a [`ReconciledState`].
//! - [`resonance`] -- The bounded mood/latency synchronization score.
//! - [`config`] -- Configuration loading from `tandem-config.yaml`.
//!
//! [`HybridClock`]: clock::HybridClock
//! [`Reconciler`]: reconciler::Reconciler
//! [`ReconciledState`]: reconciler::ReconciledState

pub mod clock;
pub mod config;
pub mod packet;
pub mod presence;
pub mod reconciler;
pub mod resonance;

pub use clock::{ClockError, HybridClock, ManualWallClock, SystemWallClock, WallClock};
pub use config::{ConfigError, HeartbeatConfig, PresenceConfig, RelayConfig, TandemConfig};
pub use packet::{CreateEventError, create_event};
pub use presence::PresenceFlag;
pub use reconciler::{PushOutcome, ReconciledState, Reconciler};
pub use resonance::{ResonancePolicy, resonance};
