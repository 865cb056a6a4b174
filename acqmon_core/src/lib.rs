#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Background acquisition monitor (hardware-agnostic).
//!
//! A device is sampled continuously by a dedicated worker thread while the
//! controlling thread stays responsive. All hardware access goes through
//! `acqmon_traits::ValueSource` and `acqmon_traits::BufferedModule`.
//!
//! ## Architecture
//!
//! - **Primitives**: `AtomicCounter` (acquire/release progress counters),
//!   `Rendezvous` (mutex + condvar mailbox / bounded queue), `StatusCell`
//! - **Monitor**: `MonitorSession`, a periodic single-channel sampler driven
//!   by a `Trigger` (`monitor` module)
//! - **Drain**: `DrainSession`, a ping-pong drain of a multi-channel
//!   buffered module with poll-then-acknowledge backpressure (`drain` module)
//! - **Status**: UNINITIALIZED / IDLE / ACQUIRING / ERROR, shared by both
//!
//! The worker thread owns the device. Progress counters are published with
//! release ordering after the data they describe, so a reader that sees
//! `last_index == k` also sees slot `k`.

pub mod atomic;
pub mod buffer;
pub mod builder;
pub mod command;
pub mod config;
pub mod conversions;
pub mod drain;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod rendezvous;
pub mod status;
pub mod trigger;
pub mod util;

pub use atomic::AtomicCounter;
pub use buffer::SampleBuffer;
pub use builder::{DrainSessionBuilder, MonitorSessionBuilder};
pub use command::Command;
pub use config::{DrainCfg, MonitorCfg};
pub use drain::DrainSession;
pub use error::{BuildError, MonitorError, Result};
pub use monitor::MonitorSession;
pub use rendezvous::Rendezvous;
pub use status::{MonitorStatus, StatusCell};
pub use trigger::{ManualTicker, Periodic, PeriodicTrigger, TickFn, Trigger, TriggerFactory};
