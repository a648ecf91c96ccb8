// SPDX-License-Identifier: MIT
//! Periodic synthetic-session emitter built on `tracing` + OpenTelemetry.
//!
//! The crate has two halves:
//! * A **bootstrap** ([`telemetry`]) that reads a YAML description of the
//!   OTLP exporters ([`config`]), constructs tracer/meter/logger providers,
//!   installs them process-wide and returns one shutdown handle.
//! * A **periodic emitter** ([`emitter`]) that fabricates one session record
//!   per tick ([`session`]), serializes it, and emits exactly one log entry
//!   plus counter/histogram observations per cycle.
//!
//! Globals are only touched at the composition boundary: the emitter itself
//! takes its instruments and collaborators explicitly, so tests can inject
//! fakes without installing anything process-wide.
//!
//! # Quick Start
//! ```no_run
//! use session_pulse::config::AppConfig;
//! use session_pulse::telemetry::init_telemetry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load("./otel.yaml")?;
//!     let handle = init_telemetry(&config)?;
//!     // business logic
//!     handle.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod emitter;
pub mod session;
pub mod telemetry;
