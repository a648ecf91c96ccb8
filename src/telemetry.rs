// SPDX-License-Identifier: MIT
//! Telemetry bootstrap: exporters, providers and process-wide installation.
//!
//! This module turns a parsed [`AppConfig`] into a working OpenTelemetry
//! pipeline for all three signals:
//!
//! * [`init_telemetry`] – builds OTLP exporters for traces, metrics and logs,
//!   installs the global propagator and providers, and wires the `tracing`
//!   subscriber (JSON console output plus the OTLP log bridge).
//! * [`TelemetryHandle`] – owns the providers and performs the one explicit
//!   synchronous shutdown/flush.
//!
//! # Installation order
//! All fallible work (exporter construction, subscriber registration) happens
//! before any process-wide state is mutated. A failed bootstrap therefore
//! installs nothing: the global propagator and providers remain whatever they
//! were before the call.
//!
//! # Concurrency
//! `init_telemetry` mutates process-wide state and must not be called from
//! multiple threads at once; installation is not atomic across the three
//! providers. After installation the providers and any instruments derived
//! from them are concurrency-safe by contract of the OpenTelemetry SDK.
//!
//! # Example
//! ```no_run
//! use session_pulse::config::AppConfig;
//! use session_pulse::telemetry::init_telemetry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load("./otel.yaml")?;
//!     let handle = init_telemetry(&config)?;
//!     // ... application logic ...
//!     handle.shutdown()?; // ensure final batches are exported
//!     Ok(())
//! }
//! ```
use anyhow::Result;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::AppConfig;

/// Errors raised while constructing and installing the telemetry pipeline.
///
/// All variants are fatal to startup; there is no degraded mode.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// An OTLP exporter could not be constructed.
    #[error("failed to construct {signal} exporter: {message}")]
    Provider {
        /// Which signal's exporter failed.
        signal: &'static str,
        message: String,
    },

    /// The global `tracing` subscriber could not be registered (typically
    /// because one is already installed).
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}

/// Handle owning the three providers; allows explicit synchronous shutdown.
///
/// Dropping the handle without calling [`TelemetryHandle::shutdown`] may lose
/// final batches, depending on exporter internals. Always call `shutdown()`
/// at a controlled point, typically just before process exit.
pub struct TelemetryHandle {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
}

impl TelemetryHandle {
    /// Flush and shut down all providers.
    ///
    /// # Errors
    /// If one or more providers report a failure, a combined `anyhow::Error`
    /// including a message for each failing component is returned.
    pub fn shutdown(self) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.shutdown() {
            errs.push(format!("tracer: {e}"));
        }
        if let Err(e) = self.meter_provider.shutdown() {
            errs.push(format!("meter: {e}"));
        }
        if let Err(e) = self.logger_provider.shutdown() {
            errs.push(format!("logger: {e}"));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errs.join(", "))
        }
    }
}

/// Build the OTLP pipeline described by `cfg` and install it process-wide.
///
/// Installs, in order: the `tracing` subscriber (env filter, JSON console
/// formatting, OTLP log bridge, OpenTelemetry span layer), the composite
/// trace-context + baggage propagator, and the global tracer and meter
/// providers. The logger provider stays owned by the returned handle and is
/// reached through the bridge layer.
///
/// # Errors
/// [`BootstrapError`] if any exporter builder fails (e.g. an invalid endpoint
/// URL) or a global subscriber is already registered. Nothing is installed in
/// that case. Note that unreachable collectors typically surface at first
/// export, not here; that is the exporter's concern.
pub fn init_telemetry(cfg: &AppConfig) -> Result<TelemetryHandle, BootstrapError> {
    // Shared resource
    let resource = Resource::builder()
        .with_service_name(cfg.service.name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service.version.clone()),
            KeyValue::new("deployment.environment", cfg.service.environment.clone()),
        ])
        .build();

    // Build exporters (HTTP binary OTLP); all fallible work happens here.
    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.exporter.traces_endpoint())
        .with_timeout(cfg.exporter.timeout())
        .build()
        .map_err(|e| BootstrapError::Provider {
            signal: "trace",
            message: e.to_string(),
        })?;

    let metric_exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.exporter.metrics_endpoint())
        .with_timeout(cfg.exporter.timeout())
        .build()
        .map_err(|e| BootstrapError::Provider {
            signal: "metric",
            message: e.to_string(),
        })?;

    let log_exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.exporter.logs_endpoint())
        .with_timeout(cfg.exporter.timeout())
        .build()
        .map_err(|e| BootstrapError::Provider {
            signal: "log",
            message: e.to_string(),
        })?;

    // Providers (batch/periodic builders spawn their own worker threads)
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let meter_provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(metric_exporter).build())
        .with_resource(resource.clone())
        .build();

    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    let bridge_layer = OpenTelemetryTracingBridge::new(&logger_provider);
    let otel_trace_layer =
        OpenTelemetryLayer::new(tracer_provider.tracer(cfg.service.name.clone()));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    // Console output: one JSON object per event, matching the emitted log
    // stream contract.
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(false);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(bridge_layer)
        .with(otel_trace_layer)
        .try_init()
        .map_err(|e| BootstrapError::Subscriber(e.to_string()))?;

    // Last step: publish the process-wide state.
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
    global::set_tracer_provider(tracer_provider.clone());
    global::set_meter_provider(meter_provider.clone());

    Ok(TelemetryHandle {
        tracer_provider,
        meter_provider,
        logger_provider,
    })
}
