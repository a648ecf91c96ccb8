// SPDX-License-Identifier: MIT
//! Periodic session emission loop.
//!
//! One tokio task owns a fixed-interval timer. Every tick is a **cycle**:
//! generate a record, serialize it, emit exactly one log entry (info on
//! success, error on failure) and the matching metric observations. A failed
//! cycle is recorded and skipped; there are no retries and no backoff, the
//! next tick simply starts over.
//!
//! If a cycle ever outlives the period, intervening ticks are dropped rather
//! than queued, so at most one cycle runs per nominal interval.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::session::{EventSerializer, SessionSource};

/// Long-lived metric handles, obtained once and reused every cycle.
///
/// Instrument names are stable for the process lifetime; the underlying SDK
/// guarantees that re-obtaining the same name yields the same series.
pub struct EmitterInstruments {
    attempts: Counter<u64>,
    errors: Counter<u64>,
    duration: Histogram<f64>,
}

impl EmitterInstruments {
    pub fn new(meter: &Meter) -> Self {
        Self {
            attempts: meter
                .u64_counter("session_requests_total")
                .with_description("Session records emitted successfully")
                .build(),
            errors: meter
                .u64_counter("session_errors_total")
                .with_description("Cycles abandoned before emission")
                .build(),
            duration: meter
                .f64_histogram("session_processing_duration_seconds")
                .with_description("Wall-clock duration of successful cycles")
                .with_unit("s")
                .build(),
        }
    }
}

/// Result of a single cycle.
#[derive(Debug, Clone, Copy)]
pub enum CycleOutcome {
    /// The record was serialized and emitted.
    Emitted {
        /// Wall-clock time from cycle start to emission.
        elapsed: Duration,
    },
    /// Serialization failed; the cycle was logged, counted and abandoned.
    Failed,
}

/// Periodic emitter driving [`SessionSource`] and [`EventSerializer`].
pub struct Emitter<G, S> {
    interval: Duration,
    source: G,
    serializer: S,
    instruments: EmitterInstruments,
}

impl<G, S> Emitter<G, S>
where
    G: SessionSource,
    S: EventSerializer,
{
    pub fn new(interval: Duration, source: G, serializer: S, instruments: EmitterInstruments) -> Self {
        Self {
            interval,
            source,
            serializer,
            instruments,
        }
    }

    /// Run cycles until `shutdown` fires or its sender is dropped.
    ///
    /// The first cycle runs one full interval after startup. Missed ticks are
    /// skipped, never queued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The timer's initial tick completes immediately; consume it so the
        // first cycle lands one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle();
                }
                _ = shutdown.changed() => {
                    info!("session emitter stopping");
                    break;
                }
            }
        }
    }

    #[instrument(name = "session_cycle", skip(self))]
    fn run_cycle(&self) -> CycleOutcome {
        let start = Instant::now();
        let event = self.source.next_session();

        match self.serializer.serialize(&event) {
            Ok(payload) => {
                info!(data = %payload, "new session event");
                self.instruments.attempts.add(1, &[]);
                let elapsed = start.elapsed();
                self.instruments.duration.record(elapsed.as_secs_f64(), &[]);
                CycleOutcome::Emitted { elapsed }
            }
            Err(err) => {
                error!(
                    error = %err,
                    session_id = %event.session_id,
                    "failed to serialize session event"
                );
                self.instruments.errors.add(1, &[]);
                CycleOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;
    use uuid::Uuid;

    use super::*;
    use crate::session::{JsonSerializer, SerializeError, SessionEvent};
    use tokio_test::assert_ok;

    fn test_event() -> SessionEvent {
        SessionEvent {
            session_id: Uuid::new_v4(),
            customer_email: "alice1@example.com".to_string(),
            login_country: "Germany".to_string(),
            browser: "test-agent".to_string(),
            login_time: "2026-01-01T00:00:00+00:00".to_string(),
            ip_address: "192.0.2.1".to_string(),
        }
    }

    fn test_instruments() -> EmitterInstruments {
        EmitterInstruments::new(&opentelemetry::global::meter("session-pulse-tests"))
    }

    struct FixedSource {
        calls: Arc<AtomicUsize>,
    }

    impl SessionSource for FixedSource {
        fn next_session(&self) -> SessionEvent {
            self.calls.fetch_add(1, Ordering::SeqCst);
            test_event()
        }
    }

    struct DelayedSource {
        delay: Duration,
    }

    impl SessionSource for DelayedSource {
        fn next_session(&self) -> SessionEvent {
            std::thread::sleep(self.delay);
            test_event()
        }
    }

    /// Fails on one specific call (1-based), succeeds otherwise.
    struct FlakySerializer {
        fail_on: usize,
        calls: Arc<AtomicUsize>,
    }

    impl EventSerializer for FlakySerializer {
        fn serialize(&self, event: &SessionEvent) -> Result<String, SerializeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                Err(SerializeError::new("injected failure"))
            } else {
                JsonSerializer.serialize(event)
            }
        }
    }

    struct AlwaysFailingSerializer;

    impl EventSerializer for AlwaysFailingSerializer {
        fn serialize(&self, _event: &SessionEvent) -> Result<String, SerializeError> {
            Err(SerializeError::new("injected failure"))
        }
    }

    /// Captures (level, message) pairs for emitted events.
    #[derive(Clone)]
    struct SpyLayer {
        events: Arc<Mutex<Vec<(Level, String)>>>,
    }

    struct MessageVisitor {
        message: String,
    }

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.message = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for SpyLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor {
                message: String::new(),
            };
            event.record(&mut visitor);
            self.events
                .lock()
                .expect("spy lock")
                .push((*event.metadata().level(), visitor.message));
        }
    }

    fn spy() -> (SpyLayer, Arc<Mutex<Vec<(Level, String)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            SpyLayer {
                events: events.clone(),
            },
            events,
        )
    }

    fn cycle_logs(events: &[(Level, String)]) -> Vec<(Level, String)> {
        events
            .iter()
            .filter(|(_, msg)| msg == "new session event" || msg == "failed to serialize session event")
            .cloned()
            .collect()
    }

    #[test]
    fn successful_cycle_emits_one_info_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let emitter = Emitter::new(
            Duration::from_secs(1),
            FixedSource {
                calls: calls.clone(),
            },
            JsonSerializer,
            test_instruments(),
        );

        let (layer, events) = spy();
        let outcome = tracing::subscriber::with_default(
            tracing_subscriber::registry().with(layer),
            || emitter.run_cycle(),
        );

        assert!(matches!(outcome, CycleOutcome::Emitted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let logs = cycle_logs(&events.lock().expect("spy lock"));
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, Level::INFO);
    }

    #[test]
    fn failed_cycle_emits_one_error_entry() {
        let emitter = Emitter::new(
            Duration::from_secs(1),
            FixedSource {
                calls: Arc::new(AtomicUsize::new(0)),
            },
            AlwaysFailingSerializer,
            test_instruments(),
        );

        let (layer, events) = spy();
        let outcome = tracing::subscriber::with_default(
            tracing_subscriber::registry().with(layer),
            || emitter.run_cycle(),
        );

        assert!(matches!(outcome, CycleOutcome::Failed));
        let logs = cycle_logs(&events.lock().expect("spy lock"));
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, Level::ERROR);
    }

    #[test]
    fn cycle_duration_covers_generation_delay() {
        let delay = Duration::from_millis(25);
        let emitter = Emitter::new(
            Duration::from_secs(1),
            DelayedSource { delay },
            JsonSerializer,
            test_instruments(),
        );

        match emitter.run_cycle() {
            CycleOutcome::Emitted { elapsed } => assert!(elapsed >= delay),
            CycleOutcome::Failed => panic!("cycle must succeed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_one_cycle_per_interval_until_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let emitter = Emitter::new(
            Duration::from_secs(1),
            FixedSource {
                calls: calls.clone(),
            },
            JsonSerializer,
            test_instruments(),
        );

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(emitter.run(rx));

        // 3.5 virtual seconds cover the ticks at 1s, 2s and 3s.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).expect("signal shutdown");
        assert_ok!(worker.await);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_second_cycle_is_contained() {
        use tracing::instrument::WithSubscriber;

        let serializer_calls = Arc::new(AtomicUsize::new(0));
        let emitter = Emitter::new(
            Duration::from_secs(1),
            FixedSource {
                calls: Arc::new(AtomicUsize::new(0)),
            },
            FlakySerializer {
                fail_on: 2,
                calls: serializer_calls.clone(),
            },
            test_instruments(),
        );

        let (layer, events) = spy();
        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(
            emitter
                .run(rx)
                .with_subscriber(tracing_subscriber::registry().with(layer)),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).expect("signal shutdown");
        assert_ok!(worker.await);

        assert_eq!(serializer_calls.load(Ordering::SeqCst), 3);
        let logs = cycle_logs(&events.lock().expect("spy lock"));
        let levels: Vec<Level> = logs.iter().map(|(level, _)| *level).collect();
        assert_eq!(levels, vec![Level::INFO, Level::ERROR, Level::INFO]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sender_is_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let emitter = Emitter::new(
            Duration::from_secs(1),
            FixedSource {
                calls: calls.clone(),
            },
            JsonSerializer,
            test_instruments(),
        );

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(emitter.run(rx));
        drop(tx);

        assert_ok!(worker.await);
    }
}
