//! Detector pipeline coordinator.
//! Raw threshold crossings and periodic ticks are messages delivered to one
//! event-loop thread that owns all session mutation, processed strictly in
//! arrival order. Queries go through the controller's locked accessors and
//! are valid in any state.

pub mod classifier;
pub mod gate;
pub mod quantizer;
pub mod window;

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel as cb;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Timebase;
use crate::epoch::SessionEpoch;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::{ListenState, StateMachine};
use self::classifier::Classifier;
use self::gate::InvocationGate;
use self::quantizer::{Quantizer, RawEvent};
use self::window::SampleWindow;

/// Detector tuning.
pub struct DetectorConfig {
    /// Width of one quantized slot in milliseconds.
    pub sample_size_ms: u32,
    /// Slots in the classification window (the classifier's input size).
    pub window_slots: usize,
    /// Period of the tick that drives classification.
    pub tick_period_ms: u64,
    /// Capture sample rate for the microphone source, mono.
    pub sample_rate: u32,
    /// RMS at or above which the level counts as a loud crossing.
    pub level_high: f32,
    /// RMS at or below which the level counts as a quiet crossing.
    pub level_low: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_size_ms: 40,
            window_slots: 75, // 3 seconds of history at 40 ms per slot
            tick_period_ms: 50,
            sample_rate: 16000,
            level_high: 1200.0, // raw i16 RMS
            level_low: 300.0,
        }
    }
}

/// Messages delivered to the event loop. Each carries the session epoch it
/// was produced under so restarts can shed stale queue contents.
#[derive(Debug)]
pub enum DetectorEvent {
    /// Threshold crossing from the microphone source, with the timebase
    /// reading captured at the moment of the crossing.
    Level {
        raw: RawEvent,
        at_ms: u32,
        epoch: u64,
        enqueued_at: Instant,
    },
    /// Periodic tick that drives gate + classifier.
    Tick { epoch: u64, enqueued_at: Instant },
}

/// Per-session state. Replaced wholesale on every start.
struct Session {
    id: String,
    start_ms: u32,
    quantizer: Quantizer,
    window: SampleWindow,
    gate: InvocationGate,
    detected: bool,
}

impl Session {
    fn new(config: &DetectorConfig, start_ms: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_ms,
            quantizer: Quantizer::new(config.sample_size_ms),
            window: SampleWindow::new(config.window_slots),
            gate: InvocationGate::new(),
            detected: false,
        }
    }
}

/// Controller: the public operation surface plus the session it guards.
/// Mutation happens only on the event-loop thread; queries take the session
/// lock briefly and never change the listening state.
pub struct Detector {
    config: DetectorConfig,
    state: StateMachine,
    session: Mutex<Session>,
    classifier: Mutex<Box<dyn Classifier>>,
    epoch: Arc<SessionEpoch>,
    timebase: Arc<dyn Timebase>,
    metrics: Arc<MetricsRegistry>,
}

impl Detector {
    pub fn new(
        config: DetectorConfig,
        timebase: Arc<dyn Timebase>,
        classifier: Box<dyn Classifier>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let session = Session::new(&config, 0);
        Self {
            config,
            state: StateMachine::new(),
            session: Mutex::new(session),
            classifier: Mutex::new(classifier),
            epoch: Arc::new(SessionEpoch::new()),
            timebase,
            metrics,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Epoch counter shared with event producers for stamping.
    pub fn epoch(&self) -> Arc<SessionEpoch> {
        Arc::clone(&self.epoch)
    }

    pub fn timebase(&self) -> Arc<dyn Timebase> {
        Arc::clone(&self.timebase)
    }

    /// Begin a listening session. Resets all session state, zeroes the
    /// session clock, and invalidates events queued under any prior session.
    /// Valid both from idle and as a re-start while already listening.
    pub fn start_listening(&self) -> Result<(), String> {
        self.state.transition(ListenState::Listening)?;
        let epoch = self.epoch.advance();
        let mut session = self.session.lock();
        *session = Session::new(&self.config, self.timebase.now_ms());
        self.classifier.lock().reset();
        info!(session_id = %session.id, epoch, "listening_started");
        Ok(())
    }

    /// Halt event processing. Session state is retained read-only until the
    /// next start. Safe to call at any point, including when already idle.
    pub fn stop(&self) {
        if self.state.current() == ListenState::Idle {
            return;
        }
        self.state.force_idle();
    }

    pub fn is_listening(&self) -> bool {
        self.state.current() == ListenState::Listening
    }

    /// Subscribe to listening-state changes.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ListenState> {
        self.state.subscribe()
    }

    /// Sticky detection flag, read-and-clear. False before the first start.
    pub fn was_detected(&self) -> bool {
        let mut session = self.session.lock();
        std::mem::take(&mut session.detected)
    }

    /// Window contents in chronological order, oldest slot first, length =
    /// `window_slots`. All false before the first session writes anything.
    pub fn debug_snapshot(&self) -> Vec<bool> {
        self.session.lock().window.snapshot()
    }

    /// Fold one threshold crossing into the window. Event-loop thread only.
    fn on_level(&self, raw: RawEvent, at_ms: u32) {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let elapsed_ms = at_ms.wrapping_sub(session.start_ms);
        let filled = session
            .quantizer
            .advance(raw, elapsed_ms, &mut session.window);
        if filled > 0 {
            self.metrics
                .record(metric_names::BACKFILL_SLOTS, filled as f64);
            debug!(
                tick = session.quantizer.current_tick(),
                filled,
                event = ?raw,
                "slots_quantized"
            );
        }
    }

    /// Run the classifier if the session reached a tick it has not been run
    /// for yet. Event-loop thread only.
    fn on_tick(&self) {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let tick = session.quantizer.current_tick();
        if !session.gate.should_invoke(tick) {
            return;
        }

        let snapshot = session.window.snapshot();
        let run_start = Instant::now();
        let hit = self.classifier.lock().classify(&snapshot);
        self.metrics.record(
            metric_names::CLASSIFIER_RUN,
            run_start.elapsed().as_micros() as f64,
        );

        if hit {
            // Latched until the next was_detected; later misses never clear it.
            session.detected = true;
            info!(session_id = %session.id, tick, "pattern_detected");
        }
    }
}

/// Handle that keeps the event loop alive; joins the thread on drop.
/// The loop exits once every event sender has been dropped.
pub struct DetectorHandle {
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the event-loop thread: the single writer for all session state.
pub fn spawn_event_loop(rx: cb::Receiver<DetectorEvent>, detector: Arc<Detector>) -> DetectorHandle {
    let thread = std::thread::Builder::new()
        .name("detector-events".into())
        .spawn(move || {
            info!("detector event loop started");
            loop {
                match rx.recv() {
                    Ok(event) => handle_event(&detector, event),
                    Err(cb::RecvError) => {
                        info!("detector event channel closed, exiting loop");
                        break;
                    }
                }
            }
        })
        .expect("failed to spawn detector event thread");
    DetectorHandle {
        thread: Some(thread),
    }
}

fn handle_event(detector: &Detector, event: DetectorEvent) {
    match event {
        DetectorEvent::Level {
            raw,
            at_ms,
            epoch,
            enqueued_at,
        } => {
            detector.metrics.record(
                metric_names::EVENT_QUEUE_WAIT,
                enqueued_at.elapsed().as_micros() as f64,
            );
            if !detector.epoch.is_current(epoch) {
                debug!(epoch, "stale level event dropped");
                return;
            }
            if detector.state.current() != ListenState::Listening {
                return;
            }
            detector.on_level(raw, at_ms);
        }
        DetectorEvent::Tick { epoch, enqueued_at } => {
            detector.metrics.record(
                metric_names::EVENT_QUEUE_WAIT,
                enqueued_at.elapsed().as_micros() as f64,
            );
            if !detector.epoch.is_current(epoch) {
                debug!(epoch, "stale tick dropped");
                return;
            }
            if detector.state.current() != ListenState::Listening {
                return;
            }
            detector.on_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Timebase the test moves by hand.
    struct ManualTimebase(AtomicU32);

    impl ManualTimebase {
        fn set(&self, ms: u32) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Timebase for ManualTimebase {
        fn now_ms(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Classifier returning a scripted sequence of results, then false.
    struct Scripted(VecDeque<bool>);

    impl Classifier for Scripted {
        fn classify(&mut self, _window: &[bool]) -> bool {
            self.0.pop_front().unwrap_or(false)
        }

        fn reset(&mut self) {}
    }

    fn detector_with(
        results: &[bool],
    ) -> (Arc<Detector>, Arc<ManualTimebase>) {
        let timebase = Arc::new(ManualTimebase(AtomicU32::new(0)));
        let detector = Arc::new(Detector::new(
            DetectorConfig::default(),
            Arc::clone(&timebase) as Arc<dyn Timebase>,
            Box::new(Scripted(results.iter().copied().collect())),
            Arc::new(MetricsRegistry::new()),
        ));
        (detector, timebase)
    }

    fn level(detector: &Detector, raw: RawEvent, at_ms: u32) {
        handle_event(
            detector,
            DetectorEvent::Level {
                raw,
                at_ms,
                epoch: detector.epoch.current(),
                enqueued_at: Instant::now(),
            },
        );
    }

    fn tick(detector: &Detector) {
        handle_event(
            detector,
            DetectorEvent::Tick {
                epoch: detector.epoch.current(),
                enqueued_at: Instant::now(),
            },
        );
    }

    #[test]
    fn queries_before_first_start_return_defaults() {
        let (detector, _) = detector_with(&[]);
        assert!(!detector.is_listening());
        assert!(!detector.was_detected());
        let snapshot = detector.debug_snapshot();
        assert_eq!(snapshot.len(), 75);
        assert!(snapshot.iter().all(|&slot| !slot));
    }

    #[test]
    fn events_while_idle_are_dropped() {
        let (detector, _) = detector_with(&[true]);
        level(&detector, RawEvent::Loud, 0);
        level(&detector, RawEvent::Quiet, 200);
        tick(&detector);
        assert!(!detector.was_detected());
        assert!(detector.debug_snapshot().iter().all(|&slot| !slot));
    }

    #[test]
    fn two_event_fixture_fills_the_first_slot() {
        let (detector, timebase) = detector_with(&[]);
        detector.start_listening().unwrap();

        level(&detector, RawEvent::Loud, 0);
        timebase.set(41);
        level(&detector, RawEvent::Quiet, 41);

        let snapshot = detector.debug_snapshot();
        assert_eq!(snapshot[..2], [true, false]);
        assert!(snapshot[2..].iter().all(|&slot| !slot));
    }

    #[test]
    fn session_clock_starts_at_the_listen_call() {
        let (detector, timebase) = detector_with(&[]);
        timebase.set(10_000);
        detector.start_listening().unwrap();

        // 10 041 ms absolute is 41 ms into the session: tick 1.
        level(&detector, RawEvent::Loud, 10_000);
        level(&detector, RawEvent::Quiet, 10_041);
        assert_eq!(detector.debug_snapshot()[..2], [true, false]);
    }

    #[test]
    fn detection_is_sticky_until_read_then_clears() {
        let (detector, _) = detector_with(&[true, false, false]);
        detector.start_listening().unwrap();

        level(&detector, RawEvent::Loud, 0);
        level(&detector, RawEvent::Quiet, 50);
        tick(&detector); // scripted true → latched

        // Subsequent negative classifications must not clear the latch.
        level(&detector, RawEvent::Quiet, 100);
        tick(&detector);
        level(&detector, RawEvent::Quiet, 150);
        tick(&detector);

        assert!(detector.was_detected());
        assert!(!detector.was_detected()); // read-and-clear
    }

    #[test]
    fn classifier_runs_once_per_new_tick() {
        // Script has exactly one `true`; if the gate let the same tick
        // through twice, the second run would consume the scripted false
        // and detection order would show it.
        let (detector, _) = detector_with(&[false, true]);
        detector.start_listening().unwrap();

        level(&detector, RawEvent::Loud, 0);
        level(&detector, RawEvent::Quiet, 50); // tick 1
        tick(&detector); // consumes scripted false
        tick(&detector); // same tick: gated, script untouched
        assert!(!detector.was_detected());

        level(&detector, RawEvent::Quiet, 100); // tick 2
        tick(&detector); // consumes scripted true
        assert!(detector.was_detected());
    }

    #[test]
    fn restart_resets_window_gate_and_flag() {
        let (detector, timebase) = detector_with(&[true]);
        detector.start_listening().unwrap();

        level(&detector, RawEvent::Loud, 0);
        for ms in (50..4000).step_by(50) {
            level(&detector, RawEvent::Loud, ms);
        }
        tick(&detector);
        assert!(detector.debug_snapshot().iter().any(|&slot| slot));

        timebase.set(5000);
        detector.start_listening().unwrap();
        assert!(detector.debug_snapshot().iter().all(|&slot| !slot));
        assert!(!detector.was_detected());
    }

    #[test]
    fn stale_epoch_events_are_dropped_after_restart() {
        let (detector, _) = detector_with(&[]);
        detector.start_listening().unwrap();
        let old_epoch = detector.epoch.current();

        detector.start_listening().unwrap(); // re-start advances the epoch

        handle_event(
            &detector,
            DetectorEvent::Level {
                raw: RawEvent::Loud,
                at_ms: 0,
                epoch: old_epoch,
                enqueued_at: Instant::now(),
            },
        );
        handle_event(
            &detector,
            DetectorEvent::Level {
                raw: RawEvent::Quiet,
                at_ms: 200,
                epoch: old_epoch,
                enqueued_at: Instant::now(),
            },
        );
        assert!(detector.debug_snapshot().iter().all(|&slot| !slot));
    }

    #[test]
    fn stop_retains_state_read_only() {
        let (detector, _) = detector_with(&[]);
        detector.start_listening().unwrap();
        level(&detector, RawEvent::Loud, 0);
        level(&detector, RawEvent::Quiet, 50);

        detector.stop();
        assert!(!detector.is_listening());
        // Snapshot survives the stop, and further events are ignored.
        assert_eq!(detector.debug_snapshot()[0], true);
        level(&detector, RawEvent::Loud, 100);
        level(&detector, RawEvent::Quiet, 400);
        assert_eq!(detector.debug_snapshot()[..2], [true, false]);

        detector.stop(); // redundant stop is a no-op
    }

    #[test]
    fn event_loop_thread_processes_and_exits_on_disconnect() {
        let (detector, _) = detector_with(&[true]);
        detector.start_listening().unwrap();
        let (tx, rx) = cb::unbounded();
        let handle = spawn_event_loop(rx, Arc::clone(&detector));

        let epoch = detector.epoch.current();
        tx.send(DetectorEvent::Level {
            raw: RawEvent::Loud,
            at_ms: 0,
            epoch,
            enqueued_at: Instant::now(),
        })
        .unwrap();
        tx.send(DetectorEvent::Level {
            raw: RawEvent::Quiet,
            at_ms: 50,
            epoch,
            enqueued_at: Instant::now(),
        })
        .unwrap();
        tx.send(DetectorEvent::Tick {
            epoch,
            enqueued_at: Instant::now(),
        })
        .unwrap();

        drop(tx);
        drop(handle); // joins: all sends processed in order

        assert!(detector.was_detected());
        assert_eq!(detector.debug_snapshot()[0], true);
    }
}
