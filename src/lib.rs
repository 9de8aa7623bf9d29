//! clapsense: sound-event quantization + sliding-window clap detection.
//! Pipeline: microphone threshold crossings → quantizer → sample window →
//! invocation gate → classifier → sticky detection flag.

pub mod clock;
pub mod detector;
pub mod epoch;
pub mod metrics;
pub mod mic;
pub mod state_machine;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use clock::{MonotonicTimebase, Timebase};
use detector::classifier::OldestSlotStub;
use detector::{spawn_event_loop, Detector, DetectorConfig};
use metrics::MetricsRegistry;

/// Build the full pipeline and poll detections until the process is killed.
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clapsense=debug".parse().unwrap()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("clapsense starting");

    let metrics = Arc::new(MetricsRegistry::new());
    let timebase: Arc<dyn Timebase> = Arc::new(MonotonicTimebase::new());
    let detector = Arc::new(Detector::new(
        DetectorConfig::default(),
        Arc::clone(&timebase),
        Box::new(OldestSlotStub),
        Arc::clone(&metrics),
    ));

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let _event_loop = spawn_event_loop(event_rx, Arc::clone(&detector));

    let _mic = match mic::start_mic_source(
        detector.config(),
        event_tx,
        Arc::clone(&timebase),
        detector.epoch(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "microphone source failed to start (no input device?)");
            None
        }
    };

    if let Err(e) = detector.start_listening() {
        warn!(error = %e, "start_listening rejected");
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
        if detector.was_detected() {
            let snapshot = detector.debug_snapshot();
            info!(window = %serde_json::json!(snapshot), "clap pattern detected");
        }
    }
}
