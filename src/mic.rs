//! Microphone source: cpal capture reduced to threshold-crossing events,
//! plus the periodic tick that drives classification.
//! The capture callback computes one RMS per buffer and only enqueues a
//! message when the level crosses out of its current band — mirroring the
//! level-threshold interrupt of a microphone peripheral. The callback does
//! no allocation and never blocks beyond the channel send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as cb;
use tracing::{error, info};

use crate::clock::Timebase;
use crate::detector::quantizer::RawEvent;
use crate::detector::{DetectorConfig, DetectorEvent};
use crate::epoch::SessionEpoch;

/// RMS energy over a buffer of PCM samples.
#[inline]
pub fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let f = s as f64;
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Which side of the threshold band the level was last on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelBand {
    Low,
    Mid,
    High,
}

/// Turns per-buffer RMS readings into Loud/Quiet crossings, one per band
/// change. Re-readings inside the same band produce nothing.
struct ThresholdCrossing {
    low: f32,
    high: f32,
    band: LevelBand,
}

impl ThresholdCrossing {
    fn new(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            band: LevelBand::Mid,
        }
    }

    fn process(&mut self, rms: f32) -> Option<RawEvent> {
        let band = if rms >= self.high {
            LevelBand::High
        } else if rms <= self.low {
            LevelBand::Low
        } else {
            LevelBand::Mid
        };
        if band == self.band {
            return None;
        }
        self.band = band;
        match band {
            LevelBand::High => Some(RawEvent::Loud),
            LevelBand::Low => Some(RawEvent::Quiet),
            LevelBand::Mid => None,
        }
    }
}

/// Keeps the capture stream and tick thread alive. Stops both on drop.
pub struct MicHandle {
    _stream: cpal::Stream,
    stop_flag: Arc<AtomicBool>,
    tick_thread: Option<std::thread::JoinHandle<()>>,
}

impl MicHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for MicHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.tick_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start the microphone source: capture stream + periodic tick thread, both
/// feeding the detector event channel.
pub fn start_mic_source(
    config: &DetectorConfig,
    tx: cb::Sender<DetectorEvent>,
    timebase: Arc<dyn Timebase>,
    epoch: Arc<SessionEpoch>,
) -> Result<MicHandle, String> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or("no audio input device available")?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut crossing = ThresholdCrossing::new(config.level_low, config.level_high);
    let level_tx = tx.clone();
    let level_timebase = Arc::clone(&timebase);
    let level_epoch = Arc::clone(&epoch);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Some(raw) = crossing.process(compute_rms(data)) {
                    let _ = level_tx.send(DetectorEvent::Level {
                        raw,
                        at_ms: level_timebase.now_ms(),
                        epoch: level_epoch.current(),
                        enqueued_at: Instant::now(),
                    });
                }
            },
            |err| {
                error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| format!("failed to build input stream: {e}"))?;

    stream
        .play()
        .map_err(|e| format!("failed to start audio stream: {e}"))?;
    info!("audio capture stream started");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_tick = Arc::clone(&stop_flag);
    let tick_period = Duration::from_millis(config.tick_period_ms);
    let tick_thread = std::thread::Builder::new()
        .name("detector-tick".into())
        .spawn(move || {
            while !stop_tick.load(Ordering::Relaxed) {
                std::thread::sleep(tick_period);
                if tx
                    .send(DetectorEvent::Tick {
                        epoch: epoch.current(),
                        enqueued_at: Instant::now(),
                    })
                    .is_err()
                {
                    break;
                }
            }
            info!("tick thread stopping");
        })
        .map_err(|e| format!("failed to spawn tick thread: {e}"))?;

    Ok(MicHandle {
        _stream: stream,
        stop_flag,
        tick_thread: Some(tick_thread),
    })
}
