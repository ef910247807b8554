//! The frame loop: ticks the world at a fixed rate and publishes each frame.

use crate::AppState;
use hamlet_engine::FrameRecorder;
use hamlet_protocol::Frame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Tick the world once and package the drawing as frame `seq`.
pub fn render_frame<R: Rng + ?Sized>(state: &AppState, seq: u64, rng: &mut R) -> Frame {
    let (width, height) = state.surface;
    let mut recorder = FrameRecorder::new(width, height);
    state.world().tick(&mut recorder, rng);
    recorder.finish(seq)
}

/// Run until `stop` turns true (or its sender goes away). Resolves to the
/// number of frames rendered.
pub fn spawn_animator(
    state: Arc<AppState>,
    fps: u32,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rng = StdRng::from_entropy();
        let mut seq = 0u64;

        tracing::info!(fps, "animator started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    seq += 1;
                    let frame = render_frame(&state, seq, &mut rng);
                    state.frames.send_replace(frame);
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(frames = seq, "animator stopped");
        seq
    })
}
