//! Stall detection and automatic restart for a playing session.

use radio_types::PlaybackState;

use crate::engine::Shared;
use crate::events::EngineEvent;
use crate::session::Session;

/// Poll the sink until the session is cancelled, restarting output whenever the
/// sink has gone quiet.
///
/// A restart reuses the source that originally started playback. A failed restart
/// leaves the session Stalled and is retried on the next tick.
pub(crate) fn watch(shared: &Shared, session: &Session) {
    loop {
        std::thread::sleep(shared.config.poll_interval);
        if session.cancel.is_cancelled() {
            break;
        }
        if shared.sink.is_busy() {
            continue;
        }
        let Some(source) = session.source() else {
            break;
        };
        if !session.transition(PlaybackState::Stalled) {
            break;
        }
        tracing::info!(session = session.id, source = %source, "output stalled, restarting");

        let restarted = {
            let _sink = shared.lock_sink();
            if session.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = shared.sink.load(&source) {
                tracing::warn!(session = session.id, error = %e, "stall restart: reload failed");
                continue;
            }
            let _gate = shared.lock_gate();
            if session.cancel.is_cancelled() {
                break;
            }
            shared.sink.set_volume(shared.volume_level());
            shared.sink.play(true)
        };
        match restarted {
            Ok(()) => {
                let restarts = session.record_restart();
                if !session.transition(PlaybackState::Playing) {
                    break;
                }
                shared.emit(EngineEvent::StallRecovered {
                    session: session.id,
                    restarts,
                });
            }
            Err(e) => {
                tracing::warn!(session = session.id, error = %e, "stall restart: play failed");
            }
        }
    }
    tracing::debug!(session = session.id, "liveness loop exited");
}
