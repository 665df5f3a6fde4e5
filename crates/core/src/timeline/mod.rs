use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{Move, PoseSample, PoseSink, Result};

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f64) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// Cloneable stop signal shared between the scheduler and whoever may end a
/// session early.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Plays queued moves one after another on a shared clock.
#[derive(Default)]
pub struct MoveQueue {
    moves: VecDeque<Box<dyn Move + Send>>,
    clock: PlaybackClock,
    handle: SessionHandle,
}

impl MoveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that stops the queue from another thread.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn queue_move(&mut self, next: Box<dyn Move + Send>) {
        if self.moves.is_empty() {
            self.clock.reset();
        }
        self.moves.push_back(next);
    }

    /// Drops every queued move, including the active one.
    pub fn clear_move_queue(&mut self) {
        if !self.moves.is_empty() {
            tracing::info!(dropped = self.moves.len(), "move queue cleared");
        }
        self.moves.clear();
        self.clock.reset();
    }

    pub fn is_idle(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Local time of the active move.
    pub fn elapsed(&self) -> f64 {
        self.clock.time_seconds
    }

    /// Advances the clock by `delta` and evaluates the active move.
    ///
    /// Returns `None` once the queue is empty or a stop was requested.
    pub fn tick(&mut self, delta: f64) -> Option<PoseSample> {
        if self.handle.is_stop_requested() {
            self.handle.stop.store(false, Ordering::SeqCst);
            self.clear_move_queue();
            return None;
        }

        self.clock.advance(delta);
        while let Some(active) = self.moves.front() {
            let duration = active.duration();
            if self.clock.time_seconds < duration {
                break;
            }
            self.clock.time_seconds -= duration;
            self.moves.pop_front();
            tracing::debug!(remaining = self.moves.len(), "move finished");
        }

        let t = self.clock.time_seconds;
        self.moves.front_mut().map(|active| active.evaluate(t))
    }

    /// Ticks once and forwards the resulting target to `sink`.
    pub fn drive(&mut self, delta: f64, sink: &mut dyn PoseSink) -> Result<bool> {
        match self.tick(delta) {
            Some(sample) => {
                sink.set_target(&sample, delta)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for MoveQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveQueue")
            .field("moves", &self.moves.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BreathingMove, SessionConfig, TracingPoseSink};

    struct Hold {
        seconds: f64,
        evaluated: Vec<f64>,
    }

    impl Move for Hold {
        fn duration(&self) -> f64 {
            self.seconds
        }

        fn evaluate(&mut self, t: f64) -> PoseSample {
            self.evaluated.push(t);
            PoseSample::new([0.0; 3], 0.0, 0.0, self.seconds)
        }
    }

    fn hold(seconds: f64) -> Box<dyn Move + Send> {
        Box::new(Hold {
            seconds,
            evaluated: Vec::new(),
        })
    }

    #[test]
    fn clock_never_goes_negative() {
        let mut clock = PlaybackClock::default();
        clock.advance(1.5);
        clock.advance(-4.0);
        assert_eq!(clock.time_seconds, 0.0);
    }

    #[test]
    fn plays_moves_in_order() {
        let mut queue = MoveQueue::new();
        queue.queue_move(hold(1.0));
        queue.queue_move(hold(2.0));

        assert_eq!(queue.tick(0.5).map(|s| s.yaw_deg), Some(1.0));
        assert_eq!(queue.tick(0.75).map(|s| s.yaw_deg), Some(2.0));
        assert!((queue.elapsed() - 0.25).abs() < 1e-12);
        assert_eq!(queue.tick(2.0), None);
        assert!(queue.is_idle());
    }

    #[test]
    fn stop_request_clears_queue() {
        let mut queue = MoveQueue::new();
        let handle = queue.handle();
        queue.queue_move(hold(10.0));
        assert!(queue.tick(0.1).is_some());

        handle.request_stop();
        assert_eq!(queue.tick(0.1), None);
        assert!(queue.is_empty());

        queue.queue_move(hold(10.0));
        assert!(queue.tick(0.1).is_some());
    }

    #[test]
    fn drives_breathing_session_into_pose_sink() {
        let config = SessionConfig {
            voice_guidance: false,
            ..SessionConfig::new(3, 5.0, 8.0).unwrap()
        };
        let mut queue = MoveQueue::new();
        queue.queue_move(Box::new(BreathingMove::new(config).unwrap()));

        let mut sink = TracingPoseSink::new();
        let mut ticks = 0;
        while queue.drive(0.5, &mut sink).unwrap() {
            ticks += 1;
        }
        assert_eq!(ticks, 359);
        assert_eq!(sink.applied(), 359);
    }
}
