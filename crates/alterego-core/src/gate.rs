//! Capture gate: rate-limits saves after a face has been recorded.
//!
//! Any frame with a face puts the gate into `Cooldown(0)`. Each following
//! empty frame counts up; once `threshold` consecutive empty frames have
//! been seen the gate is `Armed` again.

/// Consecutive empty frames required before saving is re-enabled.
pub const DEFAULT_COOLDOWN_FRAMES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// The next frame with a face may be saved.
    Armed,
    /// `n` consecutive empty frames seen since the last face.
    Cooldown(u32),
}

/// When detections are allowed through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePolicy {
    /// Save only when the gate is armed at the start of the frame.
    #[default]
    Enforce,
    /// Save every frame with a face; the gate still tracks its counter.
    SaveEveryDetection,
}

#[derive(Debug, Clone)]
pub struct CaptureGate {
    state: GateState,
    threshold: u32,
    policy: GatePolicy,
}

impl CaptureGate {
    pub fn new(threshold: u32) -> Self {
        Self::with_policy(threshold, GatePolicy::Enforce)
    }

    pub fn with_policy(threshold: u32, policy: GatePolicy) -> Self {
        Self {
            state: GateState::Armed,
            threshold,
            policy,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == GateState::Armed
    }

    /// Feed one frame's detection count; returns whether to save them.
    pub fn observe(&mut self, detections: usize) -> bool {
        let was_armed = self.is_armed();

        self.state = match (detections, self.state) {
            (0, GateState::Armed) => GateState::Armed,
            (0, GateState::Cooldown(n)) if n + 1 >= self.threshold => GateState::Armed,
            (0, GateState::Cooldown(n)) => GateState::Cooldown(n + 1),
            (_, _) => GateState::Cooldown(0),
        };

        detections > 0
            && match self.policy {
                GatePolicy::Enforce => was_armed,
                GatePolicy::SaveEveryDetection => true,
            }
    }
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_FRAMES)
    }
}
