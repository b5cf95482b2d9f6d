use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(5000);

/// Last accepted detection for one scanning session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionState {
    pub last_text: String,
    /// `None` is the "far past" sentinel, so the first detection is never
    /// blocked by the cooldown.
    pub last_timestamp: Option<Instant>,
    pub cooldown: Duration,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl DetectionState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_text: String::new(),
            last_timestamp: None,
            cooldown,
        }
    }

    /// Record an accepted detection. The stored timestamp never moves
    /// backwards.
    pub fn commit(&mut self, text: impl Into<String>, now: Instant) {
        self.last_text = text.into();
        self.last_timestamp = Some(match self.last_timestamp {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    /// Back to the initial sentinel, keeping the configured cooldown
    pub fn reset(&mut self) {
        self.last_text.clear();
        self.last_timestamp = None;
    }
}

/// Outcome of a debounce check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Emit,
    SuppressedCooldown,
    SuppressedDuplicate,
}

impl Decision {
    pub fn is_emit(self) -> bool {
        matches!(self, Decision::Emit)
    }
}

/// Stateless gate over a `DetectionState`.
///
/// The check never mutates state; callers that act on `Decision::Emit`
/// commit through `DetectionState::commit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionDebouncer;

impl DetectionDebouncer {
    pub fn should_emit(&self, candidate: &str, now: Instant, state: &DetectionState) -> Decision {
        if let Some(last) = state.last_timestamp {
            if now.saturating_duration_since(last) < state.cooldown {
                return Decision::SuppressedCooldown;
            }
        }

        if candidate == state.last_text {
            return Decision::SuppressedDuplicate;
        }

        Decision::Emit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_millis(5000);

    #[test]
    fn first_detection_is_never_blocked() {
        let state = DetectionState::new(COOLDOWN);
        let decision = DetectionDebouncer.should_emit("Privacy Policy", Instant::now(), &state);
        assert_eq!(decision, Decision::Emit);
    }

    #[test]
    fn identical_text_inside_cooldown_is_suppressed() {
        let start = Instant::now();
        let mut state = DetectionState::new(COOLDOWN);
        state.commit("Privacy Policy", start);

        let decision = DetectionDebouncer.should_emit(
            "Privacy Policy",
            start + Duration::from_millis(1000),
            &state,
        );
        assert_eq!(decision, Decision::SuppressedCooldown);
    }

    #[test]
    fn different_text_inside_cooldown_is_still_suppressed() {
        let start = Instant::now();
        let mut state = DetectionState::new(COOLDOWN);
        state.commit("Privacy Policy", start);

        let decision =
            DetectionDebouncer.should_emit("Terms of Use", start + Duration::from_millis(4999), &state);
        assert_eq!(decision, Decision::SuppressedCooldown);
    }

    #[test]
    fn identical_text_after_cooldown_is_suppressed() {
        let start = Instant::now();
        let mut state = DetectionState::new(COOLDOWN);
        state.commit("Privacy Policy", start);

        let decision = DetectionDebouncer.should_emit(
            "Privacy Policy",
            start + Duration::from_secs(60),
            &state,
        );
        assert_eq!(decision, Decision::SuppressedDuplicate);
    }

    #[test]
    fn changed_text_after_cooldown_emits() {
        let start = Instant::now();
        let mut state = DetectionState::new(COOLDOWN);
        state.commit("Privacy Policy", start);

        let decision =
            DetectionDebouncer.should_emit("Terms of Use", start + Duration::from_millis(5000), &state);
        assert!(decision.is_emit());
    }

    #[test]
    fn check_does_not_mutate_state() {
        let state = DetectionState::new(COOLDOWN);
        let before = state.clone();
        let _ = DetectionDebouncer.should_emit("anything", Instant::now(), &state);
        assert_eq!(state, before);
    }

    #[test]
    fn commit_keeps_timestamp_monotonic() {
        let start = Instant::now();
        let mut state = DetectionState::new(COOLDOWN);
        state.commit("later", start + Duration::from_secs(10));
        state.commit("earlier", start);

        assert_eq!(state.last_timestamp, Some(start + Duration::from_secs(10)));
        assert_eq!(state.last_text, "earlier");
    }

    #[test]
    fn reset_restores_sentinel() {
        let mut state = DetectionState::new(Duration::from_millis(250));
        state.commit("text", Instant::now());
        state.reset();

        assert_eq!(state.last_timestamp, None);
        assert!(state.last_text.is_empty());
        assert_eq!(state.cooldown, Duration::from_millis(250));
    }
}
