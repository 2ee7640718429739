use super::utterance;
use shared::{DetectionMode, PredictionSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What has been said so far in this session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpokenState {
    pub last_utterance: Option<String>,
    /// Cooldown anchor. `None` until something is spoken or a detection gap
    /// resets it.
    pub last_spoken_at: Option<Instant>,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A new utterance was accepted and should be spoken.
    Speak(String),
    /// Nothing above threshold.
    NoDetection,
    /// The candidate equals the last spoken utterance.
    Repeat,
    /// A new candidate exists but the cooldown has not elapsed.
    CoolingDown(String),
}

impl Decision {
    pub fn utterance(&self) -> Option<&str> {
        match self {
            Decision::Speak(text) => Some(text),
            _ => None,
        }
    }
}

/// Turns per-tick prediction sets into at most one utterance, applying the
/// confidence threshold (strict `>`) and the cooldown between distinct
/// utterances.
#[derive(Debug)]
pub struct DecisionEngine {
    mode: DetectionMode,
    threshold: f32,
    cooldown: Duration,
    spoken: SpokenState,
}

impl DecisionEngine {
    pub fn new(mode: DetectionMode, threshold: f32, cooldown: Duration) -> Self {
        info!(
            "DecisionEngine initialized: mode={}, threshold={:.2}, cooldown={}ms",
            mode,
            threshold,
            cooldown.as_millis()
        );

        Self {
            mode,
            threshold,
            cooldown,
            spoken: SpokenState::default(),
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn spoken(&self) -> &SpokenState {
        &self.spoken
    }

    pub fn last_utterance(&self) -> Option<&str> {
        self.spoken.last_utterance.as_deref()
    }

    pub fn evaluate(
        &mut self,
        image: &PredictionSet,
        pose: Option<&PredictionSet>,
        now: Instant,
    ) -> Decision {
        let candidate = match self.mode {
            DetectionMode::Object => image.last_above(self.threshold).map(utterance::object),
            DetectionMode::Combined => {
                let subject = image.last_above(self.threshold);
                let action = pose.and_then(|p| p.last_above(self.threshold));
                let previous = self.spoken.last_utterance.as_deref();

                match (subject, action) {
                    (Some(subject), Some(action)) => Some(utterance::combined(subject, action)),
                    (Some(subject), None) => {
                        Some(utterance::combined(subject, utterance::action_of(previous)))
                    }
                    (None, Some(action)) => {
                        Some(utterance::combined(utterance::subject_of(previous), action))
                    }
                    (None, None) => {
                        // A gap in detection restarts the cooldown window.
                        self.spoken.last_spoken_at = Some(now);
                        None
                    }
                }
            }
        };

        let Some(candidate) = candidate else {
            return Decision::NoDetection;
        };

        if self.spoken.last_utterance.as_deref() == Some(candidate.as_str()) {
            return Decision::Repeat;
        }

        let cooled_down = match self.spoken.last_spoken_at {
            Some(anchor) => now.saturating_duration_since(anchor) >= self.cooldown,
            None => true,
        };

        if !cooled_down {
            debug!("Suppressing '{}' during cooldown", candidate);
            return Decision::CoolingDown(candidate);
        }

        info!("Accepted utterance: '{}'", candidate);
        self.spoken.last_utterance = Some(candidate.clone());
        self.spoken.last_spoken_at = Some(now);
        Decision::Speak(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ClassPrediction;

    const COOLDOWN: Duration = Duration::from_millis(2000);

    fn set(pairs: &[(&str, f32)]) -> PredictionSet {
        pairs
            .iter()
            .map(|(name, p)| ClassPrediction::new(*name, *p))
            .collect()
    }

    fn combined() -> DecisionEngine {
        DecisionEngine::new(DetectionMode::Combined, 0.9, COOLDOWN)
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_nothing_above_threshold_emits_nothing() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Person", 0.5), ("Nobody", 0.5)]);
        let pose = set(&[("Waving", 0.89), ("Sitting", 0.11)]);

        assert_eq!(engine.evaluate(&image, Some(&pose), t0), Decision::NoDetection);
        assert_eq!(engine.last_utterance(), None);
    }

    #[test]
    fn test_first_tick_speaks_combined_utterance() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Person", 0.95), ("Nobody", 0.05)]);
        let pose = set(&[("Waving", 0.97), ("Sitting", 0.03)]);

        let decision = engine.evaluate(&image, Some(&pose), t0);

        assert_eq!(decision, Decision::Speak("Person is Waving".to_string()));
        assert_eq!(engine.spoken().last_utterance.as_deref(), Some("Person is Waving"));
        assert_eq!(engine.spoken().last_spoken_at, Some(t0));
    }

    #[test]
    fn test_repeating_same_tick_is_suppressed() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Person", 0.95)]);
        let pose = set(&[("Waving", 0.97)]);

        assert!(engine.evaluate(&image, Some(&pose), t0).utterance().is_some());
        assert_eq!(engine.evaluate(&image, Some(&pose), t0), Decision::Repeat);
    }

    #[test]
    fn test_identical_predictions_never_reemit() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Person", 0.95)]);
        let pose = set(&[("Waving", 0.97)]);

        assert!(engine.evaluate(&image, Some(&pose), t0).utterance().is_some());
        for tick in 1..500 {
            let decision = engine.evaluate(&image, Some(&pose), ms(t0, tick * 16));
            assert_eq!(decision, Decision::Repeat, "tick {}", tick);
        }
    }

    #[test]
    fn test_cooldown_between_distinct_utterances() {
        let mut engine = combined();
        let t0 = Instant::now();

        let a = set(&[("A", 0.95)]);
        let b = set(&[("B", 0.95)]);
        let c = set(&[("C", 0.95)]);
        let d = set(&[("D", 0.95)]);

        assert_eq!(
            engine.evaluate(&a, Some(&b), t0),
            Decision::Speak("A is B".to_string())
        );
        assert_eq!(
            engine.evaluate(&c, Some(&d), ms(t0, 1000)),
            Decision::CoolingDown("C is D".to_string())
        );
        assert_eq!(engine.last_utterance(), Some("A is B"));
        assert_eq!(
            engine.evaluate(&c, Some(&d), ms(t0, 2100)),
            Decision::Speak("C is D".to_string())
        );
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let mut engine = combined();
        let t0 = Instant::now();

        engine.evaluate(&set(&[("A", 0.95)]), Some(&set(&[("B", 0.95)])), t0);
        let decision = engine.evaluate(&set(&[("C", 0.95)]), Some(&set(&[("D", 0.95)])), ms(t0, 2000));
        assert_eq!(decision, Decision::Speak("C is D".to_string()));
    }

    #[test]
    fn test_suppressed_candidate_is_not_queued() {
        let mut engine = combined();
        let t0 = Instant::now();
        let pose = set(&[("Waving", 0.95)]);

        engine.evaluate(&set(&[("A", 0.95)]), Some(&pose), t0);
        assert!(matches!(
            engine.evaluate(&set(&[("B", 0.95)]), Some(&pose), ms(t0, 500)),
            Decision::CoolingDown(_)
        ));
        // B is no longer the live candidate once the cooldown elapses.
        assert_eq!(
            engine.evaluate(&set(&[("A", 0.95)]), Some(&pose), ms(t0, 2500)),
            Decision::Repeat
        );
    }

    #[test]
    fn test_probability_equal_to_threshold_is_not_detected() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Person", 0.9)]);
        let pose = set(&[("Waving", 0.9)]);

        assert_eq!(engine.evaluate(&image, Some(&pose), t0), Decision::NoDetection);
    }

    #[test]
    fn test_last_match_wins_in_scan_order() {
        let mut engine = combined();
        let t0 = Instant::now();
        let image = set(&[("Alice", 0.99), ("Bob", 0.91), ("Nobody", 0.0)]);
        let pose = set(&[("Sitting", 0.95), ("Waving", 0.93)]);

        assert_eq!(
            engine.evaluate(&image, Some(&pose), t0),
            Decision::Speak("Bob is Waving".to_string())
        );
    }

    #[test]
    fn test_only_subject_borrows_previous_action() {
        let mut engine = combined();
        let t0 = Instant::now();

        engine.evaluate(&set(&[("Alice", 0.95)]), Some(&set(&[("Sitting", 0.95)])), t0);
        let decision = engine.evaluate(
            &set(&[("Bob", 0.95)]),
            Some(&set(&[("Sitting", 0.5)])),
            ms(t0, 3000),
        );

        assert_eq!(decision, Decision::Speak("Bob is Sitting".to_string()));
    }

    #[test]
    fn test_only_action_borrows_previous_subject() {
        let mut engine = combined();
        let t0 = Instant::now();

        engine.evaluate(&set(&[("Alice", 0.95)]), Some(&set(&[("Sitting", 0.95)])), t0);
        let decision = engine.evaluate(
            &set(&[("Alice", 0.2)]),
            Some(&set(&[("Waving", 0.95)])),
            ms(t0, 3000),
        );

        assert_eq!(decision, Decision::Speak("Alice is Waving".to_string()));
    }

    #[test]
    fn test_only_subject_without_history_leaves_action_empty() {
        let mut engine = combined();
        let t0 = Instant::now();

        let decision = engine.evaluate(&set(&[("Alice", 0.95)]), Some(&set(&[("Sitting", 0.1)])), t0);
        assert_eq!(decision, Decision::Speak("Alice is ".to_string()));
    }

    #[test]
    fn test_only_action_without_history_leaves_subject_empty() {
        let mut engine = combined();
        let t0 = Instant::now();

        let decision = engine.evaluate(&set(&[("Alice", 0.1)]), Some(&set(&[("Waving", 0.95)])), t0);
        assert_eq!(decision, Decision::Speak(" is Waving".to_string()));
    }

    #[test]
    fn test_combined_without_pose_set_uses_subject_only() {
        let mut engine = combined();
        let t0 = Instant::now();

        let decision = engine.evaluate(&set(&[("Alice", 0.95)]), None, t0);
        assert_eq!(decision, Decision::Speak("Alice is ".to_string()));
    }

    #[test]
    fn test_detection_gap_restarts_cooldown() {
        let mut engine = combined();
        let t0 = Instant::now();
        let empty = set(&[("Person", 0.1)]);
        let no_pose = set(&[("Waving", 0.1)]);
        let person = set(&[("Person", 0.95)]);
        let waving = set(&[("Waving", 0.95)]);

        // Nothing seen at t=0: the anchor moves to t=0 even though nothing was said.
        assert_eq!(engine.evaluate(&empty, Some(&no_pose), t0), Decision::NoDetection);
        assert_eq!(engine.spoken().last_spoken_at, Some(t0));
        assert_eq!(engine.last_utterance(), None);

        // A detection must now hold for the whole cooldown before it is spoken.
        assert!(matches!(
            engine.evaluate(&person, Some(&waving), ms(t0, 16)),
            Decision::CoolingDown(_)
        ));
        assert!(matches!(
            engine.evaluate(&person, Some(&waving), ms(t0, 1999)),
            Decision::CoolingDown(_)
        ));
        assert_eq!(
            engine.evaluate(&person, Some(&waving), ms(t0, 2000)),
            Decision::Speak("Person is Waving".to_string())
        );
    }

    #[test]
    fn test_detection_gap_after_utterance_moves_anchor() {
        let mut engine = combined();
        let t0 = Instant::now();

        engine.evaluate(&set(&[("A", 0.95)]), Some(&set(&[("B", 0.95)])), t0);
        engine.evaluate(&set(&[("A", 0.1)]), Some(&set(&[("B", 0.1)])), ms(t0, 1500));

        assert!(matches!(
            engine.evaluate(&set(&[("C", 0.95)]), Some(&set(&[("D", 0.95)])), ms(t0, 2500)),
            Decision::CoolingDown(_)
        ));
        assert_eq!(
            engine.evaluate(&set(&[("C", 0.95)]), Some(&set(&[("D", 0.95)])), ms(t0, 3500)),
            Decision::Speak("C is D".to_string())
        );
        assert_eq!(engine.last_utterance(), Some("C is D"));
    }

    #[test]
    fn test_object_mode_phrase() {
        let mut engine = DecisionEngine::new(DetectionMode::Object, 0.9, COOLDOWN);
        let t0 = Instant::now();
        let image = set(&[("Table", 0.02), ("Chair", 0.98)]);

        assert_eq!(
            engine.evaluate(&image, None, t0),
            Decision::Speak("Chair is detected nearby".to_string())
        );
    }

    #[test]
    fn test_object_mode_ignores_pose() {
        let mut engine = DecisionEngine::new(DetectionMode::Object, 0.9, COOLDOWN);
        let t0 = Instant::now();

        let decision = engine.evaluate(&set(&[("Chair", 0.2)]), Some(&set(&[("Waving", 0.99)])), t0);
        assert_eq!(decision, Decision::NoDetection);
    }

    #[test]
    fn test_object_mode_gap_keeps_anchor() {
        let mut engine = DecisionEngine::new(DetectionMode::Object, 0.9, COOLDOWN);
        let t0 = Instant::now();

        engine.evaluate(&set(&[("Chair", 0.95)]), None, t0);
        assert_eq!(engine.evaluate(&set(&[("Chair", 0.1)]), None, ms(t0, 1000)), Decision::NoDetection);
        assert_eq!(engine.spoken().last_spoken_at, Some(t0));
        assert_eq!(
            engine.evaluate(&set(&[("Door", 0.95)]), None, ms(t0, 2000)),
            Decision::Speak("Door is detected nearby".to_string())
        );
    }

    #[test]
    fn test_object_mode_change_waits_for_cooldown() {
        let mut engine = DecisionEngine::new(DetectionMode::Object, 0.9, COOLDOWN);
        let t0 = Instant::now();

        assert_eq!(
            engine.evaluate(&set(&[("Chair", 0.95), ("Door", 0.01)]), None, t0),
            Decision::Speak("Chair is detected nearby".to_string())
        );

        let door = set(&[("Chair", 0.01), ("Door", 0.95)]);
        assert_eq!(
            engine.evaluate(&door, None, ms(t0, 500)),
            Decision::CoolingDown("Door is detected nearby".to_string())
        );
        assert_eq!(engine.last_utterance(), Some("Chair is detected nearby"));
        assert_eq!(
            engine.evaluate(&door, None, ms(t0, 2000)),
            Decision::Speak("Door is detected nearby".to_string())
        );
    }
}
