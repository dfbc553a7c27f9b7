//! `IntentioEngine` — top-level decision pipeline façade.
//!
//! ## Request flow
//!
//! ```text
//! process_utterance(bytes, user)
//!     └─► FeatureExtractor::extract
//!         └─► IntentClassifier (default | personalized)
//!             └─► ConfirmationPolicy::decide
//!                 ├─► auto-execute           → IntentReport
//!                 └─► confirmation required  → session opened, IntentReport
//! ```
//!
//! Onboarding runs independently: `add_onboarding_sample` → (later)
//! `train_user`, both delegated to the personalization store.
//!
//! ## Threading
//!
//! `IntentioEngine` is `Send + Sync` — all fields use interior mutability.
//! Wrap in `Arc<IntentioEngine>` to share between request handlers and
//! event-forwarding tasks. Classification serialises on the classifier
//! handle's mutex; store operations follow the store's own per-user locking.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio,
    classify::{
        Classification, ClassifierHandle, HelpOption, HeuristicClassifier, IntentClassifier,
        IntentLabel, MainIntent, PersonalizedClassifier,
    },
    error::Result,
    events::{DecisionEvent, IntentReport},
    features::{FeatureExtractor, FeatureVector, ANALYSIS_SAMPLE_RATE},
    policy::{ConfirmationPolicy, Decision, CONFIRMATION_THRESHOLD, EMERGENCY_CONFIDENCE_FLOOR},
    session::{ConfirmOutcome, ConfirmationSession, SessionState},
    store::{MemoryStore, OnboardingState, PersonalizationStore, MIN_SAMPLES_PER_INTENT},
};

/// Broadcast channel capacity: decision events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `IntentioEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate feature analysis runs at (Hz). Uploaded utterances at
    /// other rates are resampled. Default: 16000.
    pub target_sample_rate: u32,
    /// Minimum plausible utterance length in bytes for the validation
    /// pre-check. Default: 800.
    pub min_utterance_bytes: usize,
    /// Samples every collected label needs before training. Default: 3.
    pub min_samples_per_intent: usize,
    /// Below this confidence, non-critical labels await confirmation.
    /// Default: 0.85.
    pub confirmation_threshold: f32,
    /// Reported EMERGENCY confidence never falls below this. Default: 0.88.
    pub emergency_confidence_floor: f32,
    /// Deployment-defined window after which a pending confirmation session
    /// may be swept to `TimedOut` by `expire_sessions`. Default: 30 s.
    pub session_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: ANALYSIS_SAMPLE_RATE,
            min_utterance_bytes: audio::DEFAULT_MIN_UTTERANCE_BYTES,
            min_samples_per_intent: MIN_SAMPLES_PER_INTENT,
            confirmation_threshold: CONFIRMATION_THRESHOLD,
            emergency_confidence_floor: EMERGENCY_CONFIDENCE_FLOOR,
            session_timeout: Duration::from_secs(30),
        }
    }
}

/// The top-level engine handle.
pub struct IntentioEngine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    policy: ConfirmationPolicy,
    classifier: ClassifierHandle,
    store: Arc<dyn PersonalizationStore>,
    /// Open confirmation sessions keyed by generated ID.
    sessions: Mutex<HashMap<String, ConfirmationSession>>,
    /// Broadcast sender for gated decision events.
    decision_tx: broadcast::Sender<DecisionEvent>,
    /// Monotonically increasing event sequence counter.
    seq: AtomicU64,
    next_session_id: AtomicU64,
}

impl IntentioEngine {
    /// Create a new engine around an explicit classifier and store.
    pub fn new(
        config: EngineConfig,
        classifier: ClassifierHandle,
        store: Arc<dyn PersonalizationStore>,
    ) -> Self {
        let (decision_tx, _) = broadcast::channel(BROADCAST_CAP);
        let extractor =
            FeatureExtractor::new(config.target_sample_rate, config.min_utterance_bytes);
        let policy = ConfirmationPolicy::new(
            config.confirmation_threshold,
            config.emergency_confidence_floor,
        );

        Self {
            config,
            extractor,
            policy,
            classifier,
            store,
            sessions: Mutex::new(HashMap::new()),
            decision_tx,
            seq: AtomicU64::new(0),
            next_session_id: AtomicU64::new(0),
        }
    }

    /// Engine with the heuristic classifier and an in-memory store.
    pub fn with_defaults() -> Self {
        let config = EngineConfig::default();
        let store = Arc::new(MemoryStore::new(config.min_samples_per_intent));
        Self::new(
            config,
            ClassifierHandle::new(HeuristicClassifier::new()),
            store,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Feature extraction ───────────────────────────────────────────────

    /// Pre-check an uploaded buffer. Callers may still extract regardless.
    pub fn validate_audio(&self, bytes: &[u8]) -> bool {
        self.extractor.validate(bytes)
    }

    /// Extract features from an uploaded buffer. Total — never fails.
    pub fn extract_features(&self, bytes: &[u8]) -> FeatureVector {
        self.extractor.extract(bytes)
    }

    // ── Classification ───────────────────────────────────────────────────

    /// Classify against the main intent label set with the default
    /// classifier.
    pub fn classify_main_intent(&self, features: &FeatureVector) -> Classification<MainIntent> {
        self.classifier.0.lock().classify_main(features)
    }

    /// Classify against the help submenu label set with the default
    /// classifier.
    pub fn classify_help_option(&self, features: &FeatureVector) -> Classification<HelpOption> {
        self.classifier.0.lock().classify_help(features)
    }

    /// Main-intent classification that prefers the user's personalized
    /// model when one is trained, falling back to the default classifier.
    pub fn classify_main_intent_for(
        &self,
        user_id: &str,
        features: &FeatureVector,
    ) -> Result<Classification<MainIntent>> {
        match self.store.profile(user_id)? {
            Some(profile) => {
                debug!(user_id, "classifying with personalized model");
                Ok(PersonalizedClassifier::new(profile).classify_main(features))
            }
            None => Ok(self.classify_main_intent(features)),
        }
    }

    /// Help-option classification with the same personalized-model
    /// preference as [`classify_main_intent_for`](Self::classify_main_intent_for).
    pub fn classify_help_option_for(
        &self,
        user_id: &str,
        features: &FeatureVector,
    ) -> Result<Classification<HelpOption>> {
        match self.store.profile(user_id)? {
            Some(profile) => {
                debug!(user_id, "classifying with personalized model");
                Ok(PersonalizedClassifier::new(profile).classify_help(features))
            }
            None => Ok(self.classify_help_option(features)),
        }
    }

    // ── Confirmation gating ──────────────────────────────────────────────

    /// Apply the confirmation gate to one classification.
    ///
    /// Pure delegation — no session is opened and no event is broadcast;
    /// use the `process_*` flows for the full pipeline.
    pub fn decide_confirmation<L: IntentLabel>(
        &self,
        classification: &Classification<L>,
    ) -> Decision {
        self.policy.decide(classification)
    }

    /// One-shot pipeline for a main-menu utterance:
    /// extract → classify → gate → (session when confirmation is required).
    pub fn process_utterance(
        &self,
        bytes: &[u8],
        user_id: Option<&str>,
    ) -> Result<IntentReport> {
        if !self.validate_audio(bytes) {
            warn!(
                len = bytes.len(),
                min = self.config.min_utterance_bytes,
                "utterance below minimum length — extraction proceeds on fallback terms"
            );
        }
        let features = self.extract_features(bytes);
        let classification = match user_id {
            Some(user) => self.classify_main_intent_for(user, &features)?,
            None => self.classify_main_intent(&features),
        };
        Ok(self.gate_and_report(user_id, &classification))
    }

    /// One-shot pipeline for a help-submenu utterance.
    pub fn process_help_utterance(
        &self,
        bytes: &[u8],
        user_id: Option<&str>,
    ) -> Result<IntentReport> {
        if !self.validate_audio(bytes) {
            warn!(
                len = bytes.len(),
                min = self.config.min_utterance_bytes,
                "utterance below minimum length — extraction proceeds on fallback terms"
            );
        }
        let features = self.extract_features(bytes);
        let classification = match user_id {
            Some(user) => self.classify_help_option_for(user, &features)?,
            None => self.classify_help_option(&features),
        };
        Ok(self.gate_and_report(user_id, &classification))
    }

    // ── Confirmation sessions ────────────────────────────────────────────

    /// Resolve a pending session with the user's response.
    ///
    /// Unknown session IDs resolve to `Expired` — "no such session" is a
    /// normal outcome after a sweep, not a fault.
    pub fn confirm(&self, session_id: &str, accepted: bool) -> ConfirmOutcome {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(session_id) {
            Some(session) => {
                let outcome = session.confirm(accepted);
                info!(session_id, accepted, state = ?session.state(), "session resolved");
                outcome
            }
            None => {
                warn!(session_id, "confirm for unknown session");
                ConfirmOutcome::Expired
            }
        }
    }

    /// Current state of a session, if it exists.
    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.lock().get(session_id).map(|s| s.state())
    }

    /// Sweep pending sessions past the configured window to `TimedOut`.
    /// Returns how many sessions were expired.
    pub fn expire_sessions(&self) -> usize {
        let window = self.config.session_timeout;
        let mut sessions = self.sessions.lock();
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.is_expired(window) && session.time_out() {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "pending confirmation sessions timed out");
        }
        expired
    }

    // ── Onboarding ───────────────────────────────────────────────────────

    /// Record one labeled onboarding sample. Returns the bank's new count.
    pub fn add_onboarding_sample(
        &self,
        user_id: &str,
        label: &str,
        features: &FeatureVector,
    ) -> Result<usize> {
        let count = self.store.add_sample(user_id, label, features)?;
        info!(user_id, label, count, "onboarding sample recorded");
        Ok(count)
    }

    /// Train (or retrain) the user's personalized model. `Ok(false)` means
    /// the training-readiness gate was not satisfied.
    pub fn train_user(&self, user_id: &str) -> Result<bool> {
        self.store.train(user_id)
    }

    pub fn is_onboarded(&self, user_id: &str) -> Result<bool> {
        self.store.is_onboarded(user_id)
    }

    pub fn sample_count(&self, user_id: &str, label: &str) -> Result<usize> {
        self.store.sample_count(user_id, label)
    }

    pub fn onboarding_state(&self, user_id: &str) -> Result<OnboardingState> {
        self.store.onboarding_state(user_id)
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Subscribe to gated decision events.
    pub fn subscribe_decisions(&self) -> broadcast::Receiver<DecisionEvent> {
        self.decision_tx.subscribe()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn gate_and_report<L: IntentLabel>(
        &self,
        user_id: Option<&str>,
        classification: &Classification<L>,
    ) -> IntentReport {
        let decision = self.policy.decide(classification);
        let message = self.policy.response_message(&classification.label, &decision);
        let label = classification.label.as_label();

        let session_id = if decision.requires_confirmation {
            Some(self.open_session(label))
        } else {
            None
        };

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = DecisionEvent {
            seq,
            user_id: user_id.map(str::to_string),
            intent: label.to_string(),
            confidence: decision.reported_confidence,
            requires_confirmation: decision.requires_confirmation,
            emergency: decision.emergency,
            message: message.clone(),
        };
        let _ = self.decision_tx.send(event);

        info!(
            user_id = ?user_id,
            intent = label,
            confidence = decision.reported_confidence,
            requires_confirmation = decision.requires_confirmation,
            emergency = decision.emergency,
            "utterance gated"
        );

        IntentReport {
            intent: label.to_string(),
            confidence: decision.reported_confidence,
            requires_confirmation: decision.requires_confirmation,
            emergency: decision.emergency,
            message,
            session_id,
        }
    }

    fn open_session(&self, label: &str) -> String {
        let id = format!("confirm-{}", self.next_session_id.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .lock()
            .insert(id.clone(), ConfirmationSession::new(id.clone(), label));
        debug!(session_id = %id, label, "confirmation session opened");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_DIM;

    /// Backend that returns a fixed classification, for exercising the gate.
    struct ScriptedClassifier {
        main: Classification<MainIntent>,
        help: Classification<HelpOption>,
    }

    impl IntentClassifier for ScriptedClassifier {
        fn classify_main(&mut self, _features: &FeatureVector) -> Classification<MainIntent> {
            self.main
        }

        fn classify_help(&mut self, _features: &FeatureVector) -> Classification<HelpOption> {
            self.help
        }
    }

    fn scripted_engine(main: Classification<MainIntent>) -> IntentioEngine {
        let config = EngineConfig::default();
        let store = Arc::new(MemoryStore::new(config.min_samples_per_intent));
        IntentioEngine::new(
            config,
            ClassifierHandle::new(ScriptedClassifier {
                main,
                help: Classification::new(HelpOption::Water, 0.9),
            }),
            store,
        )
    }

    fn sample_features() -> FeatureVector {
        FeatureVector::from_values(vec![0.3; FEATURE_DIM])
    }

    #[test]
    fn emergency_utterance_broadcasts_flagged_event() {
        let engine = scripted_engine(Classification::new(MainIntent::Emergency, 0.5));
        let mut rx = engine.subscribe_decisions();

        let report = engine.process_utterance(&[1u8; 1600], None).unwrap();
        assert_eq!(report.intent, "EMERGENCY");
        assert!(!report.requires_confirmation);
        assert!(report.emergency);
        assert!(report.confidence >= 0.88);
        assert!(report.session_id.is_none());

        let event = rx.try_recv().expect("decision event should be broadcast");
        assert!(event.emergency);
        assert_eq!(event.intent, "EMERGENCY");
        assert!(event.confidence >= 0.88);
    }

    #[test]
    fn low_confidence_utterance_opens_a_session() {
        let engine = scripted_engine(Classification::new(MainIntent::No, 0.6));
        let report = engine.process_utterance(&[1u8; 1600], None).unwrap();

        assert!(report.requires_confirmation);
        let session_id = report.session_id.expect("session should open");
        assert_eq!(
            engine.session_state(&session_id),
            Some(SessionState::Pending)
        );

        assert_eq!(engine.confirm(&session_id, true), ConfirmOutcome::Execute);
        // Duplicate confirms never re-execute.
        assert_eq!(
            engine.confirm(&session_id, true),
            ConfirmOutcome::AlreadyResolved(SessionState::Confirmed)
        );
    }

    #[test]
    fn unknown_session_resolves_expired() {
        let engine = scripted_engine(Classification::new(MainIntent::Yes, 0.95));
        assert_eq!(engine.confirm("confirm-404", true), ConfirmOutcome::Expired);
    }

    #[test]
    fn high_confidence_utterance_auto_executes_without_session() {
        let engine = scripted_engine(Classification::new(MainIntent::Yes, 0.95));
        let report = engine.process_utterance(&[1u8; 1600], None).unwrap();
        assert!(!report.requires_confirmation);
        assert!(report.session_id.is_none());
    }

    #[test]
    fn expire_sessions_sweeps_pending_past_window() {
        let mut config = EngineConfig::default();
        config.session_timeout = Duration::ZERO;
        let store = Arc::new(MemoryStore::new(config.min_samples_per_intent));
        let engine = IntentioEngine::new(
            config,
            ClassifierHandle::new(ScriptedClassifier {
                main: Classification::new(MainIntent::No, 0.5),
                help: Classification::new(HelpOption::Food, 0.5),
            }),
            store,
        );

        let report = engine.process_utterance(&[1u8; 1600], None).unwrap();
        let session_id = report.session_id.unwrap();
        assert_eq!(engine.expire_sessions(), 1);
        assert_eq!(
            engine.session_state(&session_id),
            Some(SessionState::TimedOut)
        );
        assert_eq!(engine.confirm(&session_id, true), ConfirmOutcome::Expired);
    }

    #[test]
    fn onboarding_gate_flows_through_the_engine() {
        let engine = IntentioEngine::with_defaults();
        let features = sample_features();

        for _ in 0..3 {
            engine.add_onboarding_sample("u", "YES", &features).unwrap();
        }
        for _ in 0..2 {
            engine.add_onboarding_sample("u", "NO", &features).unwrap();
        }

        assert!(!engine.train_user("u").unwrap());
        assert!(!engine.is_onboarded("u").unwrap());

        engine.add_onboarding_sample("u", "NO", &features).unwrap();
        assert!(engine.train_user("u").unwrap());
        assert!(engine.is_onboarded("u").unwrap());
        assert_eq!(engine.sample_count("u", "NO").unwrap(), 3);
    }

    #[test]
    fn personalized_model_is_preferred_once_trained() {
        let engine = IntentioEngine::with_defaults();

        // Train YES on an axis the heuristic would not pick by itself.
        let mut values = vec![0.0f32; FEATURE_DIM];
        values[40] = 1.0;
        let yes_like = FeatureVector::from_values(values);
        for _ in 0..3 {
            engine
                .add_onboarding_sample("u", "YES", &yes_like)
                .unwrap();
        }
        assert!(engine.train_user("u").unwrap());

        let c = engine.classify_main_intent_for("u", &yes_like).unwrap();
        assert_eq!(c.label, MainIntent::Yes);
        assert!(c.confidence > 0.5);
    }
}
