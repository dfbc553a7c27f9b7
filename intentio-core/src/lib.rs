//! # intentio-core
//!
//! Speech-to-intent decision engine for assistive communication.
//!
//! A non-verbal or limited-mobility user expresses a small set of intents
//! (YES / NO / HELP / EMERGENCY, plus a four-option help submenu) through
//! short recorded utterances. This crate is the decision pipeline behind
//! that interaction:
//!
//! ```text
//! audio bytes → FeatureExtractor → IntentClassifier → ConfirmationPolicy
//!                                                          │
//!                                     ┌────────────────────┴───────────┐
//!                                auto-execute              ConfirmationSession
//!
//! onboarding bytes → FeatureExtractor → PersonalizationStore::add_sample
//!                                             └─► train → PersonalizedProfile
//! ```
//!
//! The HTTP transport, schema validation and caregiver alert delivery live
//! in the host application; the engine only classifies, gates, and raises
//! flags on its decision events. EMERGENCY is never held behind a
//! confirmation round-trip.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod classify;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod policy;
pub mod session;
pub mod store;

// Convenience re-exports for downstream crates
pub use classify::{
    Classification, ClassifierHandle, HelpOption, HeuristicClassifier, IntentClassifier,
    IntentLabel, MainIntent, PersonalizedClassifier,
};
pub use engine::{EngineConfig, IntentioEngine};
pub use error::IntentioError;
pub use events::{DecisionEvent, IntentReport};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_DIM};
pub use policy::{ConfirmationPolicy, Decision};
pub use session::{ConfirmOutcome, ConfirmationSession, SessionState};
pub use store::{
    MemoryStore, OnboardingState, PersonalizationStore, PersonalizedProfile, SqliteStore,
};
