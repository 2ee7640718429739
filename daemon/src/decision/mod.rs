pub mod engine;
pub mod utterance;

pub use engine::{Decision, DecisionEngine, SpokenState};
