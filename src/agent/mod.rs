//! Turn execution: the state machine tying completion, tools and speech together

mod turn;

pub use turn::{SpeechSettings, TurnContext, TurnOrchestrator, TurnOutcome, TurnState};
