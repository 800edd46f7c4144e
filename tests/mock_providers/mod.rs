//! Mock Live API Server
//!
//! Simulates the Live `BidiGenerateContent` WebSocket endpoint:
//! - Acknowledges `setup` with `setupComplete`, or stalls / rejects it
//! - Plays a scripted list of server messages once the session is open
//! - Answers `toolResponse` messages with a follow-up script
//! - Records every client message for assertions

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

pub mod live_mock;

pub use live_mock::*;
