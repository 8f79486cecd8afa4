// src/alerts/mod.rs

pub mod events;
pub mod safety;
pub mod state_machine;

pub use events::{AuthorityNotice, Stamped, StatusReport, TelemetryEvent};
pub use safety::SafetyHooks;
pub use state_machine::{AlertKind, AlertStateMachine, LatchState};
