//! The interpretation coordinator: the single entry point from an ingress
//! event to a terminal `InterpretationOutcome` (§4.9).

pub mod coordinator;
pub mod outcome;
pub mod trace;

pub use coordinator::{CoordinatorContext, InterpretationCoordinator, PeriodChecker};
pub use outcome::{DecisionLogEntry, FailureType, InterpretationOutcome, OutcomeStatus};
pub use trace::{TraceBundle, TraceDataSource, TraceIntegrity, TraceSelector};
