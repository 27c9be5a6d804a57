mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;
mod worker;


pub use orchestrator::MotionCamOrchestrator;
pub use types::{ComponentState, ShutdownReason, ShutdownTrigger};
