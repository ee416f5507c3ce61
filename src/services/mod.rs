pub mod ai;
pub mod calendar;
pub mod intent;
pub mod orchestrator;
