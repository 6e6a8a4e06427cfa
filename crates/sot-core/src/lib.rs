pub mod browser;
pub mod config;
pub mod control;
pub mod daemon;
pub mod ignore;
pub mod monitor;
pub mod policy;
pub mod store;

#[cfg(test)]
mod test_support;

pub use browser::{TabActuator, TabId, TabSnapshot, TabSource};
pub use daemon::Daemon;
pub use policy::{EvaluationOrigin, PolicyMachine, TabDecision};
