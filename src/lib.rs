pub mod agents;
pub mod cli;
pub mod completion;
pub mod config;
pub mod doctor;
pub mod error;
pub mod message_log;
pub mod profiles;
pub mod provider;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
pub mod workflow;

#[cfg(test)]
mod tests;
