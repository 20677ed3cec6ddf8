#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;

pub use config::{CheckpointPolicy, SimulationConfig};
pub use error::{ConfigError, SimulationError};

pub use sessions::{
    Checkpointer, FinishedSimulation, RunningSimulation, SimulationLoopService, SimulationSession,
    TimerController, TimerExit,
};
