mod checkpoint;
mod handle;
mod timer;
mod workflow;

// Public API of the simulation subsystem.
pub use checkpoint::Checkpointer;
pub use handle::SimulationSession;
pub use timer::{TimerController, TimerExit};
pub use workflow::{FinishedSimulation, RunningSimulation, SimulationLoopService};
