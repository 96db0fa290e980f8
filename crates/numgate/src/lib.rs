//! numgate: HTTP gateway in front of a supervised number helper process.

pub mod config;
pub mod helper;
pub mod orchestrator;
pub mod supervisor;
pub mod transport;

pub use config::{Config, HelperConfig, HelperStdio};
pub use helper::{
    AggregateRequest, AggregateResponse, HealthResponse, HelperClient, HelperError,
};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use supervisor::{
    FORCE_KILL_TIMEOUT, HelperSpawnConfig, HelperSupervisor, ShutdownSignal, SpawnError,
};
pub use transport::{routes, wait_for_shutdown_signal};
