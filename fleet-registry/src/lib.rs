pub mod dispatcher;
pub mod faults;
pub mod health;
pub mod registry;

pub use dispatcher::CommandDispatcher;
pub use faults::FaultSet;
pub use health::HealthThresholds;
pub use registry::{Registry, RegistryConfig};
