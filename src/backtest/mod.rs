pub mod simulation;
pub mod synthetic;

pub use simulation::{simulate, SimulationReport, SimulationRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
