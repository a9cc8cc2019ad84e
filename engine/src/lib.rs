//! Vigil engine: continuous health monitoring, bounded self-healing,
//! short-horizon resource forecasting, proactive optimization under
//! cooldowns, and a regression-aware test loop.
//!
//! Hosts construct an [`EngineState`], hand it to an
//! [`services::Orchestrator`], and read back [`vigil_models::EngineStatus`]
//! for whatever surface they expose.

pub mod config;
pub mod services;
pub mod sources;
pub mod state;

pub use config::EngineConfig;
pub use state::EngineState;
