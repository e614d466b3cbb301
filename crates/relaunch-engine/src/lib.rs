pub mod controller;
pub mod error;
pub mod handlers;
pub mod plugins;

pub use controller::{LoopGuardPolicy, RestartController, RestartSettings};
pub use error::EngineError;
pub use handlers::ErrorHandlerRegistry;
