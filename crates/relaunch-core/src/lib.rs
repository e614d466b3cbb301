pub mod backend;
pub mod capability;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod model;
pub mod resources;
pub mod snapshot;
