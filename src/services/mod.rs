pub mod backend;
pub mod config;
pub mod events;
pub mod model_status;
pub mod retry;
pub mod session;
pub mod terminal;
