pub mod logger;
pub mod result;
pub mod state_logger;
