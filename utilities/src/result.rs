use std::error::Error;

/// Boxed error result shared by the startup and plumbing code of every crate
pub type Result<T> = std::result::Result<T, Box<dyn Error + Send + Sync>>;
