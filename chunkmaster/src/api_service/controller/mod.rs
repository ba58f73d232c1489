pub mod chunkmaster;
pub mod chunkserver;
