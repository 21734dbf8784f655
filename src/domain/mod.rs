pub mod classifier;
pub mod models;
pub mod schedule;
pub mod stats;
