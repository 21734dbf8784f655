pub mod bootstrap;
pub mod commands;
pub mod periodic_sync;
pub mod session;
pub mod sync_coordinator;
