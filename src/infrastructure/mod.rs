pub mod auth_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod local_store;
pub mod logging;
pub mod remote_client;
pub mod review_codec;
pub mod storage;
