pub mod analysis;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod types;
