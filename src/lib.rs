pub mod backup;
pub mod calc;
pub mod config;
pub mod db;
pub mod ipc;
pub mod logging;
pub mod records;
pub mod stats;
pub mod workflow;
