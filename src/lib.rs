//! Plugin Matter Bridge library.
//!
//! Plugins describe devices as endpoint trees; the bridge publishes them
//! through server nodes and keeps the whole instance alive across restart,
//! update and shutdown requests.

pub mod bridge;
pub mod config;
pub mod error;
pub mod input;
pub mod instance_lock;
pub mod matter;
pub mod storage;
