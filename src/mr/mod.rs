pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod function;
pub mod worker;
