pub mod automation;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod kpi;
pub mod models;
pub mod network;
pub mod output;
pub mod policy;
pub mod publisher;
pub mod scenario;
pub mod simulator;
pub mod state;
pub mod traffic;
