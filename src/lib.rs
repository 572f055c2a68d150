pub mod cli;
pub mod client;
pub mod codec;
pub mod compare;
pub mod config;
pub mod context;
pub mod logging;
pub mod scenario;
pub mod store;
pub mod validation;
pub mod wizard;
