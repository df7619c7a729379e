pub mod completion;
pub mod config;
pub mod credits;
pub mod error;
pub mod identity;
pub mod logging;
pub mod middleware;
pub mod protocol;
pub mod relay;
pub mod server;
