pub mod artifact;
pub mod config;
pub mod controller;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod util;
pub mod worker;
