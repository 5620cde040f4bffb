//! Infrastructure: provider clients, configuration, logging.

pub mod config;
pub mod llm;
pub mod logging;
