//! # redraft-agent
//!
//! The generation boundary for redraft: one async call, `generate(prompt)`,
//! behind the [`Generator`] trait, plus the backends that implement it.
//!
//! - [`HttpGenerator`] - OpenAI-compatible chat-completions endpoint
//! - [`CommandGenerator`] - local agent CLI run once per prompt

mod command;
mod http;
mod output;
mod spawner;
mod traits;

pub use command::CommandGenerator;
pub use http::HttpGenerator;
pub use output::CommandOutput;
pub use spawner::ProcessSpawner;
pub use traits::{
    BackendKind, GenerationError, Generator, GeneratorConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL,
    DEFAULT_TIMEOUT,
};

/// Create a generator for the configured backend
pub fn create_generator(config: &GeneratorConfig) -> Result<Box<dyn Generator>, GenerationError> {
    match config.backend {
        BackendKind::Http => Ok(Box::new(HttpGenerator::from_config(config)?)),
        BackendKind::Command => Ok(Box::new(CommandGenerator::from_config(config))),
    }
}
