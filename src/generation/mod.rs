pub mod gemini;
pub mod orchestrator;
pub mod service;

#[cfg(test)]
pub mod mock;
