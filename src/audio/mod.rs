pub mod decoder;
pub mod engine;
pub mod player;
pub mod types;

#[cfg(test)]
pub mod mock;
