pub mod artifact;
pub mod config;
pub mod dashboard;
pub mod decompose;
pub mod errors;
pub mod io;
pub mod join;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod risk;
pub mod stats;
pub mod temporal;
pub mod utils;

#[cfg(test)]
mod tests;
