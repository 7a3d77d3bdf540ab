pub mod engine;
pub mod evaluator;
pub mod indicators;

pub use engine::SignalEngine;
pub use evaluator::evaluate;
