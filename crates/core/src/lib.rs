#![forbid(unsafe_code)]

pub mod client;
pub mod evaluator;
pub mod model;
pub mod reconcile;
pub mod sync;
pub mod time;

pub use time::Clock;
