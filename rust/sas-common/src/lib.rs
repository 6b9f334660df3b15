#![warn(missing_docs)]

//! Helpers shared by the SAS issuer crates.
//!
//! [`Clock`] lets tests control time, and [`spawn_detached`] runs background
//! work on whatever executor the target offers. The thread-safety bounds
//! relax on `wasm32`.

mod sync;
pub use sync::*;

mod task;
pub use task::spawn_detached;

pub mod time;
pub use time::{Clock, ManualClock, SystemClock};
