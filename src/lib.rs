pub mod config;
pub mod engine;
pub mod error;
pub mod gradcheck;
pub mod nn;
pub mod train;
pub mod viz;

pub use error::{Error, Result};

use std::sync::atomic::{AtomicUsize, Ordering};

///
/// NOTE: Refer safe singleton globals in Rust: https://stackoverflow.com/a/27826181/6196679
///
/// Ids start at 1 and only grow, so an operand's id is always smaller than
/// the id of any node built from it.
fn get_id() -> usize {
    static COUNTER: AtomicUsize = AtomicUsize::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
