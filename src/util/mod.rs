//! Internal data structures.
//!
//! - [`fifo`]: amortized O(1) two-stack FIFO queue
//! - [`slab`]: generational slab backing scheduled task storage
//! - [`trampoline`]: reentrancy-flattening FIFO action queue

pub mod fifo;
pub mod slab;
pub mod trampoline;

pub use fifo::FifoQueue;
pub use slab::{Slab, SlabKey};
pub use trampoline::{TrampolineQueue, TrampolineState};
