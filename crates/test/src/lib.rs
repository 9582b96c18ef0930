//! Collaborators for testing coroutines: thunks and deferred values which
//! settle on a timer or on demand, and logging set-up for tests.

pub mod logging;

mod deferred;
mod thunk;

pub use deferred::{delayed, pending};
pub use thunk::{captured, delayed_failure, delayed_value, failing, never, settles_twice, Captured};
