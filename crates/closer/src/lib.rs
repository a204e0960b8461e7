//! Coordinated process shutdown.
//!
//! Process assembly registers a teardown for every resource it starts
//! (HTTP server, consumers, producers, database pool) on one [`Closer`] and
//! calls [`Closer::close_all`] once a [`shutdown_signal`] arrives.

mod closer;
mod error;
mod signal;

pub use closer::{BoxError, Closer};
pub use error::{CloseError, Result};
pub use signal::shutdown_signal;
