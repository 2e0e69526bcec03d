// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors raised while configuring or running a render.
//!
//! Configuration errors are caught before any rank is started.
//! Everything else is a broken invariant of the farming protocol; none
//! of those are recovered from, the run is abandoned and no grid is
//! produced.

use std::io;

use channel::Rank;

/// A configuration the renderer refuses to start with.
#[derive(Debug, Fail, PartialEq)]
pub enum ConfigError {
    /// Both grid dimensions must be at least two cells, otherwise the
    /// pixel-to-point mapping divides by zero.
    #[fail(display = "grid must be at least 2x2, got {}x{}", cols, rows)]
    GridTooSmall {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
    },

    /// The grid has more cells than a single buffer or frame can hold.
    #[fail(display = "grid of {}x{} cells is too large", cols, rows)]
    GridTooLarge {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
    },

    /// The viewport has no area (`xmin >= xmax` or `ymin >= ymax`).
    #[fail(display = "viewport spans {} by {}; both must be positive", dx, dy)]
    EmptyViewport {
        /// Width of the viewport on the real axis.
        dx: f64,
        /// Height of the viewport on the imaginary axis.
        dy: f64,
    },

    /// Tasks must cover at least one cell.
    #[fail(display = "task size must be at least 1")]
    ZeroTaskSize,

    /// Every worker must be allowed at least one outstanding task.
    #[fail(display = "credit must be at least 1")]
    ZeroCredit,

    /// A farm needs at least one worker besides the coordinator.
    #[fail(display = "at least one worker is required")]
    NoWorkers,

    /// Workers need at least one thread to compute on.
    #[fail(display = "worker thread count must be at least 1")]
    ZeroThreads,
}

/// Everything that can stop a render.
#[derive(Debug, Fail)]
pub enum Error {
    /// Rejected before any work was dispatched.
    #[fail(display = "configuration error: {}", _0)]
    Config(#[cause] ConfigError),

    /// A message or a grid write broke the farming protocol.
    #[fail(display = "protocol violation: {}", _0)]
    Protocol(String),

    /// The peer's end of the mesh is gone.
    #[fail(display = "rank {} disconnected", rank)]
    Disconnected {
        /// The rank that went away.
        rank: Rank,
    },

    /// A rank, or one of a worker's compute threads, panicked.
    #[fail(display = "a rank panicked during the render")]
    RankPanicked,

    /// The grid was read before every cell had been written.
    #[fail(display = "grid incomplete: {} of {} cells written", written, total)]
    Incomplete {
        /// Cells written so far.
        written: usize,
        /// Cells in the grid.
        total: usize,
    },

    /// Writing results out failed.
    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),
}

impl Error {
    /// Shorthand for building a protocol violation.
    pub fn protocol<S: Into<String>>(message: S) -> Error {
        Error::Protocol(message.into())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = ::std::result::Result<T, Error>;
