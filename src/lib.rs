#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mandelbrot farm
//!
//! The Mandelbrot set is rendered by taking every cell of a grid,
//! mapping it to a point `c` on the complex plane, and counting how
//! many times `z = z² + c` can be applied, starting from zero, before
//! `z` runs off past a radius of 2.  Every cell is independent of every
//! other, which makes the math easy to spread out and leaves the real
//! work in how it is spread.
//!
//! This crate farms the grid out to a pool of worker ranks that share
//! no memory and talk only by message.  A single coordinator cuts the
//! grid into tasks (spans of the flattened grid, or rectangular
//! blocks), keeps a bounded number of tasks in flight per worker,
//! accepts results in whatever order they arrive, writes each one into
//! the grid at the place its header names, and stops every worker once
//! the last result is in.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate itertools;
#[macro_use]
extern crate log;
extern crate crossbeam;
extern crate failure;
extern crate num;
extern crate num_cpus;

#[cfg(test)]
extern crate rand;

pub mod channel;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod frame;
pub mod grid;
pub mod local;
pub mod output;
pub mod planes;
pub mod tasks;
pub mod worker;

pub use channel::{mesh, Channel, Endpoint, Envelope, Rank, Tag, COORDINATOR};
pub use cluster::{run, Rendering};
pub use config::Config;
pub use coordinator::{Coordinator, Phase, RunReport, WorkerSlot};
pub use errors::{ConfigError, Error, Result};
pub use frame::Frame;
pub use grid::Grid;
pub use local::LocalRenderer;
pub use output::write_grid;
pub use planes::{escape_time, Pixel, PlaneMapper, Viewport};
pub use tasks::{task_size_for_count, Cursor, Partitioner, Shape, Task, Tiling};
pub use worker::{Worker, WorkerReport};
