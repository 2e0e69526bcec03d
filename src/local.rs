//! Renders the whole grid inside one process, without a farm.  The
//! single-threaded render is the reference the farmed one must match
//! cell for cell; the threaded one shares the grid out a row at a time.

use crossbeam;
use std::iter::Enumerate;
use std::slice::ChunksMut;
use std::sync::{Arc, Mutex};

use errors::{Error, Result};
use planes::{Pixel, PlaneMapper};

type RowsType<'a> = Arc<Mutex<Enumerate<ChunksMut<'a, u32>>>>;

/// Takes a plane and a limit (the number of iterations to conduct
/// per cell) and computes the escape time of every cell.
pub struct LocalRenderer {
    plane: PlaneMapper,
    limit: u32,
}

impl LocalRenderer {
    /// Requires the plane mapping and the iteration cap.
    pub fn new(plane: PlaneMapper, limit: u32) -> Self {
        LocalRenderer { plane, limit }
    }

    /// The main function for single-threaded renders.  Walks the grid
    /// row by row.
    pub fn render_single(&self) -> Vec<u32> {
        let mut buffer = vec![0 as u32; self.plane.len()];
        let cols = self.plane.shape.cols;
        for (row, line) in buffer.chunks_mut(cols).enumerate() {
            for (column, cell) in line.iter_mut().enumerate() {
                *cell = self.plane.evaluate(&Pixel(column, row), self.limit);
            }
        }
        buffer
    }

    /// A multi-threaded version of the render function that takes a
    /// thread count.  Threads pull rows from a shared iterator until
    /// none are left.
    pub fn render(&self, threads: usize) -> Result<Vec<u32>> {
        let mut buffer = vec![0 as u32; self.plane.len()];
        let cols = self.plane.shape.cols;
        {
            let rows: RowsType = Arc::new(Mutex::new(buffer.chunks_mut(cols).enumerate()));
            crossbeam::scope(|spawner| {
                for _ in 0..threads.max(1) {
                    let rows = rows.clone();
                    spawner.spawn(move |_| loop {
                        let next = match rows.lock() {
                            Ok(mut rows) => rows.next(),
                            Err(_) => None,
                        };
                        match next {
                            Some((row, line)) => {
                                for (column, cell) in line.iter_mut().enumerate() {
                                    *cell = self.plane.evaluate(&Pixel(column, row), self.limit);
                                }
                            }
                            None => {
                                break;
                            }
                        }
                    });
                }
            })
            .map_err(|_| Error::RankPanicked)?;
        }
        Ok(buffer)
    }
}
