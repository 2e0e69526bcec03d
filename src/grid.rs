//! The dense buffer the coordinator assembles results into.

use errors::{Error, Result};
use tasks::{Shape, Task};

/// A row-major grid of iteration counts that remembers which cells
/// have been written.
#[derive(Clone, Debug)]
pub struct Grid {
    shape: Shape,
    cells: Vec<u32>,
    written: Vec<bool>,
    remaining: usize,
}

impl Grid {
    /// An empty grid.
    pub fn new(shape: Shape) -> Grid {
        Grid {
            shape,
            cells: vec![0; shape.len()],
            written: vec![false; shape.len()],
            remaining: shape.len(),
        }
    }

    /// The grid's dimensions.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Copy the values computed for `task` into the cells it covers.
    /// Each cell may be written once; a task outside the grid, a value
    /// count that differs from the task length, or a second write to a
    /// cell is a protocol violation, and leaves the grid untouched.
    pub fn write_range(&mut self, task: &Task, values: &[u32]) -> Result<()> {
        if !task.fits(self.shape) {
            return Err(Error::protocol(format!(
                "{:?} falls outside the {}x{} grid",
                task, self.shape.cols, self.shape.rows
            )));
        }
        if values.len() != task.len() {
            return Err(Error::protocol(format!(
                "{:?} came back with {} values",
                task,
                values.len()
            )));
        }
        let shape = self.shape;
        if let Some(pixel) = task
            .cells(shape.cols)
            .find(|pixel| self.written[shape.offset(pixel)])
        {
            return Err(Error::protocol(format!(
                "cell {:?} of {:?} was already written",
                pixel, task
            )));
        }

        match *task {
            Task::Span { offset, len } => {
                self.cells[offset..offset + len].copy_from_slice(values);
                for flag in &mut self.written[offset..offset + len] {
                    *flag = true;
                }
            }
            Task::Block {
                row,
                col,
                height,
                width,
            } => {
                for (r, chunk) in values.chunks(width).enumerate().take(height) {
                    let start = (row + r) * shape.cols + col;
                    self.cells[start..start + width].copy_from_slice(chunk);
                    for flag in &mut self.written[start..start + width] {
                        *flag = true;
                    }
                }
            }
        }
        self.remaining -= task.len();
        Ok(())
    }

    /// Number of cells written so far.
    pub fn written(&self) -> usize {
        self.cells.len() - self.remaining
    }

    /// True once every cell has been written.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// The whole grid, row-major.  Only available once complete.
    pub fn read(&self) -> Result<&[u32]> {
        if !self.is_complete() {
            return Err(Error::Incomplete {
                written: self.written(),
                total: self.cells.len(),
            });
        }
        Ok(&self.cells)
    }

    /// Consume a complete grid and return its buffer.
    pub fn into_vec(self) -> Result<Vec<u32>> {
        self.read()?;
        Ok(self.cells)
    }

    /// The rows of a complete grid.
    pub fn rows(&self) -> Result<::std::slice::Chunks<u32>> {
        Ok(self.read()?.chunks(self.shape.cols))
    }
}
