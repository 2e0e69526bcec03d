//! Run parameters, with the defaults the renderer has always used.

use num_cpus;

use errors::ConfigError;
use frame::checked_frame_len;
use planes::{PlaneMapper, Viewport};
use tasks::{Partitioner, Shape, Tiling};

/// Everything a farmed render needs to know.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    /// Grid dimensions.
    pub shape: Shape,
    /// Span length, or block edge, of each task.
    pub task_size: usize,
    /// How the grid is cut into tasks.
    pub tiling: Tiling,
    /// The region of the complex plane rendered.
    pub viewport: Viewport,
    /// Iteration cap of the escape-time kernel.
    pub max_iterations: u32,
    /// Number of worker ranks; the coordinator is one more.
    pub workers: usize,
    /// Tasks a worker may hold at once.
    pub credit: usize,
    /// Compute threads inside each worker.
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            shape: Shape::new(1000, 1000),
            task_size: 100,
            tiling: Tiling::Linear,
            viewport: Viewport::default(),
            max_iterations: 100,
            workers: num_cpus::get().saturating_sub(1).max(1),
            credit: 4,
            threads: 1,
        }
    }
}

impl Config {
    /// Check the parameters before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plane()?;
        let Shape { rows, cols } = self.shape;
        if rows
            .checked_mul(cols)
            .and_then(checked_frame_len)
            .is_none()
        {
            return Err(ConfigError::GridTooLarge { rows, cols });
        }
        if self.task_size == 0 {
            return Err(ConfigError::ZeroTaskSize);
        }
        if self.credit == 0 {
            return Err(ConfigError::ZeroCredit);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }

    /// The mapping from grid cells to the complex plane.
    pub fn plane(&self) -> Result<PlaneMapper, ConfigError> {
        PlaneMapper::new(self.shape, self.viewport)
    }

    /// The partitioner for this grid and tiling.
    pub fn partitioner(&self) -> Result<Partitioner, ConfigError> {
        if self.task_size == 0 {
            return Err(ConfigError::ZeroTaskSize);
        }
        Ok(Partitioner::new(self.shape, self.tiling, self.task_size))
    }
}
