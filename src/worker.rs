//! The worker side of the farm: receive a task, compute it, reply,
//! until told to stop.

use crossbeam;

use channel::{Channel, Tag, COORDINATOR};
use errors::{Error, Result};
use frame::Frame;
use planes::PlaneMapper;
use tasks::Task;

/// What a worker did before it was stopped.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Tasks computed and returned.
    pub tasks: usize,
    /// Cells computed across all tasks.
    pub cells: usize,
}

/// A worker rank.  Holds at most one task at a time; credit is the
/// coordinator's business.
pub struct Worker<C: Channel> {
    channel: C,
    plane: PlaneMapper,
    max_iterations: u32,
    threads: usize,
}

impl<C: Channel> Worker<C> {
    /// A worker computing cells of `plane` on `threads` threads.
    pub fn new(channel: C, plane: PlaneMapper, max_iterations: u32, threads: usize) -> Self {
        Worker {
            channel,
            plane,
            max_iterations,
            threads: threads.max(1),
        }
    }

    /// Serve tasks until the stop signal arrives.
    pub fn run(mut self) -> Result<WorkerReport> {
        let rank = self.channel.rank();
        let mut report = WorkerReport::default();
        loop {
            let envelope = self.channel.receive_from(COORDINATOR, None)?;
            let task = match Frame::decode(envelope.tag, &envelope.payload)? {
                Frame::Stop => break,
                Frame::Work(task) => task,
                frame @ Frame::Result { .. } => {
                    return Err(Error::protocol(format!(
                        "worker {} was sent {:?}",
                        rank,
                        frame.tag()
                    )));
                }
            };
            if !task.fits(self.plane.shape) {
                return Err(Error::protocol(format!(
                    "worker {} was sent {:?}, outside the grid",
                    rank, task
                )));
            }
            let values = compute(&self.plane, self.max_iterations, &task, self.threads)?;
            report.tasks += 1;
            report.cells += values.len();
            let reply = Frame::Result { task, values }.encode();
            self.channel.send(COORDINATOR, reply, Tag::Result)?;
        }
        debug!(
            "worker {} stopped after {} tasks, {} cells",
            rank, report.tasks, report.cells
        );
        Ok(report)
    }
}

/// Evaluate every cell of `task`, in the task's row-major order.  With
/// more than one thread the cells are cut into contiguous chunks, one
/// per thread, and all of them finish before this returns.
pub fn compute(
    plane: &PlaneMapper,
    max_iterations: u32,
    task: &Task,
    threads: usize,
) -> Result<Vec<u32>> {
    let cols = plane.shape.cols;
    let mut values = vec![0 as u32; task.len()];
    if threads <= 1 || values.len() < 2 {
        for (value, pixel) in values.iter_mut().zip(task.cells(cols)) {
            *value = plane.evaluate(&pixel, max_iterations);
        }
        return Ok(values);
    }

    let chunk = (values.len() + threads - 1) / threads;
    crossbeam::scope(|spawner| {
        for (n, region) in values.chunks_mut(chunk).enumerate() {
            spawner.spawn(move |_| {
                for (k, value) in region.iter_mut().enumerate() {
                    let pixel = task.cell(n * chunk + k, cols);
                    *value = plane.evaluate(&pixel, max_iterations);
                }
            });
        }
    })
    .map_err(|_| Error::RankPanicked)?;
    Ok(values)
}
