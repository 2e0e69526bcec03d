//! Stands up a whole farm: one coordinator rank and `workers` worker
//! ranks, each on its own thread, sharing nothing but the mesh.

use crossbeam;
use std::sync::Barrier;

use channel::mesh;
use config::Config;
use coordinator::{Coordinator, RunReport};
use errors::{Error, Result};
use grid::Grid;
use worker::{Worker, WorkerReport};

/// The outcome of a farmed render.
#[derive(Debug)]
pub struct Rendering {
    /// The completed grid.
    pub grid: Grid,
    /// The coordinator's counters.
    pub report: RunReport,
    /// Each worker's counters, in rank order starting at rank 1.
    pub workers: Vec<WorkerReport>,
}

/// Validate `config`, then render its grid across a freshly built farm.
/// Nothing is started if the configuration is rejected.
pub fn run(config: &Config) -> Result<Rendering> {
    config.validate()?;
    let plane = config.plane()?;
    let partitioner = config.partitioner()?;
    let ranks = config.workers + 1;
    info!(
        "farming {} tasks to {} workers ({:?} tiling, task size {})",
        partitioner.count(),
        config.workers,
        config.tiling,
        config.task_size
    );

    let barrier = Barrier::new(ranks);
    let mut endpoints = mesh(ranks).into_iter();
    let coordinator = endpoints
        .next()
        .ok_or_else(|| Error::protocol("empty mesh"))?;

    let outcome = crossbeam::scope(|spawner| {
        let barrier = &barrier;
        let handles: Vec<_> = endpoints
            .map(|endpoint| {
                spawner.spawn(move |_| {
                    barrier.wait();
                    Worker::new(endpoint, plane, config.max_iterations, config.threads).run()
                })
            })
            .collect();

        barrier.wait();
        let collected = Coordinator::new(coordinator, partitioner, config.credit).run();

        let workers: Result<Vec<WorkerReport>> = handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| Error::RankPanicked).and_then(|r| r))
            .collect();
        (collected, workers)
    })
    .map_err(|_| Error::RankPanicked)?;

    let (grid, report) = outcome.0?;
    let workers = outcome.1?;
    Ok(Rendering {
        grid,
        report,
        workers,
    })
}
