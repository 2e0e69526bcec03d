//! The coordinator: deals tasks out to workers under a per-worker
//! credit, collects results in whatever order they come back, writes
//! them into the grid, and stops every worker once the grid is done.
//!
//! The run moves through four phases.  While *priming*, each worker in
//! turn is handed up to `credit` tasks.  In the *steady* phase every
//! result is answered with a fresh task sent back to the worker that
//! produced it, so a worker never holds more than its credit.  Once the
//! partitioner runs dry the coordinator is *draining*: it keeps
//! receiving until nothing is outstanding.  Only then is it
//! *terminated*, and each worker receives exactly one stop signal.
//! The coordinator then waits for every worker to hang up; anything a
//! worker sends after its stop is a protocol violation.
//!
//! A worker that hangs up before it is stopped ends the run with an
//! error.  A worker that stays connected but never answers stalls the
//! run forever; no task is ever reassigned.

use std::collections::VecDeque;

use channel::{Channel, Rank, Tag, COORDINATOR};
use errors::{Error, Result};
use frame::{max_frame_len, Frame};
use grid::Grid;
use tasks::{Partitioner, Task, Tasks};

/// Where the dispatch loop is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Handing out the initial credit.
    Priming,
    /// Replacing each completed task with a new one.
    Steady,
    /// No tasks left; collecting what is still outstanding.
    Draining,
    /// Every worker has been told to stop.
    Terminated,
}

/// The coordinator's view of one worker.
#[derive(Clone, Debug, Default)]
pub struct WorkerSlot {
    outstanding: VecDeque<Task>,
    peak: usize,
    completed: usize,
    stopped: bool,
}

impl WorkerSlot {
    /// Tasks sent to the worker and not yet answered.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// The most tasks the worker ever held at once.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Results received from the worker.
    pub fn completed(&self) -> usize {
        self.completed
    }
}

/// Counters describing a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Tasks sent to workers.
    pub dispatched: usize,
    /// Results written into the grid.
    pub received: usize,
    /// Stop signals sent.
    pub stops: usize,
    /// Per worker, the most tasks it held at once.  Index 0 is worker 1.
    pub peak_outstanding: Vec<usize>,
    /// Per worker, the results it returned.  Index 0 is worker 1.
    pub completed: Vec<usize>,
}

/// Rank 0 of the farm.  Owns the grid and the worker table.
pub struct Coordinator<C: Channel> {
    channel: C,
    tasks: Tasks,
    grid: Grid,
    slots: Vec<WorkerSlot>,
    credit: usize,
    in_flight: usize,
    max_len: usize,
    phase: Phase,
    report: RunReport,
}

impl<C: Channel> Coordinator<C> {
    /// A coordinator farming out `partitioner`'s tasks to every other
    /// rank of `channel`, at most `credit` per worker at a time.
    pub fn new(channel: C, partitioner: Partitioner, credit: usize) -> Self {
        let workers = channel.size().saturating_sub(1);
        Coordinator {
            tasks: partitioner.tasks(),
            grid: Grid::new(partitioner.shape()),
            slots: vec![WorkerSlot::default(); workers],
            credit: credit.max(1),
            in_flight: 0,
            max_len: max_frame_len(partitioner.max_task_len()),
            phase: Phase::Priming,
            report: RunReport::default(),
            channel,
        }
    }

    /// Run the farm to completion and hand back the finished grid.
    pub fn run(mut self) -> Result<(Grid, RunReport)> {
        if self.slots.is_empty() {
            return Err(Error::protocol("a coordinator needs at least one worker"));
        }
        info!(
            "coordinating {} workers over a {}x{} grid, credit {}",
            self.slots.len(),
            self.grid.shape().cols,
            self.grid.shape().rows,
            self.credit
        );
        self.prime()?;
        while self.in_flight > 0 {
            self.collect()?;
        }
        self.phase = Phase::Draining;
        self.terminate()?;
        self.drain()?;

        if !self.grid.is_complete() {
            return Err(Error::Incomplete {
                written: self.grid.written(),
                total: self.grid.shape().len(),
            });
        }
        self.report.peak_outstanding = self.slots.iter().map(WorkerSlot::peak).collect();
        self.report.completed = self.slots.iter().map(WorkerSlot::completed).collect();
        info!(
            "grid complete: {} tasks dispatched, {} results received",
            self.report.dispatched, self.report.received
        );
        Ok((self.grid, self.report))
    }

    fn prime(&mut self) -> Result<()> {
        'workers: for rank in 1..=self.slots.len() {
            for _ in 0..self.credit {
                match self.tasks.next() {
                    Some(task) => self.dispatch(rank, task)?,
                    None => break 'workers,
                }
            }
        }
        let idle = self
            .slots
            .iter()
            .filter(|slot| slot.outstanding() == 0)
            .count();
        if idle > 0 {
            warn!("{} workers received no work: the grid has fewer tasks than workers", idle);
        }
        self.phase = Phase::Steady;
        Ok(())
    }

    fn collect(&mut self) -> Result<()> {
        let live: Vec<Rank> = (1..=self.slots.len())
            .filter(|&rank| !self.slots[rank - 1].stopped)
            .collect();
        let envelope = self.channel.receive_among(&live, self.max_len)?;
        let src = envelope.src;
        let (task, values) = match Frame::decode(envelope.tag, &envelope.payload)? {
            Frame::Result { task, values } => (task, values),
            frame => {
                return Err(Error::protocol(format!(
                    "rank {} sent {:?} to the coordinator",
                    src,
                    frame.tag()
                )));
            }
        };

        {
            let slot = self.slot_mut(src)?;
            match slot.outstanding.pop_front() {
                Some(ref expected) if *expected == task => (),
                expected => {
                    return Err(Error::protocol(format!(
                        "rank {} returned {:?}, expected {:?}",
                        src, task, expected
                    )));
                }
            }
            slot.completed += 1;
        }
        self.in_flight -= 1;
        self.report.received += 1;
        self.grid.write_range(&task, &values)?;

        if self.phase == Phase::Steady {
            match self.tasks.next() {
                Some(next) => self.dispatch(src, next)?,
                None => {
                    debug!("partitioner exhausted, draining {} tasks", self.in_flight);
                    self.phase = Phase::Draining;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, rank: Rank, task: Task) -> Result<()> {
        let credit = self.credit;
        {
            let slot = self.slot_mut(rank)?;
            if slot.stopped {
                return Err(Error::protocol(format!("work for stopped rank {}", rank)));
            }
            if slot.outstanding.len() >= credit {
                return Err(Error::protocol(format!("rank {} is out of credit", rank)));
            }
            slot.outstanding.push_back(task);
            slot.peak = slot.peak.max(slot.outstanding.len());
        }
        self.channel.send(rank, Frame::Work(task).encode(), Tag::Work)?;
        self.in_flight += 1;
        self.report.dispatched += 1;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        if self.in_flight != 0 {
            return Err(Error::protocol(format!(
                "stop requested with {} tasks in flight",
                self.in_flight
            )));
        }
        let stop = Frame::Stop.encode();
        for rank in 1..=self.slots.len() {
            {
                let slot = self.slot_mut(rank)?;
                if slot.stopped {
                    continue;
                }
                slot.stopped = true;
            }
            self.channel.send(rank, stop.clone(), Tag::Stop)?;
            self.report.stops += 1;
            debug!("stopped worker {}", rank);
        }
        self.phase = Phase::Terminated;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        for rank in 1..=self.slots.len() {
            match self.channel.receive_from(rank, None) {
                Ok(envelope) => {
                    return Err(Error::protocol(format!(
                        "rank {} sent {:?} after stop",
                        rank, envelope.tag
                    )));
                }
                Err(Error::Disconnected { .. }) => trace!("worker {} hung up", rank),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, rank: Rank) -> Result<&mut WorkerSlot> {
        if rank == COORDINATOR {
            return Err(Error::protocol("the coordinator is not a worker"));
        }
        self.slots
            .get_mut(rank - 1)
            .ok_or_else(|| Error::protocol(format!("no worker with rank {}", rank)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel::{mesh, Envelope};
    use planes::{PlaneMapper, Viewport};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::thread;
    use tasks::{Shape, Tiling};
    use worker::{compute, Worker};

    #[derive(Debug, PartialEq)]
    enum Event {
        Work(Rank),
        Stop(Rank),
    }

    /// Stands in for a pool of workers.  Every task sent is computed at
    /// once, and replies come back from a randomly chosen worker,
    /// oldest first per worker.
    struct Simulated {
        plane: PlaneMapper,
        size: usize,
        credit: usize,
        rng: StdRng,
        queues: Vec<VecDeque<Task>>,
        stopped: Vec<bool>,
        events: Vec<Event>,
        corrupt: Option<Task>,
        late: Option<Rank>,
    }

    impl Simulated {
        fn new(shape: Shape, workers: usize, credit: usize, seed: u64) -> Simulated {
            Simulated {
                plane: PlaneMapper::new(shape, Viewport::default()).unwrap(),
                size: workers + 1,
                credit,
                rng: StdRng::seed_from_u64(seed),
                queues: vec![VecDeque::new(); workers + 1],
                stopped: vec![false; workers + 1],
                events: vec![],
                corrupt: None,
                late: None,
            }
        }

        fn outstanding(&self) -> usize {
            self.queues.iter().map(VecDeque::len).sum()
        }
    }

    impl<'a> Channel for &'a mut Simulated {
        fn rank(&self) -> Rank {
            COORDINATOR
        }

        fn size(&self) -> usize {
            self.size
        }

        fn send(&mut self, dst: Rank, payload: Vec<u8>, tag: Tag) -> Result<()> {
            assert!(!self.stopped[dst], "message to stopped worker {}", dst);
            match Frame::decode(tag, &payload)? {
                Frame::Work(task) => {
                    self.queues[dst].push_back(task);
                    assert!(self.queues[dst].len() <= self.credit, "credit exceeded");
                    self.events.push(Event::Work(dst));
                }
                Frame::Stop => {
                    assert_eq!(self.outstanding(), 0, "stop with work outstanding");
                    self.stopped[dst] = true;
                    self.events.push(Event::Stop(dst));
                }
                other => panic!("coordinator sent {:?}", other),
            }
            Ok(())
        }

        fn receive_any(&mut self, max_len: usize) -> Result<Envelope> {
            let everyone: Vec<Rank> = (1..self.size).collect();
            self.receive_among(&everyone, max_len)
        }

        fn receive_among(&mut self, peers: &[Rank], max_len: usize) -> Result<Envelope> {
            let busy: Vec<Rank> = peers
                .iter()
                .cloned()
                .filter(|&rank| !self.queues[rank].is_empty())
                .collect();
            assert!(!busy.is_empty(), "receive with nothing outstanding");
            let src = busy[self.rng.gen_range(0, busy.len())];
            let task = self.queues[src].pop_front().unwrap();
            let task = self.corrupt.take().unwrap_or(task);
            let values = compute(&self.plane, 100, &task, 1).unwrap();
            let payload = Frame::Result { task, values }.encode();
            assert!(payload.len() <= max_len);
            Ok(Envelope {
                src,
                tag: Tag::Result,
                payload,
            })
        }

        fn receive_from(&mut self, src: Rank, _tag: Option<Tag>) -> Result<Envelope> {
            assert!(self.stopped[src], "waited on running worker {}", src);
            if self.late == Some(src) {
                self.late = None;
                let task = Task::Span { offset: 0, len: 1 };
                let payload = Frame::Result { task, values: vec![1] }.encode();
                return Ok(Envelope {
                    src,
                    tag: Tag::Result,
                    payload,
                });
            }
            Err(Error::Disconnected { rank: src })
        }
    }

    fn farm(
        sim: &mut Simulated,
        shape: Shape,
        tiling: Tiling,
        task_size: usize,
    ) -> Result<(Grid, RunReport)> {
        let credit = sim.credit;
        Coordinator::new(sim, Partitioner::new(shape, tiling, task_size), credit).run()
    }

    fn sequential(shape: Shape) -> Vec<u32> {
        let plane = PlaneMapper::new(shape, Viewport::default()).unwrap();
        compute(&plane, 100, &Task::Span { offset: 0, len: shape.len() }, 1).unwrap()
    }

    #[test]
    fn out_of_order_results_assemble_the_grid() {
        let shape = Shape::new(17, 23);
        let expected = sequential(shape);
        for &tiling in &[Tiling::Linear, Tiling::Rectangular, Tiling::RowSegments] {
            for seed in 0..4 {
                let mut sim = Simulated::new(shape, 3, 2, seed);
                let (grid, report) = farm(&mut sim, shape, tiling, 5).unwrap();
                assert_eq!(grid.read().unwrap(), &expected[..]);
                assert_eq!(report.dispatched, report.received);
                assert_eq!(report.dispatched, Partitioner::new(shape, tiling, 5).count());
            }
        }
    }

    #[test]
    fn credit_is_never_exceeded() {
        let shape = Shape::new(30, 30);
        for credit in 1..5 {
            let mut sim = Simulated::new(shape, 4, credit, 7);
            let (_, report) = farm(&mut sim, shape, Tiling::Linear, 7).unwrap();
            assert!(report.peak_outstanding.iter().all(|&peak| peak <= credit));
            assert!(report.peak_outstanding.iter().any(|&peak| peak == credit));
        }
    }

    #[test]
    fn every_worker_stopped_once_at_the_end() {
        let shape = Shape::new(12, 12);
        let mut sim = Simulated::new(shape, 5, 3, 11);
        let (_, report) = farm(&mut sim, shape, Tiling::Rectangular, 4).unwrap();
        assert_eq!(report.stops, 5);
        let first_stop = sim
            .events
            .iter()
            .position(|event| match *event {
                Event::Stop(_) => true,
                _ => false,
            })
            .unwrap();
        assert!(sim.events[first_stop..].iter().all(|event| match *event {
            Event::Stop(_) => true,
            _ => false,
        }));
        let mut stopped: Vec<Rank> = sim.events[first_stop..]
            .iter()
            .filter_map(|event| match *event {
                Event::Stop(rank) => Some(rank),
                _ => None,
            })
            .collect();
        stopped.sort();
        assert_eq!(stopped, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn more_workers_than_tasks() {
        let shape = Shape::new(2, 2);
        let mut sim = Simulated::new(shape, 6, 4, 3);
        let (grid, report) = farm(&mut sim, shape, Tiling::Linear, 3).unwrap();
        assert!(grid.is_complete());
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.stops, 6);
        assert_eq!(report.completed, vec![2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn priming_fills_workers_in_turn() {
        let shape = Shape::new(10, 10);
        let mut sim = Simulated::new(shape, 2, 3, 5);
        farm(&mut sim, shape, Tiling::Linear, 10).unwrap();
        assert_eq!(
            &sim.events[..6],
            &[
                Event::Work(1),
                Event::Work(1),
                Event::Work(1),
                Event::Work(2),
                Event::Work(2),
                Event::Work(2),
            ]
        );
    }

    #[test]
    fn unexpected_result_is_a_violation() {
        let shape = Shape::new(4, 4);
        let mut sim = Simulated::new(shape, 2, 2, 1);
        sim.corrupt = Some(Task::Span { offset: 3, len: 2 });
        match farm(&mut sim, shape, Tiling::Linear, 2) {
            Err(Error::Protocol(_)) => (),
            other => panic!("expected a protocol violation, got {:?}", other),
        }
    }

    #[test]
    fn message_after_stop_is_a_violation() {
        let shape = Shape::new(6, 6);
        let mut sim = Simulated::new(shape, 3, 2, 9);
        sim.late = Some(2);
        match farm(&mut sim, shape, Tiling::Rectangular, 3) {
            Err(Error::Protocol(ref message)) => assert!(message.contains("after stop")),
            other => panic!("expected a protocol violation, got {:?}", other),
        }
        assert_eq!(sim.stopped, vec![false, true, true, true]);
    }

    #[test]
    fn worker_hanging_up_early_ends_the_run() {
        let shape = Shape::new(12, 12);
        let plane = PlaneMapper::new(shape, Viewport::default()).unwrap();
        let mut ranks = mesh(3);
        let mut quitter = ranks.pop().unwrap();
        let steady = ranks.pop().unwrap();
        let coordinator = ranks.pop().unwrap();
        let serving = thread::spawn(move || Worker::new(steady, plane, 100, 1).run());
        let quitting = thread::spawn(move || {
            quitter.receive_from(COORDINATOR, None).unwrap();
        });

        let partitioner = Partitioner::new(shape, Tiling::Linear, 8);
        match Coordinator::new(coordinator, partitioner, 2).run() {
            Err(Error::Disconnected { rank: 2 }) => (),
            other => panic!("expected rank 2 to be gone, got {:?}", other),
        }
        quitting.join().unwrap();
        // The steady worker sees the coordinator go away.
        assert!(serving.join().unwrap().is_err());
    }

    #[test]
    fn no_workers_is_an_error() {
        let shape = Shape::new(4, 4);
        let mut sim = Simulated::new(shape, 0, 2, 1);
        assert!(farm(&mut sim, shape, Tiling::Linear, 2).is_err());
    }
}
