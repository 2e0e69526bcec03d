//! Point-to-point messaging between ranks.
//!
//! Rank 0 is the coordinator and every other rank is a worker.  Ranks
//! share nothing but the mesh: each ordered pair of ranks gets its own
//! unbounded crossbeam channel, so delivery between two peers is
//! reliable and in order, while nothing is promised across peers.

use crossbeam::channel::{unbounded, Receiver, Select, Sender};
use std::collections::VecDeque;

use errors::{Error, Result};

/// Identity of a rank within the mesh.
pub type Rank = usize;

/// The coordinator's rank.
pub const COORDINATOR: Rank = 0;

/// What a message carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    /// A task descriptor, coordinator to worker.
    Work,
    /// Computed values, worker to coordinator.
    Result,
    /// No more work; the receiving worker exits.
    Stop,
}

/// A received message and where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Sending rank.
    pub src: Rank,
    /// The tag it was sent with.
    pub tag: Tag,
    /// The encoded frame.
    pub payload: Vec<u8>,
}

/// Bidirectional, asynchronous, point-to-point messaging.
pub trait Channel {
    /// This endpoint's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the mesh, this one included.
    fn size(&self) -> usize;

    /// Queue `payload` for `dst`.  Never blocks.
    fn send(&mut self, dst: Rank, payload: Vec<u8>, tag: Tag) -> Result<()>;

    /// Block until a message arrives from any peer.  A payload longer
    /// than `max_len` bytes is a protocol violation.  Peers that have
    /// hung up are skipped; only once every peer is gone does this fail
    /// with `Disconnected`.
    fn receive_any(&mut self, max_len: usize) -> Result<Envelope>;

    /// Like `receive_any`, but only from `peers`, every one of which is
    /// expected to stay connected: if any of them hangs up, this fails
    /// with `Disconnected` naming it.
    fn receive_among(&mut self, peers: &[Rank], max_len: usize) -> Result<Envelope>;

    /// Block until a message from `src` arrives whose tag matches; `None`
    /// matches every tag.  Messages from `src` that do not match are kept,
    /// in order, for later receives.
    fn receive_from(&mut self, src: Rank, tag: Option<Tag>) -> Result<Envelope>;
}

type Packet = (Tag, Vec<u8>);

/// One rank's end of a crossbeam mesh.
pub struct Endpoint {
    rank: Rank,
    outboxes: Vec<Option<Sender<Packet>>>,
    inboxes: Vec<Option<Receiver<Packet>>>,
    pending: Vec<VecDeque<Packet>>,
    closed: Vec<bool>,
}

/// Builds a fully connected mesh of `size` ranks and returns the
/// endpoints, indexed by rank.
pub fn mesh(size: usize) -> Vec<Endpoint> {
    let mut endpoints: Vec<Endpoint> = (0..size)
        .map(|rank| Endpoint {
            rank,
            outboxes: (0..size).map(|_| None).collect(),
            inboxes: (0..size).map(|_| None).collect(),
            pending: (0..size).map(|_| VecDeque::new()).collect(),
            closed: vec![false; size],
        })
        .collect();
    for src in 0..size {
        for dst in 0..size {
            if src != dst {
                let (tx, rx) = unbounded();
                endpoints[src].outboxes[dst] = Some(tx);
                endpoints[dst].inboxes[src] = Some(rx);
            }
        }
    }
    endpoints
}

impl Endpoint {
    fn check_len(src: Rank, packet: &Packet, max_len: usize) -> Result<()> {
        if packet.1.len() > max_len {
            return Err(Error::protocol(format!(
                "{} byte message from rank {} exceeds the {} byte receive limit",
                packet.1.len(),
                src,
                max_len
            )));
        }
        Ok(())
    }

    fn deliver(src: Rank, packet: Packet, max_len: usize) -> Result<Envelope> {
        Endpoint::check_len(src, &packet, max_len)?;
        Ok(Envelope {
            src,
            tag: packet.0,
            payload: packet.1,
        })
    }

    /// Wait on `peers`.  With `strict`, a peer hanging up is an error at
    /// once; otherwise it is dropped from the wait.
    fn select(&mut self, peers: &[Rank], max_len: usize, strict: bool) -> Result<Envelope> {
        for &src in peers {
            self.inbox(src)?;
        }
        if let Some(src) = peers
            .iter()
            .cloned()
            .find(|&src| !self.pending[src].is_empty())
        {
            if let Some(packet) = self.pending[src].pop_front() {
                return Endpoint::deliver(src, packet, max_len);
            }
        }

        loop {
            if strict {
                if let Some(&src) = peers.iter().find(|&&src| self.closed[src]) {
                    return Err(Error::Disconnected { rank: src });
                }
            }
            let live: Vec<Rank> = peers
                .iter()
                .cloned()
                .filter(|&src| !self.closed[src])
                .collect();
            if live.is_empty() {
                return Err(match peers.last() {
                    Some(&rank) => Error::Disconnected { rank },
                    None => Error::protocol("receive from an empty mesh"),
                });
            }

            let (src, received) = {
                let inboxes = live
                    .iter()
                    .map(|&src| self.inbox(src))
                    .collect::<Result<Vec<_>>>()?;
                let mut select = Select::new();
                for &inbox in &inboxes {
                    select.recv(inbox);
                }
                let operation = select.select();
                let index = operation.index();
                (live[index], operation.recv(inboxes[index]))
            };
            match received {
                Ok(packet) => {
                    trace!("rank {} <- {}: {:?}", self.rank, src, packet.0);
                    return Endpoint::deliver(src, packet, max_len);
                }
                Err(_) => {
                    debug!("rank {} hung up on rank {}", src, self.rank);
                    self.closed[src] = true;
                }
            }
        }
    }

    fn inbox(&self, src: Rank) -> Result<&Receiver<Packet>> {
        match self.inboxes.get(src) {
            Some(Some(inbox)) => Ok(inbox),
            _ => Err(Error::protocol(format!(
                "rank {} has no channel from rank {}",
                self.rank, src
            ))),
        }
    }
}

impl Channel for Endpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn send(&mut self, dst: Rank, payload: Vec<u8>, tag: Tag) -> Result<()> {
        trace!("rank {} -> {}: {:?}, {} bytes", self.rank, dst, tag, payload.len());
        match self.outboxes.get(dst) {
            Some(Some(outbox)) => outbox
                .send((tag, payload))
                .map_err(|_| Error::Disconnected { rank: dst }),
            _ => Err(Error::protocol(format!(
                "rank {} cannot send to rank {}",
                self.rank, dst
            ))),
        }
    }

    fn receive_any(&mut self, max_len: usize) -> Result<Envelope> {
        let rank = self.rank;
        let peers: Vec<Rank> = (0..self.size()).filter(|&src| src != rank).collect();
        self.select(&peers, max_len, false)
    }

    fn receive_among(&mut self, peers: &[Rank], max_len: usize) -> Result<Envelope> {
        self.select(peers, max_len, true)
    }

    fn receive_from(&mut self, src: Rank, tag: Option<Tag>) -> Result<Envelope> {
        let matches = |packet: &Packet| tag.map_or(true, |tag| tag == packet.0);
        let queued = match self.pending.get(src) {
            Some(queue) => queue.iter().position(|packet| matches(packet)),
            None => return Err(Error::protocol(format!("no such rank {}", src))),
        };
        if let Some(index) = queued {
            if let Some((tag, payload)) = self.pending[src].remove(index) {
                return Ok(Envelope { src, tag, payload });
            }
        }

        loop {
            let packet = self
                .inbox(src)?
                .recv()
                .map_err(|_| Error::Disconnected { rank: src })?;
            if matches(&packet) {
                trace!("rank {} <- {}: {:?}", self.rank, src, packet.0);
                return Ok(Envelope {
                    src,
                    tag: packet.0,
                    payload: packet.1,
                });
            }
            self.pending[src].push_back(packet);
        }
    }
}
