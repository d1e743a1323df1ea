use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{SortlastError, SortlastResult};

/// Message tags, partitioned per collective so rounds can never mix.
pub mod tags {
    /// Binary-swap exchange at round `k` uses `SWAP_BASE + k`.
    pub const SWAP_BASE: u32 = 0x1000;
    pub const DIRECT_BLEND: u32 = 0x2000;
    pub const DIRECT_STRIP: u32 = 0x2001;
    pub const GATHER: u32 = 0x3000;
    pub const BROADCAST: u32 = 0x4000;
    pub const SCATTER: u32 = 0x4001;
    pub const REDUCE: u32 = 0x5000;
    pub const REDUCE_RESULT: u32 = 0x5001;
    pub const BARRIER_ARRIVE: u32 = 0x6000;
    pub const BARRIER_RELEASE: u32 = 0x6001;
    pub const ABORT: u32 = 0x7000;
}

struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<u8>,
}

/// One rank's endpoint of a fully connected message mesh.
///
/// The substrate is reliable and FIFO per (source, destination, tag) triple.
/// `recv` is selective: envelopes that do not match the requested source and
/// tag are stashed, never dropped, and handed out by a later matching `recv`.
///
/// A rank that hits a fatal error mid-collective calls [`Communicator::abort`]
/// so that peers blocked in `recv` fail with `CollectiveFailure` instead of
/// waiting forever.
pub struct Communicator {
    rank: usize,
    senders: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: VecDeque<Envelope>,
}

impl Communicator {
    /// Build the `size` connected endpoints of one group, indexed by rank.
    pub fn mesh(size: usize) -> Vec<Communicator> {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Communicator {
                rank,
                senders: senders.clone(),
                inbox,
                stash: VecDeque::new(),
            })
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.senders.len()
    }

    pub fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> SortlastResult<()> {
        let sender = self.senders.get(dest).ok_or_else(|| {
            SortlastError::collective(format!(
                "send to rank {dest} outside group of {}",
                self.size()
            ))
        })?;
        sender
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| SortlastError::collective(format!("rank {dest} is gone")))
    }

    /// Block until the next envelope from `source` with `tag` arrives.
    pub fn recv(&mut self, source: usize, tag: u32) -> SortlastResult<Vec<u8>> {
        if let Some(pos) = self
            .stash
            .iter()
            .position(|e| e.source == source && e.tag == tag)
        {
            if let Some(envelope) = self.stash.remove(pos) {
                return Ok(envelope.payload);
            }
        }

        loop {
            let envelope = self.inbox.recv().map_err(|_| {
                SortlastError::collective(format!(
                    "rank {} waiting on rank {source}: all peers disconnected",
                    self.rank
                ))
            })?;
            if envelope.tag == tags::ABORT {
                return Err(SortlastError::collective(format!(
                    "rank {} aborted: {}",
                    envelope.source,
                    String::from_utf8_lossy(&envelope.payload)
                )));
            }
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.stash.push_back(envelope);
        }
    }

    /// Best-effort fatal-error signal to every peer; peers blocked in `recv`
    /// observe it as a `CollectiveFailure`.
    pub fn abort(&self, reason: &str) {
        for dest in 0..self.size() {
            if dest == self.rank {
                continue;
            }
            let _ = self.send(dest, tags::ABORT, reason.as_bytes().to_vec());
        }
    }

    /// All ranks enter; none leaves until every rank has entered.
    pub fn barrier(&mut self) -> SortlastResult<()> {
        if self.size() == 1 {
            return Ok(());
        }
        if self.rank == 0 {
            for src in 1..self.size() {
                self.recv(src, tags::BARRIER_ARRIVE)?;
            }
            for dest in 1..self.size() {
                self.send(dest, tags::BARRIER_RELEASE, Vec::new())?;
            }
        } else {
            self.send(0, tags::BARRIER_ARRIVE, Vec::new())?;
            self.recv(0, tags::BARRIER_RELEASE)?;
        }
        Ok(())
    }

    /// Reduce every rank's value with `combine` and hand the result to all.
    ///
    /// The fold visits ranks in ascending order, so non-commutative `combine`
    /// functions see a stable operand order.
    pub fn allreduce<T, C>(&mut self, value: T, combine: C) -> SortlastResult<T>
    where
        T: Serialize + DeserializeOwned,
        C: Fn(T, T) -> T,
    {
        if self.size() == 1 {
            return Ok(value);
        }
        if self.rank == 0 {
            let mut acc = value;
            for src in 1..self.size() {
                let bytes = self.recv(src, tags::REDUCE)?;
                acc = combine(acc, wire::decode(&bytes)?);
            }
            let bytes = wire::encode(&acc)?;
            for dest in 1..self.size() {
                self.send(dest, tags::REDUCE_RESULT, bytes.clone())?;
            }
            Ok(acc)
        } else {
            self.send(0, tags::REDUCE, wire::encode(&value)?)?;
            let bytes = self.recv(0, tags::REDUCE_RESULT)?;
            wire::decode(&bytes)
        }
    }
}

/// bincode framing for structured payloads (mesh chunks, strip headers).
pub(crate) mod wire {
    use super::*;

    pub fn encode<T: Serialize>(value: &T) -> SortlastResult<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| SortlastError::collective(format!("encode wire frame: {e}")))
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SortlastResult<T> {
        bincode::deserialize(bytes)
            .map_err(|e| SortlastError::collective(format!("decode wire frame: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn mesh_assigns_ranks_in_order() {
        let comms = Communicator::mesh(3);
        assert_eq!(comms.len(), 3);
        for (i, c) in comms.iter().enumerate() {
            assert_eq!(c.rank(), i);
            assert_eq!(c.size(), 3);
        }
    }

    #[test]
    fn recv_is_selective_by_source_and_tag() {
        let mut comms = Communicator::mesh(2);
        let mut a = comms.remove(0);
        let b = comms.remove(0);

        b.send(0, 7, vec![7]).unwrap();
        b.send(0, 8, vec![8]).unwrap();

        // The later tag first; the earlier envelope must survive in the stash.
        assert_eq!(a.recv(1, 8).unwrap(), vec![8]);
        assert_eq!(a.recv(1, 7).unwrap(), vec![7]);
    }

    #[test]
    fn recv_preserves_fifo_per_source_and_tag() {
        let mut comms = Communicator::mesh(2);
        let mut a = comms.remove(0);
        let b = comms.remove(0);

        b.send(0, 5, vec![1]).unwrap();
        b.send(0, 5, vec![2]).unwrap();
        assert_eq!(a.recv(1, 5).unwrap(), vec![1]);
        assert_eq!(a.recv(1, 5).unwrap(), vec![2]);
    }

    #[test]
    fn send_outside_group_fails() {
        let comms = Communicator::mesh(2);
        assert!(matches!(
            comms[0].send(5, 0, Vec::new()),
            Err(SortlastError::CollectiveFailure(_))
        ));
    }

    #[test]
    fn recv_reports_abort_as_collective_failure() {
        let mut comms = Communicator::mesh(2);
        let mut a = comms.remove(0);
        let b = comms.remove(0);

        b.abort("bad geometry");
        let err = a.recv(1, 42).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rank 1 aborted"));
        assert!(msg.contains("bad geometry"));
    }

    #[test]
    fn recv_fails_once_all_peers_are_gone() {
        let mut comms = Communicator::mesh(2);
        let mut a = comms.remove(0);
        drop(comms);

        // `a` still holds a sender to itself; drop the whole send side.
        a.senders.clear();
        let err = a.recv(1, 0).unwrap_err();
        assert!(matches!(err, SortlastError::CollectiveFailure(_)));
    }

    #[test]
    fn barrier_releases_all_ranks() {
        let comms = Communicator::mesh(4);
        thread::scope(|s| {
            for mut comm in comms {
                s.spawn(move || comm.barrier().unwrap());
            }
        });
    }

    #[test]
    fn allreduce_folds_in_rank_order() {
        let comms = Communicator::mesh(4);
        let results: Vec<String> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut comm| {
                    s.spawn(move || {
                        let mine = comm.rank().to_string();
                        comm.allreduce(mine, |a, b| format!("{a}{b}")).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert_eq!(r, "0123");
        }
    }
}
