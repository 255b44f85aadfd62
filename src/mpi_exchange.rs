//! MPI-backed exchange for multi-process runs.
//!
//! Maps the round collectives onto plain MPI operations: variable-count
//! all-to-all for message delivery, an all-reduce for the round status and
//! variable-count gathers to the root rank. No memory is shared between
//! ranks; the conceptual global mapping exists only as messages.

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::traits::{Communicator, CommunicatorCollectives, Equivalence, Root};

use crate::constants::ROOT_RANK;
use crate::exchange::{Exchange, RoundStatus};
use crate::types::{FeatureRecord, RootPair, UnionMessage};

/// [Exchange] implementation over an MPI communicator.
pub struct MpiExchange<'c, C> {
    comm: &'c C,
}

impl<'c, C: CommunicatorCollectives> MpiExchange<'c, C> {
    /// Wrap a communicator. One partition per rank.
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }
}

/// Compute displacements from a vector of counts, for varcount operations.
fn displacements(counts: &[i32]) -> Vec<i32> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}

// Gather a distributed array to the root rank; `Some` on root only.
fn gather_varcount_to_root<T, C>(arr: &[T], comm: &C) -> Option<Vec<T>>
where
    T: Equivalence + Default + Clone,
    C: CommunicatorCollectives,
{
    let n = arr.len() as i32;
    let root_process = comm.process_at_rank(ROOT_RANK as i32);

    if comm.rank() == ROOT_RANK as i32 {
        let mut counts = vec![0_i32; comm.size() as usize];
        root_process.gather_into_root(&n, &mut counts);

        let total = counts.iter().sum::<i32>() as usize;
        let mut buffer = vec![T::default(); total];
        let displs = displacements(&counts);
        let mut partition = PartitionMut::new(&mut buffer[..], counts, &displs[..]);
        root_process.gather_varcount_into_root(arr, &mut partition);
        Some(buffer)
    } else {
        root_process.gather_into(&n);
        root_process.gather_varcount_into(arr);
        None
    }
}

impl<C: CommunicatorCollectives> Exchange for MpiExchange<'_, C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_to_all(&mut self, outbox: Vec<Vec<UnionMessage>>) -> Vec<UnionMessage> {
        assert_eq!(outbox.len(), self.size());

        // Send around how many messages each rank gets, then the messages
        // themselves with a varcount all-to-all.
        let counts: Vec<i32> = outbox.iter().map(|msgs| msgs.len() as i32).collect();
        let mut counts_from_rank = vec![0_i32; self.size()];
        self.comm.all_to_all_into(&counts, &mut counts_from_rank);

        let all_messages: Vec<UnionMessage> = outbox.into_iter().flatten().collect();
        let send_displs = displacements(&counts);
        let send_partition = Partition::new(&all_messages[..], &counts[..], &send_displs[..]);

        let total = counts_from_rank.iter().sum::<i32>() as usize;
        let mut inbox = vec![UnionMessage::default(); total];
        let recv_displs = displacements(&counts_from_rank);
        let mut recv_partition =
            PartitionMut::new(&mut inbox[..], counts_from_rank, &recv_displs[..]);

        self.comm
            .all_to_all_varcount_into(&send_partition, &mut recv_partition);

        inbox
    }

    fn reduce(&mut self, local: RoundStatus) -> RoundStatus {
        let local = [
            local.changes as u64,
            local.messages as u64,
            u64::from(local.failed),
        ];
        let mut global = [0_u64; 3];
        self.comm
            .all_reduce_into(&local[..], &mut global[..], SystemOperation::sum());

        RoundStatus {
            changes: global[0] as usize,
            messages: global[1] as usize,
            failed: global[2] > 0,
        }
    }

    fn gather_pairs(&mut self, pairs: &[RootPair]) -> Option<Vec<RootPair>> {
        gather_varcount_to_root(pairs, self.comm)
    }

    fn gather_features(&mut self, records: &[FeatureRecord]) -> Option<Vec<FeatureRecord>> {
        gather_varcount_to_root(records, self.comm)
    }
}
