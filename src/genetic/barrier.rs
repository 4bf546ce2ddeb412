//! Gated rendezvous used to step the worker pool through one phase.
//!
//! A [`GenerationBarrier`] pairs a "go" gate with a counting barrier. The
//! orchestrator opens the gate, every party (workers and orchestrator) runs
//! its share of the phase and arrives; the last arrival closes the gate again
//! and releases the others, so the next cycle starts with the gate shut.
//!
//! Any participant can [`abort`](GenerationBarrier::abort) the barrier. From
//! then on every wait returns [`Aborted`] instead of blocking, which is how a
//! failed worker releases siblings that would otherwise wait for it forever.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// The rendezvous was abandoned by another participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    arrived: usize,
    cycle: u64,
    aborted: bool,
}

#[derive(Debug)]
pub struct GenerationBarrier {
    parties: usize,
    state: Mutex<GateState>,
    signal: Condvar,
}

impl GenerationBarrier {
    /// A closed barrier for `parties` participants
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "a barrier needs at least one party");
        GenerationBarrier {
            parties,
            state: Mutex::new(GateState::default()),
            signal: Condvar::new(),
        }
    }

    /// Open the gate for the current cycle and wake everyone parked on it
    pub fn open(&self) -> Result<(), Aborted> {
        let mut state = self.lock();
        if state.aborted {
            return Err(Aborted);
        }
        state.open = true;
        self.signal.notify_all();
        Ok(())
    }

    /// Block until the gate is open
    pub fn wait_open(&self) -> Result<(), Aborted> {
        let state = self.signal
            .wait_while(self.lock(), |s| !s.open && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.aborted {
            Err(Aborted)
        } else {
            Ok(())
        }
    }

    /// Arrive at the rendezvous and block until every party has arrived.
    ///
    /// Returns `Ok(true)` for the last arrival, which also closed the gate.
    pub fn arrive_and_wait(&self) -> Result<bool, Aborted> {
        let mut state = self.lock();
        if state.aborted {
            return Err(Aborted);
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.open = false;
            state.cycle = state.cycle.wrapping_add(1);
            self.signal.notify_all();
            return Ok(true);
        }

        let cycle = state.cycle;
        let state = self.signal
            .wait_while(state, |s| s.cycle == cycle && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.cycle != cycle {
            Ok(false)
        } else {
            Err(Aborted)
        }
    }

    /// Abandon the barrier: wake every waiter and fail every later call
    pub fn abort(&self) {
        let mut state = self.lock();
        state.aborted = true;
        self.signal.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_party_cycles_without_blocking() {
        let barrier = GenerationBarrier::new(1);
        for _ in 0..3 {
            barrier.open().unwrap();
            barrier.wait_open().unwrap();
            assert_eq!(barrier.arrive_and_wait(), Ok(true));
        }
    }

    #[test]
    fn test_workers_do_not_pass_a_closed_gate() {
        let workers = 4;
        let barrier = GenerationBarrier::new(workers + 1);
        let done = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| {
                    for _ in 0..5 {
                        barrier.wait_open().unwrap();
                        done.fetch_add(1, Ordering::SeqCst);
                        barrier.arrive_and_wait().unwrap();
                    }
                });
            }

            for cycle in 0..5 {
                thread::sleep(Duration::from_millis(5));
                // nobody may run ahead while the gate is shut
                assert_eq!(done.load(Ordering::SeqCst), cycle * workers);
                barrier.open().unwrap();
                barrier.arrive_and_wait().unwrap();
                assert_eq!(done.load(Ordering::SeqCst), (cycle + 1) * workers);
            }
        });
    }

    #[test]
    fn test_exactly_one_leader_per_cycle() {
        let barrier = GenerationBarrier::new(3);
        let leaders = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..10 {
                        if barrier.arrive_and_wait().unwrap() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(leaders.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_abort_releases_waiters() {
        let barrier = GenerationBarrier::new(3);

        thread::scope(|s| {
            let gate = s.spawn(|| barrier.wait_open());
            let rendezvous = s.spawn(|| barrier.arrive_and_wait());

            thread::sleep(Duration::from_millis(10));
            barrier.abort();

            assert_eq!(gate.join().unwrap(), Err(Aborted));
            assert_eq!(rendezvous.join().unwrap(), Err(Aborted));
        });

        assert!(barrier.is_aborted());
        assert_eq!(barrier.open(), Err(Aborted));
        assert_eq!(barrier.wait_open(), Err(Aborted));
        assert_eq!(barrier.arrive_and_wait(), Err(Aborted));
    }
}
