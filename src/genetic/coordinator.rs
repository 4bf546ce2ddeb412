//! Phase coordination for the persistent worker pool.
//!
//! One generation runs as
//!
//! ```text
//! BREED (workers) -> B1 -> COMMIT (workers) -> B2 -> mutate (orchestrator)
//!   -> FITNESS (workers) -> B3 -> sort/normalize (orchestrator)
//! ```
//!
//! Every worker phase is gated by its own [`GenerationBarrier`]: the
//! orchestrator opens the gate, then arrives at the rendezvous with the
//! workers. Orchestrator windows run while every worker is parked on a
//! closed gate, so they have the shared buffers to themselves.
//!
//! A worker that returns an error or panics aborts all three barriers; the
//! orchestrator then stops, joins the pool and reports a
//! [`EngineError::WorkerFailure`]. A panicking window aborts them as well, so
//! the pool is joined before the panic leaves [`PhaseCoordinator::run`].

use std::any::Any;
use std::thread;

use crate::error::EngineError;
use crate::genetic::barrier::{Aborted, GenerationBarrier};

/// Worker phases of one generation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Breed,
    Commit,
    Fitness,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Breed, Phase::Commit, Phase::Fitness];
}

/// Orchestrator-only steps of one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// After COMMIT, before FITNESS
    Mutate,
    /// After FITNESS, before the next generation's BREED
    SortAndNormalize,
}

/// Work executed by each pool worker over its own partition
pub trait PhaseProgram: Sync {
    /// Per-worker state (partition, random stream), owned by its thread
    type Worker: Send;

    fn run_phase(&self, phase: Phase, worker: &mut Self::Worker) -> Result<(), EngineError>;
}

impl From<Aborted> for EngineError {
    fn from(_: Aborted) -> Self {
        EngineError::Aborted
    }
}

/// The three gated barriers of a generation, sized for `workers + 1` parties
pub struct PhaseCoordinator {
    workers: usize,
    breed: GenerationBarrier,
    commit: GenerationBarrier,
    fitness: GenerationBarrier,
}

impl PhaseCoordinator {
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "the pool needs at least one worker");
        PhaseCoordinator {
            workers,
            breed: GenerationBarrier::new(workers + 1),
            commit: GenerationBarrier::new(workers + 1),
            fitness: GenerationBarrier::new(workers + 1),
        }
    }

    fn barrier(&self, phase: Phase) -> &GenerationBarrier {
        match phase {
            Phase::Breed => &self.breed,
            Phase::Commit => &self.commit,
            Phase::Fitness => &self.fitness,
        }
    }

    fn abort(&self) {
        for phase in Phase::ALL {
            self.barrier(phase).abort();
        }
    }

    /// Run `iterations` generations of `program` on one thread per entry of
    /// `workers`, calling `window` for the orchestrator-only steps.
    ///
    /// Returns the worker states once every thread has been joined.
    pub fn run<P, F>(
        &self,
        program: &P,
        workers: Vec<P::Worker>,
        iterations: usize,
        mut window: F,
    ) -> Result<Vec<P::Worker>, EngineError>
    where
        P: PhaseProgram,
        F: FnMut(Window, usize) -> Result<(), EngineError>,
    {
        assert_eq!(workers.len(), self.workers, "one state per pool worker");

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for (id, mut worker) in workers.into_iter().enumerate() {
                let spawned = thread::Builder::new()
                    .name(format!("ga-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnUnwind(self);
                        let result = self.worker_loop(program, &mut worker, iterations);
                        if result.is_err() {
                            self.abort();
                        }
                        result.map(|()| worker)
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        self.abort();
                        return Err(EngineError::Spawn(e));
                    }
                }
            }

            let outcome = {
                let _guard = AbortOnUnwind(self);
                self.orchestrate(iterations, &mut window)
            };
            if outcome.is_err() {
                self.abort();
            }

            let mut failure = None;
            let mut finished = Vec::with_capacity(handles.len());
            for (id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(worker)) => finished.push(worker),
                    Ok(Err(EngineError::Aborted)) => {}
                    Ok(Err(e)) => {
                        log::error!("worker {} failed: {}", id, e);
                        failure.get_or_insert(EngineError::WorkerFailure {
                            worker: id,
                            message: e.to_string(),
                        });
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("worker {} panicked: {}", id, message);
                        failure.get_or_insert(EngineError::WorkerFailure { worker: id, message });
                    }
                }
            }

            match failure {
                Some(e) => Err(e),
                None => outcome.map(|()| finished),
            }
        })
    }

    fn worker_loop<P: PhaseProgram>(
        &self,
        program: &P,
        worker: &mut P::Worker,
        iterations: usize,
    ) -> Result<(), EngineError> {
        for _ in 0..iterations {
            for phase in Phase::ALL {
                let barrier = self.barrier(phase);
                barrier.wait_open()?;
                program.run_phase(phase, worker)?;
                barrier.arrive_and_wait()?;
            }
        }
        Ok(())
    }

    fn orchestrate<F>(&self, iterations: usize, window: &mut F) -> Result<(), EngineError>
    where
        F: FnMut(Window, usize) -> Result<(), EngineError>,
    {
        for generation in 0..iterations {
            self.step(&self.breed)?;
            self.step(&self.commit)?;
            window(Window::Mutate, generation)?;
            self.step(&self.fitness)?;
            window(Window::SortAndNormalize, generation)?;
        }
        Ok(())
    }

    fn step(&self, barrier: &GenerationBarrier) -> Result<(), Aborted> {
        barrier.open()?;
        barrier.arrive_and_wait()?;
        Ok(())
    }
}

/// Aborts every barrier if its holder (a worker or the orchestrator) unwinds
struct AbortOnUnwind<'a>(&'a PhaseCoordinator);

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
