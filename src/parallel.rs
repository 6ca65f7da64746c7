//! Parallel-for over work-unit indices.
//!
//! Workers claim the next index from a mutex-guarded counter until every
//! unit is taken. Each unit's result is stored in its own slot, so the caller
//! gets results back in index order once the phase has joined.

use crate::errors::{CompileError, Result};
use parking_lot::Mutex;

/// Number of worker threads for a requested count (0 = one per core).
pub fn thread_count(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Shared dispatch counter with a progress pacifier.
struct Dispatch<'a> {
    next: Mutex<usize>,
    count: usize,
    label: &'a str,
}

impl<'a> Dispatch<'a> {
    const fn new(count: usize, label: &'a str) -> Self {
        Dispatch {
            next: Mutex::new(0),
            count,
            label,
        }
    }

    fn claim(&self) -> Option<usize> {
        let mut next = self.next.lock();
        if *next >= self.count {
            return None;
        }
        let index = *next;
        *next += 1;

        let before = index * 10 / self.count;
        let after = (index + 1) * 10 / self.count;
        if after != before {
            tracing::debug!("{}: {}%", self.label, after * 10);
        }
        Some(index)
    }
}

fn collect<T>(slots: Vec<Mutex<Option<Result<T>>>>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(slots.len());
    for (index, slot) in slots.into_iter().enumerate() {
        match slot.into_inner() {
            Some(result) => out.push(result?),
            None => {
                return Err(CompileError::Internal(format!(
                    "work unit {index} was never run"
                )));
            },
        }
    }
    Ok(out)
}

/// Runs `work(i)` for every `i` in `0..count` on `threads` workers and returns
/// the results in index order. If any unit fails, the error of the lowest
/// failing index is returned after all workers have finished.
#[cfg(feature = "parallel")]
pub fn run_threads_on<T, F>(count: usize, threads: usize, label: &str, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    let threads = thread_count(threads).min(count);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| CompileError::Internal(format!("thread pool: {e}")))?;

    let dispatch = Dispatch::new(count, label);
    let slots: Vec<Mutex<Option<Result<T>>>> = (0..count).map(|_| Mutex::new(None)).collect();

    {
        let dispatch = &dispatch;
        let slots = &slots;
        let work = &work;
        pool.scope(|scope| {
            for _ in 0..threads {
                scope.spawn(move |_| {
                    while let Some(index) = dispatch.claim() {
                        let result = work(index);
                        *slots[index].lock() = Some(result);
                    }
                });
            }
        });
    }

    tracing::debug!("{label}: {count} units on {threads} threads");
    collect(slots)
}

/// Serial build: same contract, run on the calling thread.
#[cfg(not(feature = "parallel"))]
pub fn run_threads_on<T, F>(count: usize, _threads: usize, label: &str, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    let dispatch = Dispatch::new(count, label);
    let slots: Vec<Mutex<Option<Result<T>>>> = (0..count).map(|_| Mutex::new(None)).collect();
    while let Some(index) = dispatch.claim() {
        *slots[index].lock() = Some(work(index));
    }
    collect(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_come_back_in_index_order() {
        let out = run_threads_on(100, 4, "test", |i| Ok(i * i)).unwrap();
        assert_eq!(out.len(), 100);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn lowest_failing_index_wins() {
        let err = run_threads_on(50, 3, "test", |i| {
            if i % 7 == 6 {
                Err(CompileError::Internal(format!("unit {i}")))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "internal error: unit 6");
    }
}
