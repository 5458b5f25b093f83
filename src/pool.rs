//! Bounded worker pool for fan-out over many keys.

use std::collections::VecDeque;
use std::sync::mpsc;

use parking_lot::Mutex;

/// Run `task` over `items` on at most `workers` scoped threads.
///
/// Workers pull from a shared queue, so a slow item never holds back the
/// rest. Results come back in input order. With one worker or one item the
/// tasks run on the calling thread.
pub fn run_bounded<T, R, F>(items: Vec<T>, workers: usize, task: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers <= 1 {
        return items.into_iter().map(task).collect();
    }

    let total = items.len();
    let queue = Mutex::new(items.into_iter().enumerate().collect::<VecDeque<_>>());
    let (tx, rx) = mpsc::channel::<(usize, R)>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let task = &task;
            scope.spawn(move || {
                loop {
                    let next = queue.lock().pop_front();
                    let Some((idx, item)) = next else { break };
                    if tx.send((idx, task(item))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    for (idx, result) in rx {
        slots[idx] = Some(result);
    }
    slots.into_iter().flatten().collect()
}
