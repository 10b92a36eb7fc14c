/**
 * Background worker thread that drives batch dispatch.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐   bounded channel    ┌────────────────┐
 *  │  Service      │ ──── WorkerMsg ────► │  Worker thread  │
 *  │  (any thread) │                      │  (single)       │
 *  └──────────────┘                      └───────┬────────┘
 *                        ticker ──────────────►  │
 *                                         dispatch(Trigger)
 *                                                │
 *                                    providers (priority order)
 * ```
 *
 * The worker waits on three sources at once:
 * - the wake-up channel (bounded), carrying `BatchFull` and `Flush`;
 * - the control channel (unbounded), carrying `Reschedule` and `Stop`;
 * - a `crossbeam_channel::tick` ticker firing every batch interval.
 *
 * No send ever blocks the caller: a full wake-up channel already holds
 * enough wake-ups, and control messages are rare and unbounded.
 *
 * It does not own any queue. Each wake-up calls the dispatch callback with
 * the reason it woke up; the service decides what to drain.
 *
 * The loop ends on `Stop` or when every handle is dropped.
 */
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::{FlareError, Result};

/// Wake-ups buffered at most; extra ones are dropped because one pending
/// wake-up already covers them.
const WAKE_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub enum WorkerMsg {
    /// The pending queue reached the batch size: dispatch one batch now.
    BatchFull,

    /// Drain everything that is pending (reconnect, restored offline reports).
    Flush,

    /// Replace the ticker with one using the new interval.
    Reschedule(Duration),

    /// Exit the loop.
    Stop,
}

/**
 * Why the dispatch callback is being invoked.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Periodic timer tick. Skipped if a dispatch is already running.
    Timer,

    /// Batch-size threshold reached.
    BatchFull,

    /// Full drain requested.
    Flush,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/**
 * Handle to the background worker thread.
 *
 * The thread is fire-and-forget: no join handle is kept. Clones talk to
 * the same thread. Dropping the last handle disconnects the channels,
 * which ends the loop after the current dispatch returns.
 */
#[derive(Clone)]
pub struct Worker {
    wake: Sender<WorkerMsg>,
    control: Sender<WorkerMsg>,
}

impl Worker {
    /**
     * Spawns the worker thread with a ticker of period `interval`.
     *
     * # Arguments
     * * `interval` — batch timer period.
     * * `dispatch` — invoked on the worker thread for every wake-up.
     */
    pub fn spawn<F>(interval: Duration, dispatch: F) -> Result<Self>
    where
        F: Fn(Trigger) + Send + 'static,
    {
        let (wake, wake_rx) = crossbeam_channel::bounded(WAKE_CAPACITY);
        let (control, control_rx) = crossbeam_channel::unbounded();

        thread::Builder::new()
            .name("flare-worker".into())
            .spawn(move || {
                /*
                 * A panic inside a provider is already contained by the
                 * service, but keep the thread from dying silently if
                 * anything else goes wrong.
                 */
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    Self::run_loop(&wake_rx, &control_rx, interval, &dispatch);
                }));

                if result.is_err() {
                    tracing::error!("Worker thread panicked; periodic flushing has stopped");
                }
            })
            .map_err(FlareError::WorkerSpawn)?;

        Ok(Self { wake, control })
    }

    /**
     * Sends `msg` without blocking.
     *
     * Wake-ups that find the channel full are dropped.
     */
    pub fn request(&self, msg: WorkerMsg) {
        let result = match msg {
            WorkerMsg::BatchFull | WorkerMsg::Flush => match self.wake.try_send(msg) {
                Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
                Err(TrySendError::Disconnected(_)) => Err(()),
            },
            WorkerMsg::Reschedule(_) | WorkerMsg::Stop => {
                self.control.send(msg).map_err(|_| ())
            }
        };

        if result.is_err() {
            tracing::debug!("Worker has shut down; request ignored");
        }
    }

    /// Restarts the ticker with a new period.
    pub fn reschedule(&self, interval: Duration) {
        self.request(WorkerMsg::Reschedule(interval));
    }

    /// Stops the loop. The thread exits once its current dispatch returns.
    pub fn stop(&self) {
        self.request(WorkerMsg::Stop);
    }

    fn run_loop<F>(
        wake: &Receiver<WorkerMsg>,
        control: &Receiver<WorkerMsg>,
        interval: Duration,
        dispatch: &F,
    ) where
        F: Fn(Trigger),
    {
        let mut ticker = crossbeam_channel::tick(interval);

        loop {
            let mut reschedule = None;

            crossbeam_channel::select! {
                recv(control) -> msg => match msg {
                    Ok(WorkerMsg::Reschedule(next)) => reschedule = Some(next),
                    _ => break,
                },
                recv(wake) -> msg => match msg {
                    Ok(WorkerMsg::BatchFull) => dispatch(Trigger::BatchFull),
                    Ok(WorkerMsg::Flush) => dispatch(Trigger::Flush),
                    Ok(_) => {}
                    Err(_) => break,
                },
                recv(ticker) -> _ => dispatch(Trigger::Timer),
            }

            if let Some(next) = reschedule {
                tracing::debug!(interval_ms = next.as_millis() as u64, "Batch timer rescheduled");
                ticker = crossbeam_channel::tick(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_ticker_fires_periodically() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn(Duration::from_millis(20), move |t| {
            let _ = tx.send(t);
        })
        .expect("spawn");

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::Timer));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::Timer));
        worker.stop();
    }

    #[test]
    fn test_requests_are_forwarded() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn(Duration::from_secs(3600), move |t| {
            let _ = tx.send(t);
        })
        .expect("spawn");

        worker.request(WorkerMsg::BatchFull);
        worker.request(WorkerMsg::Flush);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::BatchFull));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::Flush));
        worker.stop();
    }

    #[test]
    fn test_reschedule_speeds_up_ticker() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn(Duration::from_secs(3600), move |t| {
            let _ = tx.send(t);
        })
        .expect("spawn");

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        worker.reschedule(Duration::from_millis(20));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::Timer));
        worker.stop();
    }

    #[test]
    fn test_control_does_not_wait_for_busy_dispatch() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn(Duration::from_secs(3600), move |t| {
            let _ = tx.send(t);
            thread::sleep(Duration::from_millis(300));
        })
        .expect("spawn");

        /* One dispatch in flight, the wake-up channel full behind it. */
        for _ in 0..WAKE_CAPACITY * 2 {
            worker.request(WorkerMsg::BatchFull);
        }
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(Trigger::BatchFull));

        let started = std::time::Instant::now();
        worker.reschedule(Duration::from_secs(60));
        worker.request(WorkerMsg::Flush);
        worker.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_stop_ends_loop() {
        let (tx, rx) = mpsc::channel::<Trigger>();
        let worker = Worker::spawn(Duration::from_millis(10), move |t| {
            let _ = tx.send(t);
        })
        .expect("spawn");

        worker.stop();
        /* Drain whatever ticked before Stop landed; the sender then drops. */
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(_) if std::time::Instant::now() < deadline => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
                other => panic!("worker still running: {other:?}"),
            }
        }
    }
}
