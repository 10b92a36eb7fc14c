/**
 * Transport layer — HTTP delivery and the background batch worker.
 *
 * Everything related to *how* reports leave the process:
 * - `http` — ureq-based HTTP client wrapper used by the remote provider
 * - `worker` — background thread driving the batch timer and flush requests
 */

pub mod http;
pub mod worker;

pub use http::{Delivery, HttpTransport};
pub use worker::{Trigger, Worker, WorkerMsg};
