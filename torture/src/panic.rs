//! A worker that hits a consistency fault panics. Its join handle hands back the payload as a
//! `Box<dyn Any + Send>`, which is turned into an error here so that the run can report it next
//! to the seed.

use std::any::Any;

/// The message carried by a panic payload, if any.
fn message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Convert the panic of worker `id` into an error.
pub fn worker_panicked(id: usize, payload: Box<dyn Any + Send>) -> anyhow::Error {
    match message(&*payload) {
        Some(msg) => anyhow::anyhow!("worker {} panicked: {}", id, msg),
        None => anyhow::anyhow!("worker {} panicked (no message)", id),
    }
}
