use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a background task under a stable name. With `tokio_unstable` the name
/// is attached to the task itself; otherwise the task runs inside a span
/// carrying it.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let task_name = name.into();
    #[cfg(tokio_unstable)]
    {
        tokio::task::Builder::new().name(&task_name).spawn(future)
    }
    #[cfg(not(tokio_unstable))]
    {
        use tracing::Instrument;
        tokio::spawn(future.instrument(tracing::info_span!("task", name = %task_name)))
    }
}
