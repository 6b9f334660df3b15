//! Background execution of work nobody is waiting on.

use std::future::Future;

/// Run `future` to completion on the ambient executor without awaiting it.
///
/// On native targets this is the current tokio runtime. Returns `false`
/// when there is none; the future is dropped unpolled in that case and the
/// caller must drive the work itself.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(future);
            true
        }
        Err(_) => false,
    }
}

/// Run `future` to completion on the browser's microtask queue without
/// awaiting it. Always succeeds.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
    true
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn it_runs_work_nobody_awaits() {
        let (sender, receiver) = oneshot::channel();

        assert!(spawn_detached(async move {
            let _ = sender.send(42);
        }));

        assert_eq!(receiver.await, Ok(42));
    }

    #[test]
    fn it_declines_without_a_runtime() {
        assert!(!spawn_detached(async {}));
    }
}
