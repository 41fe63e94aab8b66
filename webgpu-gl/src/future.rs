use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

enum WakerOrResult<T> {
    Waker(Waker),
    Result(T),
}

/// A future that completes when the device resolves the matching operation.
///
/// Results are produced either immediately (error scopes, write mappings) or
/// when the device drains its fenced callbacks (read mappings, loss).
pub struct GpuFuture<T> {
    data: Arc<Data<T>>,
}

struct Data<T> {
    waker_or_result: Mutex<Option<WakerOrResult<T>>>,
}

/// A completion handle to set the result on a [`GpuFuture`].
pub(crate) struct GpuFutureCompletion<T> {
    data: Arc<Data<T>>,
}

impl<T> fmt::Debug for GpuFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl<T> GpuFuture<T> {
    /// Returns `true` once a result is available.
    pub fn is_ready(&self) -> bool {
        matches!(
            *self.data.waker_or_result.lock(),
            Some(WakerOrResult::Result(_))
        )
    }

    pub(crate) fn ready(value: T) -> Self {
        Self {
            data: Arc::new(Data {
                waker_or_result: Mutex::new(Some(WakerOrResult::Result(value))),
            }),
        }
    }
}

impl<T> Future for GpuFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<Self::Output> {
        let mut waker_or_result = self.into_ref().get_ref().data.waker_or_result.lock();

        match waker_or_result.take() {
            Some(WakerOrResult::Result(res)) => Poll::Ready(res),
            _ => {
                *waker_or_result = Some(WakerOrResult::Waker(context.waker().clone()));
                Poll::Pending
            }
        }
    }
}

impl<T> GpuFutureCompletion<T> {
    pub fn complete(self, value: T) {
        let mut waker_or_result = self.data.waker_or_result.lock();

        match waker_or_result.replace(WakerOrResult::Result(value)) {
            Some(WakerOrResult::Waker(waker)) => {
                drop(waker_or_result);
                waker.wake();
            }
            None => {}
            Some(WakerOrResult::Result(_)) => {
                drop(waker_or_result);
                unreachable!()
            }
        };
    }
}

pub(crate) fn new_gpu_future<T>() -> (GpuFuture<T>, GpuFutureCompletion<T>) {
    let data = Arc::new(Data {
        waker_or_result: Mutex::new(None),
    });

    (
        GpuFuture {
            data: Arc::clone(&data),
        },
        GpuFutureCompletion { data },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_after_poll() {
        let (future, completion) = new_gpu_future::<u32>();
        assert!(!future.is_ready());
        completion.complete(7);
        assert!(future.is_ready());
        assert_eq!(pollster::block_on(future), 7);
    }

    #[test]
    fn ready_future() {
        assert_eq!(pollster::block_on(GpuFuture::ready("done")), "done");
    }
}
