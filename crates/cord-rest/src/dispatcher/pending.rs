//! Queued requests and their completion handles

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RestError;
use crate::route::RestRequest;

type Completion = oneshot::Sender<Result<Value, RestError>>;

/// A request waiting in the dispatcher queue
pub(crate) struct PendingRequest {
    pub(crate) request: RestRequest,
    /// Latest instant the caller is willing to wait for a rate limit
    pub(crate) deadline: Option<Instant>,
    completion: Completion,
}

impl PendingRequest {
    pub(crate) fn new(request: RestRequest, deadline: Option<Instant>) -> (Self, ResponseHandle) {
        let (completion, rx) = oneshot::channel();
        (
            Self {
                request,
                deadline,
                completion,
            },
            ResponseHandle { rx },
        )
    }

    /// Deliver the result; a dropped handle is ignored
    pub(crate) fn complete(self, result: Result<Value, RestError>) {
        let _ = self.completion.send(result);
    }

    /// The caller dropped its handle
    pub(crate) fn is_abandoned(&self) -> bool {
        self.completion.is_closed()
    }
}

/// Completion handle returned by [`RequestDispatcher::submit`]
///
/// Resolves to the decoded JSON body. Dropping the handle before the worker
/// reaches the request skips it.
///
/// [`RequestDispatcher::submit`]: super::RequestDispatcher::submit
#[derive(Debug)]
pub struct ResponseHandle {
    rx: oneshot::Receiver<Result<Value, RestError>>,
}

impl ResponseHandle {
    /// Wait for the response and deserialize it
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, RestError> {
        let value = self.await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value, RestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Worker dropped the request without answering
            Poll::Ready(Err(_)) => Poll::Ready(Err(RestError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}
