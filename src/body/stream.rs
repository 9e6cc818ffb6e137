use bytes::Bytes;
use std::{pin::Pin, task::Poll};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::response::Head;

/// A single frame of a streamed response.
#[derive(Debug)]
pub enum Frame {
    /// Response head, sent once before any data.
    Head(Head),
    /// A chunk of the response body.
    Data(Bytes),
}

impl Frame {
    /// Returns the body chunk, if this is a data frame.
    #[inline]
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            Frame::Data(data) => Some(data),
            Frame::Head(_) => None,
        }
    }
}

/// Streamed response body.
///
/// The stream ends when the request settles, check the [`ResponseFuture`] for the outcome.
///
/// [`ResponseFuture`]: crate::response::ResponseFuture
#[derive(Debug)]
pub struct BodyStream {
    rx: UnboundedReceiver<Frame>,
}

impl BodyStream {
    pub(crate) fn channel() -> (UnboundedSender<Frame>, BodyStream) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (tx, BodyStream { rx })
    }

    /// Receive the next frame.
    #[inline]
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Returns the next frame if one is already available.
    #[inline]
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for BodyStream {
    type Item = Frame;

    #[inline]
    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
