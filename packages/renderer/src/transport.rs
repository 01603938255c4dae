use crate::message::{RendererRequest, RendererResponse};
use crate::RendererError;
use crossbeam_channel::{Receiver, Sender};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// The seam between the link and whatever carries the messages.
pub trait RendererTransport {
    fn roundtrip(
        &self,
        request: &RendererRequest,
        timeout: Duration,
    ) -> Result<RendererResponse, RendererError>;
}

/// In-process transport that acknowledges everything and records the
/// request sequence. Handles are allocated sequentially starting at 1.
///
/// This is the test renderer: the recorded sequence is what the
/// renderer-parity property compares against the output DOM.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    requests: Rc<RefCell<Vec<RendererRequest>>>,
    next_handle: Rc<Cell<u64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every request sent so far.
    pub fn requests(&self) -> Vec<RendererRequest> {
        self.requests.borrow().clone()
    }
}

impl RendererTransport for RecordingTransport {
    fn roundtrip(
        &self,
        request: &RendererRequest,
        _timeout: Duration,
    ) -> Result<RendererResponse, RendererError> {
        self.requests.borrow_mut().push(request.clone());
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        Ok(RendererResponse::ok(request.request_id, handle))
    }
}

/// Channel-pair transport for a renderer living on another thread.
///
/// The renderer end holds the mirrored `(Receiver<RendererRequest>,
/// Sender<RendererResponse>)` pair and answers at its own pace; the
/// roundtrip here blocks up to the timeout.
pub struct ChannelTransport {
    tx: Sender<RendererRequest>,
    rx: Receiver<RendererResponse>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<RendererRequest>, rx: Receiver<RendererResponse>) -> Self {
        ChannelTransport { tx, rx }
    }

    /// Build a connected pair: the transport plus the renderer-side
    /// endpoints.
    pub fn pair() -> (
        Self,
        Receiver<RendererRequest>,
        Sender<RendererResponse>,
    ) {
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
        (ChannelTransport::new(req_tx, resp_rx), req_rx, resp_tx)
    }
}

impl RendererTransport for ChannelTransport {
    fn roundtrip(
        &self,
        request: &RendererRequest,
        timeout: Duration,
    ) -> Result<RendererResponse, RendererError> {
        self.tx
            .send(request.clone())
            .map_err(|_| RendererError::Disconnected)?;
        match self.rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(RendererError::Timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(RendererError::Disconnected)
            }
        }
    }
}
