use crate::message::{Operation, RendererRequest, RendererResponse, TargetKind};
use crate::transport::RendererTransport;
use crate::RendererError;
use serde_json::json;
use std::cell::Cell;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A live connection to a renderer.
///
/// The link owns the transport and the request-id counter; all calls are
/// synchronous. Handles returned by the create operations are opaque to
/// the interpreter - they are only ever passed back as `target_value`.
pub struct RendererLink {
    transport: Box<dyn RendererTransport>,
    timeout: Duration,
    next_request_id: Cell<u64>,
}

impl RendererLink {
    pub fn new(transport: Box<dyn RendererTransport>) -> Self {
        RendererLink {
            transport,
            timeout: DEFAULT_TIMEOUT,
            next_request_id: Cell::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn call(
        &self,
        target: TargetKind,
        target_value: u64,
        operation: Operation,
        data: serde_json::Value,
    ) -> Result<u64, RendererError> {
        let request_id = self.next_request_id.get() + 1;
        self.next_request_id.set(request_id);

        let request = RendererRequest {
            target,
            target_value,
            operation,
            request_id: Some(request_id),
            data,
        };
        log::trace!("renderer <- {:?} (req {request_id})", request.operation);

        let RendererResponse {
            ret_code,
            result_value,
            ..
        } = self.transport.roundtrip(&request, self.timeout)?;

        if ret_code != 200 {
            log::warn!("renderer refused {:?}: retCode {ret_code}", request.operation);
            return Err(RendererError::ServerRefused(ret_code));
        }
        Ok(result_value)
    }

    // ------------------------------------------------------ session setup

    pub fn create_workspace(&self, name: &str) -> Result<u64, RendererError> {
        self.call(
            TargetKind::Session,
            0,
            Operation::CreateWorkspace,
            json!({ "name": name }),
        )
    }

    pub fn create_plain_window(
        &self,
        workspace: u64,
        name: &str,
        title: &str,
    ) -> Result<u64, RendererError> {
        self.call(
            TargetKind::Workspace,
            workspace,
            Operation::CreatePlainWindow,
            json!({ "name": name, "title": title }),
        )
    }

    pub fn create_tabbed_window(
        &self,
        workspace: u64,
        name: &str,
        title: &str,
    ) -> Result<u64, RendererError> {
        self.call(
            TargetKind::Workspace,
            workspace,
            Operation::CreateTabbedWindow,
            json!({ "name": name, "title": title }),
        )
    }

    pub fn create_tab_page(&self, window: u64, name: &str) -> Result<u64, RendererError> {
        self.call(
            TargetKind::Window,
            window,
            Operation::CreateTabPage,
            json!({ "name": name }),
        )
    }

    // --------------------------------------------------------- dom edits

    /// Append parsed children (an HTML chunk) under `element`.
    pub fn append_child(
        &self,
        page: u64,
        element: u64,
        html: &str,
    ) -> Result<(), RendererError> {
        self.call(
            TargetKind::Page,
            page,
            Operation::AppendChild,
            json!({ "element": element, "content": html }),
        )
        .map(drop)
    }

    /// Replace the children of `element` with an HTML chunk.
    pub fn displace_child(
        &self,
        page: u64,
        element: u64,
        html: &str,
    ) -> Result<(), RendererError> {
        self.call(
            TargetKind::Page,
            page,
            Operation::DisplaceChild,
            json!({ "element": element, "content": html }),
        )
        .map(drop)
    }

    pub fn update_element_property(
        &self,
        page: u64,
        element: u64,
        property: &str,
        value: &str,
    ) -> Result<(), RendererError> {
        self.call(
            TargetKind::Page,
            page,
            Operation::UpdateElementProperty,
            json!({ "element": element, "property": property, "value": value }),
        )
        .map(drop)
    }

    pub fn append_content(&self, page: u64, element: u64, text: &str) -> Result<(), RendererError> {
        self.call(
            TargetKind::Page,
            page,
            Operation::AppendContent,
            json!({ "element": element, "content": text }),
        )
        .map(drop)
    }

    pub fn displace_content(
        &self,
        page: u64,
        element: u64,
        text: &str,
    ) -> Result<(), RendererError> {
        self.call(
            TargetKind::Page,
            page,
            Operation::DisplaceContent,
            json!({ "element": element, "content": text }),
        )
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, RecordingTransport};

    #[test]
    fn recording_transport_hands_out_handles() {
        let transport = RecordingTransport::new();
        let link = RendererLink::new(Box::new(transport.clone()));

        let workspace = link.create_workspace("default").unwrap();
        let window = link.create_plain_window(workspace, "main", "main").unwrap();
        assert_ne!(workspace, window);

        let ops: Vec<Operation> = transport.requests().iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![Operation::CreateWorkspace, Operation::CreatePlainWindow]
        );
    }

    #[test]
    fn refusal_and_timeout() {
        let (transport, req_rx, resp_tx) = ChannelTransport::pair();
        let link =
            RendererLink::new(Box::new(transport)).with_timeout(Duration::from_millis(50));

        let server = std::thread::spawn(move || {
            let req = req_rx.recv().unwrap();
            resp_tx
                .send(RendererResponse::refused(req.request_id, 409))
                .unwrap();
            // swallow the second request without answering
            let _ = req_rx.recv();
        });

        assert_eq!(
            link.create_workspace("w"),
            Err(RendererError::ServerRefused(409))
        );
        assert_eq!(link.create_workspace("w"), Err(RendererError::Timeout));
        server.join().unwrap();
    }
}
