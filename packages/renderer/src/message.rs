use serde::{Deserialize, Serialize};

/// What a request addresses on the renderer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Session,
    Workspace,
    Window,
    Page,
}

/// The renderer operations, spelled the way they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    CreateWorkspace,
    CreatePlainWindow,
    CreateTabbedWindow,
    CreateTabPage,
    AppendChild,
    DisplaceChild,
    UpdateElementProperty,
    AppendContent,
    DisplaceContent,
}

/// One message to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererRequest {
    pub target: TargetKind,
    /// The handle of the target object (0 for the session itself).
    pub target_value: u64,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub data: serde_json::Value,
}

/// The renderer's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(rename = "retCode")]
    pub ret_code: u16,
    #[serde(rename = "resultValue", default)]
    pub result_value: u64,
}

impl RendererResponse {
    pub fn ok(request_id: Option<u64>, result_value: u64) -> Self {
        RendererResponse {
            request_id,
            ret_code: 200,
            result_value,
        }
    }

    pub fn refused(request_id: Option<u64>, ret_code: u16) -> Self {
        RendererResponse {
            request_id,
            ret_code,
            result_value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let req = RendererRequest {
            target: TargetKind::Workspace,
            target_value: 3,
            operation: Operation::CreatePlainWindow,
            request_id: Some(7),
            data: serde_json::json!({ "name": "main" }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["target"], "workspace");
        assert_eq!(json["operation"], "createPlainWindow");
        assert_eq!(json["target_value"], 3);

        let resp: RendererResponse =
            serde_json::from_str(r#"{"request_id":7,"retCode":200,"resultValue":12}"#).unwrap();
        assert_eq!(resp.result_value, 12);
    }
}
