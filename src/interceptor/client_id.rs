use super::{CallHook, CallInfo};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use uuid::Uuid;

/// 调用方进程标识头部
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// 单次请求标识头部
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 客户端身份钩子
///
/// 为每个出站调用附加 `x-client-id`（调用进程的可执行文件路径）和
/// `x-request-id`（每次调用新生成的 UUID）。已经存在的头部不会被覆盖，
/// 所以重复应用的结果与应用一次相同。
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    client_id: AsciiMetadataValue,
}

impl ClientIdentity {
    /// 使用当前进程的可执行文件路径作为客户端标识
    pub fn new() -> Self {
        Self::with_client_id(current_client_id())
    }

    /// 使用指定的客户端标识；非 ASCII 的标识退化为 `unknown`
    pub fn with_client_id(client_id: impl AsRef<str>) -> Self {
        let client_id = client_id
            .as_ref()
            .parse()
            .unwrap_or_else(|_| AsciiMetadataValue::from_static("unknown"));
        Self { client_id }
    }

    pub fn client_id(&self) -> &AsciiMetadataValue {
        &self.client_id
    }

    /// 补齐缺失的身份头部
    pub fn apply(&self, metadata: &mut MetadataMap) {
        if !metadata.contains_key(CLIENT_ID_HEADER) {
            metadata.insert(CLIENT_ID_HEADER, self.client_id.clone());
        }

        if !metadata.contains_key(REQUEST_ID_HEADER) {
            // UUID 的文本形式总是合法的 ASCII
            if let Ok(value) = Uuid::new_v4().to_string().parse() {
                metadata.insert(REQUEST_ID_HEADER, value);
            }
        }
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl CallHook for ClientIdentity {
    fn on_call_start(&self, _info: &CallInfo, metadata: &mut MetadataMap) {
        self.apply(metadata);
    }
}

impl Interceptor for ClientIdentity {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        self.apply(req.metadata_mut());
        Ok(req)
    }
}

fn current_client_id() -> String {
    std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
