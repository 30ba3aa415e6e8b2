//! traceparent 中继
//!
//! 某些中间跳（例如托管的 serverless 入口）会丢弃或重新生成 `traceparent`，
//! 导致下游的 span 挂到错误的父节点上。客户端在发送前把原始值复制一份到
//! `original-traceparent`，服务端在处理前再用它覆盖 `traceparent`。
//!
//! 两个钩子都是无状态的，缺少头部时不做任何修改，也不会报错。

use super::{CallHook, CallInfo};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};

/// W3C trace context 头部
pub const TRACE_PARENT_HEADER: &str = "traceparent";

/// 跨跳保存原始 traceparent 的别名头部
pub const ORIGINAL_TRACE_PARENT_HEADER: &str = "original-traceparent";

/// 客户端钩子：把 `traceparent` 复制到 `original-traceparent`
///
/// 原始头部保持不变，仍然认识 `traceparent` 的中间设施不受影响。
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveTraceParent;

/// 服务端钩子：用 `original-traceparent` 覆盖 `traceparent`
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreTraceParent;

impl CallHook for PreserveTraceParent {
    fn on_call_start(&self, _info: &CallInfo, metadata: &mut MetadataMap) {
        copy_values(metadata, TRACE_PARENT_HEADER, ORIGINAL_TRACE_PARENT_HEADER);
    }
}

impl CallHook for RestoreTraceParent {
    fn on_call_start(&self, _info: &CallInfo, metadata: &mut MetadataMap) {
        copy_values(metadata, ORIGINAL_TRACE_PARENT_HEADER, TRACE_PARENT_HEADER);
    }
}

/// 用 `from` 的全部取值替换 `to` 的取值；`from` 不存在时不修改
fn copy_values(metadata: &mut MetadataMap, from: &'static str, to: &'static str) {
    let values: Vec<AsciiMetadataValue> = metadata.get_all(from).iter().cloned().collect();
    if values.is_empty() {
        return;
    }

    metadata.remove(to);
    for value in values {
        metadata.append(to, value);
    }
}
