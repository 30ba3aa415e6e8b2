use std::net::SocketAddr;
use std::sync::Arc;

use super::{CallHook, CallInfo};
use tonic::Code;
use tonic::metadata::MetadataMap;

/// 组合钩子
///
/// 按加入顺序依次调用每个钩子。链本身也实现 [`CallHook`]，可以嵌套。
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn CallHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn with(mut self, hook: impl CallHook) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn push(&mut self, hook: Arc<dyn CallHook>) {
        self.hooks.push(hook);
    }

    pub fn extend(&mut self, other: HookChain) {
        self.hooks.extend(other.hooks);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl CallHook for HookChain {
    fn on_call_start(&self, info: &CallInfo, metadata: &mut MetadataMap) {
        // 按顺序应用钩子
        for hook in &self.hooks {
            hook.on_call_start(info, metadata);
        }
    }

    fn on_call_end(&self, info: &CallInfo, code: Code) {
        for hook in &self.hooks {
            hook.on_call_end(info, code);
        }
    }

    fn on_connection_start(&self, peer: Option<SocketAddr>) {
        for hook in &self.hooks {
            hook.on_connection_start(peer);
        }
    }

    fn on_connection_end(&self, peer: Option<SocketAddr>) {
        for hook in &self.hooks {
            hook.on_connection_end(peer);
        }
    }
}

impl FromIterator<Arc<dyn CallHook>> for HookChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn CallHook>>>(iter: I) -> Self {
        Self {
            hooks: iter.into_iter().collect(),
        }
    }
}
