//! Ordered registry of tool declarations and their local handlers.

use std::sync::Arc;

use serde_json::Value;

use crate::core::session::{ToolDeclaration, ToolInvocation};
use crate::errors::ToolDispatchResult;

/// Local side effect requested by a tool, executed by the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    /// Capture a camera frame and send it to the agent
    Snapshot { reason: String },
}

/// What a handler produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    /// Payload returned to the agent
    pub response: Value,
    /// System transcript entry describing the call
    pub narration: Option<String>,
    pub effects: Vec<ToolEffect>,
}

impl ToolReply {
    /// `{"result": "ok"}` with a narration.
    pub fn ok(narration: impl Into<String>) -> Self {
        Self {
            response: serde_json::json!({ "result": "ok" }),
            narration: Some(narration.into()),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Executes one tool locally. Handlers run synchronously and must not block.
pub trait ToolHandler: Send + Sync {
    fn handle(&self, invocation: &ToolInvocation) -> ToolDispatchResult<ToolReply>;
}

impl<F> ToolHandler for F
where
    F: Fn(&ToolInvocation) -> ToolDispatchResult<ToolReply> + Send + Sync,
{
    fn handle(&self, invocation: &ToolInvocation) -> ToolDispatchResult<ToolReply> {
        self(invocation)
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    pub declaration: ToolDeclaration,
    pub enabled: bool,
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.declaration.name)
            .field("enabled", &self.enabled)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Tools offered to the agent, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool with a handler. An existing tool of the same name is
    /// replaced in place.
    pub fn register(&mut self, declaration: ToolDeclaration, handler: Arc<dyn ToolHandler>) {
        self.insert(ToolEntry {
            declaration,
            enabled: true,
            handler: Some(handler),
        });
    }

    /// Add a tool without a local handler; calls get a generic acknowledgement.
    pub fn declare(&mut self, declaration: ToolDeclaration) {
        self.insert(ToolEntry {
            declaration,
            enabled: true,
            handler: None,
        });
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.declaration.name != name);
        self.entries.len() != before
    }

    /// Enable or disable a tool. Returns `false` for unknown names.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.declaration.name == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.iter().find(|e| e.declaration.name == name)
    }

    /// Handler for an enabled tool.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.get(name)
            .filter(|e| e.enabled)
            .and_then(|e| e.handler.clone())
    }

    pub fn entries(&self) -> &[ToolEntry] {
        &self.entries
    }

    /// Declarations sent in `setup`.
    pub fn enabled_declarations(&self) -> Vec<ToolDeclaration> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.declaration.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: ToolEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.declaration.name == entry.declaration.name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}
