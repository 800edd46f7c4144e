//! Tool-call dispatch.
//!
//! Every invocation in a batch produces exactly one [`ToolResult`] with the
//! invocation's id, whatever happens to its handler:
//!
//! - registered and enabled: the handler's reply
//! - handler error: an `{"error": ...}` payload
//! - unknown or disabled: a generic `{"result": "ok"}` acknowledgement

use serde_json::Value;

use super::registry::{ToolEffect, ToolRegistry};
use crate::core::session::{ToolInvocation, ToolResult};

/// Everything a batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// One result per invocation, in invocation order
    pub results: Vec<ToolResult>,
    /// System transcript entries, in invocation order
    pub narrations: Vec<String>,
    /// Side effects for the console to run
    pub effects: Vec<ToolEffect>,
}

impl DispatchOutcome {
    /// Transcript entry describing the results sent back.
    pub fn response_narration(&self) -> Option<String> {
        if self.results.is_empty() {
            return None;
        }
        let json = serde_json::to_string_pretty(&self.results).unwrap_or_default();
        Some(format!("Function call response:\n```json\n{json}\n```"))
    }
}

/// Routes invocations to registered handlers.
#[derive(Debug, Clone, Default)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn dispatch(&self, invocations: &[ToolInvocation]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for invocation in invocations {
            let response = match self.registry.handler(&invocation.name) {
                Some(handler) => match handler.handle(invocation) {
                    Ok(reply) => {
                        tracing::debug!(tool = %invocation.name, id = %invocation.id, "Tool handled");
                        outcome.narrations.extend(reply.narration);
                        outcome.effects.extend(reply.effects);
                        reply.response
                    }
                    Err(e) => {
                        tracing::warn!(tool = %invocation.name, id = %invocation.id, "Tool failed: {}", e);
                        outcome
                            .narrations
                            .push(format!("Function call **{}** failed: {}", invocation.name, e));
                        e.to_payload()
                    }
                },
                None => {
                    tracing::debug!(tool = %invocation.name, "No handler, acknowledging");
                    outcome.narrations.push(generic_narration(invocation));
                    serde_json::json!({ "result": "ok" })
                }
            };

            outcome.results.push(ToolResult {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                response,
            });
        }

        outcome
    }
}

fn generic_narration(invocation: &ToolInvocation) -> String {
    let args = match &invocation.args {
        Value::Null => "{}".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    format!(
        "Triggering function call: **{}**\n```json\n{}\n```",
        invocation.name, args
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::ToolDeclaration;
    use crate::core::tools::registry::ToolReply;
    use crate::errors::{ToolDispatchError, ToolDispatchResult};
    use serde_json::json;
    use std::sync::Arc;

    fn decl(name: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.to_string(),
            description: None,
            parameters: None,
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolInvocation {
        ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(
            decl("echo"),
            Arc::new(|inv: &ToolInvocation| -> ToolDispatchResult<ToolReply> {
                Ok(ToolReply {
                    response: inv.args.clone(),
                    narration: Some("echoed".to_string()),
                    effects: Vec::new(),
                })
            }),
        );
        registry.register(
            decl("broken"),
            Arc::new(|_: &ToolInvocation| -> ToolDispatchResult<ToolReply> {
                Err(ToolDispatchError::Failed("boom".to_string()))
            }),
        );
        ToolDispatcher::new(registry)
    }

    #[test]
    fn test_one_result_per_invocation() {
        let outcome = dispatcher().dispatch(&[
            call("1", "echo", json!({"x": 1})),
            call("2", "broken", Value::Null),
            call("3", "mystery", json!({"q": "?"})),
        ]);

        let ids: Vec<_> = outcome.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(outcome.results[0].response, json!({"x": 1}));
        assert_eq!(outcome.results[1].response["error"], "Tool failed: boom");
        assert_eq!(outcome.results[2].response, json!({"result": "ok"}));
        assert_eq!(outcome.narrations.len(), 3);
    }

    #[test]
    fn test_generic_narration_format() {
        let outcome = ToolDispatcher::default().dispatch(&[call("a", "lookup", json!({"k": "v"}))]);
        assert_eq!(
            outcome.narrations[0],
            "Triggering function call: **lookup**\n```json\n{\n  \"k\": \"v\"\n}\n```"
        );
    }

    #[test]
    fn test_disabled_tool_is_acknowledged() {
        let mut d = dispatcher();
        d.registry_mut().set_enabled("echo", false);
        let outcome = d.dispatch(&[call("1", "echo", json!({"x": 1}))]);
        assert_eq!(outcome.results[0].response, json!({"result": "ok"}));
    }

    #[test]
    fn test_response_narration() {
        let outcome = dispatcher().dispatch(&[call("1", "mystery", Value::Null)]);
        let text = outcome.response_narration().unwrap();
        assert!(text.starts_with("Function call response:\n```json\n["));
        assert!(text.contains("\"id\": \"1\""));
        assert!(DispatchOutcome::default().response_narration().is_none());
    }
}
