//! Built-in tool set of the interviewer persona.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::registry::{ToolEffect, ToolHandler, ToolRegistry, ToolReply};
use crate::core::session::{ToolDeclaration, ToolInvocation};
use crate::errors::{ToolDispatchError, ToolDispatchResult};

pub const PROVIDE_INTERVIEW_SUMMARY: &str = "provide_interview_summary";
pub const TAKE_SNAPSHOT: &str = "take_snapshot";

fn parse_args<T: for<'de> Deserialize<'de>>(invocation: &ToolInvocation) -> ToolDispatchResult<T> {
    serde_json::from_value(invocation.args.clone())
        .map_err(|e| ToolDispatchError::InvalidArguments(format!("{}: {}", invocation.name, e)))
}

// =============================================================================
// provide_interview_summary
// =============================================================================

#[derive(Debug, Deserialize)]
struct SummaryArgs {
    summary: String,
    recommendation: String,
}

/// Formats the closing assessment into the transcript.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterviewSummaryTool;

impl InterviewSummaryTool {
    pub fn declaration() -> ToolDeclaration {
        ToolDeclaration {
            name: PROVIDE_INTERVIEW_SUMMARY.to_string(),
            description: Some(
                "Provides a summary of the candidate's performance at the end of the interview."
                    .to_string(),
            ),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "summary": {
                        "type": "STRING",
                        "description": "A concise summary of the candidate's strengths and weaknesses based on their answers."
                    },
                    "recommendation": {
                        "type": "STRING",
                        "description": "A hiring recommendation, e.g., \"Strong hire\", \"Good fit\", \"Not a fit\"."
                    }
                },
                "required": ["summary", "recommendation"]
            })),
        }
    }
}

impl ToolHandler for InterviewSummaryTool {
    fn handle(&self, invocation: &ToolInvocation) -> ToolDispatchResult<ToolReply> {
        let args: SummaryArgs = parse_args(invocation)?;
        tracing::info!(recommendation = %args.recommendation, "Interview summary received");
        Ok(ToolReply::ok(format!(
            "**Interview Complete**\n\n**Summary:**\n{}\n\n**Recommendation:** {}",
            args.summary, args.recommendation
        )))
    }
}

// =============================================================================
// take_snapshot
// =============================================================================

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    #[serde(default)]
    reason: String,
}

/// Requests a camera snapshot for the candidate file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotTool;

impl SnapshotTool {
    pub fn declaration() -> ToolDeclaration {
        ToolDeclaration {
            name: TAKE_SNAPSHOT.to_string(),
            description: Some(
                "Takes a snapshot of the candidate from the video feed. Use this if you need to \
                 capture an image for the file, for example for identification purposes at the \
                 start of the interview. Provide a brief reason why you're taking it."
                    .to_string(),
            ),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "reason": {
                        "type": "STRING",
                        "description": "A brief, polite reason for taking the snapshot that will be communicated to the candidate."
                    }
                },
                "required": ["reason"]
            })),
        }
    }
}

impl ToolHandler for SnapshotTool {
    fn handle(&self, invocation: &ToolInvocation) -> ToolDispatchResult<ToolReply> {
        let args: SnapshotArgs = parse_args(invocation)?;
        Ok(
            ToolReply::ok(format!("System: Taking snapshot. Reason: {}", args.reason))
                .with_effect(ToolEffect::Snapshot {
                    reason: args.reason,
                }),
        )
    }
}

/// Registry holding the interviewer tools, all enabled.
pub fn interviewer_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        InterviewSummaryTool::declaration(),
        Arc::new(InterviewSummaryTool),
    );
    registry.register(SnapshotTool::declaration(), Arc::new(SnapshotTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::ToolDispatcher;

    fn call(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            id: "id-1".to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_summary_narration() {
        let reply = InterviewSummaryTool
            .handle(&call(
                PROVIDE_INTERVIEW_SUMMARY,
                json!({"summary": "Solid Rust skills.", "recommendation": "Strong hire"}),
            ))
            .unwrap();
        assert_eq!(
            reply.narration.as_deref(),
            Some("**Interview Complete**\n\n**Summary:**\nSolid Rust skills.\n\n**Recommendation:** Strong hire")
        );
        assert_eq!(reply.response, json!({"result": "ok"}));
    }

    #[test]
    fn test_summary_missing_args_is_invalid() {
        let err = InterviewSummaryTool
            .handle(&call(PROVIDE_INTERVIEW_SUMMARY, json!({"summary": "x"})))
            .unwrap_err();
        assert!(matches!(err, ToolDispatchError::InvalidArguments(_)));
    }

    #[test]
    fn test_snapshot_requests_capture() {
        let reply = SnapshotTool
            .handle(&call(TAKE_SNAPSHOT, json!({"reason": "ID verification"})))
            .unwrap();
        assert_eq!(
            reply.narration.as_deref(),
            Some("System: Taking snapshot. Reason: ID verification")
        );
        assert_eq!(
            reply.effects,
            vec![ToolEffect::Snapshot {
                reason: "ID verification".to_string()
            }]
        );
    }

    #[test]
    fn test_registry_declares_both_tools() {
        let registry = interviewer_registry();
        let names: Vec<_> = registry
            .enabled_declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec![PROVIDE_INTERVIEW_SUMMARY, TAKE_SNAPSHOT]);

        let outcome = ToolDispatcher::new(registry).dispatch(&[
            call(TAKE_SNAPSHOT, json!({"reason": "file"})),
            call(PROVIDE_INTERVIEW_SUMMARY, json!({})),
        ]);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.effects.len(), 1);
        assert!(outcome.results[1].response.get("error").is_some());
    }
}
