//! System-prompt templating.
//!
//! Templates use `{{key}}` placeholders. Keys are looked up in the
//! configured variables, except `{{cameraInstruction}}` which is filled
//! with a note reflecting whether the camera is currently on. Placeholders
//! without a value are left in place and reported at `warn`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Placeholder substituted with the camera note.
pub const CAMERA_INSTRUCTION_KEY: &str = "cameraInstruction";

pub const CAMERA_ON_NOTE: &str =
    "(Internal Note: The candidate's camera is on. You can proceed with the interview.)";

pub const CAMERA_OFF_NOTE: &str = "(Internal Note: The candidate's camera is off. Your first \
     action is to politely ask them to enable it. For example: '[calm] Before we begin, it seems \
     your camera isn't active. Could you please enable it so we can have a more personal \
     conversation?')";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

const INTERVIEWER_TEMPLATE: &str = r#"You are Veronica, an interview specialist at a technical recruiting consultancy. You conduct spoken job interviews. Stay professional, warm and attentive, and speak the way a person does: use contractions, vary your sentences and keep each reply short.

Your voice engine understands bracketed tone tags such as [professional], [friendly], [calm], [thoughtful] and [sincere]. Use them to shape your delivery. Never read a tag aloud.

Candidate details:
- Full Name: {{fullName}}
- Email: {{email}}
- Phone Number: {{phone}}
- Job Experience: {{jobExperience}}

Interview plan:

1. Greet {{fullName}} by name, introduce yourself and confirm the role they are applying for.
2. Camera: {{cameraInstruction}}
3. Ask about their background, what they know about the company and the role, and which strengths their experience with {{jobExperience}} brings.
4. Ask one or two behavioural questions (a conflict, a mistake, a deadline under pressure) and their salary expectations.
5. Invite their questions, thank them and explain the next steps.

If an answer is vague or off topic, politely ask for a concrete example. If after two or three attempts the candidate clearly cannot address the core requirements, end the interview courteously.

However the interview ends, call `provide_interview_summary` immediately afterwards with your assessment and a hiring recommendation. You may call `take_snapshot` with a short reason when you need a picture of the candidate for the file."#;

/// Values substituted into a template.
pub type PromptVariables = BTreeMap<String, String>;

/// A system-prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The built-in interviewer persona.
    pub fn interviewer() -> Self {
        Self::new(INTERVIEWER_TEMPLATE)
    }

    /// Read a template from `location` if it names an existing file,
    /// otherwise treat `location` as the template text itself.
    pub fn load(location: &str) -> std::io::Result<Self> {
        let path = Path::new(location);
        if !location.contains('\n') && path.is_file() {
            return Ok(Self::new(std::fs::read_to_string(path)?));
        }
        Ok(Self::new(location))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder keys in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let key = &caps[1];
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    /// Substitute `variables` and the camera note.
    pub fn render(&self, variables: &PromptVariables, camera_on: bool) -> String {
        let mut missing: Vec<String> = Vec::new();

        let rendered = PLACEHOLDER.replace_all(&self.source, |caps: &Captures| -> String {
            let key = &caps[1];
            if key == CAMERA_INSTRUCTION_KEY {
                return camera_note(camera_on).to_string();
            }
            match variables.get(key) {
                Some(value) => value.clone(),
                None => {
                    if !missing.iter().any(|k| k == key) {
                        missing.push(key.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            tracing::warn!(placeholders = ?missing, "System prompt has unfilled placeholders");
        }
        rendered.into_owned()
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::interviewer()
    }
}

/// Note that fills `{{cameraInstruction}}`.
pub fn camera_note(camera_on: bool) -> &'static str {
    if camera_on {
        CAMERA_ON_NOTE
    } else {
        CAMERA_OFF_NOTE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> PromptVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_every_occurrence() {
        let template = PromptTemplate::new("Hi {{name}}. Bye {{ name }}.");
        assert_eq!(
            template.render(&vars(&[("name", "Ada")]), false),
            "Hi Ada. Bye Ada."
        );
    }

    #[test]
    fn test_camera_instruction() {
        let template = PromptTemplate::new("Note: {{cameraInstruction}}");
        assert_eq!(
            template.render(&PromptVariables::new(), true),
            format!("Note: {CAMERA_ON_NOTE}")
        );
        assert!(
            template
                .render(&PromptVariables::new(), false)
                .contains("camera is off")
        );
    }

    #[test]
    fn test_missing_placeholders_are_kept() {
        let template = PromptTemplate::new("{{a}} and {{b}}");
        assert_eq!(template.render(&vars(&[("a", "1")]), true), "1 and {{b}}");
    }

    #[test]
    fn test_placeholders_in_order() {
        let template = PromptTemplate::new("{{b}} {{a}} {{b}}");
        assert_eq!(template.placeholders(), vec!["b", "a"]);
    }

    #[test]
    fn test_interviewer_template_fully_rendered() {
        let template = PromptTemplate::interviewer();
        assert_eq!(
            template.placeholders(),
            vec!["fullName", "email", "phone", "jobExperience", "cameraInstruction"]
        );

        let rendered = template.render(
            &vars(&[
                ("fullName", "Ada Lovelace"),
                ("email", "ada@example.com"),
                ("phone", "+44 20 0000 0000"),
                ("jobExperience", "analytical engines"),
            ]),
            true,
        );
        assert!(rendered.contains("Greet Ada Lovelace by name"));
        assert!(rendered.contains(CAMERA_ON_NOTE));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_load_inline_and_file() {
        let inline = PromptTemplate::load("Be brief, {{name}}.").unwrap();
        assert_eq!(inline.source(), "Be brief, {{name}}.");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "From file").unwrap();
        let loaded = PromptTemplate::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.source(), "From file");
    }
}
