//! Prompt composition for single-shot and conversational hypes.
//!
//! Pure functions only: the same inputs always produce the same prompt.
//! Whether memory appears in a conversational prompt is decided by the
//! caller; the builder renders whatever memory it is handed.

use crate::persona::Persona;
use crate::scenario::Scenario;
use crate::session::{HypeSession, Role, Turn};

const SINGLE_SHOT_MEMORY_HEADING: &str =
    "MEMORY - User's Recent Wins (use these to personalize your hype):";
const SINGLE_SHOT_MEMORY_FOOTER: &str =
    "Reference these past wins naturally to boost their confidence!";
const CONVERSATION_MEMORY_HEADING: &str =
    "MEMORY - User's Recent Wins (reference naturally, don't repeat every turn):";

const SINGLE_SHOT_CLOSING: &str =
    "Give them a quick, powerful hype! (4-5 sentences max, designed to be spoken in 20-30 seconds)";

const LIVE_CONVERSATION_FRAMING: &str = "\
You are in a LIVE VOICE CONVERSATION. Be conversational, natural, and responsive.
Keep responses brief (2-3 sentences) since they'll be spoken aloud.
Don't repeat yourself or reference the same wins multiple times.
Respond directly to what the user just said.";

/// What kind of prompt to build.
#[derive(Debug, Clone, Copy)]
pub enum PromptKind<'a> {
    /// One-off hype for a scenario and/or free-text description.
    SingleShot {
        scenario: Option<Scenario>,
        free_text: Option<&'a str>,
    },
    /// Next reply in a live conversation.
    Conversation {
        history: &'a [Turn],
        message: &'a str,
    },
}

/// Compose a prompt. Memory is omitted entirely when `memory` is empty.
pub fn build(persona: Persona, kind: PromptKind<'_>, memory: &[HypeSession]) -> String {
    let mut prompt = String::from(persona.profile().instructions);

    match kind {
        PromptKind::SingleShot {
            scenario,
            free_text,
        } => {
            if !memory.is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(SINGLE_SHOT_MEMORY_HEADING);
                prompt.push('\n');
                prompt.push_str(&memory_lines(memory));
                prompt.push('\n');
                prompt.push_str(SINGLE_SHOT_MEMORY_FOOTER);
            }
            push_situation(&mut prompt, scenario, free_text);
            prompt.push_str("\n\n");
            prompt.push_str(SINGLE_SHOT_CLOSING);
        }
        PromptKind::Conversation { history, message } => {
            if !memory.is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(CONVERSATION_MEMORY_HEADING);
                prompt.push('\n');
                prompt.push_str(&memory_lines(memory));
            }
            prompt.push_str("\n\n");
            prompt.push_str(LIVE_CONVERSATION_FRAMING);

            if !history.is_empty() {
                prompt.push_str("\n\n--- CONVERSATION SO FAR ---\n");
                for turn in history {
                    let label = match turn.role {
                        Role::User => "User",
                        Role::Assistant => persona.display_name(),
                    };
                    prompt.push_str(label);
                    prompt.push_str(": ");
                    prompt.push_str(&turn.text);
                    prompt.push('\n');
                }
            }

            prompt.push_str("\n\n--- NEW MESSAGE ---\nUser: ");
            prompt.push_str(message);
            prompt.push_str("\n\nRespond naturally as ");
            prompt.push_str(persona.display_name());
            prompt.push(':');
        }
    }

    prompt
}

/// Single-shot prompt shorthand.
pub fn build_hype_prompt(
    persona: Persona,
    scenario: Option<Scenario>,
    free_text: Option<&str>,
    memory: &[HypeSession],
) -> String {
    build(
        persona,
        PromptKind::SingleShot {
            scenario,
            free_text,
        },
        memory,
    )
}

/// Conversational prompt shorthand.
pub fn build_conversation_prompt(
    persona: Persona,
    history: &[Turn],
    message: &str,
    memory: &[HypeSession],
) -> String {
    build(persona, PromptKind::Conversation { history, message }, memory)
}

/// One `- <scenario>: <input> (Result: WIN! <notes>)` line per session,
/// each terminated by a newline.
pub fn memory_lines(sessions: &[HypeSession]) -> String {
    let mut out = String::new();
    for session in sessions {
        out.push_str("- ");
        out.push_str(&session.scenario);
        out.push_str(": ");
        out.push_str(&session.user_input);
        match session.outcome_notes.as_deref() {
            Some(notes) => {
                out.push_str(" (Result: WIN! ");
                out.push_str(notes);
                out.push_str(")\n");
            }
            None => out.push_str(" (Result: WIN!)\n"),
        }
    }
    out
}

fn push_situation(prompt: &mut String, scenario: Option<Scenario>, free_text: Option<&str>) {
    prompt.push_str("\n\n---\n\nUser is ");
    if let Some(scenario) = scenario {
        prompt.push_str(scenario.situation());
    }
    let free_text = free_text.map(str::trim).filter(|t| !t.is_empty());
    if let Some(text) = free_text {
        if scenario.is_some() {
            prompt.push_str(". They shared: \"");
            prompt.push_str(text);
            prompt.push('"');
        } else {
            prompt.push_str("facing: ");
            prompt.push_str(text);
        }
    }
}
