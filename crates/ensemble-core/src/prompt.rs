// Prompt template for a single in-character turn.
//
// Turns the scene, the speaking character, whoever else is present, and the
// dialogue so far into one instruction string for the completion model.
// Everything here is pure: the same catalog and inputs always produce the
// same prompt.

use thiserror::Error;

use crate::catalog::Catalog;
use crate::turn::HistoryMessage;

/// Text returned in place of a prompt when the scene or speaker is unknown.
pub const CONFIG_ERROR_MARKER: &str = "System Config Error: Missing Scenario or Agent";

/// Substituted for the others block when nobody else resolves.
pub const ALONE_TEXT: &str = "Only you are here.";

/// Reply length the model is asked to stay under.
const MAX_REPLY_WORDS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// Either the scene id or the speaking character id is not in the catalog.
    /// Displays as [`CONFIG_ERROR_MARKER`].
    #[error("System Config Error: Missing Scenario or Agent")]
    MissingSceneOrCharacter,
}

// ---------------------------------------------------------------------------
// Turn prompt
// ---------------------------------------------------------------------------

/// Build the prompt asking `speaker_id` for their next line in `scene_id`.
///
/// `present_ids` is everyone in the scene; the speaker is filtered out and
/// unknown ids are ignored. `history` is rendered oldest-first.
pub fn compose_prompt(
    catalog: &Catalog,
    scene_id: &str,
    speaker_id: &str,
    present_ids: &[String],
    history: &[HistoryMessage],
) -> Result<String, PromptError> {
    let (Some(scene), Some(speaker)) = (
        catalog.lookup_scene(scene_id),
        catalog.lookup_character(speaker_id),
    ) else {
        return Err(PromptError::MissingSceneOrCharacter);
    };

    let others = others_present(catalog, speaker_id, present_ids);
    let transcript = render_transcript(history);

    let mut prompt = String::with_capacity(1024);

    prompt.push_str("You are roleplaying in a simulation.\n---\n");

    // Section 1: ENVIRONMENT
    prompt.push_str(&format!(
        "**ENVIRONMENT (Where you are):**\n\
         Scenario: {}\n\
         Description: {}\n\n",
        scene.name, scene.description,
    ));

    // Section 2: YOUR CHARACTER
    prompt.push_str(&format!(
        "**YOUR CHARACTER:**\n\
         Name: {}\n\
         Role: {}\n\
         Personality: {}\n\n",
        speaker.name, speaker.role, speaker.personality,
    ));

    // Section 3: OTHER CHARACTERS PRESENT
    prompt.push_str("**OTHER CHARACTERS PRESENT:**\n");
    prompt.push_str(&others);
    prompt.push_str("\n\n");

    // Section 4: CONVERSATION HISTORY
    prompt.push_str("**CONVERSATION HISTORY:**\n");
    prompt.push_str(&transcript);
    prompt.push_str("\n\n---\n");

    // Section 5: INSTRUCTION
    prompt.push_str(&format!(
        "**INSTRUCTION:**\n\
         Based on the history, continue the conversation as {name}.\n\
         1. Stay strictly in character. Reflect your personality in your tone and word choice.\n\
         2. React to the environment ({scene}) and what others said.\n\
         3. Keep your response concise (under {MAX_REPLY_WORDS} words).\n\
         4. Output Format: Just the spoken text (no \"{name} says:\" prefixes).\n",
        name = speaker.name,
        scene = scene.name,
    ));

    Ok(prompt.trim().to_string())
}

// ---------------------------------------------------------------------------
// Section helpers
// ---------------------------------------------------------------------------

/// One `- Name (role): personality` bullet per known character other than the
/// speaker, in input order. Falls back to [`ALONE_TEXT`].
pub fn others_present(catalog: &Catalog, speaker_id: &str, present_ids: &[String]) -> String {
    let bullets: Vec<String> = present_ids
        .iter()
        .filter(|id| id.as_str() != speaker_id)
        .filter_map(|id| catalog.lookup_character(id))
        .map(|c| format!("- {} ({}): {}", c.name, c.role, c.personality))
        .collect();

    if bullets.is_empty() {
        ALONE_TEXT.to_string()
    } else {
        bullets.join("\n")
    }
}

/// Render the dialogue as `agentId: content` lines, oldest first.
pub fn render_transcript(history: &[HistoryMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.agent_id, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
