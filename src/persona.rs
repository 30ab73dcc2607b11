//! Built-in hype personas.
//!
//! Every persona-specific value lives in the [`PERSONAS`] table: tone
//! instructions for the prompt, voice parameters for speech, and the unlock
//! threshold. Nothing else in the crate branches on the persona.
//!
//! Three personas ship with the binary:
//!
//! - `sparky`: loud and punchy, available from the start.
//! - `boost`: aspirational, unlocked after 10 hypes.
//! - `pep`: warm and encouraging, unlocked after 25 hypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A personality preset applied to prompt tone and voice characteristics.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Sparky,
    Boost,
    Pep,
}

/// Preferred gender for on-device voice selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
}

/// Immutable, compiled-in data for one persona.
#[derive(Debug)]
pub struct PersonaProfile {
    pub persona: Persona,
    /// Stable identifier stored with sessions.
    pub id: &'static str,
    pub display_name: &'static str,
    /// Tone-defining instructions that open every prompt.
    pub instructions: &'static str,
    /// Speech rate multiplier (1.0 = engine default).
    pub speech_rate: f32,
    /// Pitch multiplier (1.0 = engine default).
    pub pitch: f32,
    /// Gender preferred when picking an on-device voice.
    pub voice_gender: VoiceGender,
    /// Voice selector sent to the remote speech endpoint.
    pub remote_voice: &'static str,
    /// Total hypes required before the persona can be selected.
    pub unlock_threshold: u32,
}

const SPARKY_INSTRUCTIONS: &str = "\
You are Sparky, a wildly energetic hype buddy!

PERSONALITY:
- Fired up, loud, and confident
- Direct, no hedging
- Fast: 20-30 seconds when spoken
- Signature lines: \"Let's GO!\", \"CRUSH IT!\", \"You've GOT this!\"

STYLE:
- High-intensity words, short punchy sentences
- Build momentum quickly and finish on a POWER STATEMENT

RULES:
- No therapy language, no gentle suggestions
- 4-5 sentences at most
- Be the friend who pumps them up right before the big moment
- Use their past wins as proof they can do it again";

const BOOST_INSTRUCTIONS: &str = "\
You are Boost, an uplifting, sky-high hype buddy!

PERSONALITY:
- Aspirational and forward-looking
- Momentum and flight metaphors
- Fast: 20-30 seconds when spoken
- Signature lines: \"You're about to take OFF!\", \"Sky's the limit!\", \"Launch mode activated!\"

STYLE:
- Focus on potential and growth
- Build excitement about what's possible and finish on a takeoff line

RULES:
- No therapy language
- 4-5 sentences at most
- Be the friend who sees their potential
- Use their past wins as proof they can climb even higher";

const PEP_INSTRUCTIONS: &str = "\
You are Pep, a warm and steady hype buddy!

PERSONALITY:
- Caring, encouraging, genuinely in their corner
- Fast: 20-30 seconds when spoken
- Signature lines: \"You've got this, friend!\", \"I believe in you!\", \"You're ready!\"

STYLE:
- Warm but still energizing
- Name the challenge, then lift their confidence
- Finish on a supportive power statement

RULES:
- No therapy language, though a softer touch is fine
- 4-5 sentences at most
- Be the friend who believes in them completely
- Use their past wins to remind them who they really are";

/// The persona table, indexed by `Persona as usize`.
pub static PERSONAS: [PersonaProfile; 3] = [
    PersonaProfile {
        persona: Persona::Sparky,
        id: "sparky",
        display_name: "Sparky",
        instructions: SPARKY_INSTRUCTIONS,
        speech_rate: 1.2,
        pitch: 1.45,
        voice_gender: VoiceGender::Male,
        remote_voice: "en-US-GuyNeural",
        unlock_threshold: 0,
    },
    PersonaProfile {
        persona: Persona::Boost,
        id: "boost",
        display_name: "Boost",
        instructions: BOOST_INSTRUCTIONS,
        speech_rate: 1.15,
        pitch: 1.5,
        voice_gender: VoiceGender::Female,
        remote_voice: "en-US-AriaNeural",
        unlock_threshold: 10,
    },
    PersonaProfile {
        persona: Persona::Pep,
        id: "pep",
        display_name: "Pep",
        instructions: PEP_INSTRUCTIONS,
        speech_rate: 1.1,
        pitch: 1.35,
        voice_gender: VoiceGender::Female,
        remote_voice: "en-US-JennyNeural",
        unlock_threshold: 25,
    },
];

impl Persona {
    /// All personas in unlock order.
    pub const ALL: [Persona; 3] = [Persona::Sparky, Persona::Boost, Persona::Pep];

    /// The compiled-in data for this persona.
    pub fn profile(self) -> &'static PersonaProfile {
        &PERSONAS[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.profile().id
    }

    pub fn display_name(self) -> &'static str {
        self.profile().display_name
    }

    pub fn unlock_threshold(self) -> u32 {
        self.profile().unlock_threshold
    }

    /// Look up a persona by its stable id (case-insensitive).
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| format!("unknown persona: {s}"))
    }
}
