//! Enumerated hype scenarios and their situational phrases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A common high-pressure moment the user can pick instead of describing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Presentation,
    Interview,
    Workout,
    Date,
    #[serde(alias = "hard_convo")]
    HardConversation,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Presentation,
        Scenario::Interview,
        Scenario::Workout,
        Scenario::Date,
        Scenario::HardConversation,
    ];

    /// Stable identifier used on the command line and in config.
    pub fn id(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Interview => "interview",
            Self::Workout => "workout",
            Self::Date => "date",
            Self::HardConversation => "hard_conversation",
        }
    }

    /// Human-readable label; this is what gets stored on the session record.
    pub fn title(self) -> &'static str {
        match self {
            Self::Presentation => "Big Presentation",
            Self::Interview => "Job Interview",
            Self::Workout => "Tough Workout",
            Self::Date => "First Date",
            Self::HardConversation => "Hard Conversation",
        }
    }

    /// Fixed descriptive phrase completing "User is ...".
    pub fn situation(self) -> &'static str {
        match self {
            Self::Presentation => "about to give a presentation or speak in public",
            Self::Interview => "about to go into a job interview",
            Self::Workout => "about to do a challenging workout or physical activity",
            Self::Date => "about to go on a date and feeling nervous",
            Self::HardConversation => "about to have a difficult or uncomfortable conversation",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match needle.as_str() {
            "hard_convo" => Ok(Self::HardConversation),
            other => Self::ALL
                .into_iter()
                .find(|sc| sc.id() == other)
                .ok_or_else(|| format!("unknown scenario: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_ids_and_aliases() {
        assert_eq!("interview".parse::<Scenario>().unwrap(), Scenario::Interview);
        assert_eq!(
            "hard-conversation".parse::<Scenario>().unwrap(),
            Scenario::HardConversation
        );
        assert_eq!(
            "hard_convo".parse::<Scenario>().unwrap(),
            Scenario::HardConversation
        );
        assert!("skydiving".parse::<Scenario>().is_err());
    }

    #[test]
    fn situations_read_as_continuations() {
        for scenario in Scenario::ALL {
            assert!(scenario.situation().starts_with("about to"));
        }
    }

    #[test]
    fn serde_accepts_legacy_id() {
        let sc: Scenario = serde_json::from_str("\"hard_convo\"").unwrap();
        assert_eq!(sc, Scenario::HardConversation);
    }
}
