//! Text cleanup before synthesis.

/// Remove emoji glyphs and their joiners/selectors.
///
/// Plain digits, `#` and `*` survive even though they can start keycap
/// sequences; only the keycap combiner itself is dropped. Spaces left
/// doubled by a removed glyph are collapsed and the result is trimmed.
pub fn strip_emoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if is_emoji(c) {
            continue;
        }
        if c == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(c);
    }
    out.trim().to_owned()
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x231A..=0x231B
            | 0x23E9..=0x23F3
            | 0x23F8..=0x23FA
            | 0x2B05..=0x2B07
            | 0x2B1B..=0x2B1C
            | 0x2B50
            | 0x2B55
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
            | 0x200D
            | 0x20E3
            | 0xFE0E..=0xFE0F
            | 0xE0020..=0xE007F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_pictographs_and_collapses_gaps() {
        assert_eq!(strip_emoji("Let's GO! 🔥🔥"), "Let's GO!");
        assert_eq!(strip_emoji("You 💪 got this"), "You got this");
        assert_eq!(strip_emoji("🚀 Launch mode activated! ✨"), "Launch mode activated!");
    }

    #[test]
    fn strips_joined_sequences_and_flags() {
        assert_eq!(strip_emoji("Team 👩‍💻 ready 🇺🇸"), "Team ready");
        assert_eq!(strip_emoji("Heart ❤️ full"), "Heart full");
    }

    #[test]
    fn keeps_digits_and_punctuation() {
        assert_eq!(strip_emoji("Top 3 reasons #1 * 2"), "Top 3 reasons #1 * 2");
        assert_eq!(strip_emoji("Rank 1️⃣"), "Rank 1");
    }

    #[test]
    fn emoji_only_text_becomes_empty() {
        assert!(strip_emoji("🎉 🎉").is_empty());
    }

    #[test]
    fn keeps_newlines_and_accents() {
        assert_eq!(strip_emoji("Café\nnaïve"), "Café\nnaïve");
    }
}
