//! Deterministic mapping from service-provided labels and scores to UI tokens.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationToken {
    Happy,
    Sad,
    Angry,
    Fear,
    Surprise,
    Disgust,
    Neutral,
}

impl PresentationToken {
    pub const ALL: [PresentationToken; 7] = [
        PresentationToken::Happy,
        PresentationToken::Sad,
        PresentationToken::Angry,
        PresentationToken::Fear,
        PresentationToken::Surprise,
        PresentationToken::Disgust,
        PresentationToken::Neutral,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            PresentationToken::Happy => "😊",
            PresentationToken::Sad => "😢",
            PresentationToken::Angry => "😠",
            PresentationToken::Fear => "😟",
            PresentationToken::Surprise => "😮",
            PresentationToken::Disgust => "😖",
            PresentationToken::Neutral => "😐",
        }
    }

    /// Mood wording shown next to the glyph.
    pub fn descriptor(self) -> &'static str {
        match self {
            PresentationToken::Happy => "Happy",
            PresentationToken::Sad => "Low",
            PresentationToken::Angry => "Frustrated",
            PresentationToken::Fear => "Anxious",
            PresentationToken::Surprise => "Surprised",
            PresentationToken::Disgust => "Uneasy",
            PresentationToken::Neutral => "Neutral",
        }
    }
}

/// Maps an emotion label to its token. Total: unknown labels are neutral.
pub fn emotion(label: &str) -> PresentationToken {
    match label.trim().to_ascii_lowercase().as_str() {
        "happy" | "happiness" => PresentationToken::Happy,
        "sad" | "sadness" => PresentationToken::Sad,
        "angry" | "anger" => PresentationToken::Angry,
        "fear" => PresentationToken::Fear,
        "surprise" => PresentationToken::Surprise,
        "disgust" => PresentationToken::Disgust,
        _ => PresentationToken::Neutral,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressBand {
    Calm,
    Normal,
    Stressed,
    High,
}

impl StressBand {
    pub fn for_level(level: u8) -> Self {
        match level {
            0..=24 => StressBand::Calm,
            25..=49 => StressBand::Normal,
            50..=74 => StressBand::Stressed,
            _ => StressBand::High,
        }
    }

    pub fn color_hex(self) -> &'static str {
        match self {
            StressBand::Calm => "#00b894",
            StressBand::Normal => "#0984e3",
            StressBand::Stressed => "#e17055",
            StressBand::High => "#d63031",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StressBand::Calm => "Calm",
            StressBand::Normal => "Normal",
            StressBand::Stressed => "Stressed",
            StressBand::High => "High",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PresentationToken, StressBand, emotion};

    #[test]
    fn synonyms_and_case_map_to_the_same_token() {
        assert_eq!(emotion("HAPPY"), emotion("happy"));
        assert_eq!(emotion("happiness"), emotion("happy"));
        assert_eq!(emotion("Sadness"), PresentationToken::Sad);
        assert_eq!(emotion("anger"), PresentationToken::Angry);
    }

    #[test]
    fn unknown_and_empty_labels_are_neutral() {
        assert_eq!(emotion("unknown-xyz"), PresentationToken::Neutral);
        assert_eq!(emotion(""), PresentationToken::Neutral);
        assert_eq!(emotion("   "), PresentationToken::Neutral);
    }

    #[test]
    fn fear_reads_as_anxious() {
        let token = emotion("fear");
        assert_eq!(token, PresentationToken::Fear);
        assert_eq!(token.descriptor(), "Anxious");
        assert_eq!(token.emoji(), "😟");
    }

    #[test]
    fn every_token_has_a_glyph() {
        for token in PresentationToken::ALL {
            assert!(!token.emoji().is_empty());
            assert!(!token.descriptor().is_empty());
        }
    }

    #[test]
    fn bands_cover_the_whole_range() {
        assert_eq!(StressBand::for_level(0), StressBand::Calm);
        assert_eq!(StressBand::for_level(24), StressBand::Calm);
        assert_eq!(StressBand::for_level(25), StressBand::Normal);
        assert_eq!(StressBand::for_level(65), StressBand::Stressed);
        assert_eq!(StressBand::for_level(75), StressBand::High);
        assert_eq!(StressBand::for_level(100), StressBand::High);
        assert_eq!(StressBand::High.color_hex(), "#d63031");
    }
}
