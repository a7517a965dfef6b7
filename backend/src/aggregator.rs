use shared::{Emotion, EmotionScores};
use strum::IntoEnumIterator;

use crate::classifier::RawEmotionScores;

const ANGRY_WEIGHT: f64 = 0.5;
const FEAR_WEIGHT: f64 = 0.3;

/// Scores folded into the happy/neutral/sad buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketedEmotion {
    pub happy: f64,
    pub neutral: f64,
    pub sad: f64,
}

impl BucketedEmotion {
    pub fn from_raw(raw: &RawEmotionScores) -> Self {
        Self {
            happy: raw.get("happy"),
            neutral: raw.get("neutral"),
            sad: raw.get("sad") + ANGRY_WEIGHT * raw.get("angry") + FEAR_WEIGHT * raw.get("fear"),
        }
    }

    pub fn score(&self, emotion: Emotion) -> f64 {
        match emotion {
            Emotion::Happy => self.happy,
            Emotion::Neutral => self.neutral,
            Emotion::Sad => self.sad,
        }
    }

    /// Highest bucket; on ties the earlier of happy, neutral, sad wins.
    pub fn dominant(&self) -> Emotion {
        let mut best = Emotion::Happy;
        for emotion in Emotion::iter() {
            if self.score(emotion) > self.score(best) {
                best = emotion;
            }
        }
        best
    }
}

impl From<BucketedEmotion> for EmotionScores {
    fn from(b: BucketedEmotion) -> Self {
        EmotionScores {
            happy: b.happy,
            neutral: b.neutral,
            sad: b.sad,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub emotion: Emotion,
    /// Dominant score over 100, two decimals. Not clamped: the weighted sad
    /// bucket can push this above 1.0.
    pub confidence: f64,
    pub buckets: BucketedEmotion,
}

pub fn aggregate(raw: &RawEmotionScores) -> Aggregate {
    let buckets = BucketedEmotion::from_raw(raw);
    let emotion = buckets.dominant();
    Aggregate {
        emotion,
        confidence: round2(buckets.score(emotion) / 100.0),
        buckets,
    }
}

/// Two decimal places, halves to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
