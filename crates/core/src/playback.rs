//! The joined unit handed to the player

use crate::{AudioAsset, DisplayTarget, Sentence, SequenceNumber, VisemeTimeline};

/// A sentence together with its audio and its viseme timeline.
///
/// Only constructible once both the synthesis and the extraction result
/// exist, so the player can never receive audio without mouth cues or the
/// other way around.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEntry {
    sentence: Sentence,
    target: DisplayTarget,
    audio: AudioAsset,
    timeline: VisemeTimeline,
    placeholder: bool,
}

impl PlaybackEntry {
    pub fn new(
        sentence: Sentence,
        target: DisplayTarget,
        audio: AudioAsset,
        timeline: VisemeTimeline,
    ) -> Self {
        Self {
            sentence,
            target,
            audio,
            timeline,
            placeholder: false,
        }
    }

    /// Stand-in for a sentence whose pipeline failed: silent audio and a
    /// neutral timeline.
    pub fn placeholder(sentence: Sentence, target: DisplayTarget, silence: AudioAsset) -> Self {
        let timeline = VisemeTimeline::neutral(silence.duration().as_secs_f64());
        Self {
            sentence,
            target,
            audio: silence,
            timeline,
            placeholder: true,
        }
    }

    pub fn seq(&self) -> SequenceNumber {
        self.sentence.seq()
    }

    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    pub fn target(&self) -> DisplayTarget {
        self.target
    }

    pub fn audio(&self) -> &AudioAsset {
        &self.audio
    }

    pub fn timeline(&self) -> &VisemeTimeline {
        &self.timeline
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}
