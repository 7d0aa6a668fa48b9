//! Mouth shapes and viseme timelines
//!
//! Shape codes follow Rhubarb Lip Sync: `A`-`F` are the basic shapes,
//! `G`, `H` and `X` are extended shapes. `X` is the closed mouth used at
//! rest.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A mouth shape code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MouthShape {
    /// Closed mouth for P, B, M
    A,
    /// Slightly open, clenched teeth
    B,
    /// Open mouth
    C,
    /// Wide open mouth
    D,
    /// Slightly rounded
    E,
    /// Puckered lips
    F,
    /// Upper teeth on lower lip (F, V)
    G,
    /// Tongue raised (long L)
    H,
    /// Idle, closed
    #[default]
    X,
}

impl MouthShape {
    /// Shape shown when nothing is playing
    pub const NEUTRAL: Self = MouthShape::X;

    pub const ALL: [MouthShape; 9] = [
        MouthShape::A,
        MouthShape::B,
        MouthShape::C,
        MouthShape::D,
        MouthShape::E,
        MouthShape::F,
        MouthShape::G,
        MouthShape::H,
        MouthShape::X,
    ];

    pub fn as_char(self) -> char {
        match self {
            MouthShape::A => 'A',
            MouthShape::B => 'B',
            MouthShape::C => 'C',
            MouthShape::D => 'D',
            MouthShape::E => 'E',
            MouthShape::F => 'F',
            MouthShape::G => 'G',
            MouthShape::H => 'H',
            MouthShape::X => 'X',
        }
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for MouthShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let shape = match (chars.next(), chars.next()) {
            (Some(c), None) => MouthShape::ALL
                .into_iter()
                .find(|shape| shape.as_char() == c.to_ascii_uppercase()),
            _ => None,
        };
        shape.ok_or_else(|| format!("Unknown mouth shape: {s}"))
    }
}

/// One timed mouth-shape cue, in seconds from the start of the audio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    #[serde(rename = "value")]
    pub shape: MouthShape,
}

impl MouthCue {
    pub fn new(start: f64, end: f64, shape: MouthShape) -> Self {
        Self { start, end, shape }
    }

    /// Half-open interval check: `start <= t < end`
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.end > self.start
    }
}

/// Ordered mouth-shape cues for one audio asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisemeTimeline {
    cues: Vec<MouthCue>,
}

impl VisemeTimeline {
    /// Build a timeline, sorting cues by start time.
    ///
    /// Cues with a non-positive length or non-finite bounds are dropped.
    pub fn new(mut cues: Vec<MouthCue>) -> Self {
        cues.retain(MouthCue::is_valid);
        cues.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { cues }
    }

    /// A timeline holding the neutral shape for `seconds`
    pub fn neutral(seconds: f64) -> Self {
        Self::new(vec![MouthCue::new(0.0, seconds, MouthShape::NEUTRAL)])
    }

    /// First cue whose `[start, end)` contains `t`
    pub fn cue_at(&self, t: f64) -> Option<&MouthCue> {
        self.cues.iter().find(|cue| cue.contains(t))
    }

    /// Shape active at `t`, if any cue covers it
    pub fn shape_at(&self, t: f64) -> Option<MouthShape> {
        self.cue_at(t).map(|cue| cue.shape)
    }

    pub fn cues(&self) -> &[MouthCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// End of the last cue, 0.0 for an empty timeline
    pub fn end(&self) -> f64 {
        self.cues.iter().map(|cue| cue.end).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cue_timeline() -> VisemeTimeline {
        VisemeTimeline::new(vec![
            MouthCue::new(0.0, 0.5, MouthShape::A),
            MouthCue::new(0.5, 1.2, MouthShape::B),
        ])
    }

    #[test]
    fn test_cue_lookup() {
        let timeline = two_cue_timeline();
        assert_eq!(timeline.shape_at(0.3), Some(MouthShape::A));
        assert_eq!(timeline.shape_at(0.5), Some(MouthShape::B));
        assert_eq!(timeline.shape_at(1.5), None);
        assert_eq!(timeline.shape_at(-0.1), None);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let timeline = VisemeTimeline::new(vec![
            MouthCue::new(0.5, 1.2, MouthShape::B),
            MouthCue::new(0.0, 0.5, MouthShape::A),
        ]);
        assert_eq!(timeline.cues()[0].shape, MouthShape::A);
        assert_eq!(timeline.end(), 1.2);
    }

    #[test]
    fn test_degenerate_cues_dropped() {
        let timeline = VisemeTimeline::new(vec![
            MouthCue::new(0.4, 0.4, MouthShape::C),
            MouthCue::new(0.6, 0.2, MouthShape::D),
            MouthCue::new(f64::NAN, 1.0, MouthShape::E),
            MouthCue::new(0.0, 0.1, MouthShape::X),
        ]);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("G".parse::<MouthShape>().unwrap(), MouthShape::G);
        assert_eq!("x".parse::<MouthShape>().unwrap(), MouthShape::X);
        assert!("Q".parse::<MouthShape>().is_err());
        assert!("AB".parse::<MouthShape>().is_err());
    }

    #[test]
    fn test_cue_json_uses_value_field() {
        let cue: MouthCue =
            serde_json::from_str(r#"{"start": 0.05, "end": 0.27, "value": "C"}"#).unwrap();
        assert_eq!(cue.shape, MouthShape::C);
        assert!(cue.contains(0.05));
        assert!(!cue.contains(0.27));
    }
}
