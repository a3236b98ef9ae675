//! Decoded print-settings recommendations.

use super::profile::RequirementProfile;
use crate::core::errors::AdvisorError;
use serde::Serialize;
use std::fmt::Write as _;

pub const FILAMENT_LABELS: [&str; 6] = ["ABS", "ASA", "PC", "PETG", "PLA", "TPU"];
pub const INFILL_PERCENT_LABELS: [&str; 7] = [
    "0-15%", "16-30%", "31-45%", "46-60%", "61-75%", "76-90%", "91-100%",
];
pub const INFILL_PATTERN_LABELS: [&str; 5] = ["concentric", "cubic", "gyroid", "lines", "triangle"];
pub const NOZZLE_LABELS: [&str; 5] = ["0.2", "0.3", "0.4", "0.6", "0.8"];
pub const LAYER_HEIGHT_LABELS: [&str; 5] = ["0.1", "0.15", "0.2", "0.25", "0.3"];

/// One classifier head of the recommender, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Head {
    Filament,
    InfillPercent,
    InfillPattern,
    Nozzle,
    LayerHeight,
}

impl Head {
    pub const ALL: [Head; 5] = [
        Head::Filament,
        Head::InfillPercent,
        Head::InfillPattern,
        Head::Nozzle,
        Head::LayerHeight,
    ];

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Head::Filament => &FILAMENT_LABELS,
            Head::InfillPercent => &INFILL_PERCENT_LABELS,
            Head::InfillPattern => &INFILL_PATTERN_LABELS,
            Head::Nozzle => &NOZZLE_LABELS,
            Head::LayerHeight => &LAYER_HEIGHT_LABELS,
        }
    }

    /// Output tensor name.
    pub fn output_name(self) -> &'static str {
        match self {
            Head::Filament => "filament",
            Head::InfillPercent => "infill_percent",
            Head::InfillPattern => "infill_pattern",
            Head::Nozzle => "nozzle",
            Head::LayerHeight => "layer_height",
        }
    }

    /// Human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            Head::Filament => "Filament",
            Head::InfillPercent => "Infill percentage",
            Head::InfillPattern => "Infill pattern",
            Head::Nozzle => "Nozzle",
            Head::LayerHeight => "Layer Height",
        }
    }
}

/// The chosen label of one head with the scores it was chosen from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadPrediction {
    pub head: Head,
    pub label: &'static str,
    pub index: usize,
    pub scores: Vec<f32>,
}

impl HeadPrediction {
    /// Picks the highest score; the first index wins ties.
    ///
    /// # Errors
    ///
    /// `UnexpectedShape` if the number of scores differs from the head's labels.
    pub fn from_scores(head: Head, scores: Vec<f32>) -> Result<Self, AdvisorError> {
        let labels = head.labels();
        if scores.len() != labels.len() {
            return Err(AdvisorError::unexpected_shape(
                head.output_name(),
                format!("{} scores", labels.len()),
                format!("{} scores", scores.len()),
            ));
        }
        let index = argmax(&scores);
        Ok(Self {
            head,
            label: labels[index],
            index,
            scores,
        })
    }

    pub fn score(&self) -> f32 {
        self.scores[self.index]
    }
}

/// Index of the largest value; the first occurrence wins.
///
/// A NaN never displaces the current best, but a NaN at index 0 is returned
/// because no value compares greater than it.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = i;
        }
    }
    best
}

/// A complete recommendation for one part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub filament: HeadPrediction,
    pub infill_percent: HeadPrediction,
    pub infill_pattern: HeadPrediction,
    pub nozzle: HeadPrediction,
    pub layer_height: HeadPrediction,
    /// Product of the chosen scores.
    pub confidence: f64,
    pub profile: RequirementProfile,
}

impl Recommendation {
    /// Builds a recommendation from per-head scores in [`Head::ALL`] order.
    pub fn from_head_scores(
        scores: [Vec<f32>; 5],
        profile: RequirementProfile,
    ) -> Result<Self, AdvisorError> {
        let [filament, infill_percent, infill_pattern, nozzle, layer_height] = scores;
        let filament = HeadPrediction::from_scores(Head::Filament, filament)?;
        let infill_percent = HeadPrediction::from_scores(Head::InfillPercent, infill_percent)?;
        let infill_pattern = HeadPrediction::from_scores(Head::InfillPattern, infill_pattern)?;
        let nozzle = HeadPrediction::from_scores(Head::Nozzle, nozzle)?;
        let layer_height = HeadPrediction::from_scores(Head::LayerHeight, layer_height)?;

        let confidence = [&filament, &infill_percent, &infill_pattern, &nozzle, &layer_height]
            .iter()
            .map(|p| f64::from(p.score()))
            .product();

        Ok(Self {
            filament,
            infill_percent,
            infill_pattern,
            nozzle,
            layer_height,
            confidence,
            profile,
        })
    }

    /// Head predictions in output order.
    pub fn heads(&self) -> [&HeadPrediction; 5] {
        [
            &self.filament,
            &self.infill_percent,
            &self.infill_pattern,
            &self.nozzle,
            &self.layer_height,
        ]
    }

    /// Advice derived from the requirement profile.
    pub fn suggestions(&self) -> Vec<&'static str> {
        let p = &self.profile;
        let mut list = Vec::new();
        if p.is_pressure() || p.is_weight_support() {
            list.push("Consider increasing the infill density.");
        }
        if p.is_friction() {
            list.push("Higher infill can improve friction support.");
        }
        if p.is_decorative() {
            list.push("A lower infill density may be more efficient.");
        }
        if p.is_detail() {
            list.push("A finer nozzle and layer height could improve surface detail.");
        }
        if p.is_functional() {
            list.push("Ensure adequate infill for functional parts.");
        }
        list
    }

    /// Chosen settings, confidence and suggestions.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        for head in self.heads() {
            let _ = writeln!(out, "{}: {}", head.head.title(), head.label);
        }
        let _ = writeln!(out, "Confidence: {:.2}%", self.confidence * 100.0);

        let suggestions = self.suggestions();
        if suggestions.is_empty() {
            out.push_str("Recommendations: None\n");
        } else {
            out.push_str("Recommendations:\n");
            for s in suggestions {
                let _ = writeln!(out, " - {s}");
            }
        }
        out
    }

    /// Every head's full score table, the chosen label marked with `*`.
    pub fn format_details(&self) -> String {
        let mut out = String::new();
        for head in self.heads() {
            let _ = writeln!(out, "{}:", head.head.title());
            for (i, (label, score)) in head.head.labels().iter().zip(&head.scores).enumerate() {
                let marker = if i == head.index { '*' } else { ' ' };
                let _ = writeln!(out, " {marker} {label:<10} {:6.2}%", score * 100.0);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;

    fn one_hot(len: usize, at: usize, score: f32) -> Vec<f32> {
        let mut v = vec![0.0; len];
        v[at] = score;
        v
    }

    fn sample(profile: RequirementProfile) -> Recommendation {
        Recommendation::from_head_scores(
            [
                one_hot(6, 4, 0.9),
                one_hot(7, 1, 0.8),
                one_hot(5, 2, 1.0),
                one_hot(5, 2, 0.5),
                one_hot(5, 2, 1.0),
            ],
            profile,
        )
        .unwrap()
    }

    #[test]
    fn test_argmax_first_index_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&[0.3]), 0);
        assert_eq!(argmax(&[f32::NAN, 0.1]), 0);
        assert_eq!(argmax(&[0.1, f32::NAN, 0.05]), 0);
    }

    #[test]
    fn test_labels_and_confidence() {
        let rec = sample(RequirementProfile::default());
        assert_eq!(rec.filament.label, "PLA");
        assert_eq!(rec.infill_percent.label, "16-30%");
        assert_eq!(rec.infill_pattern.label, "gyroid");
        assert_eq!(rec.nozzle.label, "0.4");
        assert_eq!(rec.layer_height.label, "0.2");
        let expected = f64::from(0.9f32) * f64::from(0.8f32) * 0.5;
        assert!((rec.confidence - expected).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_head_width_is_unexpected_shape() {
        let err = Recommendation::from_head_scores(
            [vec![0.0; 5], vec![0.0; 7], vec![0.0; 5], vec![0.0; 5], vec![0.0; 5]],
            RequirementProfile::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedShape);
    }

    #[test]
    fn test_suggestions_follow_profile() {
        let rec = sample(RequirementProfile::new(true, true, false, true, true, false, true));
        assert_eq!(
            rec.suggestions(),
            vec![
                "Consider increasing the infill density.",
                "Higher infill can improve friction support.",
                "A lower infill density may be more efficient.",
                "A finer nozzle and layer height could improve surface detail.",
                "Ensure adequate infill for functional parts.",
            ]
        );
        assert!(sample(RequirementProfile::default()).suggestions().is_empty());
    }

    #[test]
    fn test_summary_text() {
        let summary = sample(RequirementProfile::default()).format_summary();
        assert_eq!(
            summary,
            "Filament: PLA\nInfill percentage: 16-30%\nInfill pattern: gyroid\nNozzle: 0.4\n\
             Layer Height: 0.2\nConfidence: 36.00%\nRecommendations: None\n"
        );

        let functional = sample(RequirementProfile::new(true, false, false, false, false, false, false));
        assert!(
            functional
                .format_summary()
                .ends_with("Recommendations:\n - Ensure adequate infill for functional parts.\n")
        );
    }

    #[test]
    fn test_details_mark_chosen_label() {
        let details = sample(RequirementProfile::default()).format_details();
        assert!(details.starts_with("Filament:\n"));
        assert!(details.contains(" * PLA         90.00%\n"));
        assert!(details.contains("   ABS          0.00%\n"));
    }
}
