use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

///
/// How a motif is linked to a transcription factor.
///
/// Ordered by strength: `MotifSimilarity < Orthology < Direct`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceTier {
    /// The motif resembles a motif annotated to the TF.
    MotifSimilarity,
    /// The motif is annotated to an orthologue of the TF in another species.
    Orthology,
    /// The motif is annotated to the TF itself.
    Direct,
}

impl ConfidenceTier {
    /// Every tier, strongest first.
    pub const ALL: [ConfidenceTier; 3] = [
        ConfidenceTier::Direct,
        ConfidenceTier::Orthology,
        ConfidenceTier::MotifSimilarity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Direct => "direct",
            ConfidenceTier::Orthology => "orthology",
            ConfidenceTier::MotifSimilarity => "motif-similarity",
        }
    }

    /// Column name used for this tier in enrichment tables.
    pub fn column_name(&self) -> &'static str {
        match self {
            ConfidenceTier::Direct => "Direct_annot",
            ConfidenceTier::Orthology => "Orthology_annot",
            ConfidenceTier::MotifSimilarity => "Motif_similarity_annot",
        }
    }

    ///
    /// Classify a free text annotation description, e.g.
    /// `gene is orthologous to ENSG0001 in M. musculus (identity = 82%)`.
    ///
    /// A description naming both similarity and orthology is classified as motif
    /// similarity, the weaker of the two.
    ///
    pub fn from_description(description: &str) -> Option<Self> {
        let description = description.to_lowercase();
        if description.contains("directly annotated") {
            Some(ConfidenceTier::Direct)
        } else if description.contains("similar") {
            Some(ConfidenceTier::MotifSimilarity)
        } else if description.contains("orthologous") {
            Some(ConfidenceTier::Orthology)
        } else {
            None
        }
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "direct" | "direct-annot" => Ok(ConfidenceTier::Direct),
            "orthology" | "orthology-annot" => Ok(ConfidenceTier::Orthology),
            "motif-similarity"
            | "motif-similarity-annot"
            | "motif-similarity-and-orthology"
            | "motif-similarity-and-orthology-annot" => Ok(ConfidenceTier::MotifSimilarity),
            _ => ConfidenceTier::from_description(s)
                .ok_or_else(|| format!("unrecognized confidence tier '{s}'")),
        }
    }
}

impl Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One motif to TF link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub motif: String,
    pub tf: String,
    pub tier: ConfidenceTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motif_similarity_qvalue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orthologous_identity: Option<f64>,
}

impl AnnotationEntry {
    pub fn new(motif: impl Into<String>, tf: impl Into<String>, tier: ConfidenceTier) -> Self {
        AnnotationEntry {
            motif: motif.into(),
            tf: tf.into(),
            tier,
            motif_similarity_qvalue: None,
            orthologous_identity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case("direct", ConfidenceTier::Direct)]
    #[case("Direct_annot", ConfidenceTier::Direct)]
    #[case("Orthology_annot", ConfidenceTier::Orthology)]
    #[case("motif-similarity", ConfidenceTier::MotifSimilarity)]
    #[case("Motif_similarity_and_Orthology_annot", ConfidenceTier::MotifSimilarity)]
    #[case("gene is directly annotated", ConfidenceTier::Direct)]
    #[case(
        "gene is orthologous to ENSG0001 in M. musculus (identity = 82%)",
        ConfidenceTier::Orthology
    )]
    #[case(
        "motif similar to m7 ('TF_E'; q-value = 0.0002) and gene is orthologous to ENSG0009",
        ConfidenceTier::MotifSimilarity
    )]
    fn test_parse_tier(#[case] input: &str, #[case] expected: ConfidenceTier) {
        assert_eq!(input.parse::<ConfidenceTier>().unwrap(), expected);
    }

    #[rstest]
    fn test_unknown_tier() {
        assert!("weak".parse::<ConfidenceTier>().is_err());
    }

    #[rstest]
    fn test_tier_order() {
        assert!(ConfidenceTier::Direct > ConfidenceTier::Orthology);
        assert!(ConfidenceTier::Orthology > ConfidenceTier::MotifSimilarity);
        assert_eq!(ConfidenceTier::ALL.iter().max(), Some(&ConfidenceTier::Direct));
    }
}
