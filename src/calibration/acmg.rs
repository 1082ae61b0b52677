//! ACMG functional evidence criteria and strengths.

/// ACMG evidence criterion applicable to functional assay data.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum AcmgCriterion {
    /// Well-established functional studies show a deleterious effect.
    #[serde(rename = "PS3")]
    #[strum(serialize = "PS3")]
    Ps3,
    /// Well-established functional studies show no deleterious effect.
    #[serde(rename = "BS3")]
    #[strum(serialize = "BS3")]
    Bs3,
}

impl AcmgCriterion {
    /// Criteria on the pathogenic side carry a `PS` prefix.
    pub fn is_pathogenic(&self) -> bool {
        self.to_string().starts_with("PS")
    }

    /// Criteria on the benign side carry a `BS` prefix.
    pub fn is_benign(&self) -> bool {
        self.to_string().starts_with("BS")
    }
}

/// Strength of evidence provided for a criterion.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStrength {
    Supporting,
    Moderate,
    Strong,
    VeryStrong,
}

/// A (criterion, strength) pair with its signed point weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AcmgClassification {
    pub criterion: AcmgCriterion,
    pub evidence_strength: EvidenceStrength,
}

impl AcmgClassification {
    pub fn new(criterion: AcmgCriterion, evidence_strength: EvidenceStrength) -> Self {
        Self {
            criterion,
            evidence_strength,
        }
    }

    /// Signed point weight: positive on the pathogenic side, negative on the
    /// benign side.
    pub fn points(&self) -> i32 {
        let magnitude = match self.evidence_strength {
            EvidenceStrength::Supporting => 1,
            EvidenceStrength::Moderate => 2,
            EvidenceStrength::Strong => 4,
            EvidenceStrength::VeryStrong => 8,
        };
        if self.criterion.is_benign() {
            -magnitude
        } else {
            magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn criterion_sides() {
        assert!(AcmgCriterion::Ps3.is_pathogenic());
        assert!(!AcmgCriterion::Ps3.is_benign());
        assert!(AcmgCriterion::Bs3.is_benign());
    }

    #[rstest::rstest]
    #[case(AcmgCriterion::Ps3, EvidenceStrength::Supporting, 1)]
    #[case(AcmgCriterion::Ps3, EvidenceStrength::Moderate, 2)]
    #[case(AcmgCriterion::Ps3, EvidenceStrength::Strong, 4)]
    #[case(AcmgCriterion::Ps3, EvidenceStrength::VeryStrong, 8)]
    #[case(AcmgCriterion::Bs3, EvidenceStrength::Supporting, -1)]
    #[case(AcmgCriterion::Bs3, EvidenceStrength::Strong, -4)]
    fn point_weights(
        #[case] criterion: AcmgCriterion,
        #[case] strength: EvidenceStrength,
        #[case] expected: i32,
    ) {
        assert_eq!(expected, AcmgClassification::new(criterion, strength).points());
    }

    #[test]
    fn display_round_trip() {
        assert_eq!("PS3", AcmgCriterion::Ps3.to_string());
        assert_eq!("VERY_STRONG", EvidenceStrength::VeryStrong.to_string());
        assert_eq!(AcmgCriterion::Bs3, "BS3".parse().unwrap());
    }
}
