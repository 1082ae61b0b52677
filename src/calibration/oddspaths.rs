//! Odds-of-pathogenicity evidence equivalence.
//!
//! Maps a numeric odds-path ratio onto its equivalent ACMG (criterion,
//! strength) pair per the Brnich/Tavtigian thresholds. Ratios in the open
//! interval (0.48, 2.1) are indeterminate and carry no evidence.

use crate::calibration::acmg::{AcmgCriterion, EvidenceStrength};

/// The ACMG evidence pair equivalent to an odds-path ratio, or `None` if the
/// ratio is indeterminate.
pub fn oddspaths_evidence_strength_equivalent(
    ratio: f64,
) -> Option<(AcmgCriterion, EvidenceStrength)> {
    if ratio >= 350.0 {
        Some((AcmgCriterion::Ps3, EvidenceStrength::VeryStrong))
    } else if ratio >= 18.7 {
        Some((AcmgCriterion::Ps3, EvidenceStrength::Strong))
    } else if ratio >= 4.3 {
        Some((AcmgCriterion::Ps3, EvidenceStrength::Moderate))
    } else if ratio >= 2.1 {
        Some((AcmgCriterion::Ps3, EvidenceStrength::Supporting))
    } else if ratio <= 0.003 {
        Some((AcmgCriterion::Bs3, EvidenceStrength::VeryStrong))
    } else if ratio <= 0.053 {
        Some((AcmgCriterion::Bs3, EvidenceStrength::Strong))
    } else if ratio <= 0.23 {
        Some((AcmgCriterion::Bs3, EvidenceStrength::Moderate))
    } else if ratio <= 0.48 {
        Some((AcmgCriterion::Bs3, EvidenceStrength::Supporting))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case(400.0, Some((AcmgCriterion::Ps3, EvidenceStrength::VeryStrong)))]
    #[case(350.0, Some((AcmgCriterion::Ps3, EvidenceStrength::VeryStrong)))]
    #[case(20.0, Some((AcmgCriterion::Ps3, EvidenceStrength::Strong)))]
    #[case(5.0, Some((AcmgCriterion::Ps3, EvidenceStrength::Moderate)))]
    #[case(2.1, Some((AcmgCriterion::Ps3, EvidenceStrength::Supporting)))]
    #[case(1.0, None)]
    #[case(0.48, Some((AcmgCriterion::Bs3, EvidenceStrength::Supporting)))]
    #[case(0.2, Some((AcmgCriterion::Bs3, EvidenceStrength::Moderate)))]
    #[case(0.05, Some((AcmgCriterion::Bs3, EvidenceStrength::Strong)))]
    #[case(0.001, Some((AcmgCriterion::Bs3, EvidenceStrength::VeryStrong)))]
    fn equivalences(
        #[case] ratio: f64,
        #[case] expected: Option<(AcmgCriterion, EvidenceStrength)>,
    ) {
        assert_eq!(expected, oddspaths_evidence_strength_equivalent(ratio));
    }
}
