//! Target sequence validation, type inference, and translation.

use crate::error::ValidationError;

/// Declared type of a target sequence.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SequenceType {
    Dna,
    Protein,
    /// Infer from the sequence content.
    #[default]
    Infer,
}

/// The standard one-letter amino acid alphabet.
const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// One-letter / three-letter amino acid code pairs, including the stop code.
const AA_CODES: &[(char, &str)] = &[
    ('A', "Ala"),
    ('C', "Cys"),
    ('D', "Asp"),
    ('E', "Glu"),
    ('F', "Phe"),
    ('G', "Gly"),
    ('H', "His"),
    ('I', "Ile"),
    ('K', "Lys"),
    ('L', "Leu"),
    ('M', "Met"),
    ('N', "Asn"),
    ('P', "Pro"),
    ('Q', "Gln"),
    ('R', "Arg"),
    ('S', "Ser"),
    ('T', "Thr"),
    ('V', "Val"),
    ('W', "Trp"),
    ('Y', "Tyr"),
    ('*', "Ter"),
];

/// The three-letter code for a one-letter amino acid code.
pub fn three_letter_code(one: char) -> Option<&'static str> {
    AA_CODES
        .iter()
        .find(|(c, _)| *c == one)
        .map(|(_, three)| *three)
}

/// The one-letter code for a three-letter amino acid code.
pub fn one_letter_code(three: &str) -> Option<char> {
    AA_CODES
        .iter()
        .find(|(_, t)| *t == three)
        .map(|(c, _)| *c)
}

/// Infer whether a sequence is DNA or protein.
///
/// A sequence consisting only of A/C/G/T is DNA; anything else is protein.
pub fn infer_sequence_type(sequence: &str) -> SequenceType {
    if !sequence.is_empty() && sequence.chars().all(|c| "ACGT".contains(c)) {
        SequenceType::Dna
    } else {
        SequenceType::Protein
    }
}

/// Resolve a declared sequence type, applying inference where requested.
pub fn resolve_sequence_type(sequence: &str, declared: SequenceType) -> SequenceType {
    match declared {
        SequenceType::Infer => infer_sequence_type(sequence),
        other => other,
    }
}

/// Validate a target sequence against its (possibly inferred) type.
pub fn validate_target_sequence(
    sequence: &str,
    declared: SequenceType,
) -> Result<SequenceType, ValidationError> {
    let resolved = resolve_sequence_type(sequence, declared);
    match resolved {
        SequenceType::Dna => validate_dna_sequence(sequence)?,
        SequenceType::Protein => validate_protein_sequence(sequence)?,
        SequenceType::Infer => unreachable!("inference always resolves to dna or protein"),
    }
    Ok(resolved)
}

/// Validate a DNA target sequence: uppercase A/C/T/G only, length a multiple
/// of three.
pub fn validate_dna_sequence(sequence: &str) -> Result<(), ValidationError> {
    if sequence.is_empty() {
        return Err(ValidationError::new("target sequence may not be empty"));
    }
    if !sequence.chars().all(|c| "ACTG".contains(c)) {
        return Err(ValidationError::new(
            "target sequence is invalid, must be composed only of bases ACTG",
        ));
    }
    if sequence.len() % 3 != 0 {
        return Err(ValidationError::new(
            "target sequence is invalid, length must be a multiple of three",
        ));
    }
    Ok(())
}

/// Validate a protein target sequence over the standard amino acid alphabet.
pub fn validate_protein_sequence(sequence: &str) -> Result<(), ValidationError> {
    if sequence.is_empty() {
        return Err(ValidationError::new("target sequence may not be empty"));
    }
    if let Some(invalid) = sequence.chars().find(|c| !AMINO_ACIDS.contains(*c)) {
        return Err(ValidationError::new(format!(
            "target sequence is invalid, '{}' is not a standard amino acid",
            invalid
        )));
    }
    Ok(())
}

/// Translate a DNA sequence to protein using the standard codon table and the
/// first reading frame. Stop codons are rendered as `*`.
pub fn translate_dna(sequence: &str) -> Result<String, ValidationError> {
    if sequence.len() % 3 != 0 {
        return Err(ValidationError::new(
            "sequence length must be a multiple of three for translation",
        ));
    }
    let bytes = sequence.as_bytes();
    let mut protein = String::with_capacity(sequence.len() / 3);
    for codon in bytes.chunks(3) {
        let codon = std::str::from_utf8(codon)
            .map_err(|_| ValidationError::new("sequence is not valid ASCII"))?;
        protein.push(translate_codon(codon).ok_or_else(|| {
            ValidationError::new(format!("'{}' is not a valid codon", codon))
        })?);
    }
    Ok(protein)
}

/// Translate a single codon to a one-letter amino acid code.
fn translate_codon(codon: &str) -> Option<char> {
    Some(match codon {
        "TTT" | "TTC" => 'F',
        "TTA" | "TTG" | "CTT" | "CTC" | "CTA" | "CTG" => 'L',
        "ATT" | "ATC" | "ATA" => 'I',
        "ATG" => 'M',
        "GTT" | "GTC" | "GTA" | "GTG" => 'V',
        "TCT" | "TCC" | "TCA" | "TCG" | "AGT" | "AGC" => 'S',
        "CCT" | "CCC" | "CCA" | "CCG" => 'P',
        "ACT" | "ACC" | "ACA" | "ACG" => 'T',
        "GCT" | "GCC" | "GCA" | "GCG" => 'A',
        "TAT" | "TAC" => 'Y',
        "TAA" | "TAG" | "TGA" => '*',
        "CAT" | "CAC" => 'H',
        "CAA" | "CAG" => 'Q',
        "AAT" | "AAC" => 'N',
        "AAA" | "AAG" => 'K',
        "GAT" | "GAC" => 'D',
        "GAA" | "GAG" => 'E',
        "TGT" | "TGC" => 'C',
        "TGG" => 'W',
        "CGT" | "CGC" | "CGA" | "CGG" | "AGA" | "AGG" => 'R',
        "GGT" | "GGC" | "GGA" | "GGG" => 'G',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("ATGACA", SequenceType::Dna)]
    #[case("ACGT", SequenceType::Dna)]
    #[case("MTR", SequenceType::Protein)]
    #[case("ACDEFG", SequenceType::Protein)]
    fn sequence_type_inference(#[case] sequence: &str, #[case] expected: SequenceType) {
        assert_eq!(expected, infer_sequence_type(sequence));
    }

    #[test]
    fn dna_validation_accepts_codon_multiple() {
        assert!(validate_dna_sequence("ATGACA").is_ok());
    }

    #[rstest::rstest]
    #[case("ATGA")]
    #[case("ATGAXA")]
    #[case("atgaca")]
    fn dna_validation_rejects(#[case] sequence: &str) {
        assert!(validate_dna_sequence(sequence).is_err());
    }

    #[test]
    fn protein_validation() {
        assert!(validate_protein_sequence("MTR").is_ok());
        assert!(validate_protein_sequence("MTB").is_err());
    }

    #[rstest::rstest]
    #[case("ATGACA", "MT")]
    #[case("ATGTAA", "M*")]
    #[case("TTTTTATCT", "FLS")]
    fn translation(#[case] dna: &str, #[case] protein: &str) {
        assert_eq!(protein, translate_dna(dna).unwrap());
    }

    #[test]
    fn translation_rejects_partial_codon() {
        assert!(translate_dna("ATGA").is_err());
    }

    #[test]
    fn amino_acid_codes_round_trip() {
        for (one, three) in AA_CODES {
            assert_eq!(Some(*three), three_letter_code(*one));
            assert_eq!(Some(*one), one_letter_code(three));
        }
    }
}
