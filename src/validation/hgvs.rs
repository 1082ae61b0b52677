//! MAVE-HGVS variant string parsing and target sequence consistency.
//!
//! Implements the restricted MAVE-HGVS grammar used for uploaded datasets:
//! single events (substitution, deletion, duplication, insertion, delins,
//! frameshift, synonymous) and bracketed multi-variants, under the `c.`,
//! `n.`, `g.`, `m.`, `o.`, and `p.` prefixes.

use std::sync::LazyLock;

use regex::Regex;

use crate::validation::target::{one_letter_code, three_letter_code};

/// Error raised when a variant string cannot be parsed or does not agree with
/// the target sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaveHgvsError {
    #[error("invalid variant string '{0}'")]
    Parse(String),
    #[error("target sequence mismatch for '{0}'")]
    TargetMismatch(String),
}

/// Variant prefixes valid for the `hgvs_nt` column.
pub const NT_PREFIXES: &[char] = &['c', 'n', 'g', 'm', 'o'];
/// Variant prefixes valid for the `hgvs_splice` column.
pub const SPLICE_PREFIXES: &[char] = &['c', 'n'];
/// Variant prefixes valid for the `hgvs_pro` column.
pub const PRO_PREFIXES: &[char] = &['p'];

/// A nucleotide position, possibly with UTR markers and intronic offsets
/// (only legal under the `c.` and `n.` prefixes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtPosition {
    /// The anchor base; negative values are 5' UTR positions.
    pub anchor: i64,
    /// Position is in the 3' UTR (`*` marker).
    pub utr3: bool,
    /// Intronic offset relative to the anchor.
    pub offset: i64,
}

impl NtPosition {
    /// Whether the position maps directly onto the linear target sequence.
    pub fn is_plain(&self) -> bool {
        !self.utr3 && self.offset == 0 && self.anchor >= 1
    }
}

/// A protein position: reference residue (three-letter code) plus 1-based
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProPosition {
    pub residue: String,
    pub number: u64,
}

/// A single parsed MAVE-HGVS event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NtSubstitution {
        position: NtPosition,
        reference: char,
        alternate: char,
    },
    NtDeletion {
        start: NtPosition,
        end: Option<NtPosition>,
    },
    NtDuplication {
        start: NtPosition,
        end: Option<NtPosition>,
    },
    NtInsertion {
        start: NtPosition,
        end: NtPosition,
        bases: String,
    },
    NtDelins {
        start: NtPosition,
        end: Option<NtPosition>,
        bases: String,
    },
    /// Whole-target identity (`=`).
    NtIdentical,
    ProSubstitution {
        position: ProPosition,
        alternate: String,
    },
    /// `p.Xaa#=`, a synonymous change at a known residue.
    ProSynonymous { position: ProPosition },
    ProDeletion {
        start: ProPosition,
        end: Option<ProPosition>,
    },
    ProDuplication {
        start: ProPosition,
        end: Option<ProPosition>,
    },
    ProInsertion {
        start: ProPosition,
        end: ProPosition,
        residues: Vec<String>,
    },
    ProDelins {
        start: ProPosition,
        end: Option<ProPosition>,
        residues: Vec<String>,
    },
    ProFrameshift { position: ProPosition },
    /// Whole-target identity (`p.=`).
    ProIdentical,
}

/// A parsed MAVE-HGVS variant: a prefix plus one or more events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HgvsVariant {
    pub prefix: char,
    pub events: Vec<Event>,
}

const NT_POSITION: &str = r"(?:\*?-?\d+(?:[+-]\d+)?)";
const AA: &str = r"(?:Ala|Arg|Asn|Asp|Cys|Gln|Glu|Gly|His|Ile|Leu|Lys|Met|Phe|Pro|Ser|Thr|Trp|Tyr|Val|Ter)";

static NT_POSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<utr3>\*)?(?P<anchor>-?\d+)(?P<offset>[+-]\d+)?$").unwrap());
static NT_SUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<pos>{NT_POSITION})(?P<ref>[ACGT])>(?P<alt>[ACGT])$"
    ))
    .unwrap()
});
static NT_RANGE_EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<start>{NT_POSITION})(?:_(?P<end>{NT_POSITION}))?(?P<kind>del|dup|delins|ins)(?P<seq>[ACGT]*)$"
    ))
    .unwrap()
});
static PRO_SUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<ref>{AA})(?P<pos>\d+)(?P<alt>{AA}|=)$"
    ))
    .unwrap()
});
static PRO_RANGE_EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<ref1>{AA})(?P<pos1>\d+)(?:_(?P<ref2>{AA})(?P<pos2>\d+))?(?P<kind>del|dup|delins|ins|fs)(?P<seq>(?:{AA})*)$"
    ))
    .unwrap()
});
static AA_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(AA).unwrap());

fn parse_error(s: &str) -> MaveHgvsError {
    MaveHgvsError::Parse(s.to_owned())
}

fn parse_nt_position(text: &str, allow_extended: bool, whole: &str) -> Result<NtPosition, MaveHgvsError> {
    let captures = NT_POSITION_RE.captures(text).ok_or_else(|| parse_error(whole))?;
    let position = NtPosition {
        anchor: captures
            .name("anchor")
            .unwrap()
            .as_str()
            .parse()
            .map_err(|_| parse_error(whole))?,
        utr3: captures.name("utr3").is_some(),
        offset: captures
            .name("offset")
            .map(|m| m.as_str().parse())
            .transpose()
            .map_err(|_| parse_error(whole))?
            .unwrap_or(0),
    };
    if position.anchor == 0 {
        return Err(parse_error(whole));
    }
    if !allow_extended && !position.is_plain() {
        return Err(parse_error(whole));
    }
    Ok(position)
}

fn parse_nt_event(body: &str, allow_extended: bool, whole: &str) -> Result<Event, MaveHgvsError> {
    if body == "=" {
        return Ok(Event::NtIdentical);
    }

    if let Some(captures) = NT_SUB_RE.captures(body) {
        return Ok(Event::NtSubstitution {
            position: parse_nt_position(&captures["pos"], allow_extended, whole)?,
            reference: captures["ref"].chars().next().unwrap(),
            alternate: captures["alt"].chars().next().unwrap(),
        });
    }

    let captures = NT_RANGE_EVENT_RE.captures(body).ok_or_else(|| parse_error(whole))?;
    let start = parse_nt_position(&captures["start"], allow_extended, whole)?;
    let end = captures
        .name("end")
        .map(|m| parse_nt_position(m.as_str(), allow_extended, whole))
        .transpose()?;
    let sequence = captures["seq"].to_owned();

    // Plain ranges must be ordered.
    if let Some(end) = end {
        if start.is_plain() && end.is_plain() && start.anchor >= end.anchor {
            return Err(parse_error(whole));
        }
    }

    match &captures["kind"] {
        "del" | "dup" if !sequence.is_empty() => Err(parse_error(whole)),
        "del" => Ok(Event::NtDeletion { start, end }),
        "dup" => Ok(Event::NtDuplication { start, end }),
        "ins" => {
            let end = end.ok_or_else(|| parse_error(whole))?;
            if sequence.is_empty() {
                return Err(parse_error(whole));
            }
            // Insertions sit between adjacent positions.
            if start.is_plain() && end.is_plain() && end.anchor != start.anchor + 1 {
                return Err(parse_error(whole));
            }
            Ok(Event::NtInsertion {
                start,
                end,
                bases: sequence,
            })
        }
        "delins" => {
            if sequence.is_empty() {
                return Err(parse_error(whole));
            }
            Ok(Event::NtDelins {
                start,
                end,
                bases: sequence,
            })
        }
        _ => Err(parse_error(whole)),
    }
}

fn parse_pro_event(body: &str, whole: &str) -> Result<Event, MaveHgvsError> {
    if body == "=" {
        return Ok(Event::ProIdentical);
    }

    if let Some(captures) = PRO_SUB_RE.captures(body) {
        let position = ProPosition {
            residue: captures["ref"].to_owned(),
            number: captures["pos"].parse().map_err(|_| parse_error(whole))?,
        };
        if position.number == 0 {
            return Err(parse_error(whole));
        }
        return Ok(if &captures["alt"] == "=" {
            Event::ProSynonymous { position }
        } else {
            Event::ProSubstitution {
                position,
                alternate: captures["alt"].to_owned(),
            }
        });
    }

    let captures = PRO_RANGE_EVENT_RE.captures(body).ok_or_else(|| parse_error(whole))?;
    let start = ProPosition {
        residue: captures["ref1"].to_owned(),
        number: captures["pos1"].parse().map_err(|_| parse_error(whole))?,
    };
    let end = match (captures.name("ref2"), captures.name("pos2")) {
        (Some(residue), Some(number)) => Some(ProPosition {
            residue: residue.as_str().to_owned(),
            number: number.as_str().parse().map_err(|_| parse_error(whole))?,
        }),
        _ => None,
    };
    if start.number == 0 || end.as_ref().is_some_and(|e| e.number <= start.number) {
        return Err(parse_error(whole));
    }
    let residues: Vec<String> = AA_SPLIT_RE
        .find_iter(&captures["seq"])
        .map(|m| m.as_str().to_owned())
        .collect();

    match &captures["kind"] {
        "del" | "dup" | "fs" if !residues.is_empty() => Err(parse_error(whole)),
        "del" => Ok(Event::ProDeletion { start, end }),
        "dup" => Ok(Event::ProDuplication { start, end }),
        "fs" => {
            if end.is_some() {
                return Err(parse_error(whole));
            }
            Ok(Event::ProFrameshift { position: start })
        }
        "ins" => {
            let end = end.ok_or_else(|| parse_error(whole))?;
            if residues.is_empty() || end.number != start.number + 1 {
                return Err(parse_error(whole));
            }
            Ok(Event::ProInsertion {
                start,
                end,
                residues,
            })
        }
        "delins" => {
            if residues.is_empty() {
                return Err(parse_error(whole));
            }
            Ok(Event::ProDelins {
                start,
                end,
                residues,
            })
        }
        _ => Err(parse_error(whole)),
    }
}

impl HgvsVariant {
    /// Parse a MAVE-HGVS variant string.
    pub fn parse(text: &str) -> Result<Self, MaveHgvsError> {
        let (prefix, body) = text
            .split_once('.')
            .ok_or_else(|| parse_error(text))?;
        if prefix.len() != 1 {
            return Err(parse_error(text));
        }
        let prefix = prefix.chars().next().unwrap();
        if !NT_PREFIXES.contains(&prefix) && !PRO_PREFIXES.contains(&prefix) {
            return Err(parse_error(text));
        }

        // Intronic offsets and UTR anchors are only meaningful for
        // transcript-relative prefixes.
        let allow_extended = matches!(prefix, 'c' | 'n');

        let bodies: Vec<&str> = if body.starts_with('[') && body.ends_with(']') {
            let inner = &body[1..body.len() - 1];
            let parts: Vec<&str> = inner.split(';').collect();
            if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(parse_error(text));
            }
            parts
        } else {
            vec![body]
        };

        let events = bodies
            .into_iter()
            .map(|b| {
                if prefix == 'p' {
                    parse_pro_event(b, text)
                } else {
                    parse_nt_event(b, allow_extended, text)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { prefix, events })
    }

    /// Parse and additionally check consistency against a target sequence
    /// (nucleotide target for nucleotide prefixes, protein target for `p.`).
    pub fn parse_with_target(text: &str, target: &str) -> Result<Self, MaveHgvsError> {
        let variant = Self::parse(text)?;
        variant.check_target(text, target)?;
        Ok(variant)
    }

    /// Check that referenced bases/residues at plain positions match the
    /// target sequence. Positions the linear target cannot anchor (UTR,
    /// intronic offsets) are skipped.
    pub fn check_target(&self, text: &str, target: &str) -> Result<(), MaveHgvsError> {
        let mismatch = || MaveHgvsError::TargetMismatch(text.to_owned());
        for event in &self.events {
            match event {
                Event::NtSubstitution {
                    position,
                    reference,
                    ..
                } => {
                    if position.is_plain() {
                        let found = nt_at(target, position.anchor).ok_or_else(mismatch)?;
                        if found != *reference {
                            return Err(mismatch());
                        }
                    }
                }
                Event::NtDeletion { start, end }
                | Event::NtDuplication { start, end }
                | Event::NtDelins { start, end, .. } => {
                    check_nt_bounds(target, start, end.as_ref()).map_err(|_| mismatch())?;
                }
                Event::NtInsertion { start, end, .. } => {
                    check_nt_bounds(target, start, Some(end)).map_err(|_| mismatch())?;
                }
                Event::NtIdentical => {}
                Event::ProSubstitution { position, .. }
                | Event::ProSynonymous { position }
                | Event::ProFrameshift { position } => {
                    check_pro_position(target, position).map_err(|_| mismatch())?;
                }
                Event::ProDeletion { start, end }
                | Event::ProDuplication { start, end }
                | Event::ProDelins { start, end, .. } => {
                    check_pro_position(target, start).map_err(|_| mismatch())?;
                    if let Some(end) = end {
                        check_pro_position(target, end).map_err(|_| mismatch())?;
                    }
                }
                Event::ProInsertion { start, end, .. } => {
                    check_pro_position(target, start).map_err(|_| mismatch())?;
                    check_pro_position(target, end).map_err(|_| mismatch())?;
                }
                Event::ProIdentical => {}
            }
        }
        Ok(())
    }
}

/// The base at a 1-based plain position, if in bounds.
fn nt_at(target: &str, position: i64) -> Option<char> {
    if position < 1 {
        return None;
    }
    target.chars().nth((position - 1) as usize)
}

fn check_nt_bounds(
    target: &str,
    start: &NtPosition,
    end: Option<&NtPosition>,
) -> Result<(), ()> {
    for position in std::iter::once(start).chain(end) {
        if position.is_plain() && nt_at(target, position.anchor).is_none() {
            return Err(());
        }
    }
    Ok(())
}

/// Check that a protein position's stated residue matches the target protein.
fn check_pro_position(target_protein: &str, position: &ProPosition) -> Result<(), ()> {
    let found = target_protein
        .chars()
        .nth((position.number - 1) as usize)
        .ok_or(())?;
    let expected = one_letter_code(&position.residue).ok_or(())?;
    // Stop codons render as '*'; compare through the three-letter code to
    // keep Ter handling in one place.
    if found == expected || three_letter_code(found) == Some(position.residue.as_str()) {
        Ok(())
    } else {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("g.4A>G", 'g')]
    #[case("c.4A>G", 'c')]
    #[case("n.4A>G", 'n')]
    #[case("m.4A>G", 'm')]
    #[case("o.4A>G", 'o')]
    #[case("c.122-6T>A", 'c')]
    #[case("c.*33G>C", 'c')]
    #[case("c.-12C>T", 'c')]
    #[case("g.5_7del", 'g')]
    #[case("g.5del", 'g')]
    #[case("g.2_3dup", 'g')]
    #[case("g.2_3insAGC", 'g')]
    #[case("g.5_7delinsAC", 'g')]
    #[case("g.5delinsT", 'g')]
    #[case("c.=", 'c')]
    #[case("c.[1A>T;3G>C]", 'c')]
    #[case("p.Thr2Ala", 'p')]
    #[case("p.Thr2=", 'p')]
    #[case("p.=", 'p')]
    #[case("p.Thr2_Gly4del", 'p')]
    #[case("p.Thr2del", 'p')]
    #[case("p.Thr2_Gly3insAlaSer", 'p')]
    #[case("p.Thr2_Gly4delinsAla", 'p')]
    #[case("p.Thr2fs", 'p')]
    #[case("p.Met1Ter", 'p')]
    #[case("p.[Thr2Ala;Met1Val]", 'p')]
    fn parse_valid(#[case] text: &str, #[case] prefix: char) {
        let variant = HgvsVariant::parse(text).unwrap();
        assert_eq!(prefix, variant.prefix);
    }

    #[rstest::rstest]
    #[case("4A>G")]
    #[case("x.4A>G")]
    #[case("g.4A>U")]
    #[case("g.0A>G")]
    #[case("g.122-6T>A")] // offsets are transcript-only
    #[case("g.*33G>C")]
    #[case("g.7_5del")]
    #[case("g.2_4insAGC")] // insertion positions must be adjacent
    #[case("g.2_3ins")]
    #[case("g.5_7delins")]
    #[case("g.5_7delAAA")]
    #[case("c.[1A>T]")] // multi-variant needs two or more events
    #[case("p.T2A")]
    #[case("p.Thr2")]
    #[case("p.Thr0Ala")]
    #[case("p.Gly4_Thr2del")]
    #[case("p.Thr2_Gly4fs")]
    #[case("p.Thr2_Gly3ins")]
    #[case("")]
    fn parse_invalid(#[case] text: &str) {
        assert!(matches!(
            HgvsVariant::parse(text),
            Err(MaveHgvsError::Parse(_))
        ));
    }

    // Target DNA ATGACA translates to "MT".
    #[rstest::rstest]
    #[case("g.4A>G")]
    #[case("g.5C>G")]
    #[case("g.6A>G")]
    #[case("g.1_3del")]
    #[case("c.122-6T>A")] // offset positions are not anchored, so skipped
    fn nt_target_consistent(#[case] text: &str) {
        assert!(HgvsVariant::parse_with_target(text, "ATGACA").is_ok());
    }

    #[rstest::rstest]
    #[case("g.4C>G")] // base at 4 is A
    #[case("g.7A>G")] // out of bounds
    #[case("g.5_9del")]
    fn nt_target_mismatch(#[case] text: &str) {
        assert!(matches!(
            HgvsVariant::parse_with_target(text, "ATGACA"),
            Err(MaveHgvsError::TargetMismatch(_))
        ));
    }

    #[rstest::rstest]
    #[case("p.Thr2Ala")]
    #[case("p.Thr2=")]
    #[case("p.Met1Val")]
    fn pro_target_consistent(#[case] text: &str) {
        assert!(HgvsVariant::parse_with_target(text, "MT").is_ok());
    }

    #[rstest::rstest]
    #[case("p.Ala2Thr")] // residue 2 is Thr
    #[case("p.Thr3Ala")] // out of bounds
    fn pro_target_mismatch(#[case] text: &str) {
        assert!(matches!(
            HgvsVariant::parse_with_target(text, "MT"),
            Err(MaveHgvsError::TargetMismatch(_))
        ));
    }

    #[test]
    fn multi_variant_checks_every_event() {
        assert!(HgvsVariant::parse_with_target("c.[1A>T;3G>C]", "ATGACA").is_ok());
        assert!(HgvsVariant::parse_with_target("c.[1A>T;3C>G]", "ATGACA").is_err());
    }
}
