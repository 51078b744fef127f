/// A proposed command and its one-line explanation, extracted from a
/// code-generation response. The two fields are always populated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub command: String,
    pub explanation: String,
}

/// Extract a proposed command and explanation from raw response text.
///
/// Scans non-empty lines for case-insensitive `CMD:` and `EXPL:` prefixes.
/// Without an explicit `CMD:` line the first non-empty line is the command;
/// without an explicit `EXPL:` line the second non-empty line (if any) is
/// the explanation. Returns `None` when no usable line exists at all;
/// callers must then drop any previously pending proposal.
pub fn extract_proposal(text: &str) -> Option<Proposal> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut command = None;
    let mut explanation = None;
    for line in &lines {
        if command.is_none() {
            if let Some(rest) = strip_tag(line, "CMD:") {
                command = Some(rest);
                continue;
            }
        }
        if explanation.is_none() {
            if let Some(rest) = strip_tag(line, "EXPL:") {
                explanation = Some(rest);
            }
        }
    }

    let command = command.or_else(|| lines.first().map(|l| (*l).to_owned()))?;
    if command.is_empty() {
        return None;
    }
    let explanation = explanation
        .or_else(|| lines.get(1).map(|l| (*l).to_owned()))
        .unwrap_or_default();

    Some(Proposal {
        command,
        explanation,
    })
}

fn strip_tag(line: &str, tag: &str) -> Option<String> {
    if line.len() >= tag.len() && line[..tag.len()].eq_ignore_ascii_case(tag) {
        Some(line[tag.len()..].trim().to_owned())
    } else {
        None
    }
}
