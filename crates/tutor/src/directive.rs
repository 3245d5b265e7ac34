//! Directives embedded in model output: `[CALCULATION: ...]` and `[SOLVE: ...]`.

use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Calculation,
    Solve,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 2] = [DirectiveKind::Calculation, DirectiveKind::Solve];

    fn opener(self) -> &'static str {
        match self {
            Self::Calculation => "[CALCULATION: ",
            Self::Solve => "[SOLVE: ",
        }
    }
}

/// One directive found in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Text between the opener and the first `]`.
    pub expression: String,
    /// Byte range of the whole `[...]` in the source text.
    pub span: Range<usize>,
}

/// All directives in `text`, ordered by position.
///
/// Each kind is searched on its own, so a directive may sit inside the
/// span of a directive of the other kind. The expression runs to the first
/// `]` and may not cross a line break; an opener with no `]` on its line
/// is ordinary text.
pub fn parse_directives(text: &str) -> Vec<Directive> {
    let mut found: Vec<Directive> = DirectiveKind::ALL
        .into_iter()
        .flat_map(|kind| scan(text, kind))
        .collect();
    found.sort_by_key(|d| d.span.start);
    found
}

fn scan(text: &str, kind: DirectiveKind) -> Vec<Directive> {
    let opener = kind.opener();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(opener) {
        let start = pos + offset;
        let body = &text[start + opener.len()..];
        match body.find([']', '\n', '\r']) {
            Some(end) if body[end..].starts_with(']') => {
                let len = opener.len() + end + 1;
                found.push(Directive {
                    kind,
                    expression: body[..end].to_string(),
                    span: start..start + len,
                });
                pos = start + len;
            }
            // '[' is one byte, so this stays on a char boundary
            _ => pos = start + 1,
        }
    }
    found
}

/// Which of the parsed directives get substituted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectivePolicy {
    /// The first CALCULATION if there is one, otherwise the first SOLVE.
    /// A SOLVE next to a CALCULATION is left verbatim.
    #[default]
    CalculationFirst,
    /// The first directive of each kind.
    FirstOfEach,
}

impl DirectivePolicy {
    /// The directives to act on, in order of appearance. When two chosen
    /// spans overlap only the earlier one is kept.
    pub fn select<'a>(&self, directives: &'a [Directive]) -> Vec<&'a Directive> {
        let first = |kind: DirectiveKind| directives.iter().find(|d| d.kind == kind);
        let mut chosen: Vec<&Directive> = match self {
            Self::CalculationFirst => first(DirectiveKind::Calculation)
                .or_else(|| first(DirectiveKind::Solve))
                .into_iter()
                .collect(),
            Self::FirstOfEach => DirectiveKind::ALL.into_iter().filter_map(first).collect(),
        };
        chosen.sort_by_key(|d| d.span.start);

        let mut kept: Vec<&Directive> = Vec::with_capacity(chosen.len());
        for directive in chosen {
            if kept.last().is_none_or(|prev| prev.span.end <= directive.span.start) {
                kept.push(directive);
            }
        }
        kept
    }
}

impl FromStr for DirectivePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calculation_first" => Ok(Self::CalculationFirst),
            "first_of_each" => Ok(Self::FirstOfEach),
            other => Err(format!("unknown directive policy '{other}'")),
        }
    }
}
