//! Citation markers
//!
//! Assistant text cites papers as markdown links with a `paper:<id>` target.
//! Before rendering, those links are rewritten into an inline code marker
//! `` `paper-ref:<id>|<label>` `` that the renderer turns into a paper
//! control instead of a navigating link.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use vejovis_common::db::PaperId;

/// Label used for bare `(paper:ID)` references
pub const DEFAULT_LABEL: &str = "View Paper";

const MARKER_PREFIX: &str = "paper-ref:";

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("citation pattern is valid"))
}

fn icon_link() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"\[📄\s*([^\]]*)\]\(paper:(\d+)\)")
}

fn text_link() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"\[([^\]]*)\]\(paper:(\d+)\)")
}

fn bare_reference() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"\(paper:(\d+)\)")
}

fn existing_marker() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"`paper-ref:[^`]*`")
}

fn inline_token() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"`([^`]*)`|\[([^\]]*)\]\(([^)\s]*)\)")
}

fn marker(id: &str, label: &str) -> String {
    let label: String = label.chars().filter(|c| *c != '|' && *c != '`').collect();
    let label = label.trim();
    let label = if label.is_empty() { DEFAULT_LABEL } else { label };
    format!("`{MARKER_PREFIX}{id}|{label}`")
}

/// Rewrite every paper citation into a marker.
///
/// Applied in order: icon links, other text links, then bare references.
/// Bare references inside a marker's label are left alone, so already
/// rewritten text passes through unchanged.
pub fn rewrite(text: &str) -> String {
    let text = icon_link().replace_all(text, |caps: &Captures| marker(&caps[2], &caps[1]));
    let text = text_link().replace_all(&text, |caps: &Captures| marker(&caps[2], &caps[1]));

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for existing in existing_marker().find_iter(&text) {
        out.push_str(&rewrite_bare(&text[last..existing.start()]));
        out.push_str(existing.as_str());
        last = existing.end();
    }
    out.push_str(&rewrite_bare(&text[last..]));
    out
}

fn rewrite_bare(text: &str) -> std::borrow::Cow<'_, str> {
    bare_reference().replace_all(text, |caps: &Captures| marker(&caps[1], DEFAULT_LABEL))
}

/// Inline piece of a rendered line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    PaperLink { id: PaperId, label: String },
    Code(String),
    Link { text: String, url: String },
}

fn parse_marker(code: &str) -> Option<(PaperId, String)> {
    let rest = code.strip_prefix(MARKER_PREFIX)?;
    let (id, label) = rest.split_once('|')?;
    Some((id.parse().ok()?, label.to_string()))
}

/// Split one line of rewritten text into inline segments
pub fn segments(line: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in inline_token().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            out.push(Segment::Text(line[last..whole.start()].to_string()));
        }

        let segment = if let Some(code) = caps.get(1) {
            match parse_marker(code.as_str()) {
                Some((id, label)) => Segment::PaperLink { id, label },
                None => Segment::Code(code.as_str().to_string()),
            }
        } else {
            Segment::Link {
                text: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                url: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            }
        };
        out.push(segment);
        last = whole.end();
    }

    if last < line.len() {
        out.push(Segment::Text(line[last..].to_string()));
    }
    out
}

/// Paper ids cited in the text, in order of first appearance
pub fn cited_papers(text: &str) -> Vec<PaperId> {
    let mut ids = Vec::new();
    for line in rewrite(text).lines() {
        for segment in segments(line) {
            if let Segment::PaperLink { id, .. } = segment {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

/// Plain-terminal rendering: paper controls become `[📄 label #id]`
pub fn render_terminal(text: &str) -> String {
    rewrite(text)
        .split('\n')
        .map(|line| {
            segments(line)
                .into_iter()
                .map(|segment| match segment {
                    Segment::Text(text) => text,
                    Segment::PaperLink { id, label } => format!("[📄 {label} #{id}]"),
                    Segment::Code(code) => format!("`{code}`"),
                    Segment::Link { text, url } => format!("{text} <{url}>"),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
