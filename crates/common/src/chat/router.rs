//! Keyword intent router
//!
//! Rules are evaluated independently and in order against the lower-cased
//! message; every rule that matches contributes its tool call. The search
//! fallback is evaluated separately afterwards: it runs when no rule matched
//! or when the message carries an explicit search verb.

use super::tools::{SearchArgs, ToolCall};
use regex_lite::Regex;
use std::sync::OnceLock;

const DEFAULT_TREND_TOPIC: &str = "DNA";
const FALLBACK_PAPER_LIMIT: usize = 5;
const FALLBACK_CONTENT_LIMIT: usize = 3;

const SEARCH_VERBS: &[&str] = &["search", "find", "papers about", "research on"];

/// A tool call chosen by the router, with an optional heading placed above
/// its output in the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedCall {
    pub call: ToolCall,
    pub heading: Option<&'static str>,
}

impl RoutedCall {
    fn plain(call: ToolCall) -> Self {
        Self { call, heading: None }
    }

    /// Output text as it should appear in the context
    pub fn render(&self, output: String) -> String {
        match self.heading {
            Some(heading) => format!("{}\n{}", heading, output),
            None => output,
        }
    }
}

struct Rule {
    keywords: &'static [&'static str],
    build: fn(&str) -> ToolCall,
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["overview", "database", "how many papers"],
        build: |_| ToolCall::DatabaseStats,
    },
    Rule {
        keywords: &["topic", "research area", "what are"],
        build: |_| ToolCall::ListTopics { limit: 10 },
    },
    Rule {
        keywords: &["trend", "evolve", "over time", "over the years"],
        build: |lowered| ToolCall::AnalyzeTrends { topic: trend_topic(lowered) },
    },
    Rule {
        keywords: &["gap", "understudied", "missing", "unexplored"],
        build: |_| ToolCall::FindGaps,
    },
    Rule {
        keywords: &["connection", "connect", "link", "hidden"],
        build: |_| ToolCall::FindConnections,
    },
    Rule {
        keywords: &["surprise", "insight", "interesting", "random", "explore"],
        build: |_| ToolCall::RandomExplore { count: 5 },
    },
];

fn trend_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:trend|evolution|evolve|research)\s+(?:for|of|on|in)?\s*(\w+)")
            .expect("trend pattern is valid")
    })
}

/// Topic word following "trend/evolution/research [for|of|on|in]"
fn trend_topic(lowered: &str) -> String {
    trend_pattern()
        .captures(lowered)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| DEFAULT_TREND_TOPIC.to_string(), |m| m.as_str().to_string())
}

fn fallback(message: &str) -> [RoutedCall; 2] {
    [
        RoutedCall {
            call: ToolCall::SearchPapers(SearchArgs {
                query: Some(message.to_string()),
                limit: Some(FALLBACK_PAPER_LIMIT),
            }),
            heading: Some("SEMANTIC SEARCH RESULTS:"),
        },
        RoutedCall {
            call: ToolCall::SearchContent(SearchArgs {
                query: Some(message.to_string()),
                limit: Some(FALLBACK_CONTENT_LIMIT),
            }),
            heading: Some("FULL TEXT SEARCH:"),
        },
    ]
}

/// Choose the tool calls for a user message, in execution order.
///
/// Never empty: a message that matches no rule gets the search fallback.
pub fn route(message: &str) -> Vec<RoutedCall> {
    let lowered = message.to_lowercase();

    let mut calls: Vec<RoutedCall> = RULES
        .iter()
        .filter(|rule| rule.matches(&lowered))
        .map(|rule| RoutedCall::plain((rule.build)(&lowered)))
        .collect();

    let wants_search = SEARCH_VERBS.iter().any(|verb| lowered.contains(verb));
    if calls.is_empty() || wants_search {
        calls.extend(fallback(message));
    }

    calls
}
