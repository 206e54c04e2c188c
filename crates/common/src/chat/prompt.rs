//! System prompt construction

use crate::db::CorpusSize;

const RESPONSE_RULES: &str = r#"## RESPONSE RULES - BE CONCISE!

1. **Keep it short** - Max 3-5 bullet points per insight
2. **Cross-paper connections**: When asked for "connections" or "insights", COMPARE different papers:
   - "Paper A (2005) studied X, while Paper B (2018) found Y. Together this suggests Z."
3. **Use bullet points** - Not long paragraphs
4. **Cite papers** - Include [📄 Title](paper:ID) links when available, copying the ID from the data
5. **No filler** - Skip "let me explain" or "here's what I found"

## FORMAT EXAMPLES:

Good insight (CONCISE):
- **Paper A** found X connects to **Paper B**'s finding on Y
- This suggests a potential link between [mechanism] and [outcome]

Bad (TOO VERBOSE):
"Based on my analysis of the database, I have discovered several interesting connections. Let me walk you through them in detail..."

## WHEN ASKED "SURPRISE ME" or "INSIGHTS":
- Pick 2-3 papers from the random sample
- Find ONE unexpected connection between them
- State it in 2-3 sentences MAX

## WHEN DATA IS MISSING:
Say: "No papers on [topic] in this database." Stop there."#;

/// The single leading system message for a chat turn
pub fn system_prompt(corpus: CorpusSize, context: &str) -> String {
    format!(
        "You are a Research Oracle for {} scientific papers ({} text segments).\n\n\
         ## DATA PROVIDED:\n{}\n\n{}",
        corpus.papers, corpus.chunks, context, RESPONSE_RULES
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_counts_and_context() {
        let prompt = system_prompt(CorpusSize { papers: 608, chunks: 12000 }, "CONTEXT BLOCK");
        assert!(prompt.starts_with("You are a Research Oracle for 608 scientific papers (12000 text segments).\n\n"));
        assert!(prompt.contains("## DATA PROVIDED:\nCONTEXT BLOCK\n\n## RESPONSE RULES - BE CONCISE!"));
    }

    #[test]
    fn test_carries_citation_scheme_and_refusal() {
        let prompt = system_prompt(CorpusSize::default(), "");
        assert!(prompt.contains("(paper:ID)"));
        assert!(prompt.ends_with("Say: \"No papers on [topic] in this database.\" Stop there."));
    }
}
