//! Grounding context assembly

/// Join tool outputs in invocation order, each followed by a blank line.
///
/// Outputs are passed through whole: no deduplication or truncation.
pub fn assemble(outputs: &[String]) -> String {
    let mut context = String::with_capacity(outputs.iter().map(|o| o.len() + 2).sum());
    for output in outputs {
        context.push_str(output);
        context.push_str("\n\n");
    }
    context
}
