//! Token estimation and multi-memory budget packing (§4.8).

/// Separator placed between packed memory strings. 6 characters, ~2 tokens.
const SEPARATOR: &str = "\n---\n";

/// Calibrated heuristic token estimate:
/// `ceil(1.1 * max(1.25 * words, chars / 3.5))`.
///
/// The 10% safety margin biases toward overestimating rather than
/// underestimating, which is the side that keeps `FormatMemoriesWithBudget`
/// from exceeding its caller's real budget (§9 open question (c): this
/// calibration targets a GPT-style BPE tokenizer family).
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count() as f32;
    let chars = text.chars().count() as f32;

    let estimate = 1.1 * (1.25 * words).max(chars / 3.5);
    estimate.ceil() as usize
}

/// Packs memory strings in order within `budget`, separated by
/// `"\n---\n"`. A memory is included only if
/// `used_tokens + estimate(memory) + 2 <= budget`; the first memory that
/// would exceed the budget, and everything after it, is skipped — no
/// reordering, no partial inclusion (§4.8). `budget <= 0` or empty input
/// returns `("", 0)`.
pub fn format_memories_with_budget(memories: &[String], budget: i64) -> (String, usize) {
    if budget <= 0 || memories.is_empty() {
        return (String::new(), 0);
    }

    let mut used_tokens: usize = 0;
    let mut included: Vec<&str> = Vec::new();

    for memory in memories {
        let cost = estimate_tokens(memory);
        if used_tokens + cost + 2 > budget as usize {
            break;
        }
        used_tokens += cost + 2;
        included.push(memory.as_str());
    }

    (included.join(SEPARATOR), included.len())
}
