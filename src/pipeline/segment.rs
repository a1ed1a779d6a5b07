use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

// Sentence-terminal punctuation followed by inline whitespace (any Unicode space
// except line breaks), or a line break (`\r\n`, `\n` or a bare `\r`).
// Bullet lines always start after a line break, so they never merge upward.
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?])[^\S\r\n]+|[^\S\r\n]*(?:\r\n?|\n)").unwrap());
// `-` needs trailing space so negative numbers survive; `•` and `–` never start a word.
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[•–]\s*|-(?:\s+|$))+").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Abbreviations whose trailing period does not end a sentence.
const NO_BREAK_SUFFIXES: &[&str] = &["e.g", "i.e", "vs"];

/// Split raw text into normalized, exact-deduplicated units (first occurrence wins).
pub fn segment(raw: &str) -> Vec<String> {
    let pieces = split_units(raw);
    let units = dedupe_exact(pieces.iter().map(|p| normalize(p)));
    debug!(pieces = pieces.len(), units = units.len(), "segmented");
    units
}

/// One pass over the raw text producing un-normalized candidate pieces.
fn split_units(raw: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in BREAK_RE.captures_iter(raw) {
        let Some(m) = caps.get(0) else { continue };
        let end = match caps.get(1) {
            Some(punct) => {
                if !is_sentence_end(&raw[last..punct.start()]) {
                    continue;
                }
                punct.end()
            }
            None => m.start(),
        };
        pieces.push(&raw[last..end]);
        last = m.end();
    }
    pieces.push(&raw[last..]);
    pieces
}

/// A period after a bare list number ("1.") or a known abbreviation keeps the piece open.
fn is_sentence_end(piece: &str) -> bool {
    let piece = normalize(piece);
    if !piece.is_empty() && piece.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    !NO_BREAK_SUFFIXES
        .iter()
        .any(|s| piece == *s || piece.ends_with(&format!(" {}", s)))
}

/// Lowercase, collapse whitespace, strip leading bullet markers.
pub fn normalize(piece: &str) -> String {
    let lowered = piece.trim().to_lowercase();
    let collapsed = WS_RE.replace_all(&lowered, " ");
    BULLET_RE.replace(&collapsed, "").trim().to_string()
}

fn dedupe_exact(units: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    units
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert!(segment("").is_empty());
        assert!(segment("  \n\t \n ").is_empty());
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let units = segment("First, compute the mark price. Then, apply the funding.");
        assert_eq!(units, vec!["first, compute the mark price.", "then, apply the funding."]);
    }

    #[test]
    fn exact_dedupe_after_normalization() {
        let units = segment("Hello world. Hello world. HELLO   world. Another line.");
        assert_eq!(units, vec!["hello world.", "another line."]);
    }

    #[test]
    fn bullets_never_merge_into_previous_sentence() {
        let text = "Funding has two legs\n- longs pay shorts\n• shorts pay longs\n– nobody pays";
        let units = segment(text);
        assert_eq!(
            units,
            vec!["funding has two legs", "longs pay shorts", "shorts pay longs", "nobody pays"]
        );
    }

    #[test]
    fn glued_bullets_are_stripped() {
        assert_eq!(segment("Intro\n•first\n–second"), vec!["intro", "first", "second"]);
        assert_eq!(segment("•\u{a0}third"), vec!["third"]);
    }

    #[test]
    fn any_inline_space_after_punctuation_splits() {
        let units = segment("Funding is paid hourly.\u{a0}Longs pay shorts.\u{2003}Shorts receive it.");
        assert_eq!(
            units,
            vec!["funding is paid hourly.", "longs pay shorts.", "shorts receive it."]
        );
    }

    #[test]
    fn bare_carriage_return_is_a_line_break() {
        assert_eq!(segment("Line one.\rLine two"), vec!["line one.", "line two"]);
        assert_eq!(segment("a\r\nb\rc\nd"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn negative_numbers_keep_their_sign() {
        assert_eq!(segment("-5% is a loss"), vec!["-5% is a loss"]);
    }

    #[test]
    fn numbered_list_marker_is_not_a_sentence() {
        let units = segment("1. Open the position.\n2. Close it!");
        assert_eq!(units, vec!["1. open the position.", "2. close it!"]);
    }

    #[test]
    fn abbreviations_do_not_split() {
        let units = segment("Some venues differ, e.g. binance pays hourly. Others do not.");
        assert_eq!(
            units,
            vec!["some venues differ, e.g. binance pays hourly.", "others do not."]
        );
    }

    #[test]
    fn units_are_unique() {
        let text = std::fs::read_to_string("tests/fixtures/funding_rates.md").unwrap();
        let units = segment(&text);
        let unique: HashSet<_> = units.iter().collect();
        assert_eq!(unique.len(), units.len());
        assert!(units.iter().all(|u| u == u.trim() && !u.contains("  ")));
    }

    #[test]
    fn segmentation_is_idempotent() {
        let text = std::fs::read_to_string("tests/fixtures/funding_rates.md").unwrap();
        let once = segment(&text);
        let twice = segment(&once.join("\n"));
        assert_eq!(once, twice);
    }

    #[test]
    fn unusual_whitespace_is_idempotent() {
        let inputs = [
            "Funding is paid hourly.\u{a0}Longs pay shorts.",
            "Line one.\rLine two.",
            "Rates move.\u{b}Prices follow.\u{c}Traders adjust.",
            "Intro\n•first\n–second\n-  third",
            "A gap.\u{2028}Then more\u{a0}\u{a0}text.",
        ];
        for raw in inputs {
            let once = segment(raw);
            assert_eq!(segment(&once.join("\n")), once, "{:?}", raw);
        }
    }
}
