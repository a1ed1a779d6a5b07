use std::sync::LazyLock;

use regex::Regex;

use super::info_type::InfoType;

/// One pattern family contributing `weight` to `label` when it matches.
pub struct Rule {
    pub name: &'static str,
    pub pattern: Regex,
    pub label: InfoType,
    pub weight: f64,
}

const SEQUENCE: &str = r"\b(?:step|first|second|third|then|finally)\b|(?:^|\s)\d+[.)](?:\s|$)";
const CAUSAL: &str = r"\b(?:because|therefore|so that|enables|keeps|causes)\b";

// Primary families first, then the additive boosts. Adding a rule is a table edit.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |name, pattern: &str, label, weight| Rule {
        name,
        pattern: Regex::new(pattern).unwrap(),
        label,
        weight,
    };
    vec![
        // Copula needs an article so passives like "is settled" stay out.
        rule(
            "definition",
            r"\b(?:is|are)\s+(?:a|an|the)\b|\bdefined as\b|\brefers to\b|\bis a type of\b",
            InfoType::Definition,
            1.0,
        ),
        rule(
            "mechanism",
            &format!(r"{CAUSAL}|\b(?:settled|accrues|aligns?|funding|mark price)\b"),
            InfoType::Mechanism,
            1.0,
        ),
        rule("procedure", SEQUENCE, InfoType::Procedure, 1.0),
        rule(
            "comparison",
            r"\bvs\b|\bversus\b|\bcompared to\b|\bas opposed to\b|\beither\b.*\bor\b",
            InfoType::Comparison,
            1.0,
        ),
        rule(
            "example",
            r"\bfor example\b|\bfor instance\b|\be\.g\.|\ban investor\b|\bscenario\b|\btim\b",
            InfoType::Example,
            1.0,
        ),
        rule("numeric", r"\b\d+(?:[.,]\d+)?%?", InfoType::Mechanism, 0.2),
        rule("numeric", r"\b\d+(?:[.,]\d+)?%?", InfoType::Procedure, 0.2),
        rule("sequence", SEQUENCE, InfoType::Procedure, 0.4),
        rule("causal", CAUSAL, InfoType::Mechanism, 0.4),
    ]
});

/// Raw per-label scores in `InfoType::ALL` order plus the names of the rules that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleScores {
    pub scores: [f64; 5],
    pub hits: Vec<&'static str>,
}

/// Accumulate every matching rule's weight. `text` is expected lowercase.
pub fn score_rules(text: &str) -> RuleScores {
    let mut scores = [0.0; 5];
    let mut hits: Vec<&'static str> = Vec::new();
    for rule in RULES.iter().filter(|r| r.pattern.is_match(text)) {
        scores[rule.label.index()] += rule.weight;
        if !hits.contains(&rule.name) {
            hits.push(rule.name);
        }
    }
    RuleScores { scores, hits }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_of(text: &str, label: InfoType) -> f64 {
        score_rules(text).scores[label.index()]
    }

    #[test]
    fn definition_needs_article() {
        assert_eq!(score_of("a funding rate is a periodic payment.", InfoType::Definition), 1.0);
        assert_eq!(score_of("funding is settled twice daily.", InfoType::Definition), 0.0);
        assert_eq!(score_of("basis refers to the spread.", InfoType::Definition), 1.0);
    }

    #[test]
    fn boosts_stack_on_primary_score() {
        let r = score_rules("first, compute the mark price.");
        assert!((r.scores[InfoType::Procedure.index()] - 1.4).abs() < 1e-12);
        assert_eq!(r.scores[InfoType::Mechanism.index()], 1.0);
        assert_eq!(r.hits, vec!["mechanism", "procedure", "sequence"]);
    }

    #[test]
    fn numeric_boost_hits_mechanism_and_procedure() {
        let r = score_rules("payments happen 3 times a day.");
        assert!((r.scores[InfoType::Mechanism.index()] - 0.2).abs() < 1e-12);
        assert!((r.scores[InfoType::Procedure.index()] - 0.2).abs() < 1e-12);
        assert_eq!(r.hits, vec!["numeric"]);
    }

    #[test]
    fn causal_marker_counts_twice_for_mechanism() {
        let r = score_rules("prices converge because arbitrage keeps them close.");
        assert!((r.scores[InfoType::Mechanism.index()] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn numbered_list_marker_is_a_sequence() {
        assert!(score_of("2. close the position.", InfoType::Procedure) > 1.0);
        // Decimal literals are not list markers.
        assert!(score_of("the rate is 1.5 percent", InfoType::Procedure) < 1.0);
    }

    #[test]
    fn comparison_and_example_markers() {
        assert_eq!(score_of("perps vs futures", InfoType::Comparison), 1.0);
        assert_eq!(score_of("either pay or receive", InfoType::Comparison), 1.0);
        assert_eq!(score_of("e.g. a trader shorts", InfoType::Example), 1.0);
        assert_eq!(score_of("for instance, a hedge", InfoType::Example), 1.0);
    }

    #[test]
    fn no_signal_scores_zero() {
        let r = score_rules("a simple overview sentence.");
        assert_eq!(r.scores, [0.0; 5]);
        assert!(r.hits.is_empty());
    }
}
