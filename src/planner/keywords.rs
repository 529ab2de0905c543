//! Keyword stage of the planner
//!
//! Each tool category owns a fixed lexicon. Matching is case-insensitive on
//! word tokens: short terms must equal a token, longer terms also match their
//! inflections (`risk` matches `risks`, `plot` matches `plotting`, but
//! `chart` does not match `charter`), multi-word terms match as a phrase.

use crate::models::ToolKind;

const RETRIEVAL_TERMS: &[&str] = &[
    "risk",
    "strategy",
    "strategic",
    "leadership",
    "leader",
    "ceo",
    "cfo",
    "management",
    "executive",
    "outlook",
    "priorities",
    "vision",
    "mission",
    "governance",
    "challenge",
    "competition",
    "competitor",
    "initiative",
    "culture",
    "opportunit",
    "sustainability",
];

const FINANCIAL_TERMS: &[&str] = &[
    "revenue",
    "income",
    "profit",
    "earnings",
    "sales",
    "margin",
    "growth",
    "grow",
    "trend",
    "financial",
    "cagr",
    "yoy",
    "year over year",
];

const CHART_TERMS: &[&str] = &[
    "chart",
    "graph",
    "plot",
    "visualize",
    "visualise",
    "visualization",
    "diagram",
];

/// Endings accepted after a lexicon term of four or more characters.
const INFLECTIONS: &[&str] = &[
    "", "s", "es", "d", "ed", "ted", "ing", "ting", "y", "ies", "ly", "al", "ally", "able",
    "ability",
];

fn lexicon(kind: ToolKind) -> &'static [&'static str] {
    match kind {
        ToolKind::Retrieval => RETRIEVAL_TERMS,
        ToolKind::Financial => FINANCIAL_TERMS,
        ToolKind::Chart => CHART_TERMS,
    }
}

/// Lower-cased alphanumeric tokens of `query`.
fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn term_matches(term: &str, tokens: &[String], phrase: &str) -> bool {
    if term.contains(' ') {
        return phrase.contains(&format!(" {} ", term));
    }
    if term.len() <= 3 {
        tokens.iter().any(|t| t == term)
    } else {
        tokens.iter().any(|t| {
            t.strip_prefix(term)
                .map_or(false, |rest| INFLECTIONS.contains(&rest))
        })
    }
}

/// Categories whose lexicon matches, in priority order.
pub fn matching_categories(query: &str) -> Vec<ToolKind> {
    let tokens = tokenize(query);
    let phrase = format!(" {} ", tokens.join(" "));

    ToolKind::PRIORITY
        .into_iter()
        .filter(|kind| {
            lexicon(*kind)
                .iter()
                .any(|term| term_matches(term, &tokens, &phrase))
        })
        .collect()
}

/// Resolve several matched categories to one.
///
/// Priority is Retrieval > Financial > Chart, except that Chart together
/// with Financial (and no Retrieval) asks for a plot of a financial series
/// and selects Chart.
pub fn resolve(matched: &[ToolKind]) -> Option<ToolKind> {
    let has = |kind: ToolKind| matched.contains(&kind);

    if has(ToolKind::Chart) && has(ToolKind::Financial) && !has(ToolKind::Retrieval) {
        return Some(ToolKind::Chart);
    }

    ToolKind::PRIORITY.into_iter().find(|kind| has(*kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_category_queries() {
        assert_eq!(
            matching_categories("What are the key risks in 2024?"),
            vec![ToolKind::Retrieval]
        );
        assert_eq!(
            matching_categories("How did revenue grow?"),
            vec![ToolKind::Financial]
        );
        assert_eq!(matching_categories("Plot it"), vec![ToolKind::Chart]);
        assert!(matching_categories("asdkj qwoeiu random text").is_empty());
    }

    #[test]
    fn test_short_terms_need_whole_token() {
        assert!(matching_categories("the ceo letter").contains(&ToolKind::Retrieval));
        assert!(matching_categories("ceos").is_empty());
        assert_eq!(
            matching_categories("Revenue year-over-year"),
            vec![ToolKind::Financial]
        );
    }

    #[test]
    fn test_inflections_match_but_unrelated_words_do_not() {
        assert_eq!(matching_categories("plotting the data"), vec![ToolKind::Chart]);
        assert_eq!(matching_categories("graphs please"), vec![ToolKind::Chart]);
        assert_eq!(
            matching_categories("new opportunities"),
            vec![ToolKind::Retrieval]
        );
        assert_eq!(
            matching_categories("profitability"),
            vec![ToolKind::Financial]
        );
        assert!(matching_categories("charter").is_empty());
        assert!(matching_categories("graphics card").is_empty());
    }

    #[test]
    fn test_priority_order() {
        let matched = matching_categories("How does leadership explain revenue growth?");
        assert_eq!(matched, vec![ToolKind::Retrieval, ToolKind::Financial]);
        assert_eq!(resolve(&matched), Some(ToolKind::Retrieval));

        let matched = matching_categories("Chart the strategy risks");
        assert_eq!(resolve(&matched), Some(ToolKind::Retrieval));
    }

    #[test]
    fn test_plot_of_financial_series_selects_chart() {
        let matched = matching_categories("Show revenue trend graph.");
        assert_eq!(matched, vec![ToolKind::Financial, ToolKind::Chart]);
        assert_eq!(resolve(&matched), Some(ToolKind::Chart));
    }

    #[test]
    fn test_no_match_resolves_to_none() {
        assert_eq!(resolve(&[]), None);
    }
}
