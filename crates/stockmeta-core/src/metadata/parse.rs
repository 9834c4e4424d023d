//! Cleaning and parsing of raw model responses.
//!
//! All functions here are pure so the generator's degradation rules can be
//! tested without a provider.

use std::collections::HashSet;

const TITLE_LABELS: &[&str] = &["generated title:", "image title:", "title:"];
const DESCRIPTION_LABELS: &[&str] = &["generated description:", "image description:", "description:"];

/// Terms that mark a catch-all category, in priority order.
const GENERAL_CATEGORY_TERMS: &[&str] = &["other", "general", "miscellaneous", "abstract", "business"];

fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

fn strip_label<'a>(text: &'a str, labels: &[&str]) -> &'a str {
    for label in labels {
        if let Some(head) = text.get(..label.len()) {
            if head.eq_ignore_ascii_case(label) {
                return text[label.len()..].trim_start();
            }
        }
    }
    text
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Cut `text` to at most `max` characters.
///
/// Prefers the last sentence end that keeps at least half the limit, then the
/// last word boundary, then a hard cut.
pub fn trim_to_limit(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();

    let sentence_end = cut
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .filter(|&end| cut[..end].chars().count() >= max / 2);
    if let Some(end) = sentence_end {
        return cut[..end].trim_end().to_string();
    }

    if text.chars().nth(max).is_some_and(char::is_whitespace) {
        return cut.trim_end().to_string();
    }
    if let Some(space) = cut.rfind(char::is_whitespace) {
        let head = cut[..space].trim_end_matches(|c: char| c.is_whitespace() || c == ',');
        if !head.is_empty() {
            return head.to_string();
        }
    }
    cut
}

/// Strip labels and quotes, capitalize, and cut to `max` characters.
pub fn clean_title(raw: &str, max: usize) -> String {
    let text = strip_quotes(raw);
    let text = strip_quotes(strip_label(text, TITLE_LABELS));
    trim_to_limit(&capitalize_first(text), max)
}

/// Same cleaning as titles, with description labels.
pub fn clean_description(raw: &str, max: usize) -> String {
    let text = strip_quotes(raw);
    let text = strip_quotes(strip_label(text, DESCRIPTION_LABELS));
    trim_to_limit(&capitalize_first(text), max)
}

fn word_set(keyword: &str) -> HashSet<&str> {
    keyword.split_whitespace().collect()
}

/// Whether `candidate` repeats something an earlier keyword already covers.
fn is_near_duplicate(candidate: &str, earlier: &str) -> bool {
    if candidate == earlier || earlier.contains(candidate) || candidate.contains(earlier) {
        return true;
    }
    let earlier_words = word_set(earlier);
    earlier_words.len() > 1 && word_set(candidate).is_subset(&earlier_words)
}

/// Split a comma (or newline) separated response into keywords.
///
/// `leading` keywords are placed first. Earlier keywords win: a later one is
/// dropped when it equals, contains, or is contained in an earlier one
/// (case-insensitive), or when all its words appear in an earlier multi-word
/// keyword. The result is capped at `max`.
pub fn parse_keywords(raw: &str, leading: &[&str], max: usize) -> Vec<String> {
    let candidates = leading.iter().copied().chain(
        raw.split([',', '\n', ';'])
            .map(|k| strip_quotes(k).trim_start_matches(['-', '*', '•']).trim()),
    );

    let mut kept: Vec<String> = Vec::new();
    let mut kept_lower: Vec<String> = Vec::new();
    for keyword in candidates {
        if kept.len() == max {
            break;
        }
        if keyword.is_empty() {
            continue;
        }
        let lower = keyword.to_lowercase();
        if kept_lower.iter().any(|earlier| is_near_duplicate(&lower, earlier)) {
            continue;
        }
        kept.push(keyword.to_string());
        kept_lower.push(lower);
    }
    kept
}

fn match_category<'a>(answer: &str, available: &'a [String]) -> Option<&'a String> {
    let answer = answer.to_lowercase();
    available
        .iter()
        .find(|c| c.to_lowercase() == answer)
        .or_else(|| {
            available.iter().find(|c| {
                let c = c.to_lowercase();
                c.starts_with(&answer) || c.contains(&answer) || answer.contains(&c)
            })
        })
}

/// Match a category response against a bank's list, capped at `max`.
///
/// Exact case-insensitive matches win over prefix or substring matches.
/// Returns an empty list when nothing matched.
pub fn parse_categories(raw: &str, available: &[String], max: usize) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    for answer in raw.split([',', '\n']).map(strip_quotes) {
        if selected.len() == max {
            break;
        }
        if answer.is_empty() {
            continue;
        }
        if let Some(category) = match_category(answer, available) {
            if !selected.contains(category) {
                selected.push(category.clone());
            }
        }
    }
    selected
}

/// The bank's catch-all category, or its first category.
pub fn fallback_category(available: &[String]) -> Option<String> {
    GENERAL_CATEGORY_TERMS
        .iter()
        .find_map(|term| available.iter().find(|c| c.to_lowercase().contains(term)))
        .or_else(|| available.first())
        .cloned()
}

/// Affirmative answers only; anything unclear is `false`.
pub fn parse_editorial(raw: &str) -> bool {
    let answer = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '!')
        .to_uppercase();
    answer.starts_with("YES") || answer == "TRUE" || answer == "Y"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_title_strips_label_and_quotes() {
        assert_eq!(clean_title("Title: Calm lake at sunrise", 100), "Calm lake at sunrise");
        assert_eq!(clean_title("\"generated title: misty forest\"", 100), "Misty forest");
        assert_eq!(clean_title("IMAGE TITLE: 'Old harbour'", 100), "Old harbour");
    }

    #[test]
    fn test_trim_prefers_sentence_then_word() {
        let text = "Calm lake at dawn. Mist rising over the still water surface";
        assert_eq!(trim_to_limit(text, 30), "Calm lake at dawn.");
        assert_eq!(trim_to_limit("Calm lake at dawn with mist", 20), "Calm lake at dawn");
        assert_eq!(trim_to_limit("Supercalifragilistic", 5), "Super");
        assert_eq!(trim_to_limit("short", 50), "short");
    }

    #[test]
    fn test_trim_ignores_early_sentence_end() {
        // "A." would throw away most of the budget.
        assert_eq!(trim_to_limit("A. calm lake at dawn with mist", 20), "A. calm lake at dawn");
    }

    #[test]
    fn test_trim_counts_characters() {
        assert_eq!(trim_to_limit("Příliš žluťoučký kůň", 6), "Příliš");
    }

    #[test]
    fn test_clean_description_label() {
        assert_eq!(
            clean_description("Description: a calm lake at sunrise.", 200),
            "A calm lake at sunrise."
        );
    }

    #[test]
    fn test_parse_keywords_basic() {
        assert_eq!(
            parse_keywords("lake, sunrise, reflection", &[], 50),
            vec!["lake", "sunrise", "reflection"]
        );
    }

    #[test]
    fn test_parse_keywords_near_duplicates() {
        let out = parse_keywords(
            "blue lake house, Lake, house blue, LAKE, water, blue water, water lily",
            &[],
            50,
        );
        assert_eq!(out, vec!["blue lake house", "water"]);
    }

    #[test]
    fn test_parse_keywords_earlier_short_word_suppresses_compound() {
        assert_eq!(parse_keywords("lake, blue lake house", &[], 10), vec!["lake"]);
    }

    #[test]
    fn test_parse_keywords_leading_and_cap() {
        let out = parse_keywords("editorial, parade, crowd, street, flags", &["Editorial"], 3);
        assert_eq!(out, vec!["Editorial", "parade", "crowd"]);
    }

    #[test]
    fn test_parse_keywords_no_substrings_in_result() {
        let out = parse_keywords("sun, sunset, sunny day, beach, beach sand, sand, Sun", &[], 50);
        for (i, a) in out.iter().enumerate() {
            for (j, b) in out.iter().enumerate() {
                if i != j {
                    assert!(!b.to_lowercase().contains(&a.to_lowercase()), "{a} in {b}");
                }
            }
        }
        assert_eq!(out, vec!["sun", "beach", "sand"]);
    }

    #[test]
    fn test_parse_keywords_drops_empty_and_bullets() {
        assert_eq!(parse_keywords(" , \"fog\",\n- mist ,, ", &[], 10), vec!["fog", "mist"]);
    }

    #[test]
    fn test_parse_categories_exact_then_partial() {
        let available = cats(&["Nature", "Abstract", "Other"]);
        assert_eq!(parse_categories("Nature, Abstract", &available, 2), vec!["Nature", "Abstract"]);
        assert_eq!(parse_categories("nature, abstract", &available, 1), vec!["Nature"]);

        let available = cats(&["Animals/Wildlife", "Buildings/Landmarks"]);
        assert_eq!(parse_categories("Animals", &available, 2), vec!["Animals/Wildlife"]);
        assert!(parse_categories("Food", &available, 2).is_empty());
    }

    #[test]
    fn test_parse_categories_never_exceeds_cap() {
        let available = cats(&["A1", "B1", "C1", "D1"]);
        for cap in 0..4 {
            assert!(parse_categories("A1, B1, C1, D1", &available, cap).len() <= cap);
        }
    }

    #[test]
    fn test_fallback_category_prefers_general_terms() {
        assert_eq!(
            fallback_category(&cats(&["Nature", "Business/Finance", "Miscellaneous"])),
            Some("Miscellaneous".to_string())
        );
        assert_eq!(fallback_category(&cats(&["Nature", "People"])), Some("Nature".to_string()));
        assert_eq!(fallback_category(&[]), None);
    }

    #[test]
    fn test_parse_editorial() {
        assert!(parse_editorial("YES"));
        assert!(parse_editorial("yes, this shows a news event"));
        assert!(parse_editorial("True"));
        assert!(parse_editorial("y."));
        assert!(!parse_editorial("NO"));
        assert!(!parse_editorial("maybe"));
        assert!(!parse_editorial(""));
    }
}
