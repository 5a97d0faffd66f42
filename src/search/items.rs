use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Minimum similarity for a name to count as a close match.
const CLOSE_MATCH_CUTOFF: f64 = 0.6;

/// Item names from the local CS2 item database (a JSON object keyed by name).
///
/// A missing file is not an error: name lookup just falls back to whatever the
/// user typed.
pub fn load_item_names(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::debug!("No item database at {}", path.display());
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read item database: {}", path.display()))?;
    let data: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid item database: {}", path.display()))?;

    let names: Vec<String> = match data {
        Value::Object(map) => map.into_iter().map(|(k, _)| k).collect(),
        _ => anyhow::bail!("Item database {} is not a JSON object", path.display()),
    };
    Ok(names)
}

/// Names containing every whitespace-separated token of `query`.
/// Falls back to edit-distance close matches when nothing contains them all.
pub fn fuzzy_search(query: &str, names: &[String], limit: usize) -> Vec<String> {
    let lowered = query.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let contained: Vec<String> = names
        .iter()
        .filter(|n| {
            let name = n.to_lowercase();
            tokens.iter().all(|t| name.contains(t))
        })
        .take(limit)
        .cloned()
        .collect();
    if !contained.is_empty() {
        return contained;
    }

    let mut scored: Vec<(f64, &String)> = names
        .iter()
        .map(|n| (similarity(&lowered, &n.to_lowercase()), n))
        .filter(|(score, _)| *score >= CLOSE_MATCH_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, n)| n.clone()).collect()
}

/// 1.0 for identical strings, 0.0 for nothing in common.
fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn names() -> Vec<String> {
        [
            "AK-47 | Redline (Field-Tested)",
            "AK-47 | Redline (Minimal Wear)",
            "AWP | Asiimov (Field-Tested)",
            "Glock-18 | Fade (Factory New)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_token_match_is_case_insensitive() {
        let found = fuzzy_search("ak redline", &names(), 5);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|n| n.starts_with("AK-47")));
    }

    #[test]
    fn test_limit_applies() {
        assert_eq!(fuzzy_search("ak", &names(), 1).len(), 1);
    }

    #[test]
    fn test_close_match_fallback() {
        let found = fuzzy_search("Glock-18 | Fdae (Factory New)", &names(), 5);
        assert_eq!(found, vec!["Glock-18 | Fade (Factory New)".to_string()]);
    }

    #[test]
    fn test_blank_query_finds_nothing() {
        assert!(fuzzy_search("   ", &names(), 5).is_empty());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("starbucks", "starbuck"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_load_item_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"AWP | Asiimov (Field-Tested)": {{}}, "Operation Breakout Weapon Case": 1}}"#).unwrap();

        let names = load_item_names(file.path()).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Operation Breakout Weapon Case".to_string()));

        let missing = load_item_names(Path::new("/nonexistent/cs2_items.json")).unwrap();
        assert!(missing.is_empty());
    }
}
