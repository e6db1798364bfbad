//! Fuzzy string similarity on a 0–100 scale.
//!
//! [`ratio`] is the normalized indel similarity of two strings
//! (`2·LCS / (|a| + |b|)`), and [`partial_ratio`] is the best [`ratio`] of
//! the shorter string against every equally long window of the longer one.
//! Both work on Unicode scalar values so CJK titles score the same way ASCII
//! ones do.
//!
//! [`normalize`] case-folds and strips punctuation before matching; the
//! streaming search compares normalized query and message text.

use regex::Regex;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Lowercase and drop everything that is not a word character or whitespace.
pub fn normalize(text: &str) -> String {
    PUNCTUATION.replace_all(&text.to_lowercase(), "").into_owned()
}

/// Whole-string similarity, 0–100.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best similarity of the shorter string against any substring of the longer
/// one with the same length, 0–100.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if short.len() == long.len() {
        return ratio_chars(short, long);
    }

    let mut best = 0;
    for window in long.windows(short.len()) {
        let score = ratio_chars(short, window);
        if score > best {
            best = score;
            if best == 100 {
                break;
            }
        }
    }
    best
}

/// Inclusive threshold check used by the search engine.
pub fn meets_threshold(score: u8, min_similarity: u8) -> bool {
    score >= min_similarity
}

fn ratio_chars(a: &[char], b: &[char]) -> u8 {
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let matched = 2 * lcs_len(a, b);
    ((100.0 * matched as f64) / total as f64).round() as u8
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(ratio("movie x", "movie x"), 100);
        assert_eq!(partial_ratio("movie x", "movie x"), 100);
    }

    #[test]
    fn empty_strings_score_0() {
        assert_eq!(ratio("", "abc"), 0);
        assert_eq!(partial_ratio("abc", ""), 0);
    }

    #[test]
    fn partial_finds_substring() {
        assert_eq!(partial_ratio("movie x", "movie x 1080p httpspanexamplecnsabc123"), 100);
        // argument order does not matter
        assert_eq!(partial_ratio("movie x 1080p remux", "movie x"), 100);
    }

    #[test]
    fn ratio_counts_common_subsequence() {
        // lcs = 6 of 10 + 10
        assert_eq!(ratio("abcdefghij", "abcdefxyzw"), 60);
        // lcs = 10 of 17 + 17 -> 58.8
        assert_eq!(ratio("abcdefghijklmnopq", "abcdefghijzzzzzzz"), 59);
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Movie X: The Return!"), "movie x the return");
        assert_eq!(normalize("《流浪地球》"), "流浪地球");
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(meets_threshold(60, 60));
        assert!(!meets_threshold(59, 60));
    }

    #[test]
    fn cjk_partial_match() {
        assert_eq!(partial_ratio("流浪地球", "流浪地球2 4k 国语中字"), 100);
    }
}
