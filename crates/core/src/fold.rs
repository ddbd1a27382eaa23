//! Case folding shared by write-time indexing and query-time matching.
//!
//! Folding is ASCII-lowercase plus simple Unicode case folding (`str::to_lowercase`,
//! which is locale-independent simple lowercase mapping — not full NFKC
//! normalization). Queries are folded identically so substring comparisons
//! are meaningful. See spec §9: full Unicode normalization is explicitly out
//! of scope.

/// Fold a string for indexing or query comparison.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// Non-overlapping-safe sliding window of `n` **characters** (not bytes) over
/// a folded string. Used for the bigram posting list (`n == 2`).
pub fn char_windows(s: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }
    (0..=chars.len() - n).map(|i| chars[i..i + n].iter().collect()).collect()
}

/// Number of folded characters in `s` — used to pick the search plan tier.
pub fn folded_len(s: &str) -> usize {
    fold(s).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_lowercases_ascii_and_unicode() {
        assert_eq!(fold("Alpha.TXT"), "alpha.txt");
        assert_eq!(fold("ÉCOLE"), "école");
    }

    #[test]
    fn char_windows_counts_characters_not_bytes() {
        // "申" is one char but three UTF-8 bytes; windows must be char-based.
        let windows = char_windows("申告書", 2);
        assert_eq!(windows, vec!["申告".to_string(), "告書".to_string()]);
    }

    #[test]
    fn char_windows_too_short_is_empty() {
        assert!(char_windows("a", 2).is_empty());
        assert!(char_windows("", 2).is_empty());
    }

    #[test]
    fn folded_len_counts_folded_chars() {
        assert_eq!(folded_len("AB"), 2);
        assert_eq!(folded_len("申"), 1);
    }
}
