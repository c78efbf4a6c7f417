//! Edit distance used to suggest corrections for mistyped plugin names

/// Case-insensitive Levenshtein distance
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().flat_map(char::to_lowercase).collect();
    let s2_chars: Vec<char> = s2.chars().flat_map(char::to_lowercase).collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    // Two rows instead of the full matrix
    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row: Vec<usize> = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        for j in 1..=len2 {
            let cost = usize::from(s1_chars[i - 1] != s2_chars[j - 1]);

            curr_row[j] = std::cmp::min(
                std::cmp::min(
                    prev_row[j] + 1,     // deletion
                    curr_row[j - 1] + 1, // insertion
                ),
                prev_row[j - 1] + cost, // substitution
            );
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

/// Closest candidate within `max_distance`
///
/// Ties keep the first candidate seen, so callers iterating a sorted
/// collection get a deterministic answer.
pub fn nearest<'a, I>(word: &str, candidates: I, max_distance: usize) -> Option<(&'a str, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let word_len = word.chars().count();
    let mut best: Option<(&'a str, usize)> = None;

    for candidate in candidates {
        // Length difference is a lower bound on the distance
        let len_diff = word_len.abs_diff(candidate.chars().count());
        if len_diff > max_distance {
            continue;
        }

        let distance = levenshtein(word, candidate);
        if distance > max_distance {
            continue;
        }

        match best {
            Some((_, best_dist)) if distance >= best_dist => {}
            _ => best = Some((candidate, distance)),
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("pslist", "pslist"), 0);
        assert_eq!(levenshtein("windows.pzlist", "windows.pslist"), 1);
        assert_eq!(levenshtein("malfnd", "malfind"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_levenshtein_ignores_case() {
        assert_eq!(levenshtein("Windows.PsList", "windows.pslist"), 0);
    }

    #[test]
    fn test_nearest_respects_threshold() {
        let names = ["windows.pslist", "windows.pstree", "windows.malfind"];
        assert_eq!(
            nearest("windows.pzlist", names.iter().copied(), 3),
            Some(("windows.pslist", 1))
        );
        assert_eq!(nearest("registry", names.iter().copied(), 3), None);
    }

    #[test]
    fn test_nearest_prefers_first_on_tie() {
        let names = ["psscan", "pslist"];
        // one edit from pslist, more than three from psscan
        assert_eq!(nearest("psxist", names.iter().copied(), 3), Some(("pslist", 1)));
        assert_eq!(nearest("abc", ["abd", "abe"].iter().copied(), 1), Some(("abd", 1)));
    }
}
