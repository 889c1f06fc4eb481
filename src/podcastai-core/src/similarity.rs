//! String similarity for the repetition guard.
//!
//! Uses the Ratcliff/Obershelp "gestalt" ratio: `2·M / T`, where `M` is the
//! number of characters in recursively found longest common blocks and `T`
//! the combined length of both strings. Comparison is case-insensitive.

/// Similarity ratio in `[0.0, 1.0]` between two strings, ignoring case.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Highest ratio between `candidate` and any of `lines`, skipping blank lines.
pub fn max_ratio<'a, I>(candidate: &str, lines: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| ratio(candidate, line))
        .fold(0.0, f64::max)
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, len) = longest_match(a, b, alo, ahi, blo, bhi);
        if len == 0 {
            continue;
        }
        total += len;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + len < ahi && j + len < bhi {
            pending.push((i + len, ahi, j + len, bhi));
        }
    }

    total
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    // run[k + 1] = length of the common run ending at (i - 1, blo + k)
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];

    for i in alo..ahi {
        for (k, j) in (blo..bhi).enumerate() {
            cur[k + 1] = if a[i] == b[j] { prev[k] + 1 } else { 0 };
            let len = cur[k + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identical_strings() {
        assert!(approx(ratio("Hello there", "Hello there"), 1.0));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(approx(ratio("HELLO", "hello"), 1.0));
    }

    #[test]
    fn test_partial_overlap() {
        // common block "bcd": 2 * 3 / 8
        assert!(approx(ratio("abcd", "bcde"), 0.75));
    }

    #[test]
    fn test_disjoint_and_empty() {
        assert!(approx(ratio("abc", "xyz"), 0.0));
        assert!(approx(ratio("abc", ""), 0.0));
        assert!(approx(ratio("", ""), 1.0));
    }

    #[test]
    fn test_recursive_blocks() {
        // "ab" and "d" both match around the differing middle character
        assert!(approx(ratio("abXd", "abYd"), 0.75));
    }

    #[test]
    fn test_near_duplicate_exceeds_threshold() {
        let previous = "Vector databases store embeddings so you can search by meaning.";
        let candidate = "Vector databases store embeddings so you can search by meaning!";
        assert!(ratio(previous, candidate) > 0.8);
        let fresh = "Sure, but how does that help my sales team find old proposals?";
        assert!(ratio(previous, fresh) < 0.8);
    }

    #[test]
    fn test_max_ratio_skips_blank_lines() {
        let lines = ["", "   ", "completely different words here"];
        assert!(max_ratio("abc", lines) < 0.5);
        assert!(approx(max_ratio("same", ["", "same"]), 1.0));
        assert!(approx(max_ratio("anything", std::iter::empty()), 0.0));
    }
}
