//! Redis-style glob matching for key listing.
//!
//! Supported syntax:
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]`, `[^abc]` match one character from (or outside) a set
//! - `\x` matches `x` literally

/// Returns `true` if `text` matches the glob `pattern`.
///
/// # Example
///
/// ```rust
/// use clay_storage::glob_match;
///
/// assert!(glob_match("clay:User:id:*", "clay:User:id:42"));
/// assert!(!glob_match("clay:User:id:*", "clay:Build:id:42"));
/// ```
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_chars(&pattern, &text)
}

fn match_chars(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` seen and the text position it resumes from.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => Some(p + 1),
                '[' => match match_class(pattern, p, text[t]) {
                    Some((true, next)) => Some(next),
                    Some((false, _)) => None,
                    None if text[t] == '[' => Some(p + 1),
                    None => None,
                },
                '\\' if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
                c => (c == text[t]).then_some(p + 1),
            }
        } else {
            None
        };

        match step {
            Some(next) => {
                p = next;
                t += 1;
            }
            None => match backtrack {
                Some((star, resume)) => {
                    p = star + 1;
                    t = resume + 1;
                    backtrack = Some((star, resume + 1));
                }
                None => return false,
            },
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Matches `c` against the character class opening at `pattern[open]`.
///
/// Returns whether it matched and the index just past the closing `]`,
/// or `None` when the class is never closed.
fn match_class(pattern: &[char], open: usize, c: char) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        match pattern[i] {
            ']' => return Some((matched != negate, i + 1)),
            '\\' if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == c;
                i += 2;
            }
            low if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' => {
                let high = pattern[i + 2];
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                matched |= (low..=high).contains(&c);
                i += 3;
            }
            literal => {
                matched |= literal == c;
                i += 1;
            }
        }
    }
    None
}
