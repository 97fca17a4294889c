/// Classification of one target position against the typed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Not reached yet.
    Untyped,
    /// The cursor position, i.e. the next character to type.
    Pending,
    Correct,
    Incorrect,
}

/// Classifies every target position against what has been typed so far.
///
/// Always yields exactly `target.len()` verdicts. Typed characters beyond the end of the
/// target have no position to be classified against and are ignored here.
/// Comparison is exact code-point equality.
pub fn classify(target: &[char], typed: &[char]) -> Vec<Verdict> {
    let cursor = typed.len();
    target
        .iter()
        .enumerate()
        .map(|(idx, expected)| match typed.get(idx) {
            Some(actual) if actual == expected => Verdict::Correct,
            Some(_) => Verdict::Incorrect,
            None if idx == cursor => Verdict::Pending,
            None => Verdict::Untyped,
        })
        .collect()
}

pub fn correct_count(verdicts: &[Verdict]) -> usize {
    verdicts.iter().filter(|v| **v == Verdict::Correct).count()
}

pub fn incorrect_count(verdicts: &[Verdict]) -> usize {
    verdicts.iter().filter(|v| **v == Verdict::Incorrect).count()
}

/// Index of the pending position, absent once the buffer covers the whole target.
pub fn pending_index(verdicts: &[Verdict]) -> Option<usize> {
    verdicts.iter().position(|v| *v == Verdict::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn untouched_target_has_pending_cursor_at_zero() {
        let verdicts = classify(&chars("abc"), &[]);
        assert_eq!(
            verdicts,
            vec![Verdict::Pending, Verdict::Untyped, Verdict::Untyped]
        );
        assert_eq!(pending_index(&verdicts), Some(0));
    }

    #[test]
    fn progressive_typing_scenario() {
        let target = chars("abc");

        assert_eq!(
            classify(&target, &chars("a")),
            vec![Verdict::Correct, Verdict::Pending, Verdict::Untyped]
        );
        assert_eq!(
            classify(&target, &chars("ax")),
            vec![Verdict::Correct, Verdict::Incorrect, Verdict::Pending]
        );

        let done = classify(&target, &chars("axc"));
        assert_eq!(
            done,
            vec![Verdict::Correct, Verdict::Incorrect, Verdict::Correct]
        );
        assert_eq!(pending_index(&done), None);
        assert_eq!(correct_count(&done), 2);
        assert_eq!(incorrect_count(&done), 1);
    }

    #[test]
    fn overtype_is_tolerated() {
        let verdicts = classify(&chars("ab"), &chars("abzzz"));
        assert_eq!(verdicts, vec![Verdict::Correct, Verdict::Correct]);
        assert_eq!(pending_index(&verdicts), None);
    }

    #[test]
    fn no_whitespace_or_case_normalization() {
        let verdicts = classify(&chars("A \n"), &chars("a\t "));
        assert_eq!(verdicts, vec![Verdict::Incorrect; 3]);
    }

    #[test]
    fn multibyte_characters_compare_by_code_point() {
        let verdicts = classify(&chars("©é→"), &chars("©e"));
        assert_eq!(
            verdicts,
            vec![Verdict::Correct, Verdict::Incorrect, Verdict::Pending]
        );
    }

    #[test]
    fn verdict_count_matches_target_for_any_buffer_length() {
        let target = chars("fn main() {}");
        let probe = "fn mian() {}!!";
        for cut in 0..=probe.chars().count() {
            let typed: Vec<char> = probe.chars().take(cut).collect();
            let verdicts = classify(&target, &typed);
            assert_eq!(verdicts.len(), target.len());
            let pending = verdicts.iter().filter(|v| **v == Verdict::Pending).count();
            if typed.len() < target.len() {
                assert_eq!(pending, 1);
                assert_eq!(pending_index(&verdicts), Some(typed.len()));
            } else {
                assert_eq!(pending, 0);
            }
            assert!(correct_count(&verdicts) <= typed.len().min(target.len()));
        }
    }
}
