//! Spelling suggestions for "did you mean" hints.

/// Returns the candidate closest to `x`, ignoring case and underscores,
/// provided it is within a reasonable edit distance.
pub fn nearest<'a, I>(x: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let fold = |s: &str| -> Vec<char> {
        s.chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect()
    };
    let target = fold(x);
    // allow up to 50% typos
    let mut best_dist = target.len().div_ceil(2);
    let mut best = None;
    for candidate in candidates {
        if candidate == x || (candidate.starts_with('_') && !x.starts_with('_')) {
            continue;
        }
        let d = levenshtein(&target, &fold(candidate), best_dist);
        if d < best_dist {
            best_dist = d;
            best = Some(candidate);
        }
    }
    best
}

/// Edit distance between `a` and `b`, giving up once it exceeds `max`.
fn levenshtein(a: &[char], b: &[char], max: usize) -> usize {
    if a.len().abs_diff(b.len()) > max {
        return max + 1;
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        let mut row_min = row[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (row[j + 1] + 1).min(row[j] + 1).min(prev + cost);
            prev = row[j + 1];
            row[j + 1] = next;
            row_min = row_min.min(next);
        }
        if row_min > max {
            return max + 1;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_names() {
        assert_eq!(nearest("lenght", ["len", "length", "list"]), Some("length"));
        assert_eq!(nearest("Print", ["print", "repr"]), Some("print"));
        assert_eq!(nearest("my_var", ["myvar"]), Some("myvar"));
    }

    #[test]
    fn rejects_distant_names() {
        assert_eq!(nearest("x", ["completely", "different"]), None);
        assert_eq!(nearest("foo", ["_foo"]), None);
    }
}
