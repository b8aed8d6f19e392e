//! Rank assignment shared by the weekly leaderboard, season standings and the forecast.

/// Assigns shared-tie competition ranks to rows that are already sorted best-first.
///
/// Each row gets `1 + (number of rows with a strictly better key)`, so equal keys share a rank
/// and the next distinct key resumes at its 1-based position: `{100, 100, 90}` ranks
/// `{1, 1, 3}`. Only consecutive equal keys are treated as tied, which holds for sorted input.
pub fn competition_ranks<T, K, F>(rows: &[T], key: F) -> Vec<i32>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut ranks = Vec::with_capacity(rows.len());
    let mut previous: Option<K> = None;
    let mut current_rank = 0;

    for (position, row) in rows.iter().enumerate() {
        let k = key(row);
        if previous.as_ref() != Some(&k) {
            current_rank = position as i32 + 1;
        }
        ranks.push(current_rank);
        previous = Some(k);
    }

    ranks
}

/// Strict 1..=n ranks for an already sorted list.
pub fn positional_ranks(len: usize) -> Vec<i32> {
    (1..=len as i32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_ties_skip_positions() {
        let points = vec![100, 100, 90];
        assert_eq!(competition_ranks(&points, |p| *p), vec![1, 1, 3]);
    }

    #[test]
    fn test_three_way_tie_then_fourth() {
        let points = vec![20, 20, 20, 15];
        assert_eq!(competition_ranks(&points, |p| *p), vec![1, 1, 1, 4]);
    }

    #[test]
    fn test_compound_key() {
        // (points, correct): equal points but fewer correct picks ranks lower.
        let rows = vec![(15, 3), (15, 3), (15, 2), (10, 4), (10, 4)];
        assert_eq!(competition_ranks(&rows, |r| *r), vec![1, 1, 3, 4, 4]);
    }

    #[test]
    fn test_empty_and_single() {
        let empty: Vec<i32> = vec![];
        assert!(competition_ranks(&empty, |p| *p).is_empty());
        assert_eq!(competition_ranks(&[7], |p| *p), vec![1]);
    }

    #[test]
    fn test_positional_ranks() {
        assert_eq!(positional_ranks(4), vec![1, 2, 3, 4]);
        assert!(positional_ranks(0).is_empty());
    }
}
