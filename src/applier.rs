use tracing::debug;

use crate::directive::EditOperation;
use crate::error::EditError;

struct Planned<'a> {
    boundary: usize,
    /// Insertions sort ahead of a destructive span starting at the same
    /// boundary.
    rank: u8,
    op: &'a EditOperation,
}

/// Applies `operations`, every one addressed against `original`, in a single
/// walk so no operation sees positions shifted by another.
pub fn apply(original: &[String], operations: &[EditOperation]) -> Result<Vec<String>, EditError> {
    let len = original.len();
    for op in operations {
        check_bounds(op, len)?;
    }

    let mut plan: Vec<Planned<'_>> = operations
        .iter()
        .map(|op| match op {
            EditOperation::Insert { after, .. } => Planned {
                boundary: *after,
                rank: 0,
                op,
            },
            EditOperation::Replace { start, .. } | EditOperation::Delete { start, .. } => {
                Planned {
                    boundary: start - 1,
                    rank: 1,
                    op,
                }
            }
        })
        .collect();
    plan.sort_by_key(|planned| (planned.boundary, planned.rank));

    let added: usize = operations
        .iter()
        .map(|op| match op {
            EditOperation::Replace { lines, .. } | EditOperation::Insert { lines, .. } => {
                lines.len()
            }
            EditOperation::Delete { .. } => 0,
        })
        .sum();
    let mut output = Vec::with_capacity(len + added);
    let mut cursor = 0;
    let mut last_span: Option<&EditOperation> = None;
    let mut last_insert: Option<(usize, &EditOperation)> = None;

    for planned in &plan {
        match planned.op {
            EditOperation::Insert { after, lines } => {
                if *after < cursor {
                    return Err(conflict(last_span, planned.op));
                }
                if let Some((_, previous)) = last_insert.filter(|(point, _)| point == after) {
                    return Err(conflict(Some(previous), planned.op));
                }
                output.extend_from_slice(&original[cursor..*after]);
                output.extend(lines.iter().cloned());
                cursor = *after;
                last_insert = Some((*after, planned.op));
            }
            destructive => {
                let Some((start, end)) = destructive.span() else {
                    continue;
                };
                let lo = start - 1;
                if lo < cursor {
                    return Err(conflict(last_span, destructive));
                }
                output.extend_from_slice(&original[cursor..lo]);
                if let EditOperation::Replace { lines, .. } = destructive {
                    output.extend(lines.iter().cloned());
                }
                cursor = end;
                last_span = Some(destructive);
            }
        }
    }
    output.extend_from_slice(&original[cursor..]);

    debug!(
        operations = operations.len(),
        before = len,
        after = output.len(),
        "applied operations"
    );
    Ok(output)
}

fn check_bounds(op: &EditOperation, len: usize) -> Result<(), EditError> {
    let fits = match *op {
        EditOperation::Replace { start, end, .. } => start >= 1 && start <= end && end <= len,
        EditOperation::Delete { start, count } => {
            start >= 1
                && count >= 1
                && start
                    .checked_add(count - 1)
                    .is_some_and(|last| last <= len)
        }
        EditOperation::Insert { after, .. } => after <= len,
    };
    if fits {
        Ok(())
    } else {
        Err(EditError::OutOfRange {
            operation: op.to_string(),
            len,
        })
    }
}

fn conflict(first: Option<&EditOperation>, second: &EditOperation) -> EditError {
    EditError::ConflictingOperations {
        first: first.map_or_else(|| "an earlier operation".to_string(), ToString::to_string),
        second: second.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn replace(start: usize, end: usize, new: &[&str]) -> EditOperation {
        EditOperation::Replace {
            start,
            end,
            lines: lines(new),
        }
    }

    fn insert(after: usize, new: &[&str]) -> EditOperation {
        EditOperation::Insert {
            after,
            lines: lines(new),
        }
    }

    fn delete(start: usize, count: usize) -> EditOperation {
        EditOperation::Delete { start, count }
    }

    #[test]
    fn replace_example() {
        let out = apply(
            &lines(&["a", "b", "c", "d", "e"]),
            &[replace(2, 3, &["X", "Y", "Z"])],
        )
        .unwrap();
        assert_eq!(out, lines(&["a", "X", "Y", "Z", "d", "e"]));
    }

    #[test]
    fn delete_example() {
        let out = apply(&lines(&["a", "b", "c", "d"]), &[delete(2, 2)]).unwrap();
        assert_eq!(out, lines(&["a", "d"]));
    }

    #[test]
    fn insert_example() {
        let out = apply(&lines(&["a", "b", "c"]), &[insert(1, &["m", "n"])]).unwrap();
        assert_eq!(out, lines(&["a", "m", "n", "b", "c"]));
    }

    #[test]
    fn combined_operations_use_original_numbering() {
        let out = apply(
            &lines(&["a", "b", "c", "d", "e"]),
            &[delete(2, 1), insert(4, &["Z"])],
        )
        .unwrap();
        assert_eq!(out, lines(&["a", "c", "d", "Z", "e"]));
    }

    #[test]
    fn input_order_does_not_matter() {
        let original = lines(&["1", "2", "3", "4", "5", "6", "7", "8"]);
        let ops = vec![
            replace(7, 8, &["seven"]),
            insert(0, &["top"]),
            delete(2, 2),
            insert(5, &["after five"]),
            replace(4, 4, &["four", "four b"]),
        ];
        let expected = apply(&original, &ops).unwrap();
        assert_eq!(
            expected,
            lines(&["top", "1", "four", "four b", "5", "after five", "6", "seven"])
        );

        let mut reversed = ops.clone();
        reversed.reverse();
        assert_eq!(apply(&original, &reversed).unwrap(), expected);
        let mut rotated = ops;
        rotated.rotate_left(2);
        assert_eq!(apply(&original, &rotated).unwrap(), expected);
    }

    #[test]
    fn insert_boundaries() {
        let original = lines(&["a", "b"]);
        assert_eq!(
            apply(&original, &[insert(0, &["start"])]).unwrap(),
            lines(&["start", "a", "b"])
        );
        assert_eq!(
            apply(&original, &[insert(2, &["end"])]).unwrap(),
            lines(&["a", "b", "end"])
        );
        assert_eq!(
            apply(&[], &[insert(0, &["only"])]).unwrap(),
            lines(&["only"])
        );
    }

    #[test]
    fn insert_at_end_of_replaced_span_lands_after_it() {
        let original = lines(&["a", "b", "c", "d"]);
        let out = apply(&original, &[insert(3, &["I"]), replace(2, 3, &["R"])]).unwrap();
        assert_eq!(out, lines(&["a", "R", "I", "d"]));
        let out = apply(&original, &[replace(2, 3, &["R"]), insert(1, &["I"])]).unwrap();
        assert_eq!(out, lines(&["a", "I", "R", "d"]));
    }

    #[test]
    fn empty_replacement_deletes() {
        let out = apply(&lines(&["a", "b", "c"]), &[replace(2, 2, &[])]).unwrap();
        assert_eq!(out, lines(&["a", "c"]));
    }

    #[test]
    fn out_of_range_operations() {
        let original = lines(&["a", "b", "c"]);
        for op in [
            replace(3, 4, &["x"]),
            replace(0, 1, &["x"]),
            delete(3, 2),
            delete(4, 1),
            insert(4, &["x"]),
            delete(1, usize::MAX),
        ] {
            let err = apply(&original, &[op]).unwrap_err();
            assert_eq!(err.kind(), "out_of_range");
        }
        assert!(apply(&[], &[replace(1, 1, &["x"])]).is_err());
    }

    #[test]
    fn overlapping_replace_and_delete_conflict() {
        let original: Vec<String> = (1..=20).map(|n| n.to_string()).collect();
        let err = apply(&original, &[replace(10, 15, &["x"]), delete(12, 1)]).unwrap_err();
        match err {
            EditError::ConflictingOperations { first, second } => {
                assert!(first.contains("REPLACE 10-15"));
                assert!(second.contains("DELETE 12"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn insert_inside_span_and_duplicate_points_conflict() {
        let original = lines(&["a", "b", "c", "d"]);
        let err = apply(&original, &[replace(1, 3, &["x"]), insert(2, &["y"])]).unwrap_err();
        assert_eq!(err.kind(), "conflicting_operations");
        let err = apply(&original, &[insert(2, &["y"]), insert(2, &["z"])]).unwrap_err();
        assert_eq!(err.kind(), "conflicting_operations");
        let err = apply(&original, &[delete(2, 1), delete(2, 1)]).unwrap_err();
        assert_eq!(err.kind(), "conflicting_operations");
    }

    #[test]
    fn reapplying_against_new_content_fails() {
        let original = lines(&["a", "b", "c", "d"]);
        let ops = vec![delete(3, 2)];
        let once = apply(&original, &ops).unwrap();
        assert_eq!(once, lines(&["a", "b"]));
        assert_eq!(apply(&once, &ops).unwrap_err().kind(), "out_of_range");
    }
}
