//! Merge planning.
//!
//! Groups an image's layer stack into merge steps with a single
//! left-to-right scan: adjacent layers accumulate while their combined
//! size stays under the cap, then the accumulator flushes as one step.

/// One decision of the merge plan, over contiguous layer indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStep {
    /// Preserve the single layer as-is (always true for one-layer steps)
    pub keep: bool,
    /// Indices into the original layer stack, in order
    pub layers: Vec<usize>,
}

/// Plan the merge for a stack of layer sizes under `max_bytes`.
///
/// A single layer larger than the cap is emitted as its own keep step;
/// merging cannot help it.
pub fn plan_merge(sizes: &[u64], max_bytes: u64) -> Vec<MergeStep> {
    let mut steps = Vec::new();
    let mut acc: Vec<usize> = Vec::new();
    let mut acc_sum: u64 = 0;

    for (i, &size) in sizes.iter().enumerate() {
        if acc.is_empty() {
            acc.push(i);
            acc_sum = size;
        } else if acc_sum + size <= max_bytes {
            acc.push(i);
            acc_sum += size;
        } else {
            flush(&mut steps, &mut acc);
            acc.push(i);
            acc_sum = size;
        }
    }
    flush(&mut steps, &mut acc);

    steps
}

fn flush(steps: &mut Vec<MergeStep>, acc: &mut Vec<usize>) {
    if acc.is_empty() {
        return;
    }
    steps.push(MergeStep {
        keep: acc.len() == 1,
        layers: std::mem::take(acc),
    });
}
