//! Fair division of integer budgets.
//!
//! Worker budgets (dispatch concurrency, pooled connections, dataset
//! copies) are integers that rarely divide evenly by the worker count.
//! [`divide_evenly`] splits them so that no worker's share differs from
//! another's by more than one unit.

/// Split `total` into `shares` parts whose sum is `total` and whose
/// maximum and minimum differ by at most one.
///
/// The first `shares - 1` slots alternate between the ceiling and the
/// floor of the remaining average; the final slot takes whatever remains.
/// `divide_evenly(10, 3)` is `[4, 3, 3]`.
///
/// # Panics
///
/// Panics if `shares` is zero. Callers hold the worker count at one or
/// more.
#[must_use]
pub fn divide_evenly(total: u32, shares: usize) -> Vec<u32> {
    assert!(shares > 0, "cannot divide into zero shares");

    let mut out = Vec::with_capacity(shares);
    let mut remaining = total;
    for i in 0..shares - 1 {
        let slots_left = (shares - i) as u32;
        let share = if i % 2 == 0 {
            remaining.div_ceil(slots_left)
        } else {
            remaining / slots_left
        };
        out.push(share);
        remaining -= share;
    }
    out.push(remaining);
    out
}
