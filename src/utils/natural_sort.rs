use std::cmp::Ordering;

use crate::models::LookupEntry;

/// Case-insensitive comparison where runs of digits compare by numeric value,
/// so `disk-2` sorts before `disk-10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left: Vec<char> = a.to_lowercase().chars().collect();
    let right: Vec<char> = b.to_lowercase().chars().collect();
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        if left[i].is_ascii_digit() && right[j].is_ascii_digit() {
            let start_i = i;
            while i < left.len() && left[i].is_ascii_digit() {
                i += 1;
            }
            let start_j = j;
            while j < right.len() && right[j].is_ascii_digit() {
                j += 1;
            }
            let x: String = left[start_i..i].iter().collect();
            let y: String = right[start_j..j].iter().collect();
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            let ord = x.len().cmp(&y.len()).then_with(|| x.cmp(y));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = left[i].cmp(&right[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (left.len() - i)
        .cmp(&(right.len() - j))
        .then_with(|| a.cmp(b))
}

/// Sort lookup entries by their display text
pub fn sort_by_display(entries: &mut [LookupEntry]) {
    entries.sort_by(|a, b| natural_cmp(&a.display, &b.display));
}
