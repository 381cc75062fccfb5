/// Reflect `index` into `[0, len)`.
///
/// `-1 -> 0`, `-2 -> 1`, `len -> len - 1`, `len + 1 -> len - 2`, repeating
/// with period `2 * len` so every integer resolves. `len` must be non-zero.
#[inline]
pub fn mirror(index: isize, len: usize) -> usize {
    debug_assert!(len > 0, "mirror over an empty axis");
    let len = len as isize;
    if (0..len).contains(&index) {
        return index as usize;
    }
    let period = 2 * len;
    let folded = index.rem_euclid(period);
    if folded < len {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_reflects_without_skipping_edge() {
        assert_eq!(mirror(-1, 5), 0);
        assert_eq!(mirror(-2, 5), 1);
        assert_eq!(mirror(-3, 5), 2);
        assert_eq!(mirror(5, 5), 4);
        assert_eq!(mirror(6, 5), 3);
        assert_eq!(mirror(7, 5), 2);
    }

    #[test]
    fn test_mirror_stays_in_range_and_is_identity_inside() {
        for len in 1..=12usize {
            let l = len as isize;
            for d in -2 * l..=2 * l {
                let resolved = mirror(d, len);
                assert!(resolved < len, "mirror({d}, {len}) = {resolved}");
                if (0..l).contains(&d) {
                    assert_eq!(resolved, d as usize);
                }
            }
        }
    }

    #[test]
    fn test_mirror_single_sample_axis() {
        for d in -4..=4 {
            assert_eq!(mirror(d, 1), 0);
        }
    }

    #[test]
    fn test_mirror_far_offsets_are_periodic() {
        assert_eq!(mirror(-11, 5), mirror(-1, 5));
        assert_eq!(mirror(1000, 7), mirror(1000 - 14 * 71, 7));
    }
}
