/// Utility functions shared by the corner detectors

/// Check if the 16-bit circular mask contains a run of at least `min_count`
/// set bits, wrapping from bit 15 back to bit 0
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }

    // For a run of length n: mask & rotl(mask, 1) & ... & rotl(mask, n-1)
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Pack a circular flag array into the mask consumed by [`has_consecutive_bits`]
pub fn pack_mask(flags: &[bool; 16]) -> u16 {
    flags
        .iter()
        .enumerate()
        .filter(|(_, &f)| f)
        .fold(0u16, |mask, (i, _)| mask | (1 << i))
}

/// Stable descending sort on an `f32` key
pub fn sort_by_strength<T>(items: &mut [T], key: impl Fn(&T) -> f32) {
    items.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longest_run(flags: &[bool; 16]) -> usize {
        let mut best = 0;
        let mut current = 0;
        for i in 0..32 {
            if flags[i % 16] {
                current += 1;
                best = best.max(current.min(16));
            } else {
                current = 0;
            }
        }
        best
    }

    #[test]
    fn test_consecutive_bits_simple() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().take(9) {
            *p = true;
        }
        let mask = pack_mask(&pixels);
        assert!(has_consecutive_bits(mask, 9));
        assert!(!has_consecutive_bits(mask, 10));
    }

    #[test]
    fn test_consecutive_bits_wrap_around() {
        let mut pixels = [false; 16];
        for i in (12..16).chain(0..5) {
            pixels[i] = true;
        }
        assert!(has_consecutive_bits(pack_mask(&pixels), 9));
    }

    #[test]
    fn test_alternating_bits() {
        assert!(!has_consecutive_bits(0b0101_0101_0101_0101, 2));
        assert!(has_consecutive_bits(0b0101_0101_0101_0101, 1));
        assert!(has_consecutive_bits(u16::MAX, 16));
        assert!(!has_consecutive_bits(0, 1));
    }

    #[test]
    fn test_bitmask_agrees_with_run_count() {
        for mask in (0u16..=u16::MAX).step_by(97) {
            let mut flags = [false; 16];
            for (i, f) in flags.iter_mut().enumerate() {
                *f = mask & (1 << i) != 0;
            }
            let run = longest_run(&flags);
            for n in 1..=16 {
                assert_eq!(has_consecutive_bits(mask, n), run >= n, "mask={mask:#06x} n={n}");
            }
        }
    }

    #[test]
    fn test_sort_by_strength_is_stable() {
        let mut v = vec![(0, 1.0), (1, 3.0), (2, 1.0), (3, 2.0)];
        sort_by_strength(&mut v, |p| p.1);
        assert_eq!(v.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 3, 0, 2]);
    }
}
