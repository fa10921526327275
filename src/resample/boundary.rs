//! Out-of-range index handling for filters and spline evaluation.

use crate::enums::SplineMode;

/// Map `index` into `0..len` according to `mode`. `None` means the sample
/// lies outside the grid and takes the constant fill value.
pub(crate) fn extend(index: isize, len: usize, mode: SplineMode) -> Option<usize> {
    let n = len as isize;
    if (0..n).contains(&index) {
        return Some(index as usize);
    }
    if n == 0 {
        return None;
    }
    let mapped = match mode {
        SplineMode::GridConstant => return None,
        SplineMode::Nearest => index.clamp(0, n - 1),
        // Half-sample symmetric: d c b a | a b c d | d c b a
        SplineMode::Reflect => {
            let period = 2 * n;
            let i = index.rem_euclid(period);
            if i < n { i } else { period - 1 - i }
        }
        // Whole-sample symmetric: d c b | a b c d | c b a
        SplineMode::Mirror => {
            if n == 1 {
                0
            } else {
                let period = 2 * n - 2;
                let i = index.rem_euclid(period);
                if i < n { i } else { period - i }
            }
        }
        SplineMode::GridWrap => index.rem_euclid(n),
    };
    Some(mapped as usize)
}

/// Sample `lane` at `index`, extended by `mode`.
#[inline]
pub(crate) fn sample(lane: &[f64], index: isize, mode: SplineMode, cval: f64) -> f64 {
    extend(index, lane.len(), mode).map_or(cval, |i| lane[i])
}

/// `lane` padded by `pad` samples on both sides.
pub(crate) fn pad(lane: &[f64], pad: usize, mode: SplineMode, cval: f64) -> Vec<f64> {
    let start = -(pad as isize);
    let end = (lane.len() + pad) as isize;
    (start..end).map(|i| sample(lane, i, mode, cval)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extended(mode: SplineMode) -> Vec<Option<usize>> {
        (-3..7).map(|i| extend(i, 4, mode)).collect()
    }

    #[test]
    fn modes_extend_like_ndimage() {
        assert_eq!(
            extended(SplineMode::Nearest),
            [0, 0, 0, 0, 1, 2, 3, 3, 3, 3].map(Some)
        );
        assert_eq!(
            extended(SplineMode::Reflect),
            [2, 1, 0, 0, 1, 2, 3, 3, 2, 1].map(Some)
        );
        assert_eq!(
            extended(SplineMode::Mirror),
            [3, 2, 1, 0, 1, 2, 3, 2, 1, 0].map(Some)
        );
        assert_eq!(
            extended(SplineMode::GridWrap),
            [1, 2, 3, 0, 1, 2, 3, 0, 1, 2].map(Some)
        );
        assert_eq!(extend(-1, 4, SplineMode::GridConstant), None);
    }

    #[test]
    fn single_sample_lanes() {
        assert_eq!(extend(5, 1, SplineMode::Mirror), Some(0));
        assert_eq!(extend(-2, 1, SplineMode::Reflect), Some(0));
    }

    #[test]
    fn pads_with_cval() {
        assert_eq!(
            pad(&[1.0, 2.0], 1, SplineMode::GridConstant, 9.0),
            vec![9.0, 1.0, 2.0, 9.0]
        );
    }
}
