use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;

use crate::error::Result;

/// Apply `f` to every 1-D lane of `input` along `axis`, producing lanes of
/// `out_len` samples. Lanes run in parallel; their order is preserved.
pub(crate) fn map_lanes<F>(input: &ArrayD<f64>, axis: usize, out_len: usize, f: F) -> Result<ArrayD<f64>>
where
    F: Fn(&[f64], &mut [f64]) + Sync,
{
    let ndim = input.ndim();
    let in_len = input.shape()[axis];
    let mut order: Vec<usize> = (0..ndim).filter(|&a| a != axis).collect();
    order.push(axis);

    let moved = input.view().permuted_axes(IxDyn(&order));
    let source: Vec<f64> = moved.iter().copied().collect();
    let lanes = if in_len == 0 { 0 } else { source.len() / in_len };

    let mut output = vec![0.0; lanes * out_len];
    if lanes > 0 && out_len > 0 {
        output
            .par_chunks_mut(out_len)
            .zip(source.par_chunks(in_len))
            .for_each(|(out, lane)| f(lane, out));
    }

    let mut shape: Vec<usize> = order.iter().map(|&a| input.shape()[a]).collect();
    shape[ndim - 1] = out_len;
    let result = ArrayD::from_shape_vec(IxDyn(&shape), output)?;

    let mut inverse = vec![0; ndim];
    for (position, &a) in order.iter().enumerate() {
        inverse[a] = position;
    }
    Ok(result.permuted_axes(IxDyn(&inverse)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn maps_along_the_requested_axis() {
        let input = Array2::from_shape_fn((2, 3), |(r, c)| (r * 10 + c) as f64).into_dyn();
        // Reverse each column.
        let out = map_lanes(&input, 0, 2, |lane, out| {
            out[0] = lane[1];
            out[1] = lane[0];
        })
        .unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(out[IxDyn(&[0, 2])], 12.0);
        assert_eq!(out[IxDyn(&[1, 2])], 2.0);

        let sums = map_lanes(&input, 1, 1, |lane, out| out[0] = lane.iter().sum()).unwrap();
        assert_eq!(sums.shape(), &[2, 1]);
        assert_eq!(sums[IxDyn(&[1, 0])], 33.0);
    }
}
