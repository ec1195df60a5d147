//! Parallel computation of NaN-skipping means

use crate::errors::{CmipScanError, Result};
use ndarray::{ArrayD, Axis, IxDyn};
use rayon::prelude::*;

/// Mean over several axes at once, ignoring `NaN` values
///
/// The reduced axes are moved to the back and flattened so that every output
/// cell averages one contiguous row; rows are processed in parallel. Cells
/// holding only `NaN` become `NaN`; infinities take part in the mean.
///
/// # Errors
///
/// Returns an error if an axis is out of bounds or listed twice.
pub fn parallel_nanmean_axes(data: &ArrayD<f64>, axes: &[usize]) -> Result<ArrayD<f64>> {
    let ndim = data.ndim();
    for (i, &axis) in axes.iter().enumerate() {
        if axis >= ndim {
            return Err(CmipScanError::Generic(format!(
                "Axis {axis} is out of bounds for array with {ndim} dimensions"
            )));
        }
        if axes[..i].contains(&axis) {
            return Err(CmipScanError::Generic(format!("Axis {axis} listed twice")));
        }
    }

    let kept: Vec<usize> = (0..ndim).filter(|axis| !axes.contains(axis)).collect();
    let kept_shape: Vec<usize> = kept.iter().map(|&axis| data.shape()[axis]).collect();
    let n_kept: usize = kept_shape.iter().product();
    let n_reduced: usize = axes.iter().map(|&axis| data.shape()[axis]).product();

    let mut order = kept;
    order.extend_from_slice(axes);
    let permuted = data.view().permuted_axes(IxDyn(&order));
    let rows = permuted.as_standard_layout().into_shape((n_kept, n_reduced))?;

    let means: Vec<f64> = rows
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| {
            let (sum, count) = row
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
            if count > 0 {
                #[allow(clippy::cast_precision_loss)]
                {
                    sum / count as f64
                }
            } else {
                f64::NAN
            }
        })
        .collect();

    Ok(ArrayD::from_shape_vec(kept_shape, means)?)
}
