//! Masking and averaging of named fields

use super::parallel::parallel_nanmean_axes;
use crate::dataset::DataArray;
use crate::errors::{CmipScanError, Result};
use crate::mask::Mask;

/// Reductions that keep a field's name and attributes
pub trait MaskedReduction: Sized {
    /// Copy of the field where every cell outside `mask` is `NaN`
    ///
    /// # Errors
    ///
    /// Fails if the field lacks one of the mask's dimensions or their lengths differ.
    fn masked(&self, mask: &Mask) -> Result<Self>;

    /// NaN-skipping mean over all of `dims` jointly
    ///
    /// # Errors
    ///
    /// Fails with [`CmipScanError::DimensionNotFound`] if a dimension is absent.
    fn mean_over_dims(&self, dims: &[String]) -> Result<Self>;
}

impl MaskedReduction for DataArray {
    fn masked(&self, mask: &Mask) -> Result<Self> {
        let [first, second] = mask.dims();
        let first_axis = self.require_axis(first)?;
        let second_axis = self.require_axis(second)?;

        let field_shape = [self.shape()[first_axis], self.shape()[second_axis]];
        if field_shape != mask.shape() {
            return Err(CmipScanError::ShapeMismatch {
                expected: mask.shape().to_vec(),
                found: field_shape.to_vec(),
            });
        }

        let selected = mask.data();
        let mut data = self.data.clone();
        for (index, value) in data.indexed_iter_mut() {
            if !selected[[index[first_axis], index[second_axis]]] {
                *value = f64::NAN;
            }
        }

        Ok(DataArray {
            name: self.name.clone(),
            dims: self.dims.clone(),
            data,
            attributes: self.attributes.clone(),
        })
    }

    fn mean_over_dims(&self, dims: &[String]) -> Result<Self> {
        let axes = dims
            .iter()
            .map(|dim| self.require_axis(dim))
            .collect::<Result<Vec<_>>>()?;
        let data = parallel_nanmean_axes(&self.data, &axes)?;
        let kept_dims = self
            .dims
            .iter()
            .enumerate()
            .filter_map(|(i, name)| (!axes.contains(&i)).then(|| name.clone()))
            .collect();

        Ok(DataArray {
            name: self.name.clone(),
            dims: kept_dims,
            data,
            attributes: self.attributes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AttrValue;
    use ndarray::{arr2, Array3};

    fn field() -> Result<DataArray> {
        // time=2, lat=2, lon=2
        let data = Array3::from_shape_vec((2, 2, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])?;
        let mut array = DataArray::new(
            "tas",
            vec!["time".into(), "lat".into(), "lon".into()],
            data.into_dyn(),
        )?;
        array
            .attributes
            .insert("units".to_string(), AttrValue::from("K"));
        Ok(array)
    }

    fn lat_lon_mask(values: [[bool; 2]; 2]) -> Mask {
        Mask::new(["lat".to_string(), "lon".to_string()], arr2(&values))
    }

    #[test]
    fn test_masked_mean_keeps_metadata() -> Result<()> {
        let mask = lat_lon_mask([[true, false], [false, true]]);
        let reduced = field()?
            .masked(&mask)?
            .mean_over_dims(&["lon".to_string(), "lat".to_string()])?;
        assert_eq!(reduced.dims, vec!["time"]);
        assert_eq!(reduced.data.as_slice(), Some(&[2.5, 6.5][..]));
        assert_eq!(reduced.attributes.get("units"), Some(&AttrValue::from("K")));
        assert_eq!(reduced.name, "tas");
        Ok(())
    }

    #[test]
    fn test_mask_dims_may_be_transposed_in_field() -> Result<()> {
        let data = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        let array = DataArray::new("pr", vec!["lon".into(), "lat".into()], data)?;
        // Selects lat=0, lon=1 which is element [1, 0] of the lon-first field
        let mask = lat_lon_mask([[false, true], [false, false]]);
        let masked = array.masked(&mask)?;
        assert!(masked.data[[0, 0]].is_nan());
        assert_eq!(masked.data[[1, 0]], 3.0);
        Ok(())
    }

    #[test]
    fn test_missing_dimension() -> Result<()> {
        let mask = Mask::new(["y".to_string(), "x".to_string()], arr2(&[[true; 2]; 2]));
        assert!(matches!(
            field()?.masked(&mask),
            Err(CmipScanError::DimensionNotFound { .. })
        ));
        assert!(field()?.mean_over_dims(&["depth".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn test_mask_shape_mismatch() -> Result<()> {
        let mask = Mask::new(
            ["lat".to_string(), "lon".to_string()],
            ndarray::Array2::from_elem((3, 2), true),
        );
        assert!(matches!(
            field()?.masked(&mask),
            Err(CmipScanError::ShapeMismatch { .. })
        ));
        Ok(())
    }
}
