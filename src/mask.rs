//! Two-dimensional boolean masks over the spatial grid

use crate::dataset::DataArray;
use crate::errors::{CmipScanError, Result};
use ndarray::{Array2, Ix2};

/// Boolean field over two spatial dimensions, `true` where a cell is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dims: [String; 2],
    data: Array2<bool>,
}

impl Mask {
    #[must_use]
    pub fn new(dims: [String; 2], data: Array2<bool>) -> Self {
        Self { dims, data }
    }

    /// Cast a numeric 2-D field to a mask.
    ///
    /// Every non-zero value is selected. `NaN` compares unequal to zero and is
    /// therefore selected too.
    pub fn from_data_array(array: &DataArray) -> Result<Self> {
        if array.dims.len() != 2 {
            return Err(CmipScanError::InvalidMask {
                field: array.name.clone(),
                message: format!("expected 2 dimensions, found {:?}", array.dims),
            });
        }
        let data = array
            .data
            .mapv(|v| v != 0.0)
            .into_dimensionality::<Ix2>()?;
        Ok(Self {
            dims: [array.dims[0].clone(), array.dims[1].clone()],
            data,
        })
    }

    #[must_use]
    pub fn dims(&self) -> &[String; 2] {
        &self.dims
    }

    #[must_use]
    pub fn data(&self) -> &Array2<bool> {
        &self.data
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of selected cells
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&selected| selected).count()
    }

    /// Element-wise OR; both masks must have the same shape
    pub fn logical_or(&self, other: &Mask) -> Result<Mask> {
        if self.shape() != other.shape() {
            return Err(CmipScanError::ShapeMismatch {
                expected: self.shape().to_vec(),
                found: other.shape().to_vec(),
            });
        }
        Ok(Mask {
            dims: self.dims.clone(),
            data: &self.data | &other.data,
        })
    }

    /// Same cells, labelled with new dimension names
    #[must_use]
    pub fn renamed(&self, dims: [String; 2]) -> Mask {
        Mask {
            dims,
            data: self.data.clone(),
        }
    }

    /// The mask with its two axes, and their names, swapped
    #[must_use]
    pub fn transposed(&self) -> Mask {
        Mask {
            dims: [self.dims[1].clone(), self.dims[0].clone()],
            data: self.data.t().to_owned(),
        }
    }

    /// The mask as a `0.0`/`1.0` field named `name`
    #[must_use]
    pub fn to_data_array(&self, name: &str) -> DataArray {
        DataArray {
            name: name.to_string(),
            dims: self.dims.to_vec(),
            data: self.data.mapv(|selected| if selected { 1.0 } else { 0.0 }).into_dyn(),
            attributes: Default::default(),
        }
    }
}
