//! Masked spatial reductions
//!
//! This module provides the reductions used when squashing gridded fields into
//! area-mean time series: masking cells outside a [`crate::Mask`] and averaging
//! over several dimensions at once while skipping missing values.
//!
//! # Organization
//!
//! - [`operations`]: the [`MaskedReduction`] trait implemented for [`crate::DataArray`]
//! - [`parallel`]: the rayon-backed NaN-skipping mean

pub mod operations;
pub mod parallel;

pub use operations::MaskedReduction;
pub use parallel::parallel_nanmean_axes;
