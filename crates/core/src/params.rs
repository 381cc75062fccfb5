//! Parameter normalization: typed reads from a parameter map, per-plane
//! fill-forward, reference-scale thresholds and plane selection.
//!
//! Everything here runs once when a filter is configured. Filters keep the
//! resolved per-plane vectors and never look at the raw map again.

use std::collections::HashMap;
use std::fmt::Display;

use serde_json::Value;

use crate::error::{FilterError, FilterResult};
use crate::types::SampleFormat;

pub type ParamMap = HashMap<String, Value>;

/// Typed accessor over a [`ParamMap`]. Missing keys read as `None`; keys of
/// the wrong JSON type fail with `InvalidParameter`.
pub struct ParamReader<'a> {
    params: &'a ParamMap,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a ParamMap) -> Self {
        Self { params }
    }

    /// Reject keys the filter does not understand.
    pub fn ensure_known(&self, known: &[&str]) -> FilterResult<()> {
        let mut unknown: Vec<&str> = self
            .params
            .keys()
            .map(String::as_str)
            .filter(|key| !known.contains(key))
            .collect();
        unknown.sort_unstable();
        match unknown.first() {
            Some(key) => Err(FilterError::invalid(key, "unknown parameter")),
            None => Ok(()),
        }
    }

    pub fn int(&self, name: &str) -> FilterResult<Option<i64>> {
        self.params
            .get(name)
            .map(|value| as_int(name, value))
            .transpose()
    }

    pub fn float(&self, name: &str) -> FilterResult<Option<f64>> {
        self.params
            .get(name)
            .map(|value| as_float(name, value))
            .transpose()
    }

    pub fn bool(&self, name: &str) -> FilterResult<Option<bool>> {
        match self.params.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(value) => match as_int(name, value) {
                Ok(0) => Ok(Some(false)),
                Ok(1) => Ok(Some(true)),
                _ => Err(FilterError::invalid(name, "expected a boolean")),
            },
        }
    }

    /// A list of integers; a bare scalar reads as a one-element list.
    pub fn int_list(&self, name: &str) -> FilterResult<Option<Vec<i64>>> {
        match self.params.get(name) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| as_int(name, item))
                .collect::<FilterResult<Vec<_>>>()
                .map(Some),
            Some(value) => Ok(Some(vec![as_int(name, value)?])),
        }
    }

    /// A list of numbers; a bare scalar reads as a one-element list.
    pub fn float_list(&self, name: &str) -> FilterResult<Option<Vec<f64>>> {
        match self.params.get(name) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| as_float(name, item))
                .collect::<FilterResult<Vec<_>>>()
                .map(Some),
            Some(value) => Ok(Some(vec![as_float(name, value)?])),
        }
    }

    pub fn planes(&self, plane_count: usize) -> FilterResult<Vec<bool>> {
        resolve_planes(self.int_list("planes")?.as_deref(), plane_count)
    }
}

fn as_int(name: &str, value: &Value) -> FilterResult<i64> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    match value.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(FilterError::invalid(name, format!("expected an integer, got {value}"))),
    }
}

fn as_float(name: &str, value: &Value) -> FilterResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| FilterError::invalid(name, format!("expected a number, got {value}")))
}

pub fn check_range<T>(name: &str, value: T, lo: T, hi: T) -> FilterResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if value < lo || value > hi {
        return Err(FilterError::invalid(name, format!("must be in [{lo}, {hi}], got {value}")));
    }
    Ok(value)
}

pub fn check_all<T>(name: &str, values: &[T], lo: T, hi: T) -> FilterResult<()>
where
    T: PartialOrd + Display + Copy,
{
    values
        .iter()
        .try_for_each(|v| check_range(name, *v, lo, hi).map(|_| ()))
}

/// Expand a per-plane list to exactly `plane_count` entries.
///
/// Missing entries repeat the last supplied value; an empty list falls back
/// to `default`, which is expanded by the same rule.
pub fn fill_forward<T: Copy>(values: &[T], plane_count: usize, default: &[T]) -> Vec<T> {
    let source = if values.is_empty() { default } else { values };
    let Some(&last) = source.last() else {
        return Vec::new();
    };
    (0..plane_count)
        .map(|plane| source.get(plane).copied().unwrap_or(last))
        .collect()
}

/// Fill-forward per-plane thresholds and, with `scalep`, convert them from
/// the 8-bit reference scale into `format`'s native scale. Negative values
/// are "disabled" markers and are never scaled.
pub fn normalize_thresholds(
    values: &[f32],
    plane_count: usize,
    scalep: bool,
    format: SampleFormat,
    default: &[f32],
) -> Vec<f32> {
    fill_forward(values, plane_count, default)
        .into_iter()
        .map(|v| {
            if scalep && v >= 0.0 {
                format.from_reference(v)
            } else {
                v
            }
        })
        .collect()
}

/// Turn a list of plane indices into a per-plane "process" mask.
/// `None` selects every plane.
pub fn resolve_planes(planes: Option<&[i64]>, plane_count: usize) -> FilterResult<Vec<bool>> {
    let Some(planes) = planes else {
        return Ok(vec![true; plane_count]);
    };
    let mut mask = vec![false; plane_count];
    for &index in planes {
        if index < 0 || index as usize >= plane_count {
            return Err(FilterError::InvalidPlaneIndex { index, plane_count });
        }
        mask[index as usize] = true;
    }
    Ok(mask)
}

/// Upper bound for a non-negative threshold given how it is expressed.
pub fn threshold_limit(scalep: bool, format: SampleFormat) -> f32 {
    if scalep {
        255.0
    } else {
        format.peak()
    }
}
