//! Named tunable properties.
//!
//! Lets a host application list and adjust pipeline knobs without knowing the concrete
//! configuration type.

use anyhow::{anyhow, Result};
use std::ops::RangeInclusive;

/// Object with tunable properties.
pub trait Properties {
    /// Get available properties.
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut<'_>)> {
        vec![]
    }

    /// Get a snapshot of the available properties.
    fn props(&mut self) -> Vec<(&str, Property)> {
        self.props_mut()
            .into_iter()
            .map(|(n, p)| (n, p.snapshot()))
            .collect()
    }

    /// Parse `value` and assign it to the property called `name`.
    ///
    /// Names are matched case-insensitively. Numeric values are clamped to the property bounds.
    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.props_mut()
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("unknown property: {name}"))?
            .1
            .parse_set(value)
    }
}

/// Value together with its allowed range.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct BoundedProp<T> {
    pub val: T,
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> BoundedProp<T> {
    /// The value, clamped between the lower and upper bounds.
    pub fn clamped(&self) -> T {
        clamp_to(self.val, &(self.min..=self.max))
    }
}

fn clamp_to<T: PartialOrd + Copy>(val: T, range: &RangeInclusive<T>) -> T {
    if val < *range.start() {
        *range.start()
    } else if val > *range.end() {
        *range.end()
    } else {
        val
    }
}

fn bounded<T: Copy>(val: T, range: &RangeInclusive<T>) -> BoundedProp<T> {
    BoundedProp {
        val,
        min: *range.start(),
        max: *range.end(),
    }
}

/// Owned snapshot of a property.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Property {
    Bool(bool),
    Float(BoundedProp<f32>),
    Usize(BoundedProp<usize>),
}

/// Reference to a tunable value.
pub enum PropertyMut<'a> {
    Bool(&'a mut bool),
    Float(&'a mut f32, RangeInclusive<f32>),
    Usize(&'a mut usize, RangeInclusive<usize>),
}

impl<'a> PropertyMut<'a> {
    /// Create a boolean property.
    pub fn bool(b: &'a mut bool) -> Self {
        Self::Bool(b)
    }

    /// Create a floating point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying float to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn float(val: &'a mut f32, min: f32, max: f32) -> Self {
        Self::Float(val, min..=max)
    }

    /// Create an integer property.
    pub fn usize(val: &'a mut usize, min: usize, max: usize) -> Self {
        Self::Usize(val, min..=max)
    }

    /// Copy out the current value.
    pub fn snapshot(&self) -> Property {
        match self {
            Self::Bool(b) => Property::Bool(**b),
            Self::Float(v, range) => Property::Float(bounded(**v, range)),
            Self::Usize(v, range) => Property::Usize(bounded(**v, range)),
        }
    }

    /// Assign the value of a property of the same type.
    ///
    /// The value is clamped to this property's bounds. Mismatched types are ignored.
    pub fn set(&mut self, other: &Property) {
        match (self, other) {
            (Self::Bool(b), Property::Bool(ob)) => **b = *ob,
            (Self::Float(v, range), Property::Float(o)) => **v = clamp_to(o.val, range),
            (Self::Usize(v, range), Property::Usize(o)) => **v = clamp_to(o.val, range),
            _ => {}
        }
    }

    /// Parse a textual value and assign it.
    pub fn parse_set(&mut self, value: &str) -> Result<()> {
        let value = value.trim();

        match self {
            Self::Bool(b) => {
                **b = match value.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    _ => return Err(anyhow!("invalid boolean: {value}")),
                }
            }
            Self::Float(v, range) => {
                let parsed: f32 = value.parse()?;
                if !parsed.is_finite() {
                    return Err(anyhow!("invalid number: {value}"));
                }
                **v = clamp_to(parsed, range);
            }
            Self::Usize(v, range) => **v = clamp_to(value.parse()?, range),
        }

        Ok(())
    }
}
