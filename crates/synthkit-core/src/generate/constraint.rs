//! Per-variable overrides applied on top of a profile while sampling.
//!
//! A constraint narrows what the sampler may emit: numeric and date draws
//! are clamped to `[min, max]`, draws outside `allowed_values` are redrawn
//! and finally replaced by a uniform pick from the allowed set, and
//! `null_probability` replaces the profile's missing rate.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthKitError};
use crate::profile::domain::DomainProfile;
use crate::schema::value::Value;

/// Draws per value before falling back to a uniform allowed value.
pub const MAX_CONSTRAINT_ATTEMPTS: usize = 20;

/// Domain name to variable name to constraint.
pub type ConstraintMap = BTreeMap<String, BTreeMap<String, ValueConstraint>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueConstraint {
    /// Lower bound: a number for NUMERIC, a date for DATE variables.
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// Compared by output form; empty means unrestricted.
    pub allowed_values: Vec<Value>,
    /// Replaces the observed missing rate.
    pub null_probability: Option<f64>,
}

impl ValueConstraint {
    pub fn validate(&self, domain: &str, variable: &str) -> Result<()> {
        let at = || format!("[variables.{}.{}]", domain, variable);
        if let Some(p) = self.null_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(SynthKitError::config(format!(
                    "{} null_probability must be within [0, 1], got {}",
                    at(),
                    p
                )));
            }
        }
        for bound in [&self.min, &self.max].into_iter().flatten() {
            if !matches!(bound, Value::Number(_) | Value::Date(_)) {
                return Err(SynthKitError::config(format!(
                    "{} bounds must be numbers or dates, got {:?}",
                    at(),
                    bound.to_csv_string()
                )));
            }
        }
        match (&self.min, &self.max) {
            (Some(Value::Number(lo)), Some(Value::Number(hi))) if lo > hi => {
                Err(SynthKitError::config(format!("{} min {} exceeds max {}", at(), lo, hi)))
            }
            (Some(Value::Date(lo)), Some(Value::Date(hi))) if lo > hi => {
                Err(SynthKitError::config(format!("{} min {} exceeds max {}", at(), lo, hi)))
            }
            (Some(Value::Number(_)), Some(Value::Date(_)))
            | (Some(Value::Date(_)), Some(Value::Number(_))) => Err(SynthKitError::config(
                format!("{} min and max must be of the same kind", at()),
            )),
            _ => Ok(()),
        }
    }

    /// Clamp numbers and dates into the bounds; other values pass through.
    pub fn clamp(&self, value: Value) -> Value {
        match value {
            Value::Number(mut n) => {
                if let Some(Value::Number(lo)) = self.min {
                    n = n.max(lo);
                }
                if let Some(Value::Number(hi)) = self.max {
                    n = n.min(hi);
                }
                Value::Number(n)
            }
            Value::Date(mut d) => {
                if let Some(Value::Date(lo)) = self.min {
                    d = d.max(lo);
                }
                if let Some(Value::Date(hi)) = self.max {
                    d = d.min(hi);
                }
                Value::Date(d)
            }
            other => other,
        }
    }

    pub fn allows(&self, value: &Value) -> bool {
        if self.allowed_values.is_empty() || value.is_missing() {
            return true;
        }
        let rendered = value.to_csv_string();
        self.allowed_values
            .iter()
            .any(|a| a.to_csv_string() == rendered)
    }

    pub fn pick_allowed(&self, rng: &mut impl Rng) -> Option<Value> {
        if self.allowed_values.is_empty() {
            return None;
        }
        Some(self.allowed_values[rng.random_range(0..self.allowed_values.len())].clone())
    }
}

/// Every constraint must name a known domain and variable. Constraints on
/// identifier variables have no effect and are reported.
pub fn check_constraints(constraints: &ConstraintMap, profiles: &[DomainProfile]) -> Result<()> {
    for (domain, variables) in constraints {
        let profile = profiles.iter().find(|p| &p.name == domain).ok_or_else(|| {
            SynthKitError::config(format!("[variables.{}] names an unknown domain", domain))
        })?;
        for (variable, constraint) in variables {
            constraint.validate(domain, variable)?;
            let Some(v) = profile.variables.get(variable) else {
                return Err(SynthKitError::config(format!(
                    "[variables.{}.{}] names an unknown variable",
                    domain, variable
                )));
            };
            if v.is_identifier() {
                tracing::warn!(
                    "Ignoring constraint on identifier variable {}.{}",
                    domain,
                    variable
                );
            }
        }
    }
    Ok(())
}
