//! Optimizer parameter sets.
//!
//! A [`ParamSet`] is the state handed to an optimizer: an ordered list of
//! named values, each either fixed or free, with optional bounds. Every fit
//! owns its own copy; nothing here is shared between concurrent fits.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub vary: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Param {
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            vary: false,
            min: None,
            max: None,
        }
    }

    /// Clamp `v` into `[min, max]` (open sides are unbounded).
    pub fn clamp(&self, v: f64) -> f64 {
        let mut out = v;
        if let Some(lo) = self.min {
            out = out.max(lo);
        }
        if let Some(hi) = self.max {
            out = out.min(hi);
        }
        out
    }
}

/// Ordered, name-addressable collection of [`Param`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet {
    params: Vec<Param>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fixed parameter, or overwrite the value of an existing one.
    /// Flags and bounds of an existing entry are left untouched.
    pub fn add(&mut self, name: &str, value: f64) -> &mut Param {
        let pos = match self.position(name) {
            Some(pos) => {
                self.params[pos].value = value;
                pos
            }
            None => {
                self.params.push(Param::fixed(name, value));
                self.params.len() - 1
            }
        };
        &mut self.params[pos]
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|p| p.value)
    }

    /// Like [`ParamSet::value`] but reports a missing name as a model error.
    pub fn require(&self, name: &str) -> Result<f64, String> {
        self.value(name)
            .ok_or_else(|| format!("parameter '{name}' is not defined"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    /// Free parameters, in insertion order.
    pub fn varying(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.vary)
    }

    pub fn var_names(&self) -> Vec<String> {
        self.varying().map(|p| p.name.clone()).collect()
    }

    pub fn n_varying(&self) -> usize {
        self.varying().count()
    }

    /// Write `values` into the free parameters, in [`ParamSet::varying`] order.
    /// `values` must hold exactly one entry per free parameter.
    pub fn set_free_values(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.n_varying(), "free value count mismatch");
        for (p, v) in self.params.iter_mut().filter(|p| p.vary).zip(values) {
            p.value = *v;
        }
    }

    /// Drop every parameter for which `keep` returns false.
    pub fn retain(&mut self, keep: impl FnMut(&Param) -> bool) {
        self.params.retain(keep);
    }

    /// Set a lower bound on an existing parameter.
    pub fn set_min(&mut self, name: &str, min: f64) -> Result<(), AppError> {
        let p = self
            .get_mut(name)
            .ok_or_else(|| AppError::config(format!("Parameter '{name}' is not defined.")))?;
        p.min = Some(min);
        Ok(())
    }

    /// Check that every value is finite and inside its bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        for p in &self.params {
            if !p.value.is_finite() {
                return Err(AppError::config(format!("Parameter '{}' is not finite.", p.name)));
            }
            if let (Some(lo), Some(hi)) = (p.min, p.max) {
                if lo > hi {
                    return Err(AppError::config(format!(
                        "Parameter '{}' has min {lo} > max {hi}.",
                        p.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overwrites_value_but_keeps_flags() {
        let mut params = ParamSet::new();
        let p = params.add("vsini", 3.0);
        p.vary = true;
        p.min = Some(0.5);
        params.add("vsini", 4.0);

        let p = params.get("vsini").unwrap();
        assert_eq!(p.value, 4.0);
        assert!(p.vary);
        assert_eq!(p.min, Some(0.5));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn free_values_are_written_in_order() {
        let mut params = ParamSet::new();
        params.add("teff", 5700.0);
        params.add("a", 1.0).vary = true;
        params.add("b", 2.0).vary = true;
        assert_eq!(params.var_names(), vec!["a".to_string(), "b".to_string()]);

        params.set_free_values(&[10.0, 20.0]);
        assert_eq!(params.value("a"), Some(10.0));
        assert_eq!(params.value("b"), Some(20.0));
        assert_eq!(params.value("teff"), Some(5700.0));
    }

    #[test]
    fn clone_is_independent() {
        let mut a = ParamSet::new();
        a.add("vsini", 2.0).vary = true;
        let mut b = a.clone();
        b.set_min("vsini", 0.5).unwrap();
        b.add("vsini", 9.0);
        assert_eq!(a.get("vsini").unwrap().min, None);
        assert_eq!(a.value("vsini"), Some(2.0));
    }

    #[test]
    fn clamp_respects_bounds() {
        let mut p = Param::fixed("x", 0.0);
        p.min = Some(0.5);
        assert_eq!(p.clamp(0.1), 0.5);
        assert_eq!(p.clamp(3.0), 3.0);
    }

    #[test]
    fn deserializes_as_plain_list() {
        let json = r#"[{"name": "teff", "value": 5700.0}, {"name": "vsini", "value": 3.0, "vary": true, "min": 0.2}]"#;
        let params: ParamSet = serde_json::from_str(json).unwrap();
        assert_eq!(params.len(), 2);
        assert!(!params.get("teff").unwrap().vary);
        assert_eq!(params.get("vsini").unwrap().min, Some(0.2));
    }
}
