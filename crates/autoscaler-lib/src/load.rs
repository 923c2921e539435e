//! Fractional load vectors
//!
//! A [`Load`] is a `(cpu, memory, disk)` triple of non-negative fractions. It is
//! used both for observed utilization and for relative adjustments (a cpu load
//! of 2 means "twice as much cpu").

use crate::error::LoadError;
use crate::resources::NodeResources;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul};

/// A resource dimension of a load vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Cpu,
    Memory,
    Disk,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Cpu, Dimension::Memory, Dimension::Disk];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Cpu => "cpu",
            Dimension::Memory => "memory",
            Dimension::Disk => "disk",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLoad", into = "RawLoad")]
pub struct Load {
    cpu: f64,
    memory: f64,
    disk: f64,
}

#[derive(Serialize, Deserialize)]
struct RawLoad {
    cpu: f64,
    memory: f64,
    disk: f64,
}

impl TryFrom<RawLoad> for Load {
    type Error = LoadError;

    fn try_from(raw: RawLoad) -> Result<Self, Self::Error> {
        Load::new(raw.cpu, raw.memory, raw.disk)
    }
}

impl From<Load> for RawLoad {
    fn from(load: Load) -> Self {
        RawLoad {
            cpu: load.cpu,
            memory: load.memory,
            disk: load.disk,
        }
    }
}

impl Load {
    /// Creates a load, failing if any component is NaN or negative
    pub fn new(cpu: f64, memory: f64, disk: f64) -> Result<Self, LoadError> {
        Ok(Self {
            cpu: validate(Dimension::Cpu, cpu)?,
            memory: validate(Dimension::Memory, memory)?,
            disk: validate(Dimension::Disk, disk)?,
        })
    }

    pub const fn zero() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            disk: 0.0,
        }
    }

    pub const fn one() -> Self {
        Self {
            cpu: 1.0,
            memory: 1.0,
            disk: 1.0,
        }
    }

    /// Result of arithmetic on valid loads. NaN collapses to 0 and negatives
    /// to 0 so every operation stays total.
    pub(crate) fn of(cpu: f64, memory: f64, disk: f64) -> Self {
        Self {
            cpu: sanitize(cpu),
            memory: sanitize(memory),
            disk: sanitize(disk),
        }
    }

    pub fn cpu(&self) -> f64 {
        self.cpu
    }

    pub fn memory(&self) -> f64 {
        self.memory
    }

    pub fn disk(&self) -> f64 {
        self.disk
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Cpu => self.cpu,
            Dimension::Memory => self.memory,
            Dimension::Disk => self.disk,
        }
    }

    pub fn with(&self, dimension: Dimension, value: f64) -> Self {
        match dimension {
            Dimension::Cpu => Self::of(value, self.memory, self.disk),
            Dimension::Memory => Self::of(self.cpu, value, self.disk),
            Dimension::Disk => Self::of(self.cpu, self.memory, value),
        }
    }

    pub fn add(&self, other: &Load) -> Self {
        self.join(other, |a, b| a + b)
    }

    pub fn multiply(&self, other: &Load) -> Self {
        self.join(other, |a, b| a * b)
    }

    pub fn multiply_by(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    /// Elementwise division where 0/0 is 0
    pub fn divide(&self, other: &Load) -> Self {
        self.join(other, divide)
    }

    pub fn divide_by(&self, divisor: f64) -> Self {
        self.map(|v| divide(v, divisor))
    }

    /// The load these resources represent relative to the given node resources
    pub fn divide_resources(&self, resources: &NodeResources) -> Self {
        Self::of(
            divide(self.cpu, resources.vcpu),
            divide(self.memory, resources.memory_gb),
            divide(self.disk, resources.disk_gb),
        )
    }

    /// Scales the numeric resources of the given node by this load
    pub fn scaled(&self, resources: &NodeResources) -> NodeResources {
        resources
            .with_vcpu(self.cpu * resources.vcpu)
            .with_memory_gb(self.memory * resources.memory_gb)
            .with_disk_gb(self.disk * resources.disk_gb)
    }

    /// Combines two loads dimension by dimension
    pub fn join(&self, other: &Load, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::of(
            f(self.cpu, other.cpu),
            f(self.memory, other.memory),
            f(self.disk, other.disk),
        )
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::of(f(self.cpu), f(self.memory), f(self.disk))
    }

    /// Whether any dimension matches the predicate
    pub fn any(&self, predicate: impl Fn(f64) -> bool) -> bool {
        predicate(self.cpu) || predicate(self.memory) || predicate(self.disk)
    }
}

impl Add for Load {
    type Output = Load;

    fn add(self, other: Load) -> Load {
        Load::add(&self, &other)
    }
}

impl Mul for Load {
    type Output = Load;

    fn mul(self, other: Load) -> Load {
        self.multiply(&other)
    }
}

impl Div for Load {
    type Output = Load;

    fn div(self, other: Load) -> Load {
        self.divide(&other)
    }
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "load: cpu {:.3}, memory {:.3}, disk {:.3}",
            self.cpu, self.memory, self.disk
        )
    }
}

/// Division with 0/0 = 0
pub fn divide(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    a / b
}

fn validate(dimension: Dimension, value: f64) -> Result<f64, LoadError> {
    if value.is_nan() || value < 0.0 {
        return Err(LoadError::InvalidArgument { dimension, value });
    }
    Ok(value)
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(cpu: f64, memory: f64, disk: f64) -> Load {
        Load::new(cpu, memory, disk).unwrap()
    }

    #[test]
    fn test_rejects_nan_and_negative() {
        assert!(matches!(
            Load::new(f64::NAN, 0.0, 0.0),
            Err(LoadError::InvalidArgument {
                dimension: Dimension::Cpu,
                ..
            })
        ));
        assert!(Load::new(0.5, -0.1, 0.0).is_err());
        assert!(Load::new(0.5, 0.1, f64::NAN).is_err());
        assert!(Load::new(0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_invalid_argument_names_dimension() {
        let err = Load::new(0.5, -0.1, 0.0).unwrap_err();
        assert_eq!(
            err,
            LoadError::InvalidArgument {
                dimension: Dimension::Memory,
                value: -0.1
            }
        );
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn test_divide_by_itself_is_one() {
        for (a, b, c) in [(0.3, 0.5, 0.9), (1.0, 2.0, 3.0), (1e-9, 1e9, 42.0)] {
            let l = load(a, b, c);
            assert_eq!(l.divide(&l), Load::one());
        }
    }

    #[test]
    fn test_zero_divided_by_zero_is_zero() {
        assert_eq!(Load::zero().divide(&Load::zero()), Load::zero());
        assert_eq!(load(0.0, 0.5, 0.0).divide(&load(0.0, 0.5, 0.0)), load(0.0, 1.0, 0.0));
        assert_eq!(Load::zero().divide_by(0.0), Load::zero());
    }

    #[test]
    fn test_arithmetic() {
        let a = load(0.2, 0.4, 0.6);
        let b = load(0.1, 0.1, 0.2);
        let sum = a + b;
        assert!((sum.cpu() - 0.3).abs() < 1e-12);
        assert!((sum.memory() - 0.5).abs() < 1e-12);
        assert!((sum.disk() - 0.8).abs() < 1e-12);
        assert_eq!(a * Load::one(), a);
        assert!(((a / b).disk() - 3.0).abs() < 1e-12);
        assert_eq!(a.multiply_by(0.0), Load::zero());
    }

    #[test]
    fn test_scaled_and_divide_resources() {
        let resources = NodeResources::new(4.0, 16.0, 100.0, 1.0);
        let scaled = load(0.5, 0.25, 2.0).scaled(&resources);
        assert_eq!(scaled.vcpu, 2.0);
        assert_eq!(scaled.memory_gb, 4.0);
        assert_eq!(scaled.disk_gb, 200.0);
        assert_eq!(scaled.bandwidth_gbps, 1.0);

        let relative = load(2.0, 4.0, 0.0).divide_resources(&NodeResources::new(4.0, 16.0, 0.0, 1.0));
        assert_eq!(relative, load(0.5, 0.25, 0.0));
    }

    #[test]
    fn test_map_clamps_to_valid_values() {
        let l = load(0.5, 0.5, 0.5).map(|v| v - 1.0);
        assert_eq!(l, Load::zero());
        assert!(load(0.5, 1.5, 0.2).any(|v| v > 1.0));
        assert!(!load(0.5, 0.5, 0.2).any(|v| v > 1.0));
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&load(0.1, 0.2, 0.3)).unwrap();
        assert_eq!(json, r#"{"cpu":0.1,"memory":0.2,"disk":0.3}"#);
        assert!(serde_json::from_str::<Load>(r#"{"cpu":-1,"memory":0,"disk":0}"#).is_err());
    }
}
