//! Compiled class-name pattern lists

use crate::config::LeakConfig;
use crate::error::{HeapError, Result};
use regex::RegexSet;

/// One configured pattern list, matched as a whole against a class name
#[derive(Debug, Clone)]
pub struct ClassPatterns {
    set: RegexSet,
}

impl ClassPatterns {
    pub fn new(list: &str, patterns: &[String]) -> Result<Self> {
        let set = RegexSet::new(patterns)
            .map_err(|e| HeapError::InvalidConfig(format!("{}: {}", list, e)))?;
        Ok(Self { set })
    }

    /// An empty list matches nothing
    pub fn matches(&self, class_name: &str) -> bool {
        self.set.is_match(class_name)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Every pattern list of a [`LeakConfig`], compiled once
#[derive(Debug, Clone)]
pub struct PatternBook {
    pub singleton: ClassPatterns,
    pub noise: ClassPatterns,
    pub interesting: ClassPatterns,
    pub lifecycle: ClassPatterns,
    pub runtime: ClassPatterns,
    pub string: ClassPatterns,
}

impl PatternBook {
    pub fn compile(config: &LeakConfig) -> Result<Self> {
        Ok(Self {
            singleton: ClassPatterns::new("singleton_patterns", &config.singleton_patterns)?,
            noise: ClassPatterns::new("noise_patterns", &config.noise_patterns)?,
            interesting: ClassPatterns::new("interesting_patterns", &config.interesting_patterns)?,
            lifecycle: ClassPatterns::new("lifecycle_patterns", &config.lifecycle_patterns)?,
            runtime: ClassPatterns::new("runtime_class_patterns", &config.runtime_class_patterns)?,
            string: ClassPatterns::new("string_class_patterns", &config.string_class_patterns)?,
        })
    }
}
