//! Analysis tunables
//!
//! Every threshold and class-name pattern list used by the pipeline lives
//! here as data, so heuristics can be retuned without touching algorithms.
//!
//! # Example heaplens.toml
//!
//! ```toml
//! dominator_iteration_cap = 32
//! field_order = "descendant_first"
//!
//! [leaks]
//! accumulation_min_retained = 4194304
//! lifecycle_patterns = ["Activity$", "Fragment$", "Dialog$"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Order in which inherited fields are concatenated into an instance layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
    /// The instance's own class first, then each super class up the chain
    DescendantFirst,
    /// The root of the hierarchy first, the instance's own class last
    AncestorFirst,
}

/// Text encodings tried when decoding a `byte[]` string backing array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Utf16Be,
    Latin1,
}

/// Hard caps that turn pathological inputs into an explicit error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of decoded objects (classes, instances and arrays)
    pub max_objects: usize,
    /// Maximum number of coalesced reference edges
    pub max_edges: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_objects: 64 * 1024 * 1024,
            max_edges: 512 * 1024 * 1024,
        }
    }
}

/// Leak heuristic thresholds and class-name pattern lists
///
/// Pattern lists are regular expressions matched against normalized class
/// names (`com.example.Foo$Inner`, `byte[]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakConfig {
    /// Classes expected to have at most one live instance
    pub singleton_patterns: Vec<String>,
    /// Runtime and plumbing classes a holder chain walks through reluctantly
    pub noise_patterns: Vec<String>,
    /// UI and business classes a holder chain stops at
    pub interesting_patterns: Vec<String>,
    /// Component classes that must never be pinned by static state
    pub lifecycle_patterns: Vec<String>,
    /// Runtime and library classes whose static fields are not reported
    pub runtime_class_patterns: Vec<String>,
    /// Classes treated as strings by the duplicate-content scan
    pub string_class_patterns: Vec<String>,

    /// Absolute retained-size floor for accumulation points (bytes)
    pub accumulation_min_retained: u64,
    /// Retained / shallow ratio floor for accumulation points
    pub accumulation_min_ratio: f64,
    /// Retained-size floor for objects held by static fields (bytes)
    pub static_holder_min_retained: u64,
    /// Primitive arrays at least this large get their owner explained
    pub large_array_threshold: u64,
    /// Maximum number of referrer hops in a holder chain
    pub holder_chain_max_depth: usize,

    /// Candidate decodings for `byte[]` backing arrays, tried in order
    pub byte_encodings: Vec<TextEncoding>,
    /// Minimum number of identical strings to report a group
    pub min_duplicate_strings: usize,
    /// Maximum characters kept for a duplicate string's preview
    pub max_string_preview: usize,

    /// Maximum suspects emitted by each individual scan
    pub max_suspects_per_scan: usize,
}

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            singleton_patterns: patterns(&[
                "(?i)singleton",
                "Manager$",
                "Repository$",
                "Registry$",
                "Application$",
            ]),
            noise_patterns: patterns(&[
                r"^java\.lang\.ref\.",
                r"^java\.util\.",
                r"^java\.lang\.Object\[\]$",
                r"^kotlin\.",
                r"^kotlinx\.",
                r"^android\.util\.",
                r"^dalvik\.",
                r"^libcore\.",
                r"^sun\.",
                r"^jdk\.internal\.",
                r"\$\$Lambda",
            ]),
            interesting_patterns: patterns(&[
                "(Activity|Fragment|View|Dialog|Adapter|Presenter|ViewModel)$",
                "(Manager|Service|Repository|Cache|Controller)$",
                r"^android\.graphics\.Bitmap$",
            ]),
            lifecycle_patterns: patterns(&["Activity$", "Fragment$"]),
            runtime_class_patterns: patterns(&[
                r"^java\.",
                r"^javax\.",
                r"^jdk\.",
                r"^sun\.",
                r"^android\.",
                r"^androidx\.",
                r"^com\.android\.",
                r"^com\.google\.android\.",
                r"^kotlin\.",
                r"^kotlinx\.",
                r"^dalvik\.",
                r"^libcore\.",
            ]),
            string_class_patterns: patterns(&[r"^java\.lang\.String$"]),

            accumulation_min_retained: 1024 * 1024,
            accumulation_min_ratio: 10.0,
            static_holder_min_retained: 256 * 1024,
            large_array_threshold: 1024 * 1024,
            holder_chain_max_depth: 16,

            byte_encodings: vec![TextEncoding::Utf8, TextEncoding::Latin1],
            min_duplicate_strings: 2,
            max_string_preview: 120,

            max_suspects_per_scan: 25,
        }
    }
}

/// Top-level analysis configuration
///
/// # Example
/// ```
/// use heaplens::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.dominator_iteration_cap, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Identifier width to use instead of the header-declared one (4 or 8)
    pub id_size_override: Option<u32>,
    /// Inherited field concatenation order for instance layouts
    pub field_order: FieldOrder,
    /// Abort on a malformed heap-dump sub-record instead of abandoning the segment
    pub strict: bool,
    /// Maximum passes of the approximate dominator assignment
    pub dominator_iteration_cap: usize,
    /// Number of entries in the retained-size ranked object table
    pub top_retained_objects: usize,
    pub limits: ResourceLimits,
    pub leaks: LeakConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            id_size_override: None,
            field_order: FieldOrder::DescendantFirst,
            strict: false,
            dominator_iteration_cap: 16,
            top_retained_objects: 50,
            limits: ResourceLimits::default(),
            leaks: LeakConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Fail on any malformed sub-record and iterate dominators longer
    pub fn strict() -> Self {
        Self {
            strict: true,
            dominator_iteration_cap: 64,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load configuration from a TOML string; omitted keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(width) = self.id_size_override {
            if width != 4 && width != 8 {
                return Err(format!("id_size_override must be 4 or 8, got {}", width));
            }
        }

        if self.dominator_iteration_cap == 0 {
            return Err("dominator_iteration_cap must be >= 1".to_string());
        }

        if self.limits.max_objects == 0 || self.limits.max_edges == 0 {
            return Err("resource limits must be non-zero".to_string());
        }

        let leaks = &self.leaks;
        if leaks.accumulation_min_ratio.is_nan() || leaks.accumulation_min_ratio <= 0.0 {
            return Err(format!(
                "accumulation_min_ratio must be positive, got {}",
                leaks.accumulation_min_ratio
            ));
        }

        if leaks.holder_chain_max_depth == 0 {
            return Err("holder_chain_max_depth must be >= 1".to_string());
        }

        if leaks.min_duplicate_strings < 2 {
            return Err(format!(
                "min_duplicate_strings must be >= 2, got {}",
                leaks.min_duplicate_strings
            ));
        }

        for list in [
            &leaks.singleton_patterns,
            &leaks.noise_patterns,
            &leaks.interesting_patterns,
            &leaks.lifecycle_patterns,
            &leaks.runtime_class_patterns,
            &leaks.string_class_patterns,
        ] {
            if let Err(e) = regex::RegexSet::new(list) {
                return Err(format!("invalid class pattern: {}", e));
            }
        }

        Ok(())
    }
}
