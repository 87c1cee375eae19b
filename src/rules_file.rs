//! Rule list persistence.
//!
//! ```toml
//! [[rule]]
//! match = "^\\d+ - "
//! replacement = "Chapter {nn}: "
//! ```

use std::fs;
use std::path::Path;

use crate::error::RulesFileError;
use crate::rewrite::{PatternRule, RulePipeline};

pub const RULE_SEPARATOR: &str = "=>";

pub fn load(path: &Path) -> Result<RulePipeline, RulesFileError> {
    let content = fs::read_to_string(path).map_err(|source| RulesFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let pipeline: RulePipeline = toml::from_str(&content).map_err(|source| RulesFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Loaded {} rules from {}", pipeline.len(), path.display());
    Ok(pipeline)
}

pub fn save(path: &Path, pipeline: &RulePipeline) -> Result<(), RulesFileError> {
    let content = toml::to_string(pipeline)?;
    fs::write(path, content).map_err(|source| RulesFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Saved {} rules to {}", pipeline.len(), path.display());
    Ok(())
}

/// Parses a `PATTERN=>REPLACEMENT` command line rule. The first separator wins.
pub fn parse_rule_arg(arg: &str) -> Result<PatternRule, RulesFileError> {
    arg.split_once(RULE_SEPARATOR)
        .map(|(pattern, replacement)| PatternRule::new(pattern, replacement))
        .ok_or_else(|| RulesFileError::MissingSeparator(arg.to_string()))
}
