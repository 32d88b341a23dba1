//! Error and deployment line extraction from console logs.
//!
//! Markers from [`ScrapePatterns`] are each wrapped as `.*?<marker>.*?`,
//! joined into one alternation and terminated by `\n`. `.` never crosses a
//! newline, so every match is the body of one log line; a final line
//! without a trailing newline is not matched.

use regex::Regex;

use crate::config::{NamedPattern, ScrapePatterns};
use crate::error::{ConfigError, ConfigResult};

/// Compiled scraper; cheap to share and safe to call concurrently.
#[derive(Debug, Clone)]
pub struct LogScraper {
    errors: Option<Regex>,
    deployments: Option<Regex>,
}

fn compile(patterns: &[NamedPattern]) -> ConfigResult<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut alternatives = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let alternative = format!(".*?{}.*?", pattern.marker);
        Regex::new(&alternative).map_err(|source| ConfigError::InvalidPattern {
            name: pattern.name.clone(),
            source,
        })?;
        alternatives.push(alternative);
    }

    let joined = format!("({})\n", alternatives.join("|"));
    Regex::new(&joined)
        .map(Some)
        .map_err(|source| ConfigError::InvalidPattern {
            name: "alternation".to_string(),
            source,
        })
}

fn captures(regex: Option<&Regex>, text: &str) -> Vec<String> {
    let Some(regex) = regex else {
        return Vec::new();
    };
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

impl LogScraper {
    pub fn new(patterns: &ScrapePatterns) -> ConfigResult<Self> {
        Ok(Self {
            errors: compile(&patterns.errors)?,
            deployments: compile(&patterns.deployments)?,
        })
    }

    /// Lines matching any error marker, in log order, duplicates kept.
    pub fn scrape_errors(&self, text: &str) -> Vec<String> {
        captures(self.errors.as_ref(), text)
    }

    /// Lines matching any deployment marker, in log order, duplicates kept.
    pub fn scrape_deployments(&self, text: &str) -> Vec<String> {
        captures(self.deployments.as_ref(), text)
    }
}
