//! Run identifiers: `YYYYMMDD_HHMMSS_xxxxxx` (UTC timestamp + random suffix).

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};

const SUFFIX_LEN: usize = 6;

/// Generate a fresh run id for the current instant.
pub fn generate_run_id() -> String {
    build_run_id(&Utc::now(), &generate_suffix())
}

pub fn build_run_id(now: &DateTime<Utc>, suffix: &str) -> String {
    format!("{}_{suffix}", now.format("%Y%m%d_%H%M%S"))
}

fn generate_suffix() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(SUFFIX_LEN)
        .collect::<String>()
        .to_lowercase()
}

/// Reject ids that could escape the workspace root when joined as a path.
pub fn validate_run_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("run id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("run id must not contain path separators");
    }
    if id.contains("..") {
        bail!("run id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("run id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_uses_expected_format() {
        let now = Utc.with_ymd_and_hms(2026, 1, 18, 12, 0, 0).unwrap();
        assert_eq!(build_run_id(&now, "abc123"), "20260118_120000_abc123");
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let first = generate_run_id();
        let second = generate_run_id();
        validate_run_id(&first).expect("first valid");
        validate_run_id(&second).expect("second valid");
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("a/b").is_err());
        assert!(validate_run_id(".stager").is_err());
        assert!(validate_run_id("Run").is_err());
    }
}
