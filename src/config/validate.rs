// src/config/validate.rs

use crate::config::model::{AppSection, ConfigFile, ExecutorSection, LimitsSection, RawConfigFile};
use crate::errors::{Result, StageflowError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StageflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_executor(&raw.executor)?;
        validate_limits(&raw.limits)?;
        validate_app(&raw.app)?;
        Ok(ConfigFile::new_unchecked(raw.executor, raw.limits, raw.app))
    }
}

fn validate_executor(section: &ExecutorSection) -> Result<()> {
    // conflict_policy is validated during deserialization.
    if section.max_loop_iterations == 0 {
        return Err(StageflowError::Config(
            "[executor].max_loop_iterations must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_limits(section: &LimitsSection) -> Result<()> {
    let limits = [
        ("max_data", section.max_data),
        ("max_pipelines", section.max_pipelines),
        ("max_tasks", section.max_tasks),
    ];
    for (key, value) in limits {
        if value == 0 {
            return Err(StageflowError::Config(format!(
                "[limits].{key} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn validate_app(section: &AppSection) -> Result<()> {
    if section.frames == 0 {
        return Err(StageflowError::Config(
            "[app].frames must be >= 1 (got 0)".to_string(),
        ));
    }
    if !section.frame_rate.is_finite() || section.frame_rate < 0.0 {
        return Err(StageflowError::Config(format!(
            "[app].frame_rate must be a finite number >= 0 (got {})",
            section.frame_rate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.app.frames, 120);
        assert_eq!(cfg.executor_options().max_loop_iterations, 1024);
        assert_eq!(cfg.limits().max_pipelines, 4096);
    }

    #[test]
    fn rejects_zero_loop_limit() {
        let mut raw = RawConfigFile::default();
        raw.executor.max_loop_iterations = 0;
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("max_loop_iterations"));
    }

    #[test]
    fn rejects_bad_frame_rates() {
        for rate in [-1.0, f64::NAN, f64::INFINITY] {
            let mut raw = RawConfigFile::default();
            raw.app.frame_rate = rate;
            assert!(ConfigFile::try_from(raw).is_err(), "rate {rate} accepted");
        }
    }
}
