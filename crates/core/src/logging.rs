use std::{fs, path::PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_LOG_RETENTION_FILES: usize = 14;
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "framesmooth";
pub const DEFAULT_LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingInitOptions {
    pub data_dir: Option<PathBuf>,
    pub verbose: u8,
    pub cli_log_filter: Option<String>,
    pub rust_log_env: Option<String>,
    pub default_log_filter: String,
    pub retention_files: usize,
}

impl Default for LoggingInitOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            verbose: 0,
            cli_log_filter: None,
            rust_log_env: None,
            default_log_filter: DEFAULT_LOG_FILTER.to_string(),
            retention_files: DEFAULT_LOG_RETENTION_FILES,
        }
    }
}

#[derive(Debug)]
pub struct LoggingInitPlan {
    pub filter: String,
    pub file_sink: FileSinkPlan,
}

#[derive(Debug)]
pub enum FileSinkPlan {
    Ready(ReadyFileSinkPlan),
    Fallback(FallbackFileSinkPlan),
}

#[derive(Debug)]
pub struct ReadyFileSinkPlan {
    pub log_dir: PathBuf,
    pub retention_files: usize,
    pub appender: RollingFileAppender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFileSinkPlan {
    pub attempted_log_dir: Option<PathBuf>,
    pub retention_files: usize,
    pub reason: String,
}

impl FileSinkPlan {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn log_dir(&self) -> Option<&PathBuf> {
        match self {
            Self::Ready(plan) => Some(&plan.log_dir),
            Self::Fallback(plan) => plan.attempted_log_dir.as_ref(),
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Fallback(plan) => Some(plan.reason.as_str()),
        }
    }
}

pub fn compose_logging_init_plan(options: &LoggingInitOptions) -> LoggingInitPlan {
    LoggingInitPlan {
        filter: select_log_filter(options),
        file_sink: build_file_sink_plan(options),
    }
}

/// `--log-filter` wins, then `-v`/`-vv`, then `RUST_LOG`, then the default.
pub fn select_log_filter(options: &LoggingInitOptions) -> String {
    if let Some(filter) = options.cli_log_filter.as_deref() {
        filter.to_string()
    } else if options.verbose >= 2 {
        "trace".to_string()
    } else if options.verbose == 1 {
        "debug".to_string()
    } else if let Some(filter) = options.rust_log_env.as_deref() {
        filter.to_string()
    } else {
        options.default_log_filter.clone()
    }
}

pub fn build_file_sink_plan(options: &LoggingInitOptions) -> FileSinkPlan {
    let retention_files = normalize_retention_files(options.retention_files);

    let Some(data_dir) = options.data_dir.as_deref() else {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: None,
            retention_files,
            reason: "file sink disabled: data_dir is not configured".to_string(),
        });
    };

    let log_dir = data_dir.join(DEFAULT_LOG_DIR_NAME);
    if let Err(error) = fs::create_dir_all(&log_dir) {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to create log directory: {error}"),
        });
    }

    let appender_builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(DEFAULT_LOG_FILE_PREFIX)
        .filename_suffix(DEFAULT_LOG_FILE_SUFFIX)
        .max_log_files(retention_files);

    match appender_builder.build(&log_dir) {
        Ok(appender) => FileSinkPlan::Ready(ReadyFileSinkPlan {
            log_dir,
            retention_files,
            appender,
        }),
        Err(error) => FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to initialize rolling file sink: {error}"),
        }),
    }
}

fn normalize_retention_files(retention_files: usize) -> usize {
    if retention_files == 0 {
        DEFAULT_LOG_RETENTION_FILES
    } else {
        retention_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn cli_log_filter_overrides_everything() {
        let options = LoggingInitOptions {
            verbose: 2,
            cli_log_filter: Some("framesmooth_core=trace".to_string()),
            rust_log_env: Some("error".to_string()),
            ..Default::default()
        };
        assert_eq!(select_log_filter(&options), "framesmooth_core=trace");
    }

    #[test]
    fn verbose_flags_map_to_debug_and_trace() {
        let debug = LoggingInitOptions {
            verbose: 1,
            rust_log_env: Some("warn".to_string()),
            ..Default::default()
        };
        let trace = LoggingInitOptions {
            verbose: 3,
            ..Default::default()
        };
        assert_eq!(select_log_filter(&debug), "debug");
        assert_eq!(select_log_filter(&trace), "trace");
    }

    #[test]
    fn rust_log_env_used_when_no_cli_or_verbose() {
        let options = LoggingInitOptions {
            rust_log_env: Some("warn,framesmooth_core=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(select_log_filter(&options), "warn,framesmooth_core=debug");
        assert_eq!(select_log_filter(&LoggingInitOptions::default()), "info");
    }

    #[test]
    fn file_sink_uses_default_log_dir_under_data_dir() {
        let data_dir = tempdir().expect("tempdir");
        let options = LoggingInitOptions {
            data_dir: Some(data_dir.path().to_path_buf()),
            retention_files: 0,
            ..Default::default()
        };

        let plan = build_file_sink_plan(&options);
        let expected_log_dir = data_dir.path().join(DEFAULT_LOG_DIR_NAME);

        match plan {
            FileSinkPlan::Ready(ready) => {
                assert_eq!(ready.log_dir, expected_log_dir);
                assert_eq!(ready.retention_files, DEFAULT_LOG_RETENTION_FILES);
                assert!(ready.log_dir.exists());
            }
            FileSinkPlan::Fallback(fallback) => panic!(
                "expected ready file sink, got fallback: {}",
                fallback.reason
            ),
        }
    }

    #[test]
    fn file_sink_is_disabled_without_data_dir() {
        let plan = compose_logging_init_plan(&LoggingInitOptions::default());
        assert_eq!(plan.filter, DEFAULT_LOG_FILTER);
        assert!(!plan.file_sink.is_ready());
        assert!(plan.file_sink.log_dir().is_none());
        assert!(plan
            .file_sink
            .fallback_reason()
            .is_some_and(|reason| reason.contains("data_dir")));
    }

    #[test]
    fn file_sink_falls_back_when_log_dir_cannot_be_created() {
        let data_dir_file = NamedTempFile::new().expect("named temp file");
        let options = LoggingInitOptions {
            data_dir: Some(data_dir_file.path().to_path_buf()),
            ..Default::default()
        };

        let plan = build_file_sink_plan(&options);
        let expected_log_dir = data_dir_file.path().join(DEFAULT_LOG_DIR_NAME);

        match plan {
            FileSinkPlan::Ready(_) => panic!("expected fallback file sink"),
            FileSinkPlan::Fallback(fallback) => {
                assert_eq!(fallback.attempted_log_dir, Some(expected_log_dir));
                assert_eq!(fallback.retention_files, DEFAULT_LOG_RETENTION_FILES);
                assert!(fallback.reason.contains("failed to create log directory"));
            }
        }
    }
}
