//! Iteration logging helpers for `<log_dir>/runs/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IterationMeta {
    pub run_id: String,
    pub iteration: u32,
    pub role: String,
    pub success: bool,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

impl IterationMeta {
    pub fn new(
        run_id: &str,
        iteration: u32,
        role: &str,
        success: bool,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            run_id: run_id.to_string(),
            iteration,
            role: role.to_string(),
            success,
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ended_at: ended_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub report_path: PathBuf,
    pub code_path: PathBuf,
}

impl IterationPaths {
    pub fn new(log_dir: &Path, run_id: &str, iteration: u32) -> Self {
        let dir = log_dir
            .join("runs")
            .join(run_id)
            .join(iteration.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            report_path: dir.join("report.md"),
            code_path: dir.join("code.txt"),
            dir,
        }
    }
}

pub struct IterationWriteRequest<'a> {
    pub log_dir: &'a Path,
    pub meta: &'a IterationMeta,
    pub report: &'a str,
    pub code: Option<&'a str>,
}

/// Identifier for a develop run: the UTC start time to the millisecond.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

pub fn write_iteration(request: &IterationWriteRequest<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(request.log_dir, &request.meta.run_id, request.meta.iteration);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_text(&paths.report_path, request.report)?;
    if let Some(code) = request.code {
        write_text(&paths.code_path, code)?;
    }

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn iteration_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), "run-1", 3);

        assert!(paths.dir.ends_with(Path::new("runs/run-1/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.report_path.ends_with("report.md"));
        assert!(paths.code_path.ends_with("code.txt"));
    }

    #[test]
    fn meta_records_duration() {
        let meta = IterationMeta::new("run", 2, "Debugger", false, at(0), at(3));
        assert_eq!(meta.duration_ms, 3000);
        assert!(meta.started_at.ends_with('Z'));
    }

    #[test]
    fn run_id_is_a_utc_timestamp() {
        assert_eq!(new_run_id(at(0)), "20251009T085320.000Z");
    }

    #[test]
    fn runs_in_the_same_second_get_distinct_ids() {
        let first = Utc.timestamp_millis_opt(1_760_000_000_000).unwrap();
        let second = Utc.timestamp_millis_opt(1_760_000_000_250).unwrap();
        assert_ne!(new_run_id(first), new_run_id(second));
        assert_eq!(new_run_id(second), "20251009T085320.250Z");
    }

    #[test]
    fn writes_iteration_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = IterationMeta::new("run-9", 1, "Developer", true, at(0), at(1));

        let paths = write_iteration(&IterationWriteRequest {
            log_dir: temp.path(),
            meta: &meta,
            report: "Test result: success",
            code: Some("print('hi')"),
        })
        .expect("write logs");

        let raw = fs::read_to_string(&paths.meta_path).expect("meta");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["iteration"], 1);
        assert_eq!(value["success"], true);
        assert_eq!(value["role"], "Developer");
        assert_eq!(
            fs::read_to_string(&paths.report_path).expect("report"),
            "Test result: success"
        );
        assert_eq!(fs::read_to_string(&paths.code_path).expect("code"), "print('hi')");
    }

    #[test]
    fn code_file_is_optional() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = IterationMeta::new("run-9", 2, "Debugger", false, at(0), at(0));

        let paths = write_iteration(&IterationWriteRequest {
            log_dir: temp.path(),
            meta: &meta,
            report: "Test result: failure",
            code: None,
        })
        .expect("write logs");
        assert!(paths.meta_path.is_file());
        assert!(!paths.code_path.exists());
    }
}
