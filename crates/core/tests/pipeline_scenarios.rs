use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use monospace_core::configs::monospace::{parse_monospace_config, save_monospace_config};
use monospace_core::execution::{CancelToken, JobState, NoopObserver};
use monospace_core::output::{Multiplexer, OutputMode};
use monospace_core::types::MonospaceError;
use monospace_core::workspace_manager::{RunOptions, WorkspaceManager, WorkspaceManagerConfig};

type TestResult = Result<(), Box<dyn Error>>;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().map(|b| b.clone()).unwrap_or_default()).into_owned()
    }
}

fn workspace(root: &Path, yaml: &str) -> Result<WorkspaceManager, Box<dyn Error>> {
    let config = parse_monospace_config(yaml)?;
    for project in config.projects.keys() {
        std::fs::create_dir_all(root.join(project))?;
    }
    save_monospace_config(root, &config)?;
    Ok(WorkspaceManager::new(WorkspaceManagerConfig {
        workspace_root: root.to_path_buf(),
    })?)
}

fn options(tasks: &[&str]) -> RunOptions {
    RunOptions {
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
        ..RunOptions::default()
    }
}

#[cfg(unix)]
#[tokio::test]
async fn bare_task_fans_out_over_every_project() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
  apps/b: internal
pipeline:
  build:
    cmd: ["echo", "hi"]
"#,
    )?;

    let buffer = SharedBuffer::default();
    let mut output = Multiplexer::new(OutputMode::Grouped, false, Box::new(buffer.clone()));
    let report = manager
        .run(&options(&["build"]), &mut output, CancelToken::new())
        .await?;

    assert!(report.is_success());
    let names: Vec<&str> = report.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["apps/a#build", "apps/b#build"]);

    let text = buffer.text();
    assert!(text.starts_with("Starting 2 tasks...\n"));
    assert_eq!(text.matches("    hi\n").count(), 2);
    assert!(text.contains("Tasks: ✔ 2 succeeded / 0 failed / 2 total\n"));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn dependencies_complete_before_dependents_start() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
pipeline:
  test:
    cmd: ["true"]
  build:
    cmd: ["true"]
    depends_on: [test]
"#,
    )?;

    let report = manager
        .run(&options(&["build"]), &mut NoopObserver, CancelToken::new())
        .await?;

    let test = report.job("apps/a#test").ok_or("test job missing")?;
    let build = report.job("apps/a#build").ok_or("build job missing")?;
    assert_eq!(test.state, JobState::Succeeded);
    assert_eq!(build.state, JobState::Succeeded);
    assert!(test.finished_at.ok_or("test never finished")? <= build.started_at.ok_or("build never started")?);
    Ok(())
}

#[tokio::test]
async fn cyclic_pipeline_is_refused() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
pipeline:
  a:
    cmd: ["true"]
    depends_on: [b]
  b:
    cmd: ["true"]
    depends_on: [a]
"#,
    )?;

    assert!(!manager.pipeline.is_acyclic());
    let err = manager
        .run(&options(&["a"]), &mut NoopObserver, CancelToken::new())
        .await
        .err()
        .ok_or("run should fail")?;
    assert!(matches!(err, MonospaceError::Pipeline(_)));
    assert!(err.to_string().contains("cyclic dependency"));
    assert!(manager.save().is_err());
    Ok(())
}

#[test]
fn wildcard_definitions_are_specialized_per_project() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/foo: internal
  apps/bar: internal
pipeline:
  "*#test":
    cmd: ["true"]
  "apps/foo#test":
    cmd: ["make", "test"]
"#,
    )?;

    let list = manager.resolve(&["test".to_string()], &[])?;
    let foo = list.get("apps/foo#test").ok_or("apps/foo#test missing")?;
    let bar = list.get("apps/bar#test").ok_or("apps/bar#test missing")?;
    assert_eq!(foo.def.cmd, vec!["make", "test"]);
    assert_eq!(bar.def.cmd, vec!["true"]);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn failure_is_quarantined_to_dependents() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
pipeline:
  test:
    cmd: ["false"]
  build:
    cmd: ["true"]
    depends_on: [test]
  lint:
    cmd: ["true"]
"#,
    )?;

    let buffer = SharedBuffer::default();
    let mut output = Multiplexer::new(OutputMode::Grouped, false, Box::new(buffer.clone()));
    let report = manager
        .run(&options(&["build", "lint"]), &mut output, CancelToken::new())
        .await?;

    assert!(!report.is_success());
    let state = |name: &str| report.job(name).map(|j| j.state);
    assert_eq!(state("apps/a#lint"), Some(JobState::Succeeded));
    assert_eq!(state("apps/a#test"), Some(JobState::Failed));
    assert_eq!(state("apps/a#build"), Some(JobState::Skipped));
    assert!(report.job("apps/a#build").and_then(|j| j.started_at).is_none());
    assert!(buffer
        .text()
        .contains("Tasks: ✘ 1 succeeded / 1 failed / 2 total (1 skipped)\n"));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn exec_runs_once_per_filtered_project() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
  apps/b: internal
  tools/c: local
"#,
    )?;

    let buffer = SharedBuffer::default();
    let mut output = Multiplexer::new(OutputMode::Interleaved, false, Box::new(buffer.clone()));
    let argv = vec!["sh".to_string(), "-c".to_string(), "echo $MONOSPACE_PROJECT".to_string()];
    let report = manager
        .exec(&argv, &["apps/*".to_string()], 2, &mut output, CancelToken::new())
        .await?;

    assert!(report.is_success());
    assert_eq!(report.jobs.len(), 2);
    let text = buffer.text();
    assert!(text.contains("apps/a: apps/a\n"));
    assert!(text.contains("apps/b: apps/b\n"));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn task_env_reaches_the_process() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = workspace(
        dir.path(),
        r#"
projects:
  apps/a: internal
pipeline:
  show:
    cmd: ["sh", "-c", "echo $GREETING $MONOSPACE_TASK; pwd"]
    env:
      GREETING: hello
"#,
    )?;

    let buffer = SharedBuffer::default();
    let mut output = Multiplexer::new(OutputMode::Interleaved, false, Box::new(buffer.clone()));
    let report = manager
        .run(&options(&["show"]), &mut output, CancelToken::new())
        .await?;

    assert!(report.is_success());
    let text = buffer.text();
    assert!(text.contains("apps/a#show: hello show\n"));
    assert!(text.contains("apps/a\n"));
    Ok(())
}
