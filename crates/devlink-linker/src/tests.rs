use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use devlink_core::LinkError;
use devlink_project::LinkSettings;
use serde_json::Value;

use super::*;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_project_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "devlink-linker-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    fs::canonicalize(&path).expect("must canonicalize test root")
}

fn seed_project(root: &Path, manifest: &str, lock: Option<&str>) {
    fs::write(root.join("composer.json"), manifest).expect("must write manifest");
    if let Some(lock) = lock {
        fs::write(root.join("composer.lock"), lock).expect("must write lock");
    }
}

fn write_candidate(root: &Path, dir: &str, name: &str) -> PathBuf {
    let package_dir = root.join("dev-packages").join(dir);
    fs::create_dir_all(&package_dir).expect("must create package dir");
    fs::write(
        package_dir.join("composer.json"),
        format!("{{\"name\": \"{name}\"}}"),
    )
    .expect("must write candidate");
    package_dir
}

fn linker(root: &Path, executor: RecordingExecutor) -> DevLinker<RecordingExecutor> {
    let layout = ProjectLayout::new(root, &LinkSettings::default());
    DevLinker::new(layout, "composer", executor)
}

#[derive(Debug, Default)]
enum StubBehavior {
    #[default]
    Succeed,
    ExitWith(i32, &'static str),
    FailLaunch,
    Panic,
    DeleteProject,
    Interrupt(InterruptFlag),
}

#[derive(Debug, Default)]
struct RecordingExecutor {
    behavior: StubBehavior,
    touch_lock: bool,
    commands: Vec<ResolverCommand>,
    manifests_seen: Vec<String>,
}

impl RecordingExecutor {
    fn with(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }
}

impl ProcessExecutor for RecordingExecutor {
    fn execute(&mut self, command: &ResolverCommand) -> devlink_core::Result<ProcessOutput> {
        self.commands.push(command.clone());
        self.manifests_seen.push(
            fs::read_to_string(command.working_dir.join("composer.json"))
                .expect("mutated manifest must be on disk"),
        );
        if self.touch_lock {
            fs::write(command.working_dir.join("composer.lock"), "{\"resolved\": true}")
                .expect("must write lock");
        }

        match &self.behavior {
            StubBehavior::Succeed => Ok(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
            StubBehavior::ExitWith(exit_code, stderr) => Ok(ProcessOutput {
                exit_code: *exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            StubBehavior::FailLaunch => Err(LinkError::ResolverLaunch {
                command: command.command_line(),
                source: io::Error::new(io::ErrorKind::NotFound, "composer not found"),
            }),
            StubBehavior::Panic => panic!("resolver crashed"),
            StubBehavior::Interrupt(interrupt) => {
                interrupt.raise();
                Ok(ProcessOutput {
                    exit_code: 130,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            StubBehavior::DeleteProject => {
                fs::remove_dir_all(&command.working_dir).expect("must delete project");
                Ok(ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }
}

fn read(root: &Path, file: &str) -> Vec<u8> {
    fs::read(root.join(file)).expect("must read project file")
}

#[test]
fn post_resolve_without_packages_touches_nothing() {
    let root = test_project_root();
    let mut linker = linker(&root, RecordingExecutor::default());

    let outcome = linker.post_resolve().expect("empty cycle must succeed");

    assert_eq!(outcome, CycleOutcome::NoLocalPackages);
    assert!(linker.executor().commands.is_empty());
    assert!(!root.join("composer.json").exists());
    assert!(!root.join("composer.lock").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_links_and_restores_on_success() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("{\"packages\": []}\n"));
    let mut executor = RecordingExecutor::default();
    executor.touch_lock = true;
    let mut linker = linker(&root, executor);

    let outcome = linker.post_resolve().expect("cycle must succeed");

    let CycleOutcome::Linked(report) = outcome else {
        panic!("expected linked outcome");
    };
    assert_eq!(report.packages, vec!["vendor/foo"]);
    assert_eq!(report.resolver, ResolverStatus::Succeeded);
    assert!(report.command_line.ends_with("update --no-audit vendor/foo"));
    assert_eq!(read(&root, "composer.json"), b"{}");
    assert_eq!(read(&root, "composer.lock"), b"{\"packages\": []}\n");

    let seen: Value =
        serde_json::from_str(&linker.executor().manifests_seen[0]).expect("valid json");
    assert_eq!(seen["repositories"][0]["type"], "path");
    assert_eq!(seen["repositories"][0]["url"], "dev-packages/foo");
    assert_eq!(seen["repositories"][0]["options"]["symlink"], true);
    assert_eq!(seen["require"]["vendor/foo"], "@dev");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_reports_resolver_failure_and_restores() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    let original = "{\n    \"name\": \"acme/app\",\n    \"require\": {\"vendor/foo\": \"^2.0\"}\n}\n";
    seed_project(&root, original, Some("lock"));
    let mut executor = RecordingExecutor::with(StubBehavior::ExitWith(
        2,
        "Your requirements could not be resolved",
    ));
    executor.touch_lock = true;
    let mut linker = linker(&root, executor);

    let outcome = linker.post_resolve().expect("resolver failure is reported, not raised");

    assert!(outcome.resolver_failed());
    assert_eq!(
        outcome,
        CycleOutcome::Linked(LinkReport {
            packages: vec!["vendor/foo".to_string()],
            command_line: format!(
                "composer --no-plugins --no-scripts --working-dir={} update --no-audit vendor/foo",
                root.display()
            ),
            resolver: ResolverStatus::Failed {
                exit_code: 2,
                stderr: "Your requirements could not be resolved".to_string(),
            },
        })
    );
    assert_eq!(read(&root, "composer.json"), original.as_bytes());
    assert_eq!(read(&root, "composer.lock"), b"lock");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_restores_when_resolver_cannot_launch() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{\"type\": \"project\"}", Some("lock"));
    let mut linker = linker(&root, RecordingExecutor::with(StubBehavior::FailLaunch));

    let err = linker.post_resolve().expect_err("launch failure must surface");

    assert!(matches!(err, LinkError::ResolverLaunch { .. }));
    assert_eq!(read(&root, "composer.json"), b"{\"type\": \"project\"}");
    assert_eq!(read(&root, "composer.lock"), b"lock");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_restores_when_resolver_panics() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("lock"));
    let mut executor = RecordingExecutor::with(StubBehavior::Panic);
    executor.touch_lock = true;
    let mut linker = linker(&root, executor);

    let result = panic::catch_unwind(AssertUnwindSafe(|| linker.post_resolve()));

    assert!(result.is_err());
    assert_eq!(read(&root, "composer.json"), b"{}");
    assert_eq!(read(&root, "composer.lock"), b"lock");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_missing_lockfile_is_read_error() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", None);
    let mut linker = linker(&root, RecordingExecutor::default());

    let err = linker.post_resolve().expect_err("missing lockfile must fail");

    match err {
        LinkError::Read { path, .. } => assert_eq!(path, root.join("composer.lock")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(linker.executor().commands.is_empty());
    assert_eq!(read(&root, "composer.json"), b"{}");
    assert!(!root.join("composer.lock").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_interrupted_during_resolver_restores_first() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("lock"));
    let interrupt = InterruptFlag::new();
    let mut executor = RecordingExecutor::with(StubBehavior::Interrupt(interrupt.clone()));
    executor.touch_lock = true;
    let mut linker = linker(&root, executor).with_interrupt(interrupt);

    let err = linker.post_resolve().expect_err("interruption must surface");

    assert!(err.is_interrupted());
    assert_eq!(linker.executor().commands.len(), 1);
    assert_eq!(read(&root, "composer.json"), b"{}");
    assert_eq!(read(&root, "composer.lock"), b"lock");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_after_interruption_never_mutates() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("lock"));
    let interrupt = InterruptFlag::new();
    interrupt.raise();
    let mut linker = linker(&root, RecordingExecutor::default()).with_interrupt(interrupt);

    let err = linker.post_resolve().expect_err("raised flag must stop the cycle");

    assert!(matches!(
        err,
        LinkError::Interrupted {
            stage: "package discovery"
        }
    ));
    assert!(linker.executor().commands.is_empty());
    assert_eq!(read(&root, "composer.json"), b"{}");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_invalid_manifest_never_reaches_resolver() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{\"require\": [\"vendor/foo\"]}", Some("lock"));
    let mut linker = linker(&root, RecordingExecutor::default());

    let err = linker.post_resolve().expect_err("array require must fail");

    assert!(matches!(err, LinkError::InvalidManifest { .. }));
    assert!(linker.executor().commands.is_empty());
    assert_eq!(read(&root, "composer.json"), b"{\"require\": [\"vendor/foo\"]}");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_missing_manifest_is_read_error() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    let mut linker = linker(&root, RecordingExecutor::default());

    let err = linker.post_resolve().expect_err("missing manifest must fail");

    match err {
        LinkError::Read { path, .. } => assert_eq!(path, root.join("composer.json")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!root.join("composer.json").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn post_resolve_restore_failure_is_distinct() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("lock"));
    let mut linker = linker(&root, RecordingExecutor::with(StubBehavior::DeleteProject));

    let err = linker.post_resolve().expect_err("restore must fail");

    assert!(err.is_restore_failure());
    assert!(err.to_string().contains("pre-run snapshot"));
}

#[test]
fn post_resolve_puts_last_processed_repository_first() {
    let root = test_project_root();
    write_candidate(&root, "alpha", "acme/alpha");
    write_candidate(&root, "beta", "acme/beta");
    write_candidate(&root, "gamma", "acme/gamma");
    seed_project(&root, "{}", Some("lock"));
    let mut linker = linker(&root, RecordingExecutor::default());

    let outcome = linker.post_resolve().expect("cycle must succeed");

    let seen: Value =
        serde_json::from_str(&linker.executor().manifests_seen[0]).expect("valid json");
    let urls: Vec<&str> = seen["repositories"]
        .as_array()
        .expect("repositories array")
        .iter()
        .map(|entry| entry["url"].as_str().expect("url"))
        .collect();
    assert_eq!(
        urls,
        vec!["dev-packages/gamma", "dev-packages/beta", "dev-packages/alpha"]
    );
    let CycleOutcome::Linked(report) = outcome else {
        panic!("expected linked outcome");
    };
    assert!(report
        .command_line
        .ends_with("acme/alpha acme/beta acme/gamma"));

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn pre_resolve_removes_only_discovered_symlinks() {
    use std::os::unix::fs::symlink;

    let root = test_project_root();
    let foo = write_candidate(&root, "foo", "vendor/foo");
    write_candidate(&root, "bar", "vendor/bar");
    let vendor = root.join("vendor");
    fs::create_dir_all(vendor.join("vendor")).expect("must create vendor namespace");
    fs::create_dir_all(vendor.join("other")).expect("must create other namespace");
    symlink(&foo, vendor.join("vendor/foo")).expect("must link foo");
    fs::create_dir_all(vendor.join("vendor/bar")).expect("must create real bar");
    fs::write(vendor.join("vendor/bar/composer.json"), "{}").expect("must write bar");
    symlink(&foo, vendor.join("other/foo")).expect("must link unrelated");

    let mut linker = linker(&root, RecordingExecutor::default());
    let removed = linker.pre_resolve().expect("cleanup must succeed");

    assert_eq!(removed, vec![vendor.join("vendor/foo")]);
    assert!(fs::symlink_metadata(vendor.join("vendor/foo")).is_err());
    assert!(vendor.join("vendor/bar/composer.json").exists());
    assert!(fs::symlink_metadata(vendor.join("other/foo"))
        .expect("unrelated link must remain")
        .file_type()
        .is_symlink());
    assert!(foo.join("composer.json").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pre_resolve_without_links_is_noop() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    let mut linker = linker(&root, RecordingExecutor::default());

    let removed = linker.pre_resolve().expect("cleanup must succeed");

    assert!(removed.is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn handlers_share_one_discovery_per_invocation() {
    let root = test_project_root();
    write_candidate(&root, "foo", "vendor/foo");
    seed_project(&root, "{}", Some("lock"));
    let mut linker = linker(&root, RecordingExecutor::default());

    let cleaned = linker
        .handle(HostEvent::PreUpdateCmd)
        .expect("pre handler must succeed");
    write_candidate(&root, "bar", "vendor/bar");
    let linked = linker
        .handle(HostEvent::PostUpdateCmd)
        .expect("post handler must succeed");

    assert_eq!(cleaned, HandlerOutcome::Cleaned { removed: Vec::new() });
    let HandlerOutcome::Cycle(CycleOutcome::Linked(report)) = linked else {
        panic!("expected linked cycle");
    };
    assert_eq!(report.packages, vec!["vendor/foo"]);
    assert_eq!(linker.discovery_scans(), 1);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn restore_guard_restores_when_dropped() {
    let root = test_project_root();
    seed_project(&root, "{\"a\": 1}", Some("lock"));
    let layout = ProjectLayout::new(&root, &LinkSettings::default());

    {
        let _guard = RestoreGuard::new(ManifestSnapshot::capture(&layout).expect("must capture"));
        fs::write(root.join("composer.json"), "{\"a\": 2}").expect("must mutate");
        fs::write(root.join("composer.lock"), "changed").expect("must mutate");
    }

    assert_eq!(read(&root, "composer.json"), b"{\"a\": 1}");
    assert_eq!(read(&root, "composer.lock"), b"lock");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn host_events_collapse_into_two_handlers() {
    assert_eq!(
        HostEvent::ALL.map(HostEvent::handler),
        [
            LifecycleHandler::PreResolve,
            LifecycleHandler::PreResolve,
            LifecycleHandler::PostResolve,
            LifecycleHandler::PostResolve,
        ]
    );
    assert_eq!(
        "post-install-cmd".parse::<HostEvent>(),
        Ok(HostEvent::PostInstallCmd)
    );
    let err = "post-autoload-dump"
        .parse::<HostEvent>()
        .expect_err("unknown event must fail");
    assert!(err.contains("pre-install-cmd"));
}

#[test]
fn resolver_command_restricts_update_to_packages() {
    let command = ResolverCommand::update_packages(
        "composer",
        Path::new("/work/app"),
        &["acme/widget", "acme/gadget"],
    );
    assert_eq!(command.working_dir, PathBuf::from("/work/app"));
    assert_eq!(
        command.command_line(),
        "composer --no-plugins --no-scripts --working-dir=/work/app update --no-audit acme/widget acme/gadget"
    );
}
