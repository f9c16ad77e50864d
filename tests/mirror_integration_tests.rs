//! Integration tests for a full preprocessing pass
//!
//! These tests verify:
//! - Re-running without changes writes nothing
//! - Tokens are replaced in eligible files and left alone elsewhere
//! - Only touched inputs are rewritten
//! - Outputs of deleted inputs are pruned
//! - Outputs of an earlier root layout are pruned
//! - Concurrent and sequential passes produce the same tree
//! - One broken root does not stop the others
//! - The manifest is mirrored next to the source output
//! - Bad settings, including a repeated token, stop a pass before any file I/O

use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;
use tokenmirror::services::TaskStatus;
use tokenmirror::{ConfigError, ConfigManager, PreprocessorSettings, RunContext, RunLock, run_pass};
use walkdir::WalkDir;

fn create_project() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

    write(
        &root.join("src/main/java/com/example/App.java"),
        b"class App { String key = \"${API_KEY}\"; String v = \"@@VERSION@@\"; }",
    );
    write(
        &root.join("src/main/java/com/example/util/Strings.java"),
        b"// no tokens here",
    );
    write(
        &root.join("src/main/res/values/strings.xml"),
        b"<string name=\"v\">@@VERSION@@</string>",
    );
    write(
        &root.join("src/main/res/drawable/icon.png"),
        b"\x89PNG\r\n\x1a\n${API_KEY}\x00\xff",
    );
    write(
        &root.join("src/main/AndroidManifest.xml"),
        b"<manifest versionName=\"@@VERSION@@\"/>",
    );

    (temp_dir, root)
}

fn write(path: &Utf8Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
}

fn settings() -> PreprocessorSettings {
    let mut settings = PreprocessorSettings::default();
    settings
        .replace
        .insert("${API_KEY}", "abc123");
    settings
        .replace
        .insert("@@VERSION@@", "1.2.3");
    settings
}

fn context(root: &Utf8Path, settings: &PreprocessorSettings) -> RunContext {
    ConfigManager::new(root).unwrap().resolve(settings).unwrap()
}

/// Relative path -> (content, mtime) for every file under `dir`
fn snapshot(dir: &Utf8Path) -> BTreeMap<String, (Vec<u8>, FileTime)> {
    WalkDir::new(dir)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let path = Utf8Path::from_path(entry.path()).unwrap();
            let relative = path.strip_prefix(dir).unwrap().to_string();
            let metadata = fs::metadata(path).unwrap();
            (
                relative,
                (
                    fs::read(path).unwrap(),
                    FileTime::from_last_modification_time(&metadata),
                ),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_first_pass_mirrors_everything() {
    let (_temp_dir, root) = create_project();
    let ctx = context(&root, &settings());
    let target = ctx.target.clone();

    let result = run_pass(&RunLock::new(), ctx).await;

    assert!(result.is_success(), "{:?}", result.outcomes);
    assert_eq!(result.stats.processed, 4);
    assert_eq!(result.stats.copied, 1);
    assert_eq!(result.stats.failed, 0);

    assert_eq!(
        fs::read_to_string(target.join("java/com/example/App.java")).unwrap(),
        "class App { String key = \"abc123\"; String v = \"1.2.3\"; }"
    );
    assert_eq!(
        fs::read_to_string(target.join("res/values/strings.xml")).unwrap(),
        "<string name=\"v\">1.2.3</string>"
    );
    assert_eq!(
        fs::read_to_string(target.join("AndroidManifest.xml")).unwrap(),
        "<manifest versionName=\"1.2.3\"/>"
    );
}

#[tokio::test]
async fn test_non_eligible_files_are_byte_identical() {
    let (_temp_dir, root) = create_project();
    let ctx = context(&root, &settings());
    let target = ctx.target.clone();

    run_pass(&RunLock::new(), ctx).await;

    assert_eq!(
        fs::read(target.join("res/drawable/icon.png")).unwrap(),
        fs::read(root.join("src/main/res/drawable/icon.png")).unwrap()
    );
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let (_temp_dir, root) = create_project();
    let settings = settings();
    let lock = RunLock::new();

    let first = run_pass(&lock, context(&root, &settings)).await;
    let target = root.join("build/preprocessed");
    let before = snapshot(&target);

    let second = run_pass(&lock, context(&root, &settings)).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(second.stats.files_written(), 0);
    assert_eq!(second.stats.pruned, 0);
    assert_eq!(second.stats.skipped, first.stats.files_written());
    assert_eq!(snapshot(&target), before);
}

#[tokio::test]
async fn test_only_touched_file_is_rewritten() {
    let (_temp_dir, root) = create_project();
    let settings = settings();
    let lock = RunLock::new();

    run_pass(&lock, context(&root, &settings)).await;

    let touched = root.join("src/main/java/com/example/util/Strings.java");
    fs::write(&touched, "// @@VERSION@@").unwrap();
    filetime::set_file_mtime(&touched, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let result = run_pass(&lock, context(&root, &settings)).await;

    assert_eq!(result.stats.files_written(), 1);
    assert_eq!(result.stats.processed, 1);
    assert_eq!(
        fs::read_to_string(root.join("build/preprocessed/java/com/example/util/Strings.java"))
            .unwrap(),
        "// 1.2.3"
    );
}

#[tokio::test]
async fn test_deleted_source_is_pruned() {
    let (_temp_dir, root) = create_project();
    let settings = settings();
    let lock = RunLock::new();

    run_pass(&lock, context(&root, &settings)).await;
    let output = root.join("build/preprocessed/java/com/example/util/Strings.java");
    assert!(output.exists());

    fs::remove_file(root.join("src/main/java/com/example/util/Strings.java")).unwrap();
    let result = run_pass(&lock, context(&root, &settings)).await;

    assert!(result.is_success());
    assert_eq!(result.stats.pruned, 1);
    assert!(!output.exists());
    assert!(!root.join("build/preprocessed/java/com/example/util").exists());
    // Manifest lives outside every root's output and is never pruned
    assert!(root.join("build/preprocessed/AndroidManifest.xml").exists());
}

#[tokio::test]
async fn test_pool_size_does_not_change_output() {
    let (_temp_dir_a, root_a) = create_project();
    let (_temp_dir_b, root_b) = create_project();
    for file in [
        "lib_one/src/File.java",
        "lib_two/java/File.java",
        "extra/assets/File.java",
    ] {
        write(&root_a.join(file), b"x=@@VERSION@@");
        write(&root_b.join(file), b"x=@@VERSION@@");
    }

    let mut settings = settings();
    settings.sources = vec![
        "src/main/java".to_string(),
        "lib_one/src".to_string(),
        "lib_two".to_string(),
    ];
    settings.resources = vec!["src/main/res".to_string(), "extra/assets".to_string()];

    settings.pool_size = 1;
    let sequential = run_pass(&RunLock::new(), context(&root_a, &settings)).await;
    settings.pool_size = 8;
    let concurrent = run_pass(&RunLock::new(), context(&root_b, &settings)).await;

    assert!(sequential.is_success(), "{:?}", sequential.outcomes);
    assert!(concurrent.is_success(), "{:?}", concurrent.outcomes);
    assert_eq!(
        snapshot(&root_a.join("build/preprocessed")),
        snapshot(&root_b.join("build/preprocessed"))
    );
}

#[tokio::test]
async fn test_broken_root_does_not_stop_siblings() {
    let (_temp_dir, root) = create_project();
    let mut settings = settings();
    settings.resources = vec!["src/main/res".to_string(), "does/not/exist".to_string()];

    let result = run_pass(&RunLock::new(), context(&root, &settings)).await;

    assert!(!result.is_success());
    assert!(!result.timed_out);
    assert_eq!(result.failed().count(), 1);
    assert!(
        result
            .outcomes
            .iter()
            .filter(|outcome| outcome.status == TaskStatus::Succeeded)
            .count()
            == 2
    );
    assert!(
        root.join("build/preprocessed/res/res/values/strings.xml")
            .exists()
    );
}

#[tokio::test]
async fn test_file_failure_keeps_previous_output() {
    let (_temp_dir, root) = create_project();
    let settings = settings();
    let lock = RunLock::new();

    run_pass(&lock, context(&root, &settings)).await;
    let output = root.join("build/preprocessed/java/com/example/App.java");
    let previous = fs::read(&output).unwrap();

    let source = root.join("src/main/java/com/example/App.java");
    fs::write(&source, b"\xff\xfe not utf-8").unwrap();
    filetime::set_file_mtime(&source, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let result = run_pass(&lock, context(&root, &settings)).await;

    assert!(!result.is_success());
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.pruned, 0);
    assert_eq!(fs::read(&output).unwrap(), previous);
}

#[test]
fn test_malformed_settings_fail_before_any_file_io() {
    let (_temp_dir, root) = create_project();
    let manager = ConfigManager::new(&root).unwrap();

    fs::write(
        manager.config_path(),
        "replace:\n  A: one\n  B: two\nextensions: [java, '']\n",
    )
    .unwrap();
    let settings = manager.load_settings().unwrap();

    assert_eq!(
        manager.resolve(&settings).unwrap_err(),
        ConfigError::EmptyExtension
    );
    assert!(!root.join("build").exists());
}

#[test]
fn test_repeated_token_in_settings_fails_before_any_file_io() {
    let (_temp_dir, root) = create_project();
    let manager = ConfigManager::new(&root).unwrap();

    fs::write(
        manager.config_path(),
        "replace:\n  \"@@VERSION@@\": 1.2.3\n  OTHER: x\n  \"@@VERSION@@\": 2.0.0\n",
    )
    .unwrap();
    let settings = manager.load_settings().unwrap();

    assert_eq!(
        manager.resolve(&settings).unwrap_err(),
        ConfigError::DuplicateToken("@@VERSION@@".to_string())
    );
    assert!(!root.join("build").exists());
}

#[tokio::test]
async fn test_root_layout_change_prunes_old_slots() {
    let (_temp_dir, root) = create_project();
    write(&root.join("lib/kotlin/K.java"), b"k=@@VERSION@@");
    write(&root.join("gen/out/G.java"), b"g");
    let lock = RunLock::new();
    let java = root.join("build/preprocessed/java");

    // One source root: mirrored straight into java/
    let mut settings = settings();
    let first = run_pass(&lock, context(&root, &settings)).await;
    assert!(first.is_success(), "{:?}", first.outcomes);
    assert!(java.join("com/example/App.java").exists());

    // Three roots: each gets its own slot and the single-root layout goes
    settings.sources = vec![
        "src/main/java".to_string(),
        "lib/kotlin".to_string(),
        "gen/out".to_string(),
    ];
    let second = run_pass(&lock, context(&root, &settings)).await;
    assert!(second.is_success(), "{:?}", second.outcomes);
    assert_eq!(second.stats.pruned, 2);
    assert!(!java.join("com").exists());
    assert!(java.join("java/com/example/App.java").exists());
    assert_eq!(fs::read_to_string(java.join("kotlin/K.java")).unwrap(), "k=1.2.3");
    assert!(java.join("out/G.java").exists());

    // Dropping a root removes its slot
    settings.sources.pop();
    let third = run_pass(&lock, context(&root, &settings)).await;
    assert!(third.is_success(), "{:?}", third.outcomes);
    assert_eq!(third.stats.pruned, 1);
    assert!(!java.join("out").exists());
    assert!(java.join("kotlin/K.java").exists());
    assert!(root.join("build/preprocessed/res/values/strings.xml").exists());
    assert!(root.join("build/preprocessed/AndroidManifest.xml").exists());
}

#[tokio::test]
async fn test_failed_root_leaves_old_layout_in_place() {
    let (_temp_dir, root) = create_project();
    let lock = RunLock::new();
    let mut settings = settings();

    run_pass(&lock, context(&root, &settings)).await;
    let old_output = root.join("build/preprocessed/java/com/example/App.java");
    assert!(old_output.exists());

    settings.sources = vec!["src/main/java".to_string(), "does/not/exist".to_string()];
    let result = run_pass(&lock, context(&root, &settings)).await;

    assert!(!result.is_success());
    assert_eq!(result.stats.pruned, 0);
    assert!(old_output.exists());
    assert!(
        root.join("build/preprocessed/java/java/com/example/App.java")
            .exists()
    );
}
