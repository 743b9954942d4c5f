use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::RegexSet;
use sandbox::ExecMode;
use tokio::process::Command;

/// Module the interpreter runs in test-suite mode.
const TEST_MODULE: &str = "pytest";

/// Harness flags: verbose names, short tracebacks.
const TEST_FLAGS: &[&str] = &["-v", "--tb=short"];

/// Evidence that code is meant to run under the test harness.
#[allow(clippy::expect_used)]
static TEST_MARKERS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?m)^\s*def\s+test_",
        r"(?m)^\s*class\s+Test",
        r"(?m)^\s*import\s+pytest",
        r"(?m)^\s*from\s+pytest\s+import",
    ])
    .expect("test marker patterns are valid")
});

/// Whether `code` defines tests or imports the test framework.
pub fn has_test_markers(code: &str) -> bool {
    TEST_MARKERS.is_match(code)
}

/// Mode that will actually run. Test-suite requests without any test markers
/// fall back to a plain script run.
pub fn resolve_mode(requested: ExecMode, code: &str) -> ExecMode {
    match requested {
        ExecMode::TestSuite if !has_test_markers(code) => ExecMode::Script,
        mode => mode,
    }
}

/// Interpreter arguments for running `script_name` (relative to the working
/// directory) in `mode`.
fn interpreter_args(mode: ExecMode, script_name: &OsStr) -> Vec<OsString> {
    match mode {
        ExecMode::Script => vec![script_name.to_os_string()],
        ExecMode::TestSuite => {
            let mut args = Vec::with_capacity(3 + TEST_FLAGS.len());
            args.push(OsString::from("-m"));
            args.push(OsString::from(TEST_MODULE));
            args.push(script_name.to_os_string());
            args.extend(TEST_FLAGS.iter().map(OsString::from));
            args
        }
    }
}

/// Format a human-readable display string for an interpreter invocation.
pub(crate) fn format_command_display(interpreter: &Path, args: &[OsString]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(interpreter.to_string_lossy());
    parts.extend(args.iter().map(|a| a.to_string_lossy()));
    parts.join(" ")
}

/// Build the child command for `script`.
///
/// The child runs inside the script's directory with stdin closed, both
/// output streams piped, and in its own process group.
pub(crate) fn build(interpreter: &Path, mode: ExecMode, script: &Path) -> (Command, String) {
    let script_name = script.file_name().unwrap_or(script.as_os_str());
    let args = interpreter_args(mode, script_name);
    let display = format_command_display(interpreter, &args);

    let mut cmd = Command::new(interpreter);
    cmd.args(&args)
        // keep compiled caches out of the shared temp dir
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = script.parent()
        && !dir.as_os_str().is_empty()
    {
        cmd.current_dir(dir);
    }
    crate::process::isolate_group(&mut cmd);

    (cmd, display)
}
