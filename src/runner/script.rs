use super::{RunOutput, Runner, RunnerError};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Wall-clock budget for one test process.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Character that introduces interpreter options on a test's first line.
pub const DEFAULT_HEADER_DELIMITER: char = '!';

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the pipes to close after the process group is killed.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Runner that executes each test file with an external interpreter.
///
/// The interpreter is invoked as `interpreter [options...] <test file>`, where
/// `options` come from the test's first line: everything after the header
/// delimiter, split on whitespace. For example a first line of
/// `-- ! -O3 --jit` yields `["-O3", "--jit"]`.
///
/// # Example
///
/// ```no_run
/// use diff_test_runner::runner::{Runner, ScriptRunner};
/// use std::time::Duration;
///
/// let runner = ScriptRunner::new("bin/exe").with_timeout(Duration::from_secs(5));
/// let output = runner.run("tests/hello.lua".as_ref())?;
/// print!("{}", output.stdout);
/// # Ok::<(), diff_test_runner::runner::RunnerError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: PathBuf,
    name: String,
    timeout: Duration,
    delimiter: char,
}

impl ScriptRunner {
    /// Create a runner for the given interpreter executable.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        let interpreter = interpreter.into();
        let name = interpreter
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| interpreter.display().to_string());
        Self {
            interpreter,
            name,
            timeout: DEFAULT_TIMEOUT,
            delimiter: DEFAULT_HEADER_DELIMITER,
        }
    }

    /// Set the per-test timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the character that introduces header options.
    pub fn with_header_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Path of the interpreter executable.
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Per-test timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read the interpreter options declared on the test's first line.
    fn read_header(&self, path: &Path) -> Result<Vec<String>, RunnerError> {
        let launch = |source| RunnerError::Launch {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(launch)?;
        let mut first_line = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut first_line)
            .map_err(launch)?;
        Ok(header_options(
            &String::from_utf8_lossy(&first_line),
            self.delimiter,
        ))
    }
}

impl Runner for ScriptRunner {
    fn run(&self, path: &Path) -> Result<RunOutput, RunnerError> {
        let options = self.read_header(path)?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&options)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout takes down anything the script forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!(command = ?cmd, "spawning test process");

        let deadline = Instant::now() + self.timeout;
        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        })?;
        let mut guard = ChildGuard::new(child);

        // Tests get no input; closing the pipe gives them EOF.
        drop(guard.child.stdin.take());
        let mut pipes = Pipes::new();
        let stdout = guard.child.stdout.take().map(|source| pipes.drain(source));
        let stderr = guard.child.stderr.take().map(|source| pipes.drain(source));

        // One deadline covers the process and the pipes: a background job
        // holding stdout open counts against the timeout too.
        let waited = guard.wait_until(deadline);
        let drained = matches!(waited, Waited::Exited(_)) && pipes.wait_closed(deadline);

        // Kills whatever is left in the group, even after a clean exit.
        guard.terminate();
        if !drained && !pipes.wait_closed(Instant::now() + DRAIN_GRACE) {
            tracing::warn!(
                path = %path.display(),
                "test output pipes still open after kill; keeping partial output"
            );
        }

        let output = RunOutput {
            stdout: decode(take(stdout), "stdout", path),
            stderr: decode(take(stderr), "stderr", path),
        };

        match waited {
            Waited::Exited(status) if drained => {
                tracing::debug!(path = %path.display(), %status, "test process exited");
                Ok(output)
            }
            Waited::Exited(status) => {
                tracing::debug!(
                    path = %path.display(),
                    %status,
                    timeout = ?self.timeout,
                    "test process exited but its output stayed open past the timeout"
                );
                Err(RunnerError::Timeout { output })
            }
            Waited::TimedOut => {
                tracing::debug!(
                    path = %path.display(),
                    timeout = ?self.timeout,
                    "test process timed out"
                );
                Err(RunnerError::Timeout { output })
            }
            Waited::Failed(e) => Err(RunnerError::Process {
                message: format!("failed to wait for {}: {}", self.interpreter.display(), e),
                output,
            }),
        }
    }

    fn is_available(&self) -> bool {
        if self.interpreter.components().count() > 1 {
            return self.interpreter.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.interpreter).is_file()))
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Extract interpreter options from a test file's first line.
///
/// Returns an empty list when the line has no delimiter.
pub fn header_options(first_line: &str, delimiter: char) -> Vec<String> {
    first_line
        .split_once(delimiter)
        .map(|(_, rest)| rest.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

/// How waiting on the child ended.
enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Failed(std::io::Error),
}

/// Owns a running child. Its process group is killed and the child reaped
/// before the guard goes away.
struct ChildGuard {
    child: Child,
    reaped: bool,
    killed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
            killed: false,
        }
    }

    /// Wait for the child to exit or for `deadline` to pass.
    fn wait_until(&mut self, deadline: Instant) -> Waited {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Waited::Exited(status);
                }
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Waited::TimedOut;
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => return Waited::Failed(e),
            }
        }
    }

    /// Kill the child's process group on unix (the child alone elsewhere),
    /// then reap the child if it has not been reaped yet.
    fn terminate(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        kill(&mut self.child, self.reaped);
        if !self.reaped {
            if let Err(e) = self.child.wait() {
                tracing::warn!(pid = self.child.id(), error = %e, "failed to reap killed test process");
            }
            self.reaped = true;
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn kill(child: &mut Child, reaped: bool) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: plain syscall. The group was created for this child; once the
    // leader is reaped the id stays reserved while any member is alive, and
    // an empty group just yields ESRCH.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 && !reaped {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill(child: &mut Child, reaped: bool) {
    if !reaped {
        let _ = child.kill();
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Reader threads draining the child's pipes. Each thread reports on a
/// channel when its pipe reaches EOF.
struct Pipes {
    closed_tx: Sender<()>,
    closed_rx: Receiver<()>,
    open: usize,
}

impl Pipes {
    fn new() -> Self {
        let (closed_tx, closed_rx) = mpsc::channel();
        Self {
            closed_tx,
            closed_rx,
            open: 0,
        }
    }

    /// Drain `source` on a new thread into the returned buffer.
    fn drain<R: Read + Send + 'static>(&mut self, mut source: R) -> SharedBuf {
        let buf = SharedBuf::default();
        let sink = Arc::clone(&buf);
        let closed = self.closed_tx.clone();
        self.open += 1;
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to drain test process pipe");
                        break;
                    }
                }
            }
            let _ = closed.send(());
        });
        buf
    }

    /// Wait until every pipe is closed; `false` if `deadline` passes first.
    fn wait_closed(&mut self, deadline: Instant) -> bool {
        while self.open > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.closed_rx.recv_timeout(remaining).is_err() {
                return false;
            }
            self.open -= 1;
        }
        true
    }
}

/// Whatever has been read so far; a reader still running keeps its own handle.
fn take(buf: Option<SharedBuf>) -> Vec<u8> {
    buf.map(|buf| std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner())))
        .unwrap_or_default()
}

/// Decode captured bytes, replacing invalid UTF-8 with U+FFFD.
fn decode(bytes: Vec<u8>, stream: &str, path: &Path) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        tracing::warn!(
            path = %path.display(),
            stream,
            "test output is not valid UTF-8; invalid bytes replaced with U+FFFD"
        );
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_options_after_delimiter() {
        assert_eq!(
            header_options("-- ! -O3 --jit\n", '!'),
            vec!["-O3".to_string(), "--jit".to_string()]
        );
    }

    #[test]
    fn test_header_options_without_delimiter() {
        assert!(header_options("print('hi')\n", '!').is_empty());
        assert!(header_options("", '!').is_empty());
    }

    #[test]
    fn test_header_options_splits_on_first_delimiter_only() {
        assert_eq!(
            header_options("-- ! -e x!y", '!'),
            vec!["-e".to_string(), "x!y".to_string()]
        );
    }

    #[test]
    fn test_header_options_delimiter_only() {
        assert!(header_options("--!\n", '!').is_empty());
    }

    #[test]
    fn test_header_options_custom_delimiter() {
        assert_eq!(header_options("# @ -q", '@'), vec!["-q".to_string()]);
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let text = decode(vec![0xff, b'o', b'k'], "stdout", Path::new("t.lua"));
        assert_eq!(text, "\u{fffd}ok");
        assert_eq!(decode(b"fine".to_vec(), "stdout", Path::new("t.lua")), "fine");
    }

    #[test]
    fn test_runner_defaults() {
        let runner = ScriptRunner::new("/opt/bin/exe");
        assert_eq!(runner.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(runner.interpreter(), Path::new("/opt/bin/exe"));
        assert_eq!(runner.name(), "exe");
    }

    #[test]
    fn test_missing_test_file_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.lua");
        let err = ScriptRunner::new("/bin/sh").run(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
        assert_eq!(
            err.to_string(),
            format!("could not open file {}", path.display())
        );
    }

    #[test]
    fn test_missing_interpreter_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.lua");
        std::fs::write(&path, "print('hi')\n").unwrap();
        let runner = ScriptRunner::new(dir.path().join("no-such-interpreter"));
        assert!(!runner.is_available());
        let err = runner.run(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(err.output().is_none());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            path
        }

        #[test]
        fn test_captures_stdout_and_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "a.sh", "echo out\necho err >&2\n");
            let output = ScriptRunner::new("/bin/sh").run(&path).unwrap();
            assert_eq!(output.stdout, "out\n");
            assert_eq!(output.stderr, "err\n");
        }

        #[test]
        fn test_nonzero_exit_still_returns_output() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "a.sh", "echo before\nexit 3\n");
            let output = ScriptRunner::new("/bin/sh").run(&path).unwrap();
            assert_eq!(output.stdout, "before\n");
        }

        #[test]
        fn test_header_options_reach_interpreter() {
            let dir = tempfile::tempdir().unwrap();
            // `sh -x` traces each command to stderr.
            let path = script(dir.path(), "a.sh", "# ! -x\necho traced\n");
            let output = ScriptRunner::new("/bin/sh").run(&path).unwrap();
            assert_eq!(output.stdout, "traced\n");
            assert!(output.stderr.contains("echo traced"), "stderr: {:?}", output.stderr);
        }

        #[test]
        fn test_stdin_is_closed() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "a.sh", "cat\necho done\n");
            let output = ScriptRunner::new("/bin/sh")
                .with_timeout(Duration::from_secs(10))
                .run(&path)
                .unwrap();
            assert_eq!(output.stdout, "done\n");
        }

        #[test]
        fn test_large_output_does_not_block() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(
                dir.path(),
                "a.sh",
                "i=0\nwhile [ $i -lt 20000 ]; do echo 0123456789; i=$((i+1)); done\n",
            );
            let output = ScriptRunner::new("/bin/sh")
                .with_timeout(Duration::from_secs(30))
                .run(&path)
                .unwrap();
            assert_eq!(output.stdout.len(), 20000 * 11);
        }

        #[test]
        fn test_timeout_keeps_partial_output() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(
                dir.path(),
                "a.sh",
                "echo partial\necho warn >&2\nsleep 30\necho never\n",
            );
            let started = Instant::now();
            let err = ScriptRunner::new("/bin/sh")
                .with_timeout(Duration::from_millis(500))
                .run(&path)
                .unwrap_err();
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(err.is_timeout());
            assert_eq!(err.to_string(), "Script timed out.");
            let output = err.output().unwrap();
            assert_eq!(output.stdout, "partial\n");
            assert_eq!(output.stderr, "warn\n");
        }

        #[test]
        fn test_background_job_holding_pipes_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "a.sh", "echo hi\nsleep 8 &\nexit 0\n");
            let started = Instant::now();
            let err = ScriptRunner::new("/bin/sh")
                .with_timeout(Duration::from_millis(500))
                .run(&path)
                .unwrap_err();
            let elapsed = started.elapsed();
            assert!(elapsed < Duration::from_secs(4), "took {:?}", elapsed);
            assert!(err.is_timeout());
            assert_eq!(err.output().unwrap().stdout, "hi\n");
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_background_job_is_killed_after_clean_exit() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("bg.pid");
            let path = script(
                dir.path(),
                "a.sh",
                &format!(
                    "sleep 30 >/dev/null 2>&1 &\necho $! > '{}'\necho done\n",
                    pid_file.display()
                ),
            );
            let output = ScriptRunner::new("/bin/sh")
                .with_timeout(Duration::from_secs(10))
                .run(&path)
                .unwrap();
            assert_eq!(output.stdout, "done\n");

            let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
            let stat = Path::new("/proc").join(&pid).join("stat");
            // Killed orphans may linger as zombies until init reaps them.
            let gone = || match std::fs::read_to_string(&stat) {
                Err(_) => true,
                Ok(s) => s
                    .rsplit_once(')')
                    .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
            };
            let started = Instant::now();
            while !gone() && started.elapsed() < Duration::from_secs(5) {
                thread::sleep(Duration::from_millis(20));
            }
            assert!(gone(), "background job {} survived its test", pid);
        }

        #[test]
        fn test_invalid_utf8_output_is_replaced() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "a.sh", "printf '\\377ok'\n");
            let output = ScriptRunner::new("/bin/sh").run(&path).unwrap();
            assert_eq!(output.stdout, "\u{fffd}ok");
        }

        #[test]
        fn test_is_available_searches_path() {
            assert!(ScriptRunner::new("/bin/sh").is_available());
            assert!(ScriptRunner::new("sh").is_available());
            assert!(!ScriptRunner::new("definitely-not-an-interpreter-xyz").is_available());
        }
    }
}
