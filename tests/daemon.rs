//! Integration tests for the daemon binary's termination behaviour.
//!
//! Each test starts the real `shutdown-daemon` with `HOME` pointed at a
//! temporary directory, waits for its pid file, triggers a shutdown and then
//! inspects how the process ended. Scenarios the daemon cannot stage itself
//! re-run this test binary as the child process.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use shutdown_daemon::{ShutdownCoordinator, ShutdownHandler, ShutdownOptions};
use tempfile::TempDir;

// ===========================================================================
// Helper functions
// ===========================================================================

const STARTUP_DEADLINE: Duration = Duration::from_secs(10);
const EXIT_DEADLINE: Duration = Duration::from_secs(15);

fn data_dir(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("shutdown-daemon")
}

/// Start the daemon and block until it has written its pid file.
fn spawn_daemon(home: &TempDir, envs: &[(&str, &str)]) -> Child {
    let mut child = Command::new(env!("CARGO_BIN_EXE_shutdown-daemon"))
        .env("HOME", home.path())
        .env("RUST_LOG", "debug")
        .envs(envs.iter().copied())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn daemon");

    wait_for_file(&mut child, &data_dir(home.path()).join("daemon.pid"));
    child
}

fn wait_for_file(child: &mut Child, path: &Path) {
    let started = Instant::now();
    while !path.exists() {
        if started.elapsed() > STARTUP_DEADLINE {
            let _ = child.kill();
            panic!("child did not start within {STARTUP_DEADLINE:?}");
        }
        if let Some(status) = child.try_wait().unwrap() {
            panic!("child exited during startup: {status:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn wait_for_exit(child: &mut Child) -> ExitStatus {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if started.elapsed() > EXIT_DEADLINE {
            let _ = child.kill();
            panic!("daemon did not exit within {EXIT_DEADLINE:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn send_signal(child: &Child, signo: i32) {
    // SAFETY: plain kill(2) on a child we own.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, signo) };
    assert_eq!(rc, 0, "kill failed: {}", std::io::Error::last_os_error());
}

/// Send one length-prefixed JSON request and return the decoded response.
fn ipc_request(socket: &Path, body: &str) -> serde_json::Value {
    let mut stream = UnixStream::connect(socket).expect("failed to connect to daemon");
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .unwrap();
    stream.write_all(body.as_bytes()).unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).unwrap();
    let mut response = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    stream.read_exact(&mut response).unwrap();
    serde_json::from_slice(&response).unwrap()
}

// ===========================================================================
// Child process scenarios
// ===========================================================================

/// Set to a ready-file path when this binary runs as a child scenario
const CHILD_READY_ENV: &str = "SHUTDOWN_TEST_READY_FILE";
const SLOW_HANDLER: Duration = Duration::from_millis(1_500);

/// Coordinator on the real process signals with one slow handler.
///
/// Does nothing unless started by `test_repeated_signal_waits_for_handlers`.
#[test]
fn child_slow_handler() {
    let Ok(ready) = std::env::var(CHILD_READY_ENV) else {
        return;
    };

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        let coordinator = ShutdownCoordinator::builder(ShutdownOptions {
            use_exit0: true,
            ..ShutdownOptions::default()
        })
        .install()
        .unwrap();
        coordinator.graceful_shutdown(ShutdownHandler::from_async(|_| async {
            tokio::time::sleep(SLOW_HANDLER).await;
            Ok::<(), anyhow::Error>(())
        }));

        std::fs::write(&ready, "ready").unwrap();
        std::future::pending::<()>().await;
    });
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn test_repeated_signal_waits_for_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    let mut child = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "child_slow_handler", "--test-threads=1"])
        .env(CHILD_READY_ENV, &ready)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn child");
    wait_for_file(&mut child, &ready);

    let started = Instant::now();
    send_signal(&child, libc::SIGINT);
    std::thread::sleep(Duration::from_millis(300));
    send_signal(&child, libc::SIGINT);
    let status = wait_for_exit(&mut child);

    assert_eq!(status.code(), Some(0), "status: {status:?}");
    assert!(
        started.elapsed() >= SLOW_HANDLER - Duration::from_millis(100),
        "exited after {:?}, before the handler finished",
        started.elapsed()
    );
}

#[test]
fn test_sigterm_is_reraised_after_cleanup() {
    let home = tempfile::tempdir().unwrap();
    let mut child = spawn_daemon(&home, &[]);

    send_signal(&child, libc::SIGTERM);
    let status = wait_for_exit(&mut child);

    assert_eq!(status.signal(), Some(libc::SIGTERM), "status: {status:?}");
    assert!(!data_dir(home.path()).join("daemon.pid").exists());
    assert!(!data_dir(home.path()).join("daemon.sock").exists());
}

#[test]
fn test_sigint_with_exit0_exits_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let mut child = spawn_daemon(&home, &[("SHUTDOWN_USE_EXIT0", "true")]);

    send_signal(&child, libc::SIGINT);
    let status = wait_for_exit(&mut child);

    assert_eq!(status.code(), Some(0), "status: {status:?}");
    assert!(!data_dir(home.path()).join("daemon.pid").exists());
}

#[test]
fn test_ipc_shutdown_request() {
    let home = tempfile::tempdir().unwrap();
    let mut child = spawn_daemon(&home, &[]);
    let socket = data_dir(home.path()).join("daemon.sock");

    let status = ipc_request(&socket, r#"{"type":"get_status"}"#);
    assert_eq!(status["type"], "status");
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["handlers"], 2);

    let response = ipc_request(&socket, r#"{"type":"shutdown"}"#);
    assert_eq!(response["type"], "shutting_down");
    assert_eq!(response["signal"], "SIGTERM");
    assert_eq!(response["already"], false);

    let status = wait_for_exit(&mut child);
    assert_eq!(status.signal(), Some(libc::SIGTERM), "status: {status:?}");
}

#[test]
fn test_malformed_config_fails_startup() {
    let home = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_shutdown-daemon"))
        .env("HOME", home.path())
        .env("SHUTDOWN_TIMEOUT_MS", "soon")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("failed to run daemon");

    assert!(!status.success());
    assert_eq!(status.code(), Some(1));
}
