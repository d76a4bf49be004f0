//! Sandbox behavior against a real Docker daemon.
//!
//! Run with `cargo test -p boxrun-core --test docker_integration_test -- --ignored --test-threads=1`.
//! The first run builds the execution images and can take several minutes.

use boxrun_core::config::SandboxSettings;
use boxrun_core::executors::ContainerEngine;
use boxrun_core::{ContainerLifecycleManager, DefaultRuntimes, RuntimeRegistry, SandboxError};
use std::sync::Arc;

fn setup() -> (Arc<ContainerLifecycleManager>, RuntimeRegistry) {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = SandboxSettings::default();
    let manager = Arc::new(ContainerLifecycleManager::connect(&settings).unwrap());
    let registry = DefaultRuntimes::create_registry(manager.clone(), &settings).unwrap();
    (manager, registry)
}

async fn managed_containers(manager: &ContainerLifecycleManager) -> usize {
    manager.engine().list_managed_containers().await.unwrap().len()
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_print_hello() {
    let (manager, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let result = python.run("print('hi')", None).await.unwrap();
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.exit_code, 0);
    assert_eq!(managed_containers(&manager).await, 0);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_infinite_loop_times_out() {
    let (manager, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let started = std::time::Instant::now();
    let result = python.run("while True: pass", Some(2)).await.unwrap();
    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(started.elapsed().as_secs() < 15);
    assert_eq!(managed_containers(&manager).await, 0);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_network_is_unreachable() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let code = "import socket\nsocket.create_connection(('1.1.1.1', 53), timeout=3)\nprint('connected')";
    let result = python.run(code, None).await.unwrap();
    assert!(!result.success);
    assert!(!result.stdout.contains("connected"));
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_memory_ceiling_is_enforced() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let result = python
        .run("blocks = [bytearray(64 * 1024 * 1024) for _ in range(16)]\nprint('allocated')", None)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(!result.stdout.contains("allocated"));
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_pid_limit_is_enforced() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let code = "import threading, time\n\
                threads = [threading.Thread(target=time.sleep, args=(3,)) for _ in range(200)]\n\
                for t in threads: t.start()\n\
                print('started all')";
    let result = python.run(code, Some(20)).await.unwrap();
    assert!(!result.success);
    assert!(!result.stdout.contains("started all"));
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_root_filesystem_is_read_only() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let result = python.run("open('/etc/boxrun-marker', 'w').write('x')", None).await.unwrap();
    assert!(!result.success);
    assert!(
        result.stderr.contains("Read-only file system") || result.stderr.contains("Permission denied"),
        "{}",
        result.stderr
    );

    let scratch = python
        .run("open('/tmp/ok.txt', 'w').write('x'); print(open('/tmp/ok.txt').read())", None)
        .await
        .unwrap();
    assert!(scratch.success, "{:?}", scratch);
    assert_eq!(scratch.stdout, "x\n");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_runs_do_not_share_state() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let first = python
        .run("open('/tmp/leftover.txt', 'w').write('secret')", None)
        .await
        .unwrap();
    assert!(first.success, "{:?}", first);

    let second = python
        .run("import os; print(os.path.exists('/tmp/leftover.txt'))", None)
        .await
        .unwrap();
    assert_eq!(second.stdout, "False\n");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_runs_as_non_root() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let result = python.run("import os; print(os.getuid())", None).await.unwrap();
    assert_eq!(result.stdout, "10001\n");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_pytest_harness() {
    let (_, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let code = "def add(a, b):\n    return a + b\n";
    let passing = python
        .run_with_tests(code, "def test_add():\n    assert add(1, 2) == 3\n")
        .await
        .unwrap();
    assert!(passing.success, "{:?}", passing);
    assert!(passing.stdout.contains("1 passed"));

    let failing = python
        .run_with_tests(code, "def test_add():\n    assert add(1, 2) == 4\n")
        .await
        .unwrap();
    assert!(!failing.success);
    assert!(failing.stdout.contains("1 failed"));
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_javascript_runtime() {
    let (_, registry) = setup();
    let javascript = registry.resolve("javascript").unwrap();

    let result = javascript.run("console.log(6 * 7)", None).await.unwrap();
    assert!(result.success, "{:?}", result);
    assert_eq!(result.stdout, "42\n");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_oversized_payload_never_reaches_docker() {
    let (manager, registry) = setup();
    let python = registry.resolve("python").unwrap();

    let result = python.run(&"#".repeat(60_000), None).await;
    assert!(matches!(result, Err(SandboxError::PayloadTooLarge { .. })));
    assert_eq!(managed_containers(&manager).await, 0);
}
