//! Integration tests for the job scheduler.
//!
//! Drives a real [`Scheduler`] with in-memory peers and a temporary
//! workspace:
//! - message sequence of a simple job
//! - determinism of output and returned files
//! - queue positions, cancel of queued and running jobs
//! - input rendezvous
//! - syntax, runtime and timeout errors
//! - file name sandboxing and workspace failures
//! - disconnects and pruning

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tarn_host::{FileMap, Peer, Scheduler, SchedulerHandle, ServerMessage, Workspace};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const WAIT: Duration = Duration::from_secs(10);

struct Host {
    handle: SchedulerHandle,
    _dir: TempDir,
}

async fn start_host(timeout: Duration) -> Host {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(dir.path().join("ws")).await.unwrap();
    let (scheduler, handle) = Scheduler::new(workspace, timeout);
    tokio::spawn(scheduler.run());
    Host { handle, _dir: dir }
}

/// An in-memory client.
struct Client {
    peer: Peer,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn new() -> Self {
        let (peer, rx) = Peer::channel();
        Self { peer, rx }
    }

    /// Submit `main.tarn` plus extra files; returns the key and position.
    async fn submit(&mut self, host: &Host, source: &str, extra: &[(&str, &str)]) -> (String, usize) {
        let mut files = files(extra);
        files.insert("main.tarn".into(), source.into());
        self.submit_files(host, files, "main.tarn").await
    }

    async fn submit_files(&mut self, host: &Host, files: FileMap, entrypoint: &str) -> (String, usize) {
        host.handle
            .submit(self.peer.clone(), files, entrypoint.into())
            .unwrap();
        match self.next().await {
            ServerMessage::Queued { key, position } => (key, position),
            other => panic!("expected QUEUED, got {other:?}"),
        }
    }

    async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("peer channel closed")
    }

    /// Next message that is not a `PING`.
    async fn next_event(&mut self) -> ServerMessage {
        loop {
            match self.next().await {
                ServerMessage::Ping => continue,
                msg => return msg,
            }
        }
    }

    async fn expect_running(&mut self) {
        loop {
            match self.next().await {
                ServerMessage::Running => return,
                ServerMessage::Ping | ServerMessage::QueueUpdate { .. } => continue,
                other => panic!("expected RUNNING, got {other:?}"),
            }
        }
    }

    /// Everything up to and including `SUCCESS`, ignoring queue chatter.
    async fn until_success(&mut self) -> (Vec<ServerMessage>, FileMap) {
        let mut seen = Vec::new();
        loop {
            match self.next().await {
                ServerMessage::Success { files } => return (seen, files),
                ServerMessage::Ping | ServerMessage::QueueUpdate { .. } => {}
                msg => seen.push(msg),
            }
        }
    }

    /// Messages already delivered, without waiting.
    fn pending(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn files(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn output(text: &str, end: &str) -> ServerMessage {
    ServerMessage::Output {
        text: text.into(),
        end: end.into(),
    }
}

fn errors(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Error { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// A program that blocks on input until answered.
const WAITS_FOR_INPUT: &str = "let answer = input()\nprint(\"got \" + answer)";

// ══════════════════════════════════════════════════════════════════════════════
// Basic runs
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_simple_job_message_sequence() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let (key, position) = client.submit(&host, "print(\"hi\", 1 + 1)", &[]).await;
    assert_eq!(key.len(), 10);
    assert_eq!(position, 0);

    assert_eq!(client.next().await, ServerMessage::Ping);
    assert_eq!(client.next().await, ServerMessage::Running);
    assert_eq!(client.next().await, output("hi 2", "\n"));
    match client.next().await {
        ServerMessage::Success { files } => {
            assert_eq!(files.get("main.tarn").map(String::as_str), Some("print(\"hi\", 1 + 1)"));
        }
        other => panic!("expected SUCCESS, got {other:?}"),
    }
}

#[tokio::test]
async fn test_returned_files_include_written_files() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let source = "let n = num(read_file(\"n.txt\"))\nwrite_file(\"double.txt\", n * 2)";
    client.submit(&host, source, &[("n.txt", "21")]).await;
    let (messages, returned) = client.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running]);
    assert_eq!(
        returned,
        files(&[("double.txt", "42"), ("main.tarn", source), ("n.txt", "21")])
    );
}

#[tokio::test]
async fn test_determinism() {
    let host = start_host(Duration::from_secs(30)).await;
    let source = r#"
let acc = []
for i in range(20) {
  set acc = push(acc, i * i % 7)
}
print(acc)
write_file("result.txt", acc)
append_file("log.txt", "done")
"#;
    let mut first = Client::new();
    first.submit(&host, source, &[("seed.txt", "x")]).await;
    let expected = first.until_success().await;

    for _ in 0..5 {
        let mut again = Client::new();
        again.submit(&host, source, &[("seed.txt", "x")]).await;
        assert_eq!(again.until_success().await, expected);
    }
}

#[tokio::test]
async fn test_workspace_is_wiped_between_jobs() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut first = Client::new();
    first
        .submit(&host, "write_file(\"leftover.txt\", 1)", &[("private.txt", "secret")])
        .await;
    let (_, returned) = first.until_success().await;
    assert!(returned.contains_key("leftover.txt"));

    let mut second = Client::new();
    second.submit(&host, "print(1)", &[]).await;
    let (_, returned) = second.until_success().await;
    assert_eq!(returned.keys().collect::<Vec<_>>(), vec!["main.tarn"]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Queue positions & cancellation
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_positions_and_cancel_of_queued_job() {
    let host = start_host(Duration::from_secs(30)).await;

    let mut head = Client::new();
    let (head_key, _) = head.submit(&host, WAITS_FOR_INPUT, &[]).await;
    head.expect_running().await;
    assert_eq!(head.next().await, ServerMessage::Input);

    let mut b = Client::new();
    let mut c = Client::new();
    let (b_key, b_pos) = b.submit(&host, "print(\"b\")", &[]).await;
    let (_, c_pos) = c.submit(&host, "print(\"c\")", &[]).await;
    assert_eq!((b_pos, c_pos), (1, 2));

    host.handle.stop(b_key).unwrap();
    assert_eq!(c.next().await, ServerMessage::QueueUpdate { position: 1 });

    host.handle.input(head_key, "go".into()).unwrap();
    let (messages, _) = head.until_success().await;
    assert_eq!(messages, vec![output("got go", "\n")]);

    let (messages, _) = c.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("c", "\n")]);

    // The cancelled job never ran
    assert!(b.pending().is_empty());
}

#[tokio::test]
async fn test_cancel_running_job_is_silent() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut runner = Client::new();
    let source = "write_file(\"progress.txt\", \"started\")\nprint(\"started\")\nlet i = 0\nwhile true {\n  set i = i + 1\n}";
    let (key, _) = runner.submit(&host, source, &[]).await;
    runner.expect_running().await;
    assert_eq!(runner.next_event().await, output("started", "\n"));

    let mut waiting = Client::new();
    let (_, position) = waiting.submit(&host, "print(\"next\")", &[]).await;
    assert_eq!(position, 1);

    host.handle.stop(key).unwrap();
    let (messages, returned) = runner.until_success().await;
    assert!(errors(&messages).is_empty(), "unexpected errors: {messages:?}");
    assert_eq!(returned.get("progress.txt").map(String::as_str), Some("started"));

    // The other job is untouched and runs next
    let (messages, _) = waiting.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("next", "\n")]);
}

#[tokio::test]
async fn test_stop_unknown_key_is_noop() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let (key, _) = client.submit(&host, WAITS_FOR_INPUT, &[]).await;
    client.expect_running().await;
    assert_eq!(client.next().await, ServerMessage::Input);

    host.handle.stop("ZZZZZZZZZZ".into()).unwrap();
    host.handle.input(key, "still here".into()).unwrap();
    let (messages, _) = client.until_success().await;
    assert_eq!(messages, vec![output("got still here", "\n")]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Input rendezvous
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_input_echo() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let (key, _) = client.submit(&host, "print(input())", &[]).await;
    client.expect_running().await;
    assert_eq!(client.next().await, ServerMessage::Input);

    host.handle.input(key, "hello".into()).unwrap();
    let (messages, _) = client.until_success().await;
    assert_eq!(messages, vec![output("hello", "\n")]);
}

#[tokio::test]
async fn test_input_with_wrong_key_is_ignored() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let (key, _) = client.submit(&host, "let x = input(\"> \")\nprint(x)", &[]).await;
    client.expect_running().await;
    assert_eq!(client.next_event().await, output("> ", ""));
    assert_eq!(client.next_event().await, ServerMessage::Input);

    host.handle.input("WRONGKEY00".into(), "intruder".into()).unwrap();
    host.handle.input(key, "owner".into()).unwrap();
    let (messages, _) = client.until_success().await;
    assert_eq!(messages, vec![output("owner", "\n")]);
}

#[tokio::test]
async fn test_only_first_answer_is_used() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let (key, _) = client.submit(&host, WAITS_FOR_INPUT, &[]).await;
    client.expect_running().await;
    assert_eq!(client.next().await, ServerMessage::Input);
    host.handle.input(key.clone(), "first".into()).unwrap();
    host.handle.input(key, "second".into()).unwrap();
    let (messages, _) = client.until_success().await;
    assert_eq!(messages, vec![output("got first", "\n")]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unterminated_block_reports_one_syntax_error() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let source = "let x = 1\nif x > 0 {\n  print(x)\n";
    client.submit(&host, source, &[("data.txt", "keep")]).await;
    let (messages, returned) = client.until_success().await;

    let errs = errors(&messages);
    assert_eq!(errs.len(), 1, "{messages:?}");
    assert!(errs[0].starts_with("[line 2] Syntax error:"), "got: {}", errs[0]);
    assert!(!messages.iter().any(|m| matches!(m, ServerMessage::Output { .. })));
    assert_eq!(returned, files(&[("data.txt", "keep"), ("main.tarn", source)]));
}

#[tokio::test]
async fn test_runtime_error_keeps_prior_output_and_does_not_leak() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut bad = Client::new();
    bad.submit(&host, "print(\"before\")\nprint(missing)\nprint(\"after\")", &[])
        .await;
    let (messages, _) = bad.until_success().await;
    assert_eq!(
        messages,
        vec![
            ServerMessage::Running,
            output("before", "\n"),
            ServerMessage::Error {
                text: "[line 2] Runtime error: undefined variable 'missing'".into(),
                end: "\n".into(),
            },
        ]
    );

    let mut good = Client::new();
    good.submit(&host, "print(\"clean\")", &[]).await;
    let (messages, _) = good.until_success().await;
    assert!(errors(&messages).is_empty());
}

#[tokio::test]
async fn test_missing_entrypoint() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    client
        .submit_files(&host, files(&[("other.tarn", "print(1)")]), "main.tarn")
        .await;
    let (messages, returned) = client.until_success().await;
    assert_eq!(
        errors(&messages),
        vec!["Runtime error: entrypoint 'main.tarn' not found".to_string()]
    );
    assert_eq!(returned, files(&[("other.tarn", "print(1)")]));
}

#[tokio::test]
async fn test_timeout_reports_error_then_success() {
    let timeout = Duration::from_secs(1);
    let host = start_host(timeout).await;
    let mut client = Client::new();
    client
        .submit(&host, "write_file(\"spin.txt\", \"on\")\nlet i = 0\nwhile true {\n  set i = i + 1\n}", &[])
        .await;
    client.expect_running().await;
    let started = Instant::now();

    let (messages, returned) = client.until_success().await;
    let elapsed = started.elapsed();
    assert_eq!(
        errors(&messages),
        vec!["Timeout error: Process exceeded 1s limit".to_string()]
    );
    assert!(elapsed >= timeout - Duration::from_millis(100), "finished early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(3), "took {elapsed:?}");
    assert_eq!(returned.get("spin.txt").map(String::as_str), Some("on"));
}

#[tokio::test]
async fn test_timeout_while_waiting_for_input() {
    let timeout = Duration::from_secs(1);
    let host = start_host(timeout).await;
    let mut client = Client::new();
    client.submit(&host, WAITS_FOR_INPUT, &[]).await;
    client.expect_running().await;
    assert_eq!(client.next().await, ServerMessage::Input);
    let (messages, _) = client.until_success().await;
    assert_eq!(
        errors(&messages),
        vec!["Timeout error: Process exceeded 1s limit".to_string()]
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Sandboxing
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_path_separator_files_are_never_written_or_returned() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let source = "print(read_file(\"ok.txt\"))";
    client
        .submit(
            &host,
            source,
            &[("ok.txt", "fine"), ("sub/evil.txt", "x"), ("..\\up.txt", "y"), ("/abs.txt", "z")],
        )
        .await;
    let (messages, returned) = client.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("fine", "\n")]);
    assert_eq!(returned, files(&[("main.tarn", source), ("ok.txt", "fine")]));
}

#[tokio::test]
async fn test_script_cannot_write_outside_workspace() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    client.submit(&host, "write_file(\"../escape.txt\", \"x\")", &[]).await;
    let (messages, returned) = client.until_success().await;
    let errs = errors(&messages);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].starts_with("[line 1] Runtime error: file error"), "got: {}", errs[0]);
    assert_eq!(returned.keys().collect::<Vec<_>>(), vec!["main.tarn"]);
}

#[tokio::test]
async fn test_file_the_filesystem_refuses_is_dropped() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let long_name = "a".repeat(300);
    client.submit(&host, "print(1)", &[(long_name.as_str(), "x")]).await;
    let (messages, returned) = client.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("1", "\n")]);
    assert_eq!(returned, files(&[("main.tarn", "print(1)")]));
}

#[tokio::test]
async fn test_workspace_failure_still_ends_the_job() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    let long_name = "a".repeat(300);
    client
        .submit_files(&host, files(&[(long_name.as_str(), "print(1)")]), &long_name)
        .await;
    let (messages, returned) = client.until_success().await;
    let errs = errors(&messages);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].starts_with("Runtime error: "), "got: {}", errs[0]);
    assert!(returned.is_empty());

    // The host keeps serving
    let mut next = Client::new();
    next.submit(&host, "print(2)", &[]).await;
    let (messages, _) = next.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("2", "\n")]);
}

#[tokio::test]
async fn test_runaway_list_nesting_does_not_take_down_the_host() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut client = Client::new();
    client
        .submit(&host, "let l = []\nwhile true {\n  set l = [l]\n}", &[])
        .await;
    let (messages, _) = client.until_success().await;
    assert_eq!(
        errors(&messages),
        vec!["[line 3] Runtime error: lists nested deeper than 64 levels".to_string()]
    );

    let mut next = Client::new();
    next.submit(&host, "print(\"alive\")", &[]).await;
    let (messages, _) = next.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("alive", "\n")]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Disconnects
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_disconnect_mid_run_abandons_job() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut leaving = Client::new();
    leaving
        .submit(&host, WAITS_FOR_INPUT, &[("mine.txt", "private")])
        .await;
    leaving.expect_running().await;
    assert_eq!(leaving.next().await, ServerMessage::Input);

    let mut next = Client::new();
    next.submit(&host, "print(\"after\")", &[]).await;

    let peer_id = leaving.peer.id();
    drop(leaving);
    host.handle.disconnected(peer_id).unwrap();

    let (messages, returned) = next.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("after", "\n")]);
    assert!(!returned.contains_key("mine.txt"));
}

#[tokio::test]
async fn test_unreachable_queued_peer_is_pruned() {
    let host = start_host(Duration::from_secs(30)).await;
    let mut head = Client::new();
    let (head_key, _) = head.submit(&host, WAITS_FOR_INPUT, &[]).await;
    head.expect_running().await;
    assert_eq!(head.next().await, ServerMessage::Input);

    let mut gone = Client::new();
    let mut stays = Client::new();
    gone.submit(&host, "print(\"gone\")", &[]).await;
    let (_, position) = stays.submit(&host, "print(\"stays\")", &[]).await;
    assert_eq!(position, 2);
    drop(gone);

    host.handle.input(head_key, "x".into()).unwrap();
    head.until_success().await;

    // The pruned job is skipped; the survivor runs as the new head
    let (messages, _) = stays.until_success().await;
    assert_eq!(messages, vec![ServerMessage::Running, output("stays", "\n")]);
}
