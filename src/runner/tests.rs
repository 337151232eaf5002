//! End-to-end runner tests against fake agents written as `sh` scripts.
//!
//! Scripts run as `sh <script>` so nothing needs the executable bit, and each
//! appends a line to a counter file per spawn.

#![cfg(unix)]

use super::*;
use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::parser::{NonSubstantivePolicy, ParserSet};
use crate::registry::{OverrideSet, ProfileSet, Registry};
use serde_json::json;
use serial_test::serial;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SUBSTANTIVE: &str = "Step 1: move the parser into its own module. Step 2: cover it with tests.";
const GREETING: &str = "How can I help you today?";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn counter(&self) -> PathBuf {
        self.dir.path().join("spawns")
    }

    /// Write a script that records its spawn, then runs `body`.
    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let script = format!("echo spawn >> '{}'\n{}\n", self.counter().display(), body);
        std::fs::write(&path, script).unwrap();
        path
    }

    fn spawns(&self) -> usize {
        std::fs::read_to_string(self.counter())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

/// One profile entry running `script` through `sh`. `extra` lines are
/// inserted verbatim at profile indentation.
fn agent(id: &str, script: &PathBuf, parser: &str, extra: &str) -> String {
    format!(
        "  - id: {}\n    command: sh\n    args: ['{}']\n    parser: {}\n{}    roles:\n      default: {{}}\n",
        id,
        script.display(),
        parser,
        extra
    )
}

fn bridge(agents: &[String]) -> Bridge {
    let yaml = format!("agents:\n{}", agents.concat());
    let profiles = ProfileSet::from_yaml(&yaml, None).unwrap();
    let policy = NonSubstantivePolicy::from_config(profiles.policy()).unwrap();
    let parsers = Arc::new(ParserSet::builtin(policy));
    let registry = Registry::new(profiles, OverrideSet::default(), &parsers).unwrap();
    Bridge::new(registry, AgentRunner::new(parsers))
}

fn run(bridge: &Bridge, agent_id: &str, request: ExecutionRequest) -> ExecutionOutcome {
    bridge.execute(agent_id, &request, &CancelToken::new())
}

/// Script for an iflow-style agent: `first` on a fresh call, `second` when
/// resumed, with an optional session block.
fn iflow_script(fixture: &Fixture, first: &str, second: &str, with_session: bool) -> PathBuf {
    let session = if with_session {
        "printf '<Execution Info>\\n{\"session-id\":\"sess-77\"}\\n</Execution Info>\\n'"
    } else {
        ""
    };
    fixture.script(
        "iflow.sh",
        &format!(
            "cat > /dev/null\nif [ \"$1\" = \"--resume\" ]; then\n  printf '%s\\n' '{}'\nelse\n  printf '%s\\n' '{}'\nfi\n{}",
            second, first, session
        ),
    )
}

const RETRY_EXTRA: &str =
    "    session_args: [--resume, '{session_id}']\n    retry:\n      enabled: true\n      continuation_prompt: keep going\n";

#[test]
fn test_gemini_json_over_stdin() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "gemini.sh",
        r#"input=$(cat)
printf '{"response":"Echo: %s","stats":{"models":{"gemini-2.5-pro":{"tokens":{"total":12}}}}}\n' "$input""#,
    );
    let bridge = bridge(&[agent("gemini", &script, "gemini_json", "")]);

    let outcome = run(&bridge, "gemini", ExecutionRequest::new("default", "ping"));
    let response = outcome.response().unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    assert_eq!(response.content, "Echo: ping");
    assert_eq!(response.metadata["agent"], json!("gemini"));
    assert_eq!(response.metadata["parser"], json!("gemini_json"));
    assert_eq!(response.metadata["exit_code"], json!(0));
    assert_eq!(response.metadata["attempts"], json!(1));
    assert!(response.metadata.contains_key("started_at"));
    assert_eq!(fixture.spawns(), 1);
}

#[test]
fn test_codex_jsonl_stream() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "codex.sh",
        r#"cat > /dev/null
echo 'Reading prompt from stdin...'
echo '{"type":"thread.started","thread_id":"th-1"}'
echo '{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"thinking"}}'
echo '{"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":"Renamed the function."}}'
echo '{"type":"turn.completed","usage":{"input_tokens":10,"output_tokens":4}}'"#,
    );
    let bridge = bridge(&[agent("codex", &script, "codex_jsonl", "")]);

    let response = run(&bridge, "codex", ExecutionRequest::new("default", "rename it"))
        .into_result()
        .unwrap();
    assert_eq!(response.content, "Renamed the function.");
    assert_eq!(response.session_id(), Some("th-1"));
    assert_eq!(response.metadata["usage"]["output_tokens"], json!(4));
}

#[test]
fn test_named_arg_delivery() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "named.sh",
        r#"[ "$1" = "--prompt" ] || exit 9
printf 'got %s\n' "$2""#,
    );
    let bridge = bridge(&[agent(
        "qwenish",
        &script,
        "vecli_plain",
        "    prompt_delivery: named_arg\n    prompt_flag: --prompt\n",
    )]);

    let response = run(&bridge, "qwenish", ExecutionRequest::new("default", "hello world"))
        .into_result()
        .unwrap();
    assert_eq!(response.content, "got hello world");
    let command = response.metadata["command"].as_str().unwrap();
    assert!(command.ends_with("--prompt '<prompt>'"), "{command}");
}

#[test]
fn test_positional_delivery() {
    let fixture = Fixture::new();
    let script = fixture.script("positional.sh", r#"printf 'last=%s\n' "$1""#);
    let bridge = bridge(&[agent(
        "vecli",
        &script,
        "vecli_plain",
        "    prompt_delivery: positional\n",
    )]);

    let response = run(&bridge, "vecli", ExecutionRequest::new("default", "summarize"))
        .into_result()
        .unwrap();
    assert_eq!(response.content, "last=summarize");
}

#[test]
fn test_system_prompt_prepended_and_skipped_on_session() {
    let fixture = Fixture::new();
    let script = fixture.script("sys.sh", r#"printf 'args:%s\n' "$*"
cat"#);
    let yaml = format!(
        "agents:\n  - id: planner\n    command: sh\n    args: ['{}']\n    parser: vecli_plain\n    session_args: [--resume, '{{session_id}}']\n    roles:\n      default:\n        prompt: builtin:planner\n",
        script.display()
    );
    let profiles = ProfileSet::from_yaml(&yaml, None).unwrap();
    let parsers = Arc::new(ParserSet::default());
    let registry = Registry::new(profiles, OverrideSet::default(), &parsers).unwrap();
    let bridge = Bridge::new(registry, AgentRunner::new(parsers));

    let fresh = run(&bridge, "planner", ExecutionRequest::new("default", "plan it"))
        .into_result()
        .unwrap();
    assert!(fresh.content.starts_with("args:\n"));
    assert!(fresh.content.contains("planning agent"));
    assert!(fresh.content.ends_with("\n\nplan it"));

    let resumed = run(
        &bridge,
        "planner",
        ExecutionRequest::new("default", "plan it").with_session("s1"),
    )
    .into_result()
    .unwrap();
    assert_eq!(resumed.content, "args:--resume s1\nplan it");
}

#[test]
fn test_retry_recovers_substantive_answer() {
    let fixture = Fixture::new();
    let script = iflow_script(&fixture, GREETING, SUBSTANTIVE, true);
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan the refactor"));

    match &outcome {
        ExecutionOutcome::RetriedSuccess { response, attempts } => {
            assert_eq!(*attempts, 2);
            assert_eq!(response.content, SUBSTANTIVE);
            assert!(!response.non_substantive);
            assert_eq!(response.metadata["retried_from_session"], json!("sess-77"));
            assert_eq!(response.metadata["attempts"], json!(2));
        }
        other => panic!("expected a retried success, got {other:?}"),
    }
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(fixture.spawns(), 2);
}

#[test]
fn test_no_retry_when_disabled() {
    let fixture = Fixture::new();
    let script = iflow_script(&fixture, GREETING, SUBSTANTIVE, true);
    let bridge = bridge(&[agent(
        "iflow",
        &script,
        "iflow_plain",
        "    session_args: [--resume, '{session_id}']\n",
    )]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan"));
    let response = outcome.response().unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    assert!(response.non_substantive);
    assert_eq!(response.content, GREETING);
    assert_eq!(fixture.spawns(), 1);
}

#[test]
fn test_no_retry_for_substantive_answer() {
    let fixture = Fixture::new();
    let script = iflow_script(&fixture, SUBSTANTIVE, GREETING, true);
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan"));

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    assert_eq!(outcome.response().unwrap().content, SUBSTANTIVE);
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(fixture.spawns(), 1);
}

#[test]
fn test_no_retry_without_session_id() {
    let fixture = Fixture::new();
    let script = iflow_script(&fixture, GREETING, SUBSTANTIVE, false);
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan"));
    let response = outcome.response().unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    assert!(response.non_substantive);
    assert!(response.warnings().iter().any(|w| w.contains("no session id")));
    assert_eq!(fixture.spawns(), 1);
}

#[test]
fn test_retry_happens_at_most_once() {
    let fixture = Fixture::new();
    let script = iflow_script(&fixture, GREETING, "Hello! What would you like me to do?", true);
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan"));
    let response = outcome.response().unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    // The original answer is kept, flagged as retried
    assert_eq!(response.content, GREETING);
    assert!(response.non_substantive);
    assert_eq!(response.metadata["retry_attempted"], json!(true));
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(fixture.spawns(), 2);
}

#[test]
fn test_failed_retry_keeps_first_answer() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "iflow.sh",
        &format!(
            "cat > /dev/null\n[ \"$1\" = \"--resume\" ] && exit 1\nprintf '%s\\n' '{}'\nprintf '<Execution Info>\\n{{\"session-id\":\"sess-77\"}}\\n</Execution Info>\\n'",
            GREETING
        ),
    );
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let outcome = run(&bridge, "iflow", ExecutionRequest::new("default", "plan"));
    let response = outcome.response().unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Success(_)));
    assert_eq!(response.content, GREETING);
    assert!(
        response
            .warnings()
            .iter()
            .any(|w| w.starts_with("continuation retry failed"))
    );
    assert_eq!(fixture.spawns(), 2);
}

#[test]
#[serial]
fn test_timeout_kills_agent_ignoring_sigterm() {
    let fixture = Fixture::new();
    let script = fixture.script("stuck.sh", "trap '' TERM\nsleep 30");
    let bridge = bridge(&[agent("stuck", &script, "vecli_plain", "")]);

    let timeout = Duration::from_millis(500);
    let start = Instant::now();
    let outcome = run(
        &bridge,
        "stuck",
        ExecutionRequest::new("default", "x").with_timeout(timeout),
    );
    let elapsed = start.elapsed();

    match outcome.error() {
        Some(BridgeError::Timeout { agent, command, .. }) => {
            assert_eq!(agent, "stuck");
            assert_eq!(command, "sh");
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
#[serial]
fn test_cancel_from_another_thread() {
    let fixture = Fixture::new();
    let script = fixture.script("slow.sh", "sleep 30");
    let bridge = bridge(&[agent("slow", &script, "vecli_plain", "")]);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trigger.cancel();
    });

    let start = Instant::now();
    let outcome = bridge.execute("slow", &ExecutionRequest::new("default", "x"), &cancel);
    canceller.join().unwrap();

    assert!(matches!(
        outcome.error(),
        Some(BridgeError::Cancelled {
            first_attempt: None,
            ..
        })
    ));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
#[serial]
fn test_cancel_during_retry_reports_first_attempt() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "iflow.sh",
        &format!(
            "cat > /dev/null\n[ \"$1\" = \"--resume\" ] && sleep 30\nprintf '%s\\n' '{}'\nprintf '<Execution Info>\\n{{\"session-id\":\"sess-77\"}}\\n</Execution Info>\\n'",
            GREETING
        ),
    );
    let bridge = bridge(&[agent("iflow", &script, "iflow_plain", RETRY_EXTRA)]);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(750));
        trigger.cancel();
    });

    let outcome = bridge.execute("iflow", &ExecutionRequest::new("default", "plan"), &cancel);
    canceller.join().unwrap();

    match outcome.error() {
        Some(BridgeError::Cancelled {
            first_attempt: Some(metadata),
            ..
        }) => assert_eq!(metadata["session_id"], json!("sess-77")),
        other => panic!("expected cancellation with first attempt, got {other:?}"),
    }
    assert_eq!(fixture.spawns(), 2);
}

#[test]
fn test_unknown_agent_and_role_spawn_nothing() {
    let fixture = Fixture::new();
    let script = fixture.script("ok.sh", "echo ok");
    let bridge = bridge(&[agent("alpha", &script, "vecli_plain", "")]);

    let outcome = run(&bridge, "omega", ExecutionRequest::new("default", "x"));
    assert!(matches!(outcome.error(), Some(BridgeError::UnknownAgent { .. })));

    let outcome = run(&bridge, "alpha", ExecutionRequest::new("poet", "x"));
    assert!(matches!(outcome.error(), Some(BridgeError::UnsupportedRole { .. })));

    assert_eq!(fixture.spawns(), 0);
}

#[test]
#[serial]
fn test_concurrent_calls_overlap() {
    let fixture = Fixture::new();
    let first = fixture.script("one.sh", "sleep 1\necho one");
    let second = fixture.script("two.sh", "sleep 1\necho two");
    let bridge = bridge(&[
        agent("one", &first, "vecli_plain", ""),
        agent("two", &second, "vecli_plain", ""),
    ]);

    let start = Instant::now();
    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| run(&bridge, "one", ExecutionRequest::new("default", "x")));
        let b = scope.spawn(|| run(&bridge, "two", ExecutionRequest::new("default", "x")));
        (a.join().unwrap(), b.join().unwrap())
    });
    let elapsed = start.elapsed();

    assert_eq!(a.response().unwrap().content, "one");
    assert_eq!(b.response().unwrap().content, "two");
    assert!(elapsed < Duration::from_millis(1900), "took {elapsed:?}");
}

#[test]
fn test_nonzero_exit_with_valid_output_is_success() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "gemini.sh",
        r#"cat > /dev/null
echo '{"response":"Partial but usable answer."}'
exit 2"#,
    );
    let bridge = bridge(&[agent("gemini", &script, "gemini_json", "")]);

    let outcome = run(&bridge, "gemini", ExecutionRequest::new("default", "x"));
    let response = outcome.response().unwrap();

    assert_eq!(response.content, "Partial but usable answer.");
    assert_eq!(response.metadata["exit_code"], json!(2));
    assert!(response.warnings().iter().any(|w| w.contains("status 2")));
}

#[test]
fn test_nonzero_exit_with_garbage_is_parser_error() {
    let fixture = Fixture::new();
    let script = fixture.script("broken.sh", "cat > /dev/null\necho 'panic: oops'\nexit 1");
    let bridge = bridge(&[agent("claude", &script, "claude_json", "")]);

    let outcome = run(&bridge, "claude", ExecutionRequest::new("default", "x"));
    match outcome.error() {
        Some(BridgeError::Parser { agent, source }) => {
            assert_eq!(agent, "claude");
            assert!(source.to_string().contains("claude_json"));
        }
        other => panic!("expected a parser error, got {other:?}"),
    }
}

#[test]
fn test_missing_executable_is_launch_error() {
    let yaml = "agents:\n  - id: ghost\n    command: /nonexistent/ghost-agent\n    parser: vecli_plain\n    roles: {default: {}}\n";
    let profiles = ProfileSet::from_yaml(yaml, None).unwrap();
    let parsers = Arc::new(ParserSet::default());
    let registry = Registry::new(profiles, OverrideSet::default(), &parsers).unwrap();
    let bridge = Bridge::new(registry, AgentRunner::new(parsers));

    let outcome = run(&bridge, "ghost", ExecutionRequest::new("default", "x"));
    match outcome.error() {
        Some(BridgeError::Launch { agent, command, .. }) => {
            assert_eq!(agent, "ghost");
            assert_eq!(command, "/nonexistent/ghost-agent");
        }
        other => panic!("expected a launch error, got {other:?}"),
    }
}

#[test]
fn test_stderr_noise_is_filtered() {
    let fixture = Fixture::new();
    let script = fixture.script(
        "noisy.sh",
        "echo 'The system cannot find the path specified.' >&2\necho 'rate limited once' >&2\necho answer",
    );
    let bridge = bridge(&[agent(
        "noisy",
        &script,
        "vecli_plain",
        "    stderr_noise: ['^The system cannot find the path specified\\.?$']\n",
    )]);

    let response = run(&bridge, "noisy", ExecutionRequest::new("default", "x"))
        .into_result()
        .unwrap();
    assert_eq!(response.metadata["stderr"], json!("rate limited once"));
    assert_eq!(response.metadata["stderr_noise_removed"], json!(1));
}

#[test]
fn test_output_cap_truncates_with_warning() {
    let fixture = Fixture::new();
    let script = fixture.script("chatty.sh", "head -c 5000 /dev/zero | tr '\\0' 'a'");
    let bridge = bridge(&[agent(
        "chatty",
        &script,
        "vecli_plain",
        "    max_output_bytes: 64\n",
    )]);

    let response = run(&bridge, "chatty", ExecutionRequest::new("default", "x"))
        .into_result()
        .unwrap();
    assert_eq!(response.content.len(), 64);
    assert!(response.warnings().iter().any(|w| w.contains("truncated")));
}

#[test]
fn test_working_dir_is_applied() {
    let fixture = Fixture::new();
    let script = fixture.script("pwd.sh", "pwd");
    let bridge = bridge(&[agent("pwd", &script, "vecli_plain", "")]);
    let workdir = TempDir::new().unwrap();

    let response = run(
        &bridge,
        "pwd",
        ExecutionRequest::new("default", "x").with_working_dir(workdir.path()),
    )
    .into_result()
    .unwrap();
    let expected = workdir.path().canonicalize().unwrap();
    assert_eq!(PathBuf::from(&response.content).canonicalize().unwrap(), expected);
}
