//! Tests for profile loading, override merging and resolution.

use super::*;
use crate::parser::ParserSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const MERGE_PROFILES: &str = r#"
agents:
  - id: alpha
    command: alpha-cli
    args: [a]
    parser: vecli_plain
    roles:
      default: {}
      planner:
        args: [b]
"#;

fn builtin_registry() -> Registry {
    Registry::new(
        ProfileSet::builtin().unwrap(),
        OverrideSet::default(),
        &ParserSet::default(),
    )
    .unwrap()
}

fn registry(profiles: &str, overrides: &str) -> Registry {
    let profiles = ProfileSet::from_yaml(profiles, None).unwrap();
    let overrides = OverrideSet::from_yaml(overrides, None).unwrap();
    Registry::new(profiles, overrides, &ParserSet::default()).unwrap()
}

#[test]
fn test_builtin_profiles_load() {
    let registry = builtin_registry();

    assert_eq!(
        registry.agent_ids(),
        vec!["claude", "codex", "gemini", "iflow", "kimi", "qwen", "vecli"]
    );
    for id in registry.agent_ids() {
        assert_eq!(
            registry.supported_roles(&id),
            vec!["codereviewer", "default", "planner"],
            "roles of {}",
            id
        );
    }
}

#[test]
fn test_builtin_iflow_invocation() {
    let registry = builtin_registry();
    let inv = registry.resolve("iflow", "default").unwrap();

    assert_eq!(inv.program, "iflow");
    assert!(inv.args.is_empty());
    assert_eq!(inv.prompt_delivery, PromptDelivery::NamedArg);
    assert_eq!(inv.prompt_flag.as_deref(), Some("--prompt"));
    assert_eq!(inv.parser_id, "iflow_plain");
    assert!(inv.retry.enabled);
    assert_eq!(inv.retry.continuation_prompt, "继续");
    assert_eq!(inv.session_args, vec!["--resume", "{session_id}"]);
    assert!(!inv.noise.is_empty());
    assert_eq!(inv.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));
    assert!(inv.system_prompt.is_some());
}

#[test]
fn test_builtin_claude_planner() {
    let registry = builtin_registry();
    let inv = registry.resolve("claude", "planner").unwrap();

    assert_eq!(
        inv.args,
        vec!["--print", "--output-format", "json", "--permission-mode", "plan"]
    );
    assert_eq!(inv.system_prompt_flag.as_deref(), Some("--append-system-prompt"));
    assert!(inv.system_prompt.as_deref().unwrap().contains("planning agent"));
    assert!(!inv.retry.enabled);
    assert_eq!(inv.retry.continuation_prompt, DEFAULT_CONTINUATION_PROMPT);
}

#[test]
fn test_merge_order_profile_role_override() {
    let registry = registry(MERGE_PROFILES, "alpha:\n  args: [c]\n");
    let inv = registry.resolve("alpha", "planner").unwrap();
    assert_eq!(inv.args, vec!["a", "b", "c"]);
}

#[test]
fn test_override_replaces_command() {
    let registry = registry(
        MERGE_PROFILES,
        "alpha:\n  command: \"/opt/alpha/bin/alpha --profile 'work dir'\"\n",
    );
    let inv = registry.resolve("alpha", "default").unwrap();

    assert_eq!(inv.program, "/opt/alpha/bin/alpha");
    assert_eq!(inv.args, vec!["--profile", "work dir", "a"]);
}

#[test]
fn test_override_replace_args() {
    let registry = registry(MERGE_PROFILES, "alpha:\n  args: [x, y]\n  replace_args: true\n");
    let inv = registry.resolve("alpha", "planner").unwrap();
    // Profile defaults replaced; role arguments still apply
    assert_eq!(inv.args, vec!["x", "y", "b"]);
}

#[test]
fn test_role_override_args() {
    let appended = registry(MERGE_PROFILES, "alpha:\n  roles:\n    planner:\n      args: [r]\n");
    assert_eq!(appended.resolve("alpha", "planner").unwrap().args, vec!["a", "b", "r"]);

    let replaced = registry(
        MERGE_PROFILES,
        "alpha:\n  roles:\n    planner:\n      args: [r]\n      replace_args: true\n",
    );
    assert_eq!(replaced.resolve("alpha", "planner").unwrap().args, vec!["a", "r"]);
}

#[test]
fn test_env_and_timeout_precedence() {
    let profiles = r#"
agents:
  - id: alpha
    command: alpha
    parser: vecli_plain
    timeout_seconds: 120
    env: {MODE: profile, KEEP: yes}
    roles: {default: {}}
"#;
    let plain = registry(profiles, "");
    let inv = plain.resolve("alpha", "default").unwrap();
    assert_eq!(inv.timeout, Duration::from_secs(120));
    assert_eq!(inv.env.get("MODE").map(String::as_str), Some("profile"));

    let overridden = registry(profiles, "alpha:\n  timeout_seconds: 30\n  env: {MODE: override}\n");
    let inv = overridden.resolve("alpha", "default").unwrap();
    assert_eq!(inv.timeout, Duration::from_secs(30));
    assert_eq!(inv.env.get("MODE").map(String::as_str), Some("override"));
    assert_eq!(inv.env.get("KEEP").map(String::as_str), Some("yes"));
}

#[test]
fn test_resolution_is_cached() {
    let registry = registry(MERGE_PROFILES, "");
    let first = registry.resolve("alpha", "default").unwrap();
    let second = registry.resolve("alpha", "default").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_unknown_agent() {
    let registry = registry(MERGE_PROFILES, "");
    let err = registry.resolve("omega", "default").unwrap_err();

    assert!(matches!(err, BridgeError::UnknownAgent { .. }));
    let msg = err.to_string();
    assert!(msg.contains("'omega'"));
    assert!(msg.contains("alpha"));
}

#[test]
fn test_unsupported_role() {
    let registry = registry(MERGE_PROFILES, "");
    let err = registry.resolve("alpha", "poet").unwrap_err();

    match err {
        BridgeError::UnsupportedRole {
            agent,
            role,
            supported,
        } => {
            assert_eq!(agent, "alpha");
            assert_eq!(role, "poet");
            assert_eq!(supported, "default, planner");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_override_adds_role() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("poet.txt"), "Answer in verse.\n").unwrap();
    let overrides_path = temp_dir.path().join("overrides.yaml");
    std::fs::write(
        &overrides_path,
        "alpha:\n  roles:\n    poet:\n      prompt_file: poet.txt\n      args: [--rhyme]\n",
    )
    .unwrap();

    let profiles = ProfileSet::from_yaml(MERGE_PROFILES, None).unwrap();
    let overrides = OverrideSet::load(&overrides_path).unwrap();
    let registry = Registry::new(profiles, overrides, &ParserSet::default()).unwrap();

    let inv = registry.resolve("alpha", "poet").unwrap();
    assert_eq!(inv.args, vec!["a", "--rhyme"]);
    assert_eq!(inv.system_prompt.as_deref(), Some("Answer in verse."));
    assert_eq!(registry.supported_roles("alpha"), vec!["default", "planner", "poet"]);
}

#[test]
fn test_prompt_path_relative_to_profile_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("prompts")).unwrap();
    std::fs::write(temp_dir.path().join("prompts/review.txt"), "Be strict.").unwrap();
    let path = temp_dir.path().join("agents.yaml");
    std::fs::write(
        &path,
        r#"
agents:
  - id: alpha
    command: alpha
    parser: vecli_plain
    roles:
      codereviewer:
        prompt: prompts/review.txt
"#,
    )
    .unwrap();

    let registry = Registry::new(
        ProfileSet::load(&path).unwrap(),
        OverrideSet::default(),
        &ParserSet::default(),
    )
    .unwrap();
    let inv = registry.resolve("alpha", "codereviewer").unwrap();
    assert_eq!(inv.system_prompt.as_deref(), Some("Be strict."));
}

#[test]
fn test_missing_prompt_file_is_config_error() {
    let profiles = r#"
agents:
  - id: alpha
    command: alpha
    parser: vecli_plain
    roles:
      default:
        prompt: /nonexistent/prompt.txt
"#;
    let profiles = ProfileSet::from_yaml(profiles, None).unwrap();
    let err = Registry::new(profiles, OverrideSet::default(), &ParserSet::default()).unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, BridgeError::Config(_)));
    assert!(msg.contains("agent 'alpha' role 'default'"));
    assert!(msg.contains("/nonexistent/prompt.txt"));
}

#[test]
fn test_unknown_builtin_prompt() {
    let profiles = "agents:\n  - id: alpha\n    command: alpha\n    parser: vecli_plain\n    roles:\n      default: {prompt: 'builtin:nope'}\n";
    let profiles = ProfileSet::from_yaml(profiles, None).unwrap();
    let err = Registry::new(profiles, OverrideSet::default(), &ParserSet::default()).unwrap_err();
    assert!(err.to_string().contains("unknown built-in prompt 'nope'"));
}

#[test]
fn test_duplicate_agent_id() {
    let yaml = r#"
agents:
  - {id: alpha, command: a, parser: vecli_plain, roles: {default: {}}}
  - {id: alpha, command: b, parser: vecli_plain, roles: {default: {}}}
"#;
    let err = ProfileSet::from_yaml(yaml, None).unwrap_err();
    assert!(err.to_string().contains("duplicate agent id 'alpha'"));
}

#[test]
fn test_missing_required_fields() {
    let no_command = "agents:\n  - {id: alpha, parser: vecli_plain, roles: {default: {}}}\n";
    let err = ProfileSet::from_yaml(no_command, None).unwrap_err();
    assert!(err.to_string().contains("agent 'alpha' is missing required field 'command'"));

    let no_parser = "agents:\n  - {id: alpha, command: alpha, roles: {default: {}}}\n";
    let err = ProfileSet::from_yaml(no_parser, None).unwrap_err();
    assert!(err.to_string().contains("agent 'alpha' is missing required field 'parser'"));
}

#[test]
fn test_named_arg_requires_flag() {
    let yaml = "agents:\n  - {id: alpha, command: a, parser: vecli_plain, prompt_delivery: named_arg, roles: {default: {}}}\n";
    let err = ProfileSet::from_yaml(yaml, None).unwrap_err();
    assert!(err.to_string().contains("prompt_flag"));
}

#[test]
fn test_session_args_need_slot() {
    let yaml = "agents:\n  - {id: alpha, command: a, parser: vecli_plain, session_args: [--resume], roles: {default: {}}}\n";
    let err = ProfileSet::from_yaml(yaml, None).unwrap_err();
    assert!(err.to_string().contains("{session_id}"));

    let yaml = "agents:\n  - {id: alpha, command: a, parser: vecli_plain, session_args: ['{session_id}', '{thread}'], roles: {default: {}}}\n";
    let err = ProfileSet::from_yaml(yaml, None).unwrap_err();
    assert!(err.to_string().contains("'thread'"));
}

#[test]
fn test_unknown_parser_id() {
    let yaml = "agents:\n  - {id: alpha, command: a, parser: xml_soap, roles: {default: {}}}\n";
    let profiles = ProfileSet::from_yaml(yaml, None).unwrap();
    let err = Registry::new(profiles, OverrideSet::default(), &ParserSet::default()).unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("agent 'alpha' references unknown parser 'xml_soap'"));
    assert!(msg.contains("codex_jsonl"));
}

#[test]
fn test_malformed_profiles_yaml() {
    let err = ProfileSet::from_yaml("agents: [unclosed", None).unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
}

#[test]
fn test_missing_profiles_file() {
    let err = ProfileSet::load("/nonexistent/agents.yaml").unwrap_err();
    assert!(err.to_string().contains("failed to read agent profiles"));
}

#[test]
fn test_missing_overrides_file_is_empty() {
    let overrides = OverrideSet::load("/nonexistent/overrides.yaml").unwrap();
    assert!(overrides.is_empty());
}

#[test]
fn test_malformed_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("overrides.yaml");
    std::fs::write(&path, "alpha:\n  args: [unclosed\n").unwrap();

    let err = OverrideSet::load(&path).unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
}

#[test]
fn test_overrides_tolerate_unknown_fields() {
    let overrides = OverrideSet::from_yaml("alpha:\n  args: [c]\n  colour: blue\n", None).unwrap();
    assert_eq!(overrides.get("alpha").unwrap().args, vec!["c"]);
}

#[test]
fn test_reload_overrides_swaps_cache() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("overrides.yaml");
    std::fs::write(&path, "alpha:\n  args: [c]\n").unwrap();

    let profiles = ProfileSet::from_yaml(MERGE_PROFILES, None).unwrap();
    let registry =
        Registry::new(profiles, OverrideSet::load(&path).unwrap(), &ParserSet::default()).unwrap();
    let before = registry.resolve("alpha", "default").unwrap();
    assert_eq!(before.args, vec!["a", "c"]);

    std::fs::write(&path, "alpha:\n  args: [d]\n").unwrap();
    registry.reload_overrides(&path).unwrap();

    let after = registry.resolve("alpha", "default").unwrap();
    assert_eq!(after.args, vec!["a", "d"]);
    // Invocations handed out earlier are unchanged
    assert_eq!(before.args, vec!["a", "c"]);
}

#[test]
fn test_failed_reload_keeps_previous_generation() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("overrides.yaml");
    std::fs::write(&path, "alpha:\n  args: [c]\n").unwrap();

    let profiles = ProfileSet::from_yaml(MERGE_PROFILES, None).unwrap();
    let registry =
        Registry::new(profiles, OverrideSet::load(&path).unwrap(), &ParserSet::default()).unwrap();

    std::fs::write(&path, "alpha:\n  command: \"unterminated\n").unwrap();
    assert!(registry.reload_overrides(&path).is_err());

    let inv = registry.resolve("alpha", "default").unwrap();
    assert_eq!(inv.args, vec!["a", "c"]);
    assert_eq!(registry.override_for("alpha").unwrap().args, vec!["c"]);
}

#[test]
fn test_resolved_invocation_serializes() {
    let registry = builtin_registry();
    let inv = registry.resolve("qwen", "default").unwrap();
    let json = serde_json::to_value(inv.as_ref()).unwrap();

    assert_eq!(json["program"], "qwen");
    assert_eq!(json["prompt_delivery"], "named_arg");
    assert_eq!(json["timeout_seconds"], 1800.0);
    assert!(json.get("stderr_noise").is_none());
    assert_eq!(inv.command_line(), "qwen -o json");
}
