use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use llm_batch::{
    BatchRunner, ConversationHistory, Error, ProviderRegistry, RawResponse, Transport,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::str::FromStr;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "gpt": {
        "model": "gpt-4o-mini",
        "url": "https://openai.test/v1/chat/completions",
        "headers": {"Authorization": "Bearer {TEST_KEY}"},
        "cost_by_million": {"input": 1.00, "output": 2.00}
    },
    "gemini": {
        "model": "gemini-1.5-flash",
        "url": "https://gemini.test/v1beta/models/gemini-1.5-flash:generateContent",
        "max_tokens": 256,
        "cost_by_million": {"input": 0.5, "output": 1.5},
        "result_path": "candidates[0].content.parts[0].text",
        "input_tokens_path": "usageMetadata.promptTokenCount",
        "output_tokens_path": "usageMetadata.candidatesTokenCount"
    },
    "free": {
        "model": "llama3",
        "url": "https://local.test/v1/chat/completions"
    }
}"#;

#[derive(Clone, Debug)]
struct Recorded {
    url: String,
    headers: BTreeMap<String, String>,
    body: Value,
}

/// Answers in the shape the URL implies; fails with 500 on call `fail_at`.
#[derive(Default)]
struct FakeTransport {
    calls: Mutex<Vec<Recorded>>,
    fail_at: Option<usize>,
}

impl FakeTransport {
    fn failing_at(call: usize) -> Self {
        FakeTransport {
            fail_at: Some(call),
            ..Default::default()
        }
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> llm_batch::Result<RawResponse> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Recorded {
            url: url.to_string(),
            headers: headers.clone(),
            body: body.clone(),
        });
        let n = calls.len();

        if self.fail_at == Some(n) {
            return Ok(RawResponse {
                status: 500,
                body: r#"{"error": "overloaded"}"#.to_string(),
            });
        }

        let reply = format!("reply {}", n);
        let response = if url.contains("gemini") {
            json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": reply}]}}],
                "usageMetadata": {"promptTokenCount": 200_000, "candidatesTokenCount": 100_000}
            })
        } else {
            json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": reply}}],
                "usage": {"prompt_tokens": 500_000, "completion_tokens": 250_000}
            })
        };
        Ok(RawResponse {
            status: 200,
            body: response.to_string(),
        })
    }
}

struct Workspace {
    _tmp: TempDir,
    prompts: std::path::PathBuf,
    output: std::path::PathBuf,
}

fn workspace(with_system: bool) -> Workspace {
    let tmp = tempfile::tempdir().unwrap();
    let prompts = tmp.path().join("prompts");
    fs::create_dir_all(&prompts).unwrap();
    if with_system {
        fs::write(prompts.join("0_system_command.txt"), "You are terse.").unwrap();
    }
    fs::write(prompts.join("1_entities.txt"), "Create the entities").unwrap();
    fs::write(prompts.join("2_controllers.txt"), "Create the controllers").unwrap();
    fs::write(prompts.join("3_tests.txt"), "Create the tests").unwrap();
    let output = tmp.path().join("output");
    Workspace {
        _tmp: tmp,
        prompts,
        output,
    }
}

const PACED_CONFIG: &str = r#"{
    "fast": {
        "model": "gpt-4o-mini",
        "url": "https://openai.test/fast",
        "cost_by_million": {"input": 1, "output": 1}
    },
    "idle": {
        "model": "gpt-4o-mini",
        "url": "https://openai.test/idle",
        "cost_by_million": {"input": 1, "output": 1},
        "sleep": 0
    },
    "slow": {
        "model": "gpt-4o-mini",
        "url": "https://openai.test/slow",
        "cost_by_million": {"input": 1, "output": 1},
        "sleep": 2.5
    }
}"#;

fn runner(transport: FakeTransport) -> BatchRunner<FakeTransport> {
    let env = vec![("TEST_KEY".to_string(), "k-123".to_string())];
    let config = llm_batch::registry::substitute_env(CONFIG, env);
    let registry = ProviderRegistry::from_json(&config).unwrap();
    BatchRunner::new(registry, transport, 0.4).with_delay(Duration::ZERO)
}

fn paced_runner(delay: Duration) -> BatchRunner<FakeTransport> {
    let registry = ProviderRegistry::from_json(PACED_CONFIG).unwrap();
    BatchRunner::new(registry, FakeTransport::default(), 0.4).with_delay(delay)
}

fn assert_elapsed(elapsed: Duration, expected: Duration) {
    // The paused clock may round each timer up to the next millisecond.
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(100),
        "elapsed {:?}, expected {:?}",
        elapsed,
        expected
    );
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn roles(messages: &Value) -> Vec<String> {
    messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_two_providers_three_prompts() {
    let ws = workspace(true);
    let runner = runner(FakeTransport::default());

    let summary = runner
        .run(&["gpt", "gemini"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap();

    assert_eq!(summary.calls, 6);
    // gpt: 3 * (0.5 + 0.5); gemini: 3 * (0.1 + 0.15)
    assert_eq!(summary.total_cost, Decimal::from_str("3.75").unwrap());

    assert_eq!(
        file_names(&ws.output),
        vec![
            "gemini_1_entities_result.txt",
            "gemini_2_controllers_result.txt",
            "gemini_3_tests_result.txt",
            "gpt_1_entities_result.txt",
            "gpt_2_controllers_result.txt",
            "gpt_3_tests_result.txt",
            "summary_metrics.txt",
        ]
    );
    assert_eq!(
        fs::read_to_string(ws.output.join("gpt_1_entities_result.txt")).unwrap(),
        "reply 1"
    );
    assert_eq!(
        fs::read_to_string(ws.output.join("gemini_3_tests_result.txt")).unwrap(),
        "reply 6"
    );

    let summary_text = fs::read_to_string(ws.output.join("summary_metrics.txt")).unwrap();
    let blocks: Vec<&str> = summary_text.split("\n\n").filter(|b| !b.is_empty()).collect();
    assert_eq!(blocks.len(), 6);
    assert!(blocks[0].starts_with("gpt\t1_entities.txt\telapsed_time_ms\t"));
    assert!(blocks[0].contains("gpt\t1_entities.txt\ttotal_tokens\t750000"));
    assert!(blocks[0].ends_with("gpt\t1_entities.txt\ttotal_cost_usd\t1,00000000"));
    assert!(blocks[5].ends_with("gemini\t3_tests.txt\ttotal_cost_usd\t0,25000000"));
}

#[tokio::test]
async fn test_history_is_per_provider() {
    let ws = workspace(true);
    let runner = runner(FakeTransport::default());

    runner
        .run(&["gpt", "gemini"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap();

    let calls = runner.transport().recorded();
    assert_eq!(calls.len(), 6);

    // gpt keeps its own turns in order.
    assert_eq!(roles(&calls[0].body["messages"]), vec!["system", "user"]);
    assert_eq!(
        roles(&calls[2].body["messages"]),
        vec!["system", "user", "assistant", "user", "assistant", "user"]
    );
    assert_eq!(calls[1].body["messages"][2]["content"], json!("reply 1"));
    assert_eq!(calls[0].body["temperature"], json!(0.4));
    assert_eq!(calls[0].headers["Authorization"], "Bearer k-123");

    // gemini starts over with only the system instruction.
    let first_gemini = &calls[3].body;
    assert!(calls[3].url.contains("gemini"));
    assert_eq!(roles(&first_gemini["contents"]), vec!["user"]);
    assert_eq!(
        first_gemini["system_instruction"],
        json!({"parts": [{"text": "You are terse."}]})
    );
    assert_eq!(
        first_gemini["generationConfig"],
        json!({"temperature": 0.4, "maxOutputTokens": 256})
    );
    assert_eq!(
        roles(&calls[5].body["contents"]),
        vec!["user", "model", "user", "model", "user"]
    );
    assert!(!calls[5].body.to_string().contains("reply 1"));
}

#[tokio::test]
async fn test_without_system_file() {
    let ws = workspace(false);
    let runner = runner(FakeTransport::default());

    let summary = runner
        .run(&["gpt"], &ws.prompts, None, &ws.output)
        .await
        .unwrap();
    assert_eq!(summary.calls, 3);

    let calls = runner.transport().recorded();
    assert_eq!(roles(&calls[0].body["messages"]), vec!["user"]);
}

#[tokio::test]
async fn test_abort_keeps_earlier_results() {
    let ws = workspace(true);
    let runner = runner(FakeTransport::failing_at(4));

    let err = runner
        .run(&["gpt", "gemini"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap_err();

    match &err {
        Error::Call { provider, file, .. } => {
            assert_eq!(provider, "gemini");
            assert_eq!(file, "1_entities.txt");
        }
        other => panic!("expected a call error, got {:?}", other),
    }
    assert!(matches!(err.kind(), Error::Upstream { status: 500, .. }));

    assert_eq!(
        file_names(&ws.output),
        vec![
            "gpt_1_entities_result.txt",
            "gpt_2_controllers_result.txt",
            "gpt_3_tests_result.txt",
        ]
    );
    assert_eq!(runner.transport().recorded().len(), 4);
}

#[tokio::test]
async fn test_unknown_cost_stops_the_batch() {
    let ws = workspace(true);
    let runner = runner(FakeTransport::default());

    let err = runner
        .run(&["free", "gpt"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), Error::Aggregation(_)));
    assert_eq!(file_names(&ws.output), vec!["free_1_entities_result.txt"]);
    assert_eq!(runner.transport().recorded().len(), 1);
}

#[tokio::test]
async fn test_unknown_provider_fails_before_any_call() {
    let ws = workspace(true);
    fs::create_dir_all(&ws.output).unwrap();
    fs::write(ws.output.join("previous.txt"), "kept").unwrap();
    let runner = runner(FakeTransport::default());

    let err = runner
        .run(&["gpt", "mixtral"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(runner.transport().recorded().is_empty());
    assert_eq!(file_names(&ws.output), vec!["previous.txt"]);
}

#[tokio::test]
async fn test_all_runs_every_provider_in_key_order() {
    let ws = workspace(true);
    let runner = runner(FakeTransport::default());

    // `free` has no cost table, so the batch stops on its first call; it is
    // first only because keys are sorted.
    let err = runner
        .run(&["all"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap_err();
    match err {
        Error::Call { provider, .. } => assert_eq!(provider, "free"),
        other => panic!("expected a call error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_process_single_prompt() {
    let runner = runner(FakeTransport::default());
    let provider = runner.registry().get("gemini").unwrap();
    let mut history = ConversationHistory::seeded(Some("S"));

    let result = runner
        .process(provider, &mut history, "adhoc.txt", "Hello")
        .await
        .unwrap();

    assert_eq!(result.result_text, "reply 1");
    assert_eq!(result.usage.input_tokens, 200_000);
    assert_eq!(result.usage.output_tokens, 100_000);
    assert_eq!(result.usage.total_tokens, 300_000);
    assert_eq!(
        result.usage.total_cost(),
        Some(Decimal::from_str("0.25").unwrap())
    );
    assert_eq!(history.len(), 3);
    assert_eq!(history.messages()[2].content, "reply 1");
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_every_call() {
    let ws = workspace(true);
    let runner = paced_runner(Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let summary = runner
        .run(&["fast", "idle", "slow"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap();

    assert_eq!(summary.calls, 9);
    // 1s after each of the 9 calls, plus 2.5s after each `slow` call.
    assert_elapsed(started.elapsed(), Duration::from_millis(16_500));
}

#[tokio::test(start_paused = true)]
async fn test_provider_sleep_without_base_delay() {
    let ws = workspace(true);
    let runner = paced_runner(Duration::ZERO);

    let started = tokio::time::Instant::now();
    runner
        .run(&["fast", "idle"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap();
    assert_elapsed(started.elapsed(), Duration::ZERO);

    let started = tokio::time::Instant::now();
    runner
        .run(&["slow"], &ws.prompts, Some("0_system_command.txt"), &ws.output)
        .await
        .unwrap();
    assert_elapsed(started.elapsed(), Duration::from_millis(7_500));
}
