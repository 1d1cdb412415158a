use async_trait::async_trait;
use gen_gateway::{
    client::{poll_until_terminal, PollOutcome, PollerConfig, StatusSource},
    models::{CanonicalState, TaskStatusResponse},
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Plays back scripted answers, repeating the last one.
struct Script {
    answers: Mutex<VecDeque<Result<TaskStatusResponse, String>>>,
    calls: AtomicUsize,
}

impl Script {
    fn new(answers: Vec<Result<TaskStatusResponse, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StatusSource for Script {
    async fn status(&self, _task_id: &str) -> anyhow::Result<TaskStatusResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        match answer {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no answer scripted")),
        }
    }
}

fn state(state: CanonicalState) -> TaskStatusResponse {
    TaskStatusResponse {
        success: true,
        state,
        result: None,
        result_urls: None,
        error: None,
    }
}

fn completed(url: &str) -> TaskStatusResponse {
    TaskStatusResponse {
        result: Some(url.to_string()),
        result_urls: Some(vec![url.to_string()]),
        ..state(CanonicalState::Completed)
    }
}

#[tokio::test(start_paused = true)]
async fn returns_completed_result() {
    let source = Script::new(vec![
        Ok(state(CanonicalState::Processing)),
        Ok(state(CanonicalState::Processing)),
        Ok(completed("https://media.example/1.png")),
    ]);

    let start = tokio::time::Instant::now();
    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, PollOutcome::Completed(completed("https://media.example/1.png")));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    // First query is immediate, then one every 5s.
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn times_out_at_the_ceiling() {
    let source = Script::new(vec![Ok(state(CanonicalState::Processing))]);

    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, PollOutcome::Timeout);
    // Queries at 0s, 5s, ... 295s; the deadline wins the tie at 300s.
    assert_eq!(source.calls.load(Ordering::SeqCst), 60);
}

#[tokio::test(start_paused = true)]
async fn failed_state_carries_error() {
    let source = Script::new(vec![Ok(TaskStatusResponse {
        error: Some("render crashed".to_string()),
        ..state(CanonicalState::Failed)
    })]);

    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, PollOutcome::Failed("render crashed".to_string()));
}

#[tokio::test(start_paused = true)]
async fn policy_error_from_query_ends_polling() {
    let source = Script::new(vec![
        Err("connection reset".to_string()),
        Err("prompt rejected: NSFW content".to_string()),
    ]);

    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(outcome, PollOutcome::Failed(ref m) if m.contains("NSFW")));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn policy_message_on_running_task_ends_polling() {
    let source = Script::new(vec![Ok(TaskStatusResponse {
        error: Some("Your prompt violates our safety guidelines".to_string()),
        ..state(CanonicalState::Processing)
    })]);

    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(outcome, PollOutcome::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_keep_polling() {
    let source = Script::new(vec![
        Err("502 bad gateway".to_string()),
        Err("timeout".to_string()),
        Ok(completed("https://media.example/2.png")),
    ]);

    let outcome = poll_until_terminal(
        &source,
        "task-1",
        &PollerConfig::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(outcome, PollOutcome::Completed(_)));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_promptly() {
    let source = Script::new(vec![Ok(state(CanonicalState::Processing))]);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let start = tokio::time::Instant::now();
    let outcome = poll_until_terminal(&source, "task-1", &PollerConfig::default(), &cancel).await;

    assert_eq!(outcome, PollOutcome::Cancelled);
    assert_eq!(start.elapsed(), Duration::from_secs(12));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}
