//! End-to-end batch runs over every backend, with processes replaced by
//! scripted transcripts.

use std::sync::Arc;

use agentrun_cli::{parse_batch, BatchDefaults, Orchestrator};
use agentrun_core::{BackendKind, Summary};
use agentrun_sdk::testing::{Script, ScriptedRunner};
use agentrun_sdk::{Invocation, TaskRunner};
use tokio_util::sync::CancellationToken;

fn session_for(kind: BackendKind) -> String {
    format!("sess-{kind}")
}

/// A successful transcript in each backend's own stream format.
fn transcript(invocation: &Invocation) -> Script {
    let Ok(kind) = invocation.program.parse::<BackendKind>() else {
        panic!("unexpected program {}", invocation.program);
    };
    let sid = session_for(kind);
    let out = match kind {
        BackendKind::Codex => format!(
            "{{\"type\":\"thread.started\",\"thread_id\":\"{sid}\"}}\n\
             {{\"type\":\"item.completed\",\"item\":{{\"type\":\"agent_message\",\"text\":\"codex done\"}}}}\n\
             {{\"type\":\"turn.completed\",\"usage\":{{}}}}"
        ),
        BackendKind::Claude => format!(
            "{{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"{sid}\"}}\n\
             {{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false,\"session_id\":\"{sid}\",\"result\":\"claude done\"}}"
        ),
        BackendKind::Gemini => format!(
            "{{\"type\":\"init\",\"session_id\":\"{sid}\"}}\n\
             {{\"type\":\"result\",\"session_id\":\"{sid}\",\"status\":\"success\",\"content\":\"gemini done\"}}"
        ),
        BackendKind::Opencode => format!(
            "{{\"type\":\"text\",\"sessionID\":\"{sid}\",\"part\":{{\"type\":\"text\",\"text\":\"opencode done\"}}}}\n\
             {{\"type\":\"step_finish\",\"sessionID\":\"{sid}\",\"part\":{{\"type\":\"step-finish\",\"reason\":\"stop\"}}}}"
        ),
    };
    Script::stdout(&out)
}

fn new_batch() -> String {
    BackendKind::ALL
        .iter()
        .map(|kind| format!("---TASK---\nid: new-{kind}\nbackend: {kind}\n---CONTENT---\nstart work for {kind}\n"))
        .collect()
}

#[tokio::test]
async fn new_then_resume_batch_across_all_backends() {
    let scripted = Arc::new(ScriptedRunner::new(transcript));
    let orchestrator = Orchestrator::new(TaskRunner::new(scripted.clone()));
    let defaults = BatchDefaults::default();

    let first = orchestrator
        .run_batch(parse_batch(&new_batch(), &defaults), CancellationToken::new())
        .await;
    assert_eq!(
        first.summary,
        Summary {
            total: 4,
            success: 4,
            failed: 0
        }
    );
    for (outcome, kind) in first.results.iter().zip(BackendKind::ALL) {
        assert_eq!(outcome.task_id.as_str(), format!("new-{kind}"));
        assert_eq!(outcome.session_id, session_for(kind));
        assert_eq!(outcome.message, format!("{kind} done"));
    }

    let resume_batch: String = first
        .results
        .iter()
        .zip(BackendKind::ALL)
        .map(|(outcome, kind)| {
            format!(
                "---TASK---\nid: resume-{kind}\nbackend: {kind}\nsession_id: {}\n---CONTENT---\nfollow up\nwith details\n",
                outcome.session_id
            )
        })
        .collect();

    let second = orchestrator
        .run_batch(parse_batch(&resume_batch, &defaults), CancellationToken::new())
        .await;
    assert!(second.all_succeeded(), "{second:?}");
    for (resumed, original) in second.results.iter().zip(&first.results) {
        assert_eq!(resumed.session_id, original.session_id);
    }

    let calls = scripted.invocations();
    assert_eq!(calls.len(), 8);
    for call in &calls {
        let kind: BackendKind = call.program.parse().unwrap();
        let sid = session_for(kind);
        let prompt = call.args.last().unwrap();
        if prompt.starts_with("start work") {
            assert!(!call.args.contains(&sid), "{kind} new run mentions session");
            continue;
        }

        assert_eq!(prompt, "follow up\nwith details", "{kind} prompt must stay one argument");
        let joined = format!(" {} ", call.args.join(" "));
        let expected = match kind {
            BackendKind::Codex => format!(" resume {sid} "),
            BackendKind::Claude | BackendKind::Gemini => format!(" -r {sid} "),
            BackendKind::Opencode => format!(" -s {sid} "),
        };
        assert!(joined.contains(&expected), "{kind}: {:?}", call.args);
    }
}

#[tokio::test]
async fn opencode_stdin_request_keeps_prompt_argument() {
    let scripted = Arc::new(ScriptedRunner::new(transcript));
    let orchestrator = Orchestrator::new(TaskRunner::new(scripted.clone()));
    let batch = "---TASK---\nid: oc\nbackend: opencode\nstdin: true\n---CONTENT---\nread from arg\n";

    let report = orchestrator
        .run_batch(
            parse_batch(batch, &BatchDefaults::default()),
            CancellationToken::new(),
        )
        .await;

    assert!(report.all_succeeded(), "{report:?}");
    let calls = scripted.invocations();
    assert_eq!(calls[0].args.last().map(String::as_str), Some("read from arg"));
    assert!(calls[0].stdin.is_none());
}

#[tokio::test]
async fn bad_blocks_fail_alone() {
    let scripted = Arc::new(ScriptedRunner::new(transcript));
    let orchestrator = Orchestrator::new(TaskRunner::new(scripted.clone()));
    let batch = format!(
        "{}---TASK---\nid: orphan\nmode: resume\n---CONTENT---\nno session\n",
        new_batch()
    );

    let report = orchestrator
        .run_batch(
            parse_batch(&batch, &BatchDefaults::default()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.success, 4);
    assert_eq!(report.summary.failed, 1);
    let orphan = report.results.last().unwrap();
    assert_eq!(orphan.task_id.as_str(), "orphan");
    assert_ne!(orphan.exit_code, 0);
    assert!(orphan.error.contains("session_id"), "{}", orphan.error);
    assert_eq!(scripted.invocations().len(), 4);
}
