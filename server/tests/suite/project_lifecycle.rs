//! The spec → plan → approve/reject → run lifecycle over JSON-RPC.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use super::support::{write_spec, Fixture};

const REPORT_SPEC: &str = r#"apiVersion: agentrun/v1
kind: ProjectSpec
meta:
  name: weekly-report
  description: GitHub-style weekly report
goal: Summarize repository activity into a weekly report
success_criteria:
  - type: not_empty
    target: output
allowed_commands:
  - "github:repo:list"
  - "github:pr:list"
  - "github:issue:list"
  - "fs:write"
output:
  path: ./reports/weekly.md
  format: markdown
"#;

fn github_fixture() -> Fixture {
    Fixture::new(&[
        ("github:repo:list", json!(["repo-a", "repo-b"])),
        ("github:pr:list", json!(["pr-1"])),
        ("github:issue:list", json!(["issue-9"])),
        ("fs:write", json!({"path": "./reports/weekly.md", "bytes_written": 64})),
    ])
}

#[tokio::test]
async fn load_reports_spec_summary_and_emits_event() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);

    let response = fx.call("project.load", json!({"path": path})).await;
    let result = &response["result"];
    assert_eq!(result["name"], json!("weekly-report"));
    assert_eq!(result["success_criteria"], json!(1));

    let kinds: Vec<String> = fx
        .bus
        .history(None)
        .iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert!(kinds.contains(&"spec.loaded".to_string()));
}

#[tokio::test]
async fn load_invalid_spec_is_spec_invalid() {
    let fx = github_fixture();
    let (_dir, path) = write_spec("apiVersion: agentrun/v1\nkind: ProjectSpec\nmeta:\n  name: x\n");

    let response = fx.call("project.load", json!({"path": path})).await;
    let error = &response["error"];
    assert_eq!(error["code"], json!(-32003));
    assert!(error["message"].as_str().unwrap().contains("goal"));
}

#[tokio::test]
async fn plan_without_loaded_spec_is_no_pending_plan() {
    let fx = github_fixture();
    let response = fx.call("project.plan", Value::Null).await;
    assert_eq!(response["error"]["code"], json!(-32004));
}

#[tokio::test]
async fn plan_orders_reads_before_writes_and_binds_output_path() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);
    fx.call("project.load", json!({"path": path})).await;

    let response = fx.call("project.plan", Value::Null).await;
    let result = &response["result"];

    assert!(result["plan_id"].as_str().unwrap().starts_with("plan-"));
    assert_eq!(result["status"], json!("awaiting_approval"));
    assert!(result["risk_summary"]
        .as_str()
        .unwrap()
        .contains("3 read-only"));

    let steps = result["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 4);
    for step in &steps[..3] {
        assert_eq!(step["risk"], json!("read-only"));
    }
    let write = &steps[3];
    assert_eq!(write["risk"], json!("write"));
    assert_eq!(write["command"], json!("fs:write"));
    assert_eq!(write["args"], json!(["./reports/weekly.md"]));
    assert_eq!(write["checkpoint_before"], json!(true));

    let kinds: Vec<String> = fx
        .bus
        .history(None)
        .iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert!(kinds.contains(&"plan.generated".to_string()));
    assert!(kinds.contains(&"plan.approval_requested".to_string()));
}

#[tokio::test]
async fn approve_executes_pending_plan_and_clears_it() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);
    fx.call("project.load", json!({"path": path})).await;
    fx.call("project.plan", Value::Null).await;

    let response = fx.call("project.approve", Value::Null).await;
    let result = &response["result"];
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["steps"], json!(4));
    assert_eq!(result["verification"]["passed"], json!(true));

    // The pending slot is consumed.
    let again = fx.call("project.approve", Value::Null).await;
    assert_eq!(again["error"]["code"], json!(-32004));

    let kinds: Vec<String> = fx
        .bus
        .history(None)
        .iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert!(kinds.contains(&"plan.approved".to_string()));
    assert!(kinds.contains(&"pipeline.end".to_string()));
}

#[tokio::test]
async fn reject_discards_pending_plan_with_feedback() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);
    fx.call("project.load", json!({"path": path})).await;
    fx.call("project.plan", Value::Null).await;

    let response = fx
        .call("project.reject", json!({"feedback": "scope too broad"}))
        .await;
    assert_eq!(response["result"]["status"], json!("rejected"));
    assert_eq!(response["result"]["feedback"], json!("scope too broad"));

    let approve = fx.call("project.approve", Value::Null).await;
    assert_eq!(approve["error"]["code"], json!(-32004));

    let kinds: Vec<String> = fx
        .bus
        .history(None)
        .iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert!(kinds.contains(&"plan.rejected".to_string()));
}

#[tokio::test]
async fn reload_clears_pending_plan() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);
    fx.call("project.load", json!({"path": path.clone()})).await;
    fx.call("project.plan", Value::Null).await;

    // Loading again discards the pending plan.
    fx.call("project.load", json!({"path": path})).await;
    let approve = fx.call("project.approve", Value::Null).await;
    assert_eq!(approve["error"]["code"], json!(-32004));
}

#[tokio::test]
async fn run_is_load_plan_auto_approve_execute() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(REPORT_SPEC);

    let response = fx.call("project.run", json!({"path": path})).await;
    let result = &response["result"];
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["steps"], json!(4));

    let kinds: Vec<String> = fx
        .bus
        .history(None)
        .iter()
        .map(|e| e.kind.to_string())
        .collect();
    assert!(kinds.contains(&"spec.loaded".to_string()));
    assert!(kinds.contains(&"plan.generated".to_string()));
    assert!(kinds.contains(&"plan.approved".to_string()));
}

#[tokio::test]
async fn run_fails_when_success_criteria_fail() {
    let fx = Fixture::new(&[("data:fetch", json!("the output text"))]);
    let spec = r#"apiVersion: agentrun/v1
kind: ProjectSpec
meta:
  name: doomed
goal: Fetch data that must contain a marker it never will
success_criteria:
  - type: contains
    target: output
    expected: "IMPOSSIBLE-MARKER"
allowed_commands:
  - "data:fetch"
"#;
    let (_dir, path) = write_spec(spec);

    let response = fx.call("project.run", json!({"path": path})).await;
    let error = &response["error"];
    assert_eq!(error["code"], json!(-32002));
    assert!(error["message"].as_str().unwrap().contains("0/1"));
}

#[tokio::test]
async fn validate_reports_issues_without_side_effects() {
    let fx = github_fixture();
    let (_dir, path) = write_spec(
        "apiVersion: wrong/v9\nkind: ProjectSpec\nmeta:\n  name: x\ngoal: g\n",
    );

    let response = fx.call("project.validate", json!({"path": path})).await;
    let result = &response["result"];
    assert_eq!(result["valid"], json!(false));
    let errors = result["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], json!("apiVersion"));

    // No spec was loaded.
    let plan = fx.call("project.plan", Value::Null).await;
    assert_eq!(plan["error"]["code"], json!(-32004));
}

#[tokio::test]
async fn init_scaffolds_a_template() {
    let fx = github_fixture();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("scaffolded.yaml");

    let response = fx
        .call(
            "project.init",
            json!({"template": "report", "output": dest.display().to_string()}),
        )
        .await;
    assert_eq!(response["result"]["template"], json!("report"));
    assert!(dest.exists());

    // The scaffolded file validates cleanly.
    let validate = fx
        .call("project.validate", json!({"path": dest.display().to_string()}))
        .await;
    assert_eq!(validate["result"]["valid"], json!(true));
}

#[tokio::test]
async fn init_unknown_template_is_an_error() {
    let fx = github_fixture();
    let response = fx
        .call("project.init", json!({"template": "mystery"}))
        .await;
    assert_eq!(response["error"]["code"], json!(-32603));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("basic"));
}
