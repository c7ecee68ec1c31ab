//! `GcloudProvider` against scripted CLI output.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use plane_cli::application::ports::{CloudSession, InfraProvider};
use plane_cli::domain::{InfraErrorKind, LiveStatus, ResourceId, ResourceKind};
use plane_cli::infra::provider::GcloudProvider;
use plane_common::BootstrapPhase;

use crate::mocks::{ScriptedRunner, err_output, ok_output};

fn provider(runner: &ScriptedRunner) -> GcloudProvider<&ScriptedRunner> {
    GcloudProvider::new(runner, "gcloud", Some("acme-agents".to_string()), "us-central1")
}

#[tokio::test]
async fn describe_instance_reads_status_zone_and_phase() {
    let runner = ScriptedRunner::new([ok_output(
        br##"{
            "name": "agent-alice-example-com",
            "zone": "https://www.googleapis.com/compute/v1/projects/acme-agents/zones/us-central1-a",
            "status": "RUNNING",
            "metadata": {"items": [
                {"key": "bootstrap-phase", "value": "pairing_sent"},
                {"key": "startup-script", "value": "#!/bin/sh"}
            ]}
        }"##,
    )]);

    let found = provider(&runner)
        .describe_instance("agent-alice-example-com", "us-central1-a")
        .await
        .unwrap()
        .expect("instance exists");

    assert_eq!(found.status, LiveStatus::Running);
    assert_eq!(found.zone, "us-central1-a");
    assert_eq!(found.bootstrap_phase, Some(BootstrapPhase::PairingSent));

    let call = &runner.calls()[0];
    assert_eq!(call.program, "gcloud");
    assert!(call.line().contains("compute instances describe agent-alice-example-com"));
    assert!(call.args.contains(&"--zone=us-central1-a".to_string()));
    assert!(call.args.contains(&"--project=acme-agents".to_string()));
    assert!(call.args.contains(&"--format=json".to_string()));
    assert!(call.args.contains(&"--quiet".to_string()));
}

#[tokio::test]
async fn missing_instance_is_none() {
    let runner = ScriptedRunner::new([err_output(
        b"ERROR: (gcloud.compute.instances.describe) The resource 'projects/acme-agents/zones/us-central1-a/instances/agent-x' was not found",
    )]);

    let found = provider(&runner)
        .describe_instance("agent-x", "us-central1-a")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn unknown_phase_is_ignored() {
    let runner = ScriptedRunner::new([ok_output(
        br#"{"name": "agent-a", "zone": "us-central1-a", "status": "STAGING",
            "metadata": {"items": [{"key": "bootstrap-phase", "value": "dancing"}]}}"#,
    )]);

    let found = provider(&runner)
        .describe_instance("agent-a", "us-central1-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.status, LiveStatus::Transitioning);
    assert_eq!(found.bootstrap_phase, None);
}

#[tokio::test]
async fn permission_failure_is_classified() {
    let runner = ScriptedRunner::new([err_output(
        b"ERROR: (gcloud.compute.networks.create) Could not fetch resource:\n - Required 'compute.networks.create' permission for 'projects/acme-agents'",
    )]);

    let err = provider(&runner).ensure_network("agents-net").await.unwrap_err();
    assert_eq!(err.kind, InfraErrorKind::PermissionDenied);
}

#[tokio::test]
async fn spawn_failure_is_a_plain_failure() {
    let runner = ScriptedRunner::default();
    let err = provider(&runner).ensure_network("agents-net").await.unwrap_err();
    assert_eq!(err.kind, InfraErrorKind::Failed);
    assert!(err.message.contains("failed to spawn"));
}

#[tokio::test]
async fn secret_version_is_sent_on_stdin_and_numbered() {
    let runner = ScriptedRunner::new([ok_output(
        br#"{"name": "projects/123/secrets/agent-a-config/versions/4"}"#,
    )]);

    let version = provider(&runner)
        .add_secret_version("agent-a-config", br#"{"model":"claude-sonnet"}"#)
        .await
        .unwrap();

    assert_eq!(version, 4);
    let call = &runner.calls()[0];
    assert!(call.args.contains(&"--data-file=-".to_string()));
    assert_eq!(call.stdin.as_deref(), Some(&br#"{"model":"claude-sonnet"}"#[..]));
}

#[tokio::test]
async fn latest_secret_version_describes_then_accesses() {
    let runner = ScriptedRunner::new([
        ok_output(br#"{"name": "projects/123/secrets/agent-a-config/versions/2"}"#),
        ok_output(b"payload"),
    ]);

    let latest = provider(&runner)
        .latest_secret_version("agent-a-config")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(latest.version, 2);
    assert_eq!(latest.data, b"payload");
    let calls = runner.calls();
    assert!(calls[1].line().contains("secrets versions access 2 --secret=agent-a-config"));
}

#[tokio::test]
async fn secret_without_versions_has_no_latest() {
    let runner = ScriptedRunner::new([err_output(
        b"ERROR: (gcloud.secrets.versions.describe) NOT_FOUND: Secret Version [latest] not found",
    )]);

    let latest = provider(&runner)
        .latest_secret_version("agent-a-config")
        .await
        .unwrap();
    assert!(latest.is_none());
}

#[tokio::test]
async fn service_account_describe_collects_roles() {
    let runner = ScriptedRunner::new([
        ok_output(br#"{"email": "agents-control@acme-agents.iam.gserviceaccount.com"}"#),
        ok_output(
            br#"[{"bindings": {"role": "roles/compute.admin"}},
                 {"bindings": {"role": "roles/secretmanager.admin"}}]"#,
        ),
    ]);

    let observed = provider(&runner)
        .describe(&ResourceId::new(ResourceKind::ServiceAccount, "agents-control"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        observed.roles,
        vec!["roles/compute.admin", "roles/secretmanager.admin"]
    );
    assert!(
        runner.calls()[0]
            .line()
            .contains("agents-control@acme-agents.iam.gserviceaccount.com")
    );
}

#[tokio::test]
async fn logged_out_session_has_no_account() {
    let runner = ScriptedRunner::new([ok_output(b"\n")]);
    let account = provider(&runner).active_account().await.unwrap();
    assert!(account.is_none());
}

#[tokio::test]
async fn resolved_project_scopes_later_calls() {
    let runner = ScriptedRunner::new([ok_output(b"acme-agents\n"), ok_output(b"")]);
    let provider = GcloudProvider::new(&runner, "gcloud", None, "us-central1");

    let project = provider.resolve_project(None).await.unwrap();
    provider.ensure_network("agents-net").await.unwrap();

    assert_eq!(project, "acme-agents");
    let calls = runner.calls();
    assert!(!calls[0].line().contains("--project="));
    assert!(calls[1].args.contains(&"--project=acme-agents".to_string()));
}

#[tokio::test]
async fn unset_default_project_is_an_error() {
    let runner = ScriptedRunner::new([ok_output(b"(unset)\n")]);
    let provider = GcloudProvider::new(&runner, "gcloud", None, "us-central1");

    let err = provider.resolve_project(None).await.unwrap_err();
    assert!(err.message.contains("--project"));
}
