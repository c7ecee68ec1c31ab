//! `CommandDirectory` against a scripted directory program.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use plane_cli::application::ports::IdentityDirectory;
use plane_cli::domain::{DirectoryConfig, InfraErrorKind, UserFilter};
use plane_cli::infra::directory::CommandDirectory;

use crate::mocks::{ScriptedRunner, err_output, ok_output};

fn config() -> DirectoryConfig {
    DirectoryConfig {
        program: Some("dirctl".to_string()),
        args: vec!["--domain".to_string(), "example.com".to_string()],
        filter: None,
    }
}

#[tokio::test]
async fn list_users_passes_query_and_parses_attributes() {
    let runner = ScriptedRunner::new([ok_output(
        br#"[
            {"id": "alice@example.com", "enabled": true, "attributes": {"model": "claude-opus", "budget": "80"}},
            {"id": "bob@example.com", "enabled": false}
        ]"#,
    )]);
    let directory = CommandDirectory::new(&runner, &config());

    let users = directory
        .list_users(&UserFilter {
            query: Some("orgUnit=/eng".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].attributes["budget"], "80");
    assert!(users[1].attributes.is_empty());
    let call = &runner.calls()[0];
    assert_eq!(call.program, "dirctl");
    assert_eq!(
        call.args,
        vec!["--domain", "example.com", "list-users", "--query", "orgUnit=/eng"]
    );
}

#[tokio::test]
async fn schema_attributes_are_repeated_flags() {
    let runner = ScriptedRunner::new([ok_output(b"")]);
    let directory = CommandDirectory::new(&runner, &config());

    directory.ensure_schema(&["model", "budget"]).await.unwrap();

    assert_eq!(
        runner.calls()[0].args,
        vec![
            "--domain",
            "example.com",
            "ensure-schema",
            "--attribute",
            "model",
            "--attribute",
            "budget"
        ]
    );
}

#[tokio::test]
async fn whoami_reports_the_delegated_account() {
    let runner = ScriptedRunner::new([ok_output(br#"{"account": "admin@example.com"}"#)]);
    let directory = CommandDirectory::new(&runner, &config());
    assert_eq!(directory.verify_access().await.unwrap(), "admin@example.com");
}

#[tokio::test]
async fn unconfigured_program_fails_without_spawning() {
    let runner = ScriptedRunner::default();
    let directory = CommandDirectory::new(&runner, &DirectoryConfig::default());

    let err = directory.verify_access().await.unwrap_err();
    assert!(err.message.contains("--directory-program"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn denied_delegation_is_a_permission_failure() {
    let runner = ScriptedRunner::new([err_output(b"403 Forbidden: domain-wide delegation missing")]);
    let directory = CommandDirectory::new(&runner, &config());

    let err = directory.verify_access().await.unwrap_err();
    assert_eq!(err.kind, InfraErrorKind::PermissionDenied);
}

#[tokio::test]
async fn garbage_output_is_reported() {
    let runner = ScriptedRunner::new([ok_output(b"<html>")]);
    let directory = CommandDirectory::new(&runner, &config());

    let err = directory
        .list_users(&UserFilter::default())
        .await
        .unwrap_err();
    assert!(err.message.contains("list-users"));
}
