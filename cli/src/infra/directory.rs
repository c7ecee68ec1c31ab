//! Identity directory adapter: an external program speaking JSON on stdout.
//!
//! The program is invoked as `<program> [args..] <subcommand> [options]`:
//!
//! - `list-users [--query Q]` prints `[{"id", "enabled", "attributes"}]`
//! - `whoami` prints `{"account": "..."}`
//! - `ensure-schema --attribute A ...` exits zero once the attributes exist

use serde::Deserialize;

use crate::application::ports::{CommandRunner, IdentityDirectory, InfraResult};
use crate::domain::{DirectoryConfig, DirectoryUser, InfraError, InfraErrorKind, UserFilter};
use crate::infra::provider::{check, runner_error};

#[derive(Debug, Deserialize)]
struct WhoAmI {
    account: String,
}

/// [`IdentityDirectory`] backed by a configured program.
pub struct CommandDirectory<R> {
    runner: R,
    program: Option<String>,
    base_args: Vec<String>,
}

impl<R: CommandRunner> CommandDirectory<R> {
    pub fn new(runner: R, config: &DirectoryConfig) -> Self {
        Self {
            runner,
            program: config.program.clone(),
            base_args: config.args.clone(),
        }
    }

    async fn invoke(&self, subcommand: &str, extra: &[String]) -> InfraResult<Vec<u8>> {
        let Some(program) = self.program.as_deref() else {
            return Err(InfraError::new(
                InfraErrorKind::Failed,
                "no directory program configured; pass --directory-program to create-plane",
            ));
        };
        let args: Vec<&str> = self
            .base_args
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(subcommand))
            .chain(extra.iter().map(String::as_str))
            .collect();
        let output = self
            .runner
            .run(program, &args)
            .await
            .map_err(runner_error)?;
        Ok(check(output)?.stdout)
    }
}

fn parse<'a, T: Deserialize<'a>>(what: &str, bytes: &'a [u8]) -> InfraResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        InfraError::new(
            InfraErrorKind::Failed,
            format!("unexpected {what} output from directory program: {e}"),
        )
    })
}

impl<R: CommandRunner> IdentityDirectory for CommandDirectory<R> {
    async fn list_users(&self, filter: &UserFilter) -> InfraResult<Vec<DirectoryUser>> {
        let mut extra = Vec::new();
        if let Some(query) = &filter.query {
            extra.push("--query".to_string());
            extra.push(query.clone());
        }
        let stdout = self.invoke("list-users", &extra).await?;
        parse("list-users", &stdout)
    }

    async fn verify_access(&self) -> InfraResult<String> {
        let stdout = self.invoke("whoami", &[]).await?;
        let who: WhoAmI = parse("whoami", &stdout)?;
        Ok(who.account)
    }

    async fn ensure_schema(&self, attributes: &[&str]) -> InfraResult<()> {
        let extra: Vec<String> = attributes
            .iter()
            .flat_map(|a| ["--attribute".to_string(), (*a).to_string()])
            .collect();
        self.invoke("ensure-schema", &extra).await.map(drop)
    }
}
