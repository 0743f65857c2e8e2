//! `pg_dump`, `psql` and `pg_restore` as child processes.

use super::DumpTool;
use crate::config::PostgresSettings;
use crate::context::{DumpFormat, DumpRecord};
use crate::errors::StageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

/// Flags passed to every dump.
const DUMP_FLAGS: [&str; 1] = ["--no-owner"];

/// Runs the Postgres client tools found on `PATH` or in a configured
/// directory. Connection parameters are passed only through the `PG*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct PgDumpTool {
    settings: PostgresSettings,
    bin_dir: Option<PathBuf>,
}

impl PgDumpTool {
    /// Creates a tool runner.
    #[must_use]
    pub fn new(settings: PostgresSettings) -> Self {
        Self {
            settings,
            bin_dir: None,
        }
    }

    /// Looks the executables up in `dir` instead of `PATH`.
    #[must_use]
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    fn command(&self, tool: &str) -> Command {
        let program = self
            .bin_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(tool), |dir| dir.join(tool));
        let mut command = Command::new(program);
        command.envs(self.settings.tool_env()).kill_on_drop(true);
        command
    }

    /// Arguments of a dump of `db_name` into `dest`.
    #[must_use]
    pub fn dump_args(db_name: &str, format: DumpFormat, dest: &Path) -> Vec<String> {
        let mut args: Vec<String> = DUMP_FLAGS.iter().map(ToString::to_string).collect();
        match format {
            DumpFormat::Sql => {
                args.push("--format=plain".to_string());
                args.push("--compress=6".to_string());
            }
            DumpFormat::Custom => args.push("--format=custom".to_string()),
        }
        args.push(format!("--file={}", dest.display()));
        args.push(db_name.to_string());
        args
    }
}

fn check(tool: &str, output: &Output) -> Result<(), StageError> {
    if output.status.success() {
        return Ok(());
    }
    Err(StageError::external_tool(
        tool,
        output.status.code(),
        String::from_utf8_lossy(&output.stderr).trim(),
    ))
}

fn spawn_error(tool: &str, err: &std::io::Error) -> StageError {
    StageError::external_tool(tool, None, format!("could not run {tool}: {err}"))
}

async fn run(tool: &str, mut command: Command) -> Result<(), StageError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| spawn_error(tool, &e))?;
    check(tool, &output)
}

#[async_trait]
impl DumpTool for PgDumpTool {
    async fn dump(&self, db_name: &str, format: DumpFormat, dest: &Path) -> Result<u64, StageError> {
        let mut command = self.command("pg_dump");
        command.args(Self::dump_args(db_name, format, dest));
        run("pg_dump", command).await?;

        let size = tokio::fs::metadata(dest).await?.len();
        info!(db_name, path = %dest.display(), size, %format, "Dumped database");
        Ok(size)
    }

    async fn restore(&self, db_name: &str, dump: &DumpRecord) -> Result<(), StageError> {
        if !dump.path.is_file() {
            return Err(StageError::not_found(format!("Dump '{}' not found.", dump.path.display())));
        }

        match dump.format {
            DumpFormat::Custom => {
                let mut command = self.command("pg_restore");
                command
                    .arg("--no-owner")
                    .arg(format!("--dbname={db_name}"))
                    .arg(&dump.path);
                run("pg_restore", command).await?;
            }
            DumpFormat::Sql => {
                let mut gunzip = Command::new("gzip")
                    .arg("-dc")
                    .arg(&dump.path)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| spawn_error("gzip", &e))?;
                let sql: Stdio = gunzip
                    .stdout
                    .take()
                    .ok_or_else(|| StageError::failure("gzip stdout was not captured"))?
                    .try_into()
                    .map_err(|e: std::io::Error| spawn_error("gzip", &e))?;

                let mut command = self.command("psql");
                command
                    .args(["--no-psqlrc", "--quiet", "--set", "ON_ERROR_STOP=1"])
                    .arg(format!("--dbname={db_name}"))
                    .stdin(sql)
                    .stdout(Stdio::null())
                    .stderr(Stdio::piped());
                let psql = command.output().await.map_err(|e| spawn_error("psql", &e))?;
                let gzip = gunzip.wait_with_output().await.map_err(|e| spawn_error("gzip", &e))?;

                check("gzip", &gzip)?;
                check("psql", &psql)?;
            }
        }

        debug!(db_name, path = %dump.path.display(), "Restored dump");
        Ok(())
    }
}
