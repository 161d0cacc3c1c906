//! Dolt-style CLI wrapper: every read goes through `sql -r json -q`, every
//! write is a single SQL statement via the CLI's SQL mode.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use vmrag_core::{
    ConflictRow, DiffRow, DiffType, MergeOutcome, NativeResolutionStrategy, PullOutcome, Result,
    StatusReport, VersionedStore, VmragError,
};

/// Escapes a string literal for inline use in a SQL statement, by doubling
/// single quotes, per the CLI wire-format contract.
pub fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Output of one subprocess invocation.
struct CliOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

/// Typed wrapper over a Dolt-style `<bin> sql -r json -q "..."` CLI, plus its
/// branch/commit/merge/remote subcommands.
///
/// Owns the CLI subprocess and its working directory exclusively; no other
/// component may read the working directory's internal files.
pub struct DoltAdapter {
    cli_path: String,
    working_dir: PathBuf,
    default_remote: String,
    subprocess_timeout: Duration,
}

impl DoltAdapter {
    pub fn new(
        cli_path: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        default_remote: impl Into<String>,
        subprocess_timeout_secs: u64,
    ) -> Self {
        Self {
            cli_path: cli_path.into(),
            working_dir: working_dir.into(),
            default_remote: default_remote.into(),
            subprocess_timeout: Duration::from_secs(subprocess_timeout_secs),
        }
    }

    /// Runs the CLI with `args`, capturing stdout/stderr to exhaustion.
    /// `kill_on_drop` means a timeout kills the child rather than leaking it.
    async fn run(&self, args: &[&str]) -> Result<CliOutput> {
        debug!(cli = %self.cli_path, ?args, "running versioned-store CLI");

        let mut cmd = Command::new(&self.cli_path);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| VmragError::adapter(format!("failed to spawn {}: {}", self.cli_path, e)))?;

        let output = tokio::time::timeout(self.subprocess_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VmragError::adapter(format!(
                    "{} {:?} timed out after {:?}",
                    self.cli_path, args, self.subprocess_timeout
                ))
            })?
            .map_err(|e| VmragError::adapter(format!("failed to read {} output: {}", self.cli_path, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(cli = %self.cli_path, ?args, %stderr, "versioned-store CLI exited non-zero");
        }

        Ok(CliOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }

    /// Runs a read query and parses the `{"rows": [...]}` envelope.
    async fn query(&self, statement: &str) -> Result<Vec<Value>> {
        let out = self.run(&["sql", "-r", "json", "-q", statement]).await?;
        if !out.success {
            return Err(VmragError::adapter(format!(
                "query failed: {}",
                out.stderr.trim()
            )));
        }
        if out.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: Value = serde_json::from_str(out.stdout.trim())
            .map_err(|e| VmragError::adapter(format!("malformed JSON from CLI: {}", e)))?;
        let rows = parsed
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows)
    }

    fn row_get_str(row: &Value, key: &str) -> Option<String> {
        row.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    }

    /// Splits a conflict-table row into base/ours/theirs maps by the
    /// `base_`/`our_`/`their_` column-name prefixes Dolt's `dolt_conflicts_*`
    /// views use.
    fn row_to_conflict(row: &Value) -> ConflictRow {
        let mut base = HashMap::new();
        let mut ours = HashMap::new();
        let mut theirs = HashMap::new();
        let mut doc_id = String::new();

        if let Some(obj) = row.as_object() {
            for (key, value) in obj {
                if let Some(field) = key.strip_prefix("base_") {
                    base.insert(field.to_string(), value.clone());
                } else if let Some(field) = key.strip_prefix("our_") {
                    if field == "doc_id" {
                        doc_id = value.as_str().unwrap_or_default().to_string();
                    }
                    ours.insert(field.to_string(), value.clone());
                } else if let Some(field) = key.strip_prefix("their_") {
                    theirs.insert(field.to_string(), value.clone());
                } else if key == "doc_id" {
                    doc_id = value.as_str().unwrap_or_default().to_string();
                }
            }
        }

        ConflictRow {
            doc_id,
            base: if base.is_empty() { None } else { Some(base) },
            ours,
            theirs,
        }
    }
}

#[async_trait]
impl VersionedStore for DoltAdapter {
    async fn current_branch(&self) -> Result<String> {
        let rows = self.query("select active_branch() as branch").await?;
        rows.first()
            .and_then(|r| Self::row_get_str(r, "branch"))
            .ok_or_else(|| VmragError::adapter("could not determine current branch"))
    }

    async fn head_commit(&self) -> Result<String> {
        let rows = self.query("select hashof('HEAD') as commit_id").await?;
        rows.first()
            .and_then(|r| Self::row_get_str(r, "commit_id"))
            .ok_or_else(|| VmragError::adapter("could not determine head commit"))
    }

    async fn status(&self) -> Result<StatusReport> {
        let branch = self.current_branch().await?;
        let out = self.run(&["status"]).await?;

        let has_staged_changes = out.stdout.contains("Changes to be committed");
        let has_unstaged_changes = out.stdout.contains("Changes not staged");

        let mut staged_tables = Vec::new();
        let mut modified_tables = Vec::new();
        let mut in_staged = false;
        let mut in_unstaged = false;
        for line in out.stdout.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("Changes to be committed") {
                in_staged = true;
                in_unstaged = false;
                continue;
            }
            if trimmed.starts_with("Changes not staged") {
                in_staged = false;
                in_unstaged = true;
                continue;
            }
            if let Some(table) = trimmed.strip_prefix("modified:") {
                let table = table.trim().to_string();
                if in_staged {
                    staged_tables.push(table);
                } else if in_unstaged {
                    modified_tables.push(table);
                }
            } else if let Some(table) = trimmed.strip_prefix("new table:") {
                let table = table.trim().to_string();
                if in_staged {
                    staged_tables.push(table);
                }
            }
        }

        Ok(StatusReport {
            branch,
            has_staged_changes,
            has_unstaged_changes,
            staged_tables,
            modified_tables,
        })
    }

    async fn create_branch(&self, name: &str, from: Option<&str>) -> Result<()> {
        let out = match from {
            Some(from) => self.run(&["branch", name, from]).await?,
            None => self.run(&["branch", name]).await?,
        };
        if !out.success {
            return Err(VmragError::adapter(format!(
                "create_branch({}) failed: {}",
                name,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        let out = self.run(&["branch", "-d", name]).await?;
        if !out.success {
            return Err(VmragError::BranchNotFound {
                branch: name.to_string(),
            });
        }
        Ok(())
    }

    async fn checkout(&self, branch: &str, create: bool) -> Result<()> {
        let out = if create {
            self.run(&["checkout", "-b", branch]).await?
        } else {
            self.run(&["checkout", branch]).await?
        };
        if !out.success {
            return Err(VmragError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        Ok(())
    }

    async fn add_all(&self) -> Result<()> {
        let out = self.run(&["add", "-A"]).await?;
        if !out.success {
            return Err(VmragError::adapter(format!("add -A failed: {}", out.stderr.trim())));
        }
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        let out = self.run(&["commit", "-m", message]).await?;
        if !out.success {
            if out.stderr.contains("nothing to commit") || out.stdout.contains("nothing to commit") {
                return Err(VmragError::NoChanges);
            }
            return Err(VmragError::adapter(format!("commit failed: {}", out.stderr.trim())));
        }
        self.head_commit().await
    }

    async fn log(&self, limit: u32) -> Result<Vec<String>> {
        let out = self
            .run(&["log", "-n", &limit.to_string(), "--oneline"])
            .await?;
        if !out.success {
            return Err(VmragError::adapter(format!("log failed: {}", out.stderr.trim())));
        }
        Ok(out
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .collect())
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let remote = if remote.is_empty() { &self.default_remote } else { remote };
        let out = self.run(&["push", remote, branch]).await?;
        if !out.success {
            if out.stderr.contains("authentication") || out.stderr.contains("auth") {
                return Err(VmragError::AuthenticationFailed {
                    reason: out.stderr.trim().to_string(),
                });
            }
            if out.stderr.contains("rejected") {
                return Err(VmragError::RemoteRejected {
                    reason: out.stderr.trim().to_string(),
                });
            }
            return Err(VmragError::RemoteUnreachable {
                remote: remote.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome> {
        let remote = if remote.is_empty() { &self.default_remote } else { remote };
        let out = self.run(&["pull", remote, branch]).await?;
        if !out.success {
            return Err(VmragError::RemoteUnreachable {
                remote: remote.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        let has_conflicts = self.has_conflicts().await?;
        let fast_forward = out.stdout.contains("Fast-forward") || out.stdout.contains("up to date");
        Ok(PullOutcome {
            fast_forward,
            has_conflicts,
        })
    }

    async fn fetch(&self, remote: &str) -> Result<()> {
        let remote = if remote.is_empty() { &self.default_remote } else { remote };
        let out = self.run(&["fetch", remote]).await?;
        if !out.success {
            return Err(VmragError::RemoteUnreachable {
                remote: remote.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn clone_remote(&self, remote: &str, checkout: Option<&str>) -> Result<()> {
        let out = self.run(&["clone", remote, "."]).await?;
        if !out.success {
            return Err(VmragError::RemoteUnreachable {
                remote: remote.to_string(),
                reason: out.stderr.trim().to_string(),
            });
        }
        if let Some(branch) = checkout {
            self.checkout(branch, false).await?;
        }
        Ok(())
    }

    async fn merge(&self, source_branch: &str) -> Result<MergeOutcome> {
        let out = self.run(&["merge", source_branch]).await?;
        let has_conflicts = self.has_conflicts().await?;
        let merge_commit = if out.success && !has_conflicts {
            Some(self.head_commit().await?)
        } else {
            None
        };
        Ok(MergeOutcome {
            has_conflicts,
            merge_commit,
        })
    }

    async fn has_conflicts(&self) -> Result<bool> {
        let rows = self.query("select count(*) as c from dolt_conflicts").await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("c"))
            .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()).or_else(|| v.as_i64()))
            .unwrap_or(0)
            > 0)
    }

    async fn conflicts_for(&self, table: &str) -> Result<Vec<ConflictRow>> {
        let statement = format!("select * from dolt_conflicts_{}", table);
        let rows = self.query(&statement).await?;
        Ok(rows.iter().map(Self::row_to_conflict).collect())
    }

    async fn resolve_conflicts(&self, table: &str, strategy: NativeResolutionStrategy) -> Result<()> {
        let flag = match strategy {
            NativeResolutionStrategy::Ours => "--ours",
            NativeResolutionStrategy::Theirs => "--theirs",
        };
        let out = self.run(&["conflicts", "resolve", flag, table]).await?;
        if !out.success {
            return Err(VmragError::adapter(format!(
                "resolve_conflicts({}) failed: {}",
                table,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn table_diff(&self, from_commit: &str, to_commit: &str, table: &str) -> Result<Vec<DiffRow>> {
        let statement = format!(
            "select diff_type, to_doc_id as source_id, from_content_hash as from_hash, \
             to_content_hash as to_hash, to_content, \
             COALESCE(to_collection_name, from_collection_name) as collection_name, \
             CAST(to_metadata AS CHAR) as metadata \
             from dolt_diff('{}', '{}', '{}')",
            escape_sql_literal(from_commit),
            escape_sql_literal(to_commit),
            table
        );
        let rows = self.query(&statement).await?;

        rows.into_iter()
            .map(|row| {
                let diff_type_str = Self::row_get_str(&row, "diff_type").unwrap_or_default();
                let diff_type = match diff_type_str.as_str() {
                    "added" => DiffType::Added,
                    "modified" => DiffType::Modified,
                    "removed" => DiffType::Removed,
                    other => {
                        return Err(VmragError::adapter(format!("unknown diff_type: {}", other)));
                    }
                };
                let mut metadata: HashMap<String, serde_json::Value> = Self::row_get_str(&row, "metadata")
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default();
                if let Some(collection_name) = Self::row_get_str(&row, "collection_name") {
                    metadata.insert("collection_name".to_string(), serde_json::Value::String(collection_name));
                }
                Ok(DiffRow {
                    diff_type,
                    source_id: Self::row_get_str(&row, "source_id").unwrap_or_default(),
                    from_hash: Self::row_get_str(&row, "from_hash"),
                    to_hash: Self::row_get_str(&row, "to_hash"),
                    to_content: Self::row_get_str(&row, "to_content"),
                    metadata,
                })
            })
            .collect()
    }

    async fn exec_sql(&self, statement: &str) -> Result<u64> {
        let rows = self.query(statement).await?;
        Ok(rows.len() as u64)
    }

    async fn query_sql(&self, statement: &str) -> Result<Vec<Value>> {
        self.query(statement).await
    }

    async fn exec_scalar(&self, statement: &str) -> Result<Option<String>> {
        let rows = self.query(statement).await?;
        Ok(rows.first().and_then(|row| {
            row.as_object().and_then(|obj| obj.values().next()).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_sql_literal_doubles_single_quotes() {
        assert_eq!(escape_sql_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_sql_literal("plain"), "plain");
        assert_eq!(escape_sql_literal("it's a 'test'"), "it''s a ''test''");
    }

    #[test]
    fn test_row_to_conflict_splits_prefixes() {
        let row = serde_json::json!({
            "our_doc_id": "D1",
            "base_title": "T0",
            "our_title": "T1",
            "their_title": "T2",
        });
        let conflict = DoltAdapter::row_to_conflict(&row);
        assert_eq!(conflict.doc_id, "D1");
        assert_eq!(conflict.base.unwrap()["title"], "T0");
        assert_eq!(conflict.ours["title"], "T1");
        assert_eq!(conflict.theirs["title"], "T2");
    }
}
