//! Append-only operations log (spec.md §4.9). Writes are synchronous with
//! the caller, so a crash mid-operation leaves a `started` or `failed` row,
//! never a silently missing one.

use std::collections::HashMap;

use vmrag_core::{OperationLog, OperationStatus, OperationType, Result, VersionedStore, VmragError};

const TABLE: &str = "sync_operations";

fn operation_type_tag(op: OperationType) -> &'static str {
    match op {
        OperationType::Commit => "commit",
        OperationType::Push => "push",
        OperationType::Pull => "pull",
        OperationType::Merge => "merge",
        OperationType::Checkout => "checkout",
        OperationType::Reset => "reset",
        OperationType::Init => "init",
        OperationType::Clone => "clone",
    }
}

fn parse_operation_type(tag: &str) -> Result<OperationType> {
    Ok(match tag {
        "commit" => OperationType::Commit,
        "push" => OperationType::Push,
        "pull" => OperationType::Pull,
        "merge" => OperationType::Merge,
        "checkout" => OperationType::Checkout,
        "reset" => OperationType::Reset,
        "init" => OperationType::Init,
        "clone" => OperationType::Clone,
        other => return Err(VmragError::internal(format!("unknown operation_type: {other}"))),
    })
}

async fn next_id(versioned: &dyn VersionedStore) -> Result<i64> {
    let value = versioned
        .exec_scalar(&format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {TABLE}"))
        .await?;
    match value {
        Some(s) => s
            .parse::<i64>()
            .map_err(|e| VmragError::internal(format!("non-numeric operation id: {e}"))),
        None => Ok(1),
    }
}

/// Insert a `started` row and return its id.
pub async fn start_operation(
    versioned: &dyn VersionedStore,
    operation_type: OperationType,
    branch: &str,
    commit_before: Option<&str>,
    collections: &[String],
    started_at: i64,
) -> Result<i64> {
    let id = next_id(versioned).await?;
    let collections_json = serde_json::to_string(collections)?;
    let commit_before_sql = sql_opt_string(commit_before);

    let sql = format!(
        "INSERT INTO {TABLE} (id, operation_type, branch, commit_before, commit_after, collections, counts, status, started_at, completed_at, error) \
         VALUES ({id}, '{op}', '{branch}', {commit_before}, NULL, '{collections}', '{{}}', 'started', {started_at}, NULL, NULL)",
        op = operation_type_tag(operation_type),
        branch = vmrag_versioned::escape_sql_literal(branch),
        commit_before = commit_before_sql,
        collections = vmrag_versioned::escape_sql_literal(&collections_json),
    );
    versioned.exec_sql(&sql).await?;
    Ok(id)
}

/// Mark row `id` completed, recording the resulting commit and per-kind
/// counts.
pub async fn complete_operation(
    versioned: &dyn VersionedStore,
    id: i64,
    commit_after: Option<&str>,
    counts: &HashMap<String, u64>,
    completed_at: i64,
) -> Result<()> {
    let counts_json = serde_json::to_string(counts)?;
    let sql = format!(
        "UPDATE {TABLE} SET status = 'completed', commit_after = {commit_after}, counts = '{counts}', completed_at = {completed_at} WHERE id = {id}",
        commit_after = sql_opt_string(commit_after),
        counts = vmrag_versioned::escape_sql_literal(&counts_json),
    );
    versioned.exec_sql(&sql).await?;
    Ok(())
}

/// Mark row `id` failed with `message`.
pub async fn fail_operation(
    versioned: &dyn VersionedStore,
    id: i64,
    message: &str,
    completed_at: i64,
) -> Result<()> {
    let sql = format!(
        "UPDATE {TABLE} SET status = 'failed', error = '{message}', completed_at = {completed_at} WHERE id = {id}",
        message = vmrag_versioned::escape_sql_literal(message),
    );
    versioned.exec_sql(&sql).await?;
    Ok(())
}

fn sql_opt_string(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", vmrag_versioned::escape_sql_literal(v)),
        None => "NULL".to_string(),
    }
}

/// Most recent `limit` rows, newest first.
pub async fn recent(versioned: &dyn VersionedStore, limit: u32) -> Result<Vec<OperationLog>> {
    let sql = format!("SELECT * FROM {TABLE} ORDER BY id DESC LIMIT {limit}");
    let rows = versioned.query_sql(&sql).await?;
    rows.iter().map(row_to_operation_log).collect()
}

fn row_to_operation_log(row: &serde_json::Value) -> Result<OperationLog> {
    let get_str = |key: &str| row.get(key).and_then(|v| v.as_str()).map(String::from);
    let get_i64 = |key: &str| row.get(key).and_then(|v| v.as_i64());

    let id = get_i64("id").ok_or_else(|| VmragError::internal("sync_operations row missing id"))?;
    let operation_type = parse_operation_type(
        &get_str("operation_type").ok_or_else(|| VmragError::internal("sync_operations row missing operation_type"))?,
    )?;
    let branch = get_str("branch").unwrap_or_default();
    let status = match get_str("status").as_deref() {
        Some("started") => OperationStatus::Started,
        Some("completed") => OperationStatus::Completed,
        Some("failed") => OperationStatus::Failed,
        other => return Err(VmragError::internal(format!("unknown operation status: {other:?}"))),
    };
    let collections: Vec<String> = get_str("collections")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let counts: HashMap<String, u64> = get_str("counts")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(OperationLog {
        id,
        operation_type,
        branch,
        commit_before: get_str("commit_before"),
        commit_after: get_str("commit_after"),
        collections,
        counts,
        status,
        started_at: get_i64("started_at").unwrap_or(0),
        completed_at: get_i64("completed_at"),
        error: get_str("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vmrag_core::{ConflictRow, DiffRow, MergeOutcome, NativeResolutionStrategy, PullOutcome, StatusReport};

    struct RecordingStore {
        statements: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VersionedStore for RecordingStore {
        async fn current_branch(&self) -> Result<String> {
            unimplemented!()
        }
        async fn head_commit(&self) -> Result<String> {
            unimplemented!()
        }
        async fn status(&self) -> Result<StatusReport> {
            unimplemented!()
        }
        async fn create_branch(&self, _name: &str, _from: Option<&str>) -> Result<()> {
            unimplemented!()
        }
        async fn delete_branch(&self, _name: &str) -> Result<()> {
            unimplemented!()
        }
        async fn checkout(&self, _branch: &str, _create: bool) -> Result<()> {
            unimplemented!()
        }
        async fn add_all(&self) -> Result<()> {
            unimplemented!()
        }
        async fn commit(&self, _message: &str) -> Result<String> {
            unimplemented!()
        }
        async fn log(&self, _limit: u32) -> Result<Vec<String>> {
            unimplemented!()
        }
        async fn push(&self, _remote: &str, _branch: &str) -> Result<()> {
            unimplemented!()
        }
        async fn pull(&self, _remote: &str, _branch: &str) -> Result<PullOutcome> {
            unimplemented!()
        }
        async fn fetch(&self, _remote: &str) -> Result<()> {
            unimplemented!()
        }
        async fn clone_remote(&self, _remote: &str, _checkout: Option<&str>) -> Result<()> {
            unimplemented!()
        }
        async fn merge(&self, _source_branch: &str) -> Result<MergeOutcome> {
            unimplemented!()
        }
        async fn has_conflicts(&self) -> Result<bool> {
            unimplemented!()
        }
        async fn conflicts_for(&self, _table: &str) -> Result<Vec<ConflictRow>> {
            unimplemented!()
        }
        async fn resolve_conflicts(&self, _table: &str, _strategy: NativeResolutionStrategy) -> Result<()> {
            unimplemented!()
        }
        async fn table_diff(&self, _from: &str, _to: &str, _table: &str) -> Result<Vec<DiffRow>> {
            unimplemented!()
        }
        async fn exec_sql(&self, statement: &str) -> Result<u64> {
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(1)
        }
        async fn query_sql(&self, _statement: &str) -> Result<Vec<serde_json::Value>> {
            Ok(vec![serde_json::json!({
                "id": 1,
                "operation_type": "commit",
                "branch": "main",
                "commit_before": "c0",
                "commit_after": "c1",
                "collections": "[\"vmrag_main\"]",
                "counts": "{\"new\":2}",
                "status": "completed",
                "started_at": 1000,
                "completed_at": 1001,
                "error": null,
            })])
        }
        async fn exec_scalar(&self, _statement: &str) -> Result<Option<String>> {
            Ok(Some("1".to_string()))
        }
    }

    #[tokio::test]
    async fn test_start_complete_round_trip() {
        let store = RecordingStore { statements: Mutex::new(Vec::new()) };
        let id = start_operation(&store, OperationType::Commit, "main", Some("c0"), &["vmrag_main".to_string()], 1000)
            .await
            .unwrap();
        assert_eq!(id, 1);

        let mut counts = HashMap::new();
        counts.insert("new".to_string(), 2u64);
        complete_operation(&store, id, Some("c1"), &counts, 1001).await.unwrap();

        let statements = store.statements.lock().unwrap();
        assert!(statements[0].contains("'started'"));
        assert!(statements[1].contains("'completed'"));
    }

    #[tokio::test]
    async fn test_fail_operation_records_error() {
        let store = RecordingStore { statements: Mutex::new(Vec::new()) };
        fail_operation(&store, 1, "adapter exploded", 1001).await.unwrap();
        let statements = store.statements.lock().unwrap();
        assert!(statements[0].contains("'failed'"));
        assert!(statements[0].contains("adapter exploded"));
    }

    #[tokio::test]
    async fn test_recent_parses_rows() {
        let store = RecordingStore { statements: Mutex::new(Vec::new()) };
        let rows = recent(&store, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].operation_type, OperationType::Commit);
        assert_eq!(rows[0].status, OperationStatus::Completed);
        assert_eq!(rows[0].collections, vec!["vmrag_main".to_string()]);
        assert_eq!(rows[0].counts.get("new"), Some(&2));
    }
}
