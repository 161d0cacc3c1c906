//! Merge-conflict classification and resolution (spec.md §4.8). Outcomes are
//! reported as the unified `ConflictOutcome` tagged variant rather than mixed
//! return-values/exceptions (design notes §9).

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use vmrag_core::{
    ConflictOutcome, ConflictRow, ConflictType, DetailedConflict, FieldSource, NativeResolutionStrategy,
    Result, ResolutionKind, ResolutionSpec, VersionedStore,
};

const CONFLICTS_TABLE: &str = "documents";

/// Preview conflicts between `source_branch` and `target_branch` for
/// `collection`. When `include_auto_resolvable` is false, conflicts the
/// analyzer judges auto-resolvable are left out of the returned list.
pub async fn preview(
    versioned: &dyn VersionedStore,
    collection: &str,
    include_auto_resolvable: bool,
) -> Result<Vec<DetailedConflict>> {
    let rows = versioned.conflicts_for(CONFLICTS_TABLE).await?;
    let mut conflicts = Vec::with_capacity(rows.len());

    for row in rows {
        let conflict = classify(collection, &row);
        if include_auto_resolvable || !conflict.auto_resolvable {
            conflicts.push(conflict);
        }
    }

    Ok(conflicts)
}

fn classify(collection: &str, row: &ConflictRow) -> DetailedConflict {
    let ours_empty = row.ours.is_empty();
    let theirs_empty = row.theirs.is_empty();

    let conflict_type = if ours_empty != theirs_empty {
        ConflictType::DeleteModify
    } else if row.base.is_none() {
        ConflictType::AddAdd
    } else {
        let base = row.base.as_ref().unwrap();
        let ours_changed = changed_fields(base, &row.ours);
        let theirs_changed = changed_fields(base, &row.theirs);
        if ours_changed.contains(&"content".to_string()) || theirs_changed.contains(&"content".to_string()) {
            ConflictType::ContentModification
        } else {
            ConflictType::MetadataConflict
        }
    };

    let (ours_changed_fields, theirs_changed_fields) = match &row.base {
        Some(base) => (changed_fields(base, &row.ours), changed_fields(base, &row.theirs)),
        None => (Vec::new(), Vec::new()),
    };

    let auto_resolvable = match conflict_type {
        ConflictType::ContentModification | ConflictType::MetadataConflict => {
            let ours_set: HashSet<&String> = ours_changed_fields.iter().collect();
            let theirs_set: HashSet<&String> = theirs_changed_fields.iter().collect();
            ours_set.is_disjoint(&theirs_set)
        }
        ConflictType::AddAdd => row.ours == row.theirs,
        ConflictType::DeleteModify | ConflictType::Schema => false,
    };

    let suggested_resolution = if auto_resolvable {
        match conflict_type {
            ConflictType::AddAdd => Some(ResolutionKind::KeepOurs),
            _ => Some(ResolutionKind::FieldMerge),
        }
    } else {
        None
    };

    let mut resolution_options = vec![ResolutionKind::KeepOurs, ResolutionKind::KeepTheirs, ResolutionKind::Custom];
    if matches!(conflict_type, ConflictType::ContentModification | ConflictType::MetadataConflict) {
        resolution_options.push(ResolutionKind::FieldMerge);
    }

    DetailedConflict {
        conflict_id: conflict_id(collection, &row.doc_id, conflict_type),
        collection_name: collection.to_string(),
        doc_id: row.doc_id.clone(),
        conflict_type,
        base: row.base.clone(),
        ours: row.ours.clone(),
        theirs: row.theirs.clone(),
        ours_changed_fields,
        theirs_changed_fields,
        auto_resolvable,
        suggested_resolution,
        resolution_options,
    }
}

fn changed_fields(
    base: &HashMap<String, serde_json::Value>,
    side: &HashMap<String, serde_json::Value>,
) -> Vec<String> {
    let mut keys: Vec<&String> = base.keys().chain(side.keys()).collect();
    keys.sort_unstable();
    keys.dedup();

    let mut changed: Vec<String> = keys
        .into_iter()
        .filter(|k| base.get(*k) != side.get(*k))
        .cloned()
        .collect();
    changed.sort_unstable();
    changed
}

fn conflict_type_tag(conflict_type: ConflictType) -> &'static str {
    match conflict_type {
        ConflictType::ContentModification => "content_modification",
        ConflictType::MetadataConflict => "metadata_conflict",
        ConflictType::AddAdd => "add_add",
        ConflictType::DeleteModify => "delete_modify",
        ConflictType::Schema => "schema",
    }
}

fn conflict_id(collection: &str, doc_id: &str, conflict_type: ConflictType) -> String {
    let digest = Sha256::digest(format!("{}_{}_{}", collection, doc_id, conflict_type_tag(conflict_type)).as_bytes());
    format!("cflt_{}", hex::encode(&digest[..6]))
}

/// Resolve a set of previewed conflicts. `resolutions` maps `conflict_id` to
/// a caller-chosen spec; any conflict left unmapped is auto-resolved via the
/// disjoint-fields rule when `auto_resolve_remaining` is set and the
/// conflict is itself auto-resolvable, otherwise it is left unresolved.
pub async fn execute(
    versioned: &dyn VersionedStore,
    conflicts: &[DetailedConflict],
    resolutions: &HashMap<String, ResolutionSpec>,
    auto_resolve_remaining: bool,
    merge_message: &str,
) -> Result<ConflictOutcome> {
    let mut resolved = 0u32;
    let mut remaining = Vec::new();
    let mut bulk_strategies: HashSet<NativeResolutionStrategy> = HashSet::new();

    for conflict in conflicts {
        let spec = resolutions.get(&conflict.conflict_id).cloned().or_else(|| {
            if auto_resolve_remaining && conflict.auto_resolvable {
                Some(auto_resolve_spec(conflict))
            } else {
                None
            }
        });

        let Some(spec) = spec else {
            remaining.push(conflict.conflict_id.clone());
            continue;
        };

        match apply_resolution(versioned, conflict, &spec, &mut bulk_strategies).await {
            Ok(()) => resolved += 1,
            Err(e) => return Ok(ConflictOutcome::AdapterError { message: e.to_string() }),
        }
    }

    if versioned.has_conflicts().await? {
        return Ok(ConflictOutcome::Unresolved { resolved, remaining });
    }

    versioned.commit(merge_message).await?;
    Ok(ConflictOutcome::Resolved { resolved })
}

fn auto_resolve_spec(conflict: &DetailedConflict) -> ResolutionSpec {
    let mut field_resolutions = HashMap::new();
    for field in &conflict.ours_changed_fields {
        field_resolutions.insert(field.clone(), FieldSource::Ours);
    }
    for field in &conflict.theirs_changed_fields {
        field_resolutions.entry(field.clone()).or_insert(FieldSource::Theirs);
    }
    ResolutionSpec::FieldMerge { field_resolutions }
}

async fn apply_resolution(
    versioned: &dyn VersionedStore,
    conflict: &DetailedConflict,
    spec: &ResolutionSpec,
    bulk_strategies: &mut HashSet<NativeResolutionStrategy>,
) -> Result<()> {
    match spec {
        ResolutionSpec::KeepOurs => {
            if bulk_strategies.insert(NativeResolutionStrategy::Ours) {
                versioned.resolve_conflicts(CONFLICTS_TABLE, NativeResolutionStrategy::Ours).await?;
            }
            Ok(())
        }
        ResolutionSpec::KeepTheirs => {
            if bulk_strategies.insert(NativeResolutionStrategy::Theirs) {
                versioned.resolve_conflicts(CONFLICTS_TABLE, NativeResolutionStrategy::Theirs).await?;
            }
            Ok(())
        }
        ResolutionSpec::FieldMerge { field_resolutions } => {
            let mut merged = conflict.ours.clone();
            for (field, source) in field_resolutions {
                let value = match source {
                    FieldSource::Ours => conflict.ours.get(field),
                    FieldSource::Theirs => conflict.theirs.get(field),
                };
                if let Some(value) = value {
                    merged.insert(field.clone(), value.clone());
                }
            }
            write_merged_row(versioned, conflict, &merged).await
        }
        ResolutionSpec::Custom { custom_values } => {
            let mut merged = conflict.ours.clone();
            for (field, value) in custom_values {
                merged.insert(field.clone(), value.clone());
            }
            write_merged_row(versioned, conflict, &merged).await
        }
    }
}

/// `merged` is a whole-row field map (spec.md §4.8's `ConflictRow.ours`/
/// `.theirs` shape), not just user metadata. Real columns (`content`,
/// `title`, `doc_type`, `content_hash`) go to their own `documents` columns;
/// everything else lands in the `metadata` JSON column.
async fn write_merged_row(
    versioned: &dyn VersionedStore,
    conflict: &DetailedConflict,
    merged: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    let mut set_clauses = Vec::new();

    if let Some(content) = merged.get("content").and_then(|v| v.as_str()) {
        set_clauses.push(format!("content = '{}'", vmrag_versioned::escape_sql_literal(content)));
        let content_hash = vmrag_core::hash::sha256_hex(content);
        set_clauses.push(format!("content_hash = '{}'", vmrag_versioned::escape_sql_literal(&content_hash)));
    }
    if let Some(title) = merged.get("title").and_then(|v| v.as_str()) {
        set_clauses.push(format!("title = '{}'", vmrag_versioned::escape_sql_literal(title)));
    }
    if let Some(doc_type) = merged.get("doc_type").and_then(|v| v.as_str()) {
        set_clauses.push(format!("doc_type = '{}'", vmrag_versioned::escape_sql_literal(doc_type)));
    }
    if let Some(metadata) = merged.get("metadata") {
        let metadata_json = serde_json::to_string(metadata)?;
        set_clauses.push(format!("metadata = '{}'", vmrag_versioned::escape_sql_literal(&metadata_json)));
    }

    if !set_clauses.is_empty() {
        let sql = format!(
            "UPDATE documents SET {} WHERE doc_id = '{}' AND collection_name = '{}'",
            set_clauses.join(", "),
            vmrag_versioned::escape_sql_literal(&conflict.doc_id),
            vmrag_versioned::escape_sql_literal(&conflict.collection_name),
        );
        versioned.exec_sql(&sql).await?;
    }

    let delete_marker = format!(
        "DELETE FROM dolt_conflicts_documents WHERE doc_id = '{}'",
        vmrag_versioned::escape_sql_literal(&conflict.doc_id)
    );
    versioned.exec_sql(&delete_marker).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vmrag_core::{DiffRow, MergeOutcome, PullOutcome, StatusReport};

    fn field_map(pairs: &[(&str, &str)]) -> HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), serde_json::json!(v))).collect()
    }

    struct RecordingVersionedStore {
        executed: Mutex<Vec<String>>,
    }

    impl RecordingVersionedStore {
        fn new() -> Self {
            Self { executed: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl VersionedStore for RecordingVersionedStore {
        async fn current_branch(&self) -> Result<String> {
            Ok("main".to_string())
        }
        async fn head_commit(&self) -> Result<String> {
            Ok("c1".to_string())
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
            Ok("merge_commit".to_string())
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
            Ok(false)
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
            self.executed.lock().unwrap().push(statement.to_string());
            Ok(1)
        }
        async fn query_sql(&self, _statement: &str) -> Result<Vec<serde_json::Value>> {
            unimplemented!()
        }
        async fn exec_scalar(&self, _statement: &str) -> Result<Option<String>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_field_merge_writes_real_columns_not_just_metadata() {
        // main D1 {title:"T0", content:"body"}; feat -> title:"T1"; other -> content:"BODY"
        let row = ConflictRow {
            doc_id: "D1".to_string(),
            base: Some(field_map(&[("title", "T0"), ("content", "body")])),
            ours: field_map(&[("title", "T1"), ("content", "body")]),
            theirs: field_map(&[("title", "T0"), ("content", "BODY")]),
        };
        let conflict = classify("docs", &row);
        assert!(conflict.auto_resolvable);

        let versioned = RecordingVersionedStore::new();
        let outcome =
            execute(&versioned, std::slice::from_ref(&conflict), &HashMap::new(), true, "resolve D1").await.unwrap();
        assert!(matches!(outcome, ConflictOutcome::Resolved { resolved: 1 }));

        let executed = versioned.executed.lock().unwrap();
        let update_sql = executed.iter().find(|s| s.starts_with("UPDATE documents")).expect("an UPDATE was issued");
        assert!(update_sql.contains("title = 'T1'"), "expected resolved title in real column: {update_sql}");
        assert!(update_sql.contains("content = 'BODY'"), "expected resolved content in real column: {update_sql}");
        let expected_hash = vmrag_core::hash::sha256_hex("BODY");
        assert!(
            update_sql.contains(&format!("content_hash = '{expected_hash}'")),
            "expected recomputed content_hash: {update_sql}"
        );
        assert!(!update_sql.contains("metadata = '{\"title\""), "whole row must not be dumped into metadata");
    }

    #[test]
    fn test_classify_disjoint_fields_is_auto_resolvable() {
        let row = ConflictRow {
            doc_id: "D1".to_string(),
            base: Some(field_map(&[("title", "T0"), ("content", "body")])),
            ours: field_map(&[("title", "T1"), ("content", "body")]),
            theirs: field_map(&[("title", "T0"), ("content", "BODY")]),
        };

        let conflict = classify("c1", &row);
        assert_eq!(conflict.conflict_type, ConflictType::ContentModification);
        assert!(conflict.auto_resolvable);
        assert_eq!(conflict.suggested_resolution, Some(ResolutionKind::FieldMerge));
        assert_eq!(conflict.ours_changed_fields, vec!["title".to_string()]);
        assert_eq!(conflict.theirs_changed_fields, vec!["content".to_string()]);
    }

    #[test]
    fn test_classify_overlapping_fields_not_auto_resolvable() {
        let row = ConflictRow {
            doc_id: "D1".to_string(),
            base: Some(field_map(&[("title", "T0")])),
            ours: field_map(&[("title", "T1")]),
            theirs: field_map(&[("title", "T2")]),
        };

        let conflict = classify("c1", &row);
        assert!(!conflict.auto_resolvable);
        assert!(conflict.suggested_resolution.is_none());
    }

    #[test]
    fn test_classify_add_add_byte_identical() {
        let row = ConflictRow {
            doc_id: "D1".to_string(),
            base: None,
            ours: field_map(&[("content", "same")]),
            theirs: field_map(&[("content", "same")]),
        };

        let conflict = classify("c1", &row);
        assert_eq!(conflict.conflict_type, ConflictType::AddAdd);
        assert!(conflict.auto_resolvable);
    }

    #[test]
    fn test_classify_delete_modify() {
        let row = ConflictRow {
            doc_id: "D1".to_string(),
            base: Some(field_map(&[("content", "body")])),
            ours: HashMap::new(),
            theirs: field_map(&[("content", "BODY")]),
        };

        let conflict = classify("c1", &row);
        assert_eq!(conflict.conflict_type, ConflictType::DeleteModify);
        assert!(!conflict.auto_resolvable);
    }

    #[test]
    fn test_conflict_id_is_stable_and_prefixed() {
        let a = conflict_id("c1", "D1", ConflictType::ContentModification);
        let b = conflict_id("c1", "D1", ConflictType::ContentModification);
        assert_eq!(a, b);
        assert!(a.starts_with("cflt_"));
    }
}
