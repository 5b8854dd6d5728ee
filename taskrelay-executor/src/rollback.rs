//! Best-effort reverse application of a recorded [`FileChange`] list.

use std::sync::Arc;

use taskrelay_core::{ContainerClient, ContainerId, CoreError, FileChange, FileChangeType, FileEditor};
use tracing::warn;

/// Reverses `changes` against the container in declared order, logging and
/// swallowing per-entry errors so one bad entry doesn't abort the rest.
///
/// Returns [`CoreError::RollbackFailed`] only for a failure in the clear
/// phase at the end — per-entry failures are absorbed and logged instead.
pub async fn rollback(
    container: &Arc<dyn ContainerClient>,
    editor: &Arc<dyn FileEditor>,
    id: &ContainerId,
    changes: &[FileChange],
) -> Result<(), CoreError> {
    for change in changes.iter().rev() {
        if let Err(err) = revert_one(container, editor, id, change).await {
            warn!(path = %change.path, %err, "rollback of one change failed, continuing");
        }
    }

    editor.clear_changes().map_err(|err| CoreError::RollbackFailed(err.to_string()))
}

async fn revert_one(
    container: &Arc<dyn ContainerClient>,
    editor: &Arc<dyn FileEditor>,
    id: &ContainerId,
    change: &FileChange,
) -> Result<(), CoreError> {
    if change.is_rollback_skippable() {
        return Ok(());
    }

    match change.change_type {
        FileChangeType::Created => {
            if container.file_exists_in_container(id, &change.path).await? {
                editor.delete_file(id, &change.path).await?;
            }
        }
        FileChangeType::Modified => {
            if let Some(old) = &change.old_content {
                editor.modify_file(id, &change.path, old).await?;
            }
        }
        FileChangeType::Deleted => {
            if let Some(old) = &change.old_content {
                editor.create_file(id, &change.path, old).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use taskrelay_core::ContainerExecResult;

    struct FakeContainer {
        existing: Vec<String>,
    }

    #[async_trait]
    impl ContainerClient for FakeContainer {
        async fn execute_in_container(
            &self,
            _id: &ContainerId,
            _cmd: &str,
            _args: &[String],
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Result<ContainerExecResult, CoreError> {
            unimplemented!()
        }

        async fn read_file_in_container(&self, _id: &ContainerId, _path: &str) -> Result<String, CoreError> {
            unimplemented!()
        }

        async fn write_file_in_container(&self, _id: &ContainerId, _path: &str, _content: &str) -> Result<(), CoreError> {
            unimplemented!()
        }

        async fn file_exists_in_container(&self, _id: &ContainerId, path: &str) -> Result<bool, CoreError> {
            Ok(self.existing.contains(&path.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingEditor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FileEditor for RecordingEditor {
        async fn create_file(&self, _id: &ContainerId, path: &str, _content: &str) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("create:{path}"));
            Ok(())
        }
        async fn modify_file(&self, _id: &ContainerId, path: &str, _transform: &str) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("modify:{path}"));
            Ok(())
        }
        async fn delete_file(&self, _id: &ContainerId, path: &str) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("delete:{path}"));
            Ok(())
        }
        fn get_changes(&self) -> Vec<FileChange> {
            Vec::new()
        }
        fn clear_changes(&self) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push("clear".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailsOnClearEditor;

    #[async_trait]
    impl FileEditor for FailsOnClearEditor {
        async fn create_file(&self, _id: &ContainerId, _path: &str, _content: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn modify_file(&self, _id: &ContainerId, _path: &str, _transform: &str) -> Result<(), CoreError> {
            Ok(())
        }
        async fn delete_file(&self, _id: &ContainerId, _path: &str) -> Result<(), CoreError> {
            Ok(())
        }
        fn get_changes(&self) -> Vec<FileChange> {
            Vec::new()
        }
        fn clear_changes(&self) -> Result<(), CoreError> {
            Err(CoreError::Transient("change log corrupted".to_string()))
        }
    }

    fn change(change_type: FileChangeType, path: &str, old: Option<&str>) -> FileChange {
        FileChange {
            change_type,
            path: path.to_string(),
            old_content: old.map(str::to_string),
            new_content: None,
        }
    }

    #[tokio::test]
    async fn reverses_created_modified_and_deleted_in_reverse_order() {
        let container: Arc<dyn ContainerClient> = Arc::new(FakeContainer {
            existing: vec!["new.rs".to_string()],
        });
        let editor = Arc::new(RecordingEditor::default());
        let editor_dyn: Arc<dyn FileEditor> = editor.clone();

        let changes = vec![
            change(FileChangeType::Created, "new.rs", None),
            change(FileChangeType::Modified, "existing.rs", Some("old body")),
            change(FileChangeType::Deleted, "removed.rs", Some("gone body")),
        ];

        rollback(&container, &editor_dyn, &"container-1".to_string(), &changes).await.unwrap();

        assert_eq!(
            *editor.calls.lock().unwrap(),
            vec![
                "create:removed.rs".to_string(), // Deleted change reverted last-to-first
                "modify:existing.rs".to_string(),
                "delete:new.rs".to_string(),
                "clear".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn skippable_changes_are_left_alone() {
        let container: Arc<dyn ContainerClient> = Arc::new(FakeContainer { existing: vec![] });
        let editor = Arc::new(RecordingEditor::default());
        let editor_dyn: Arc<dyn FileEditor> = editor.clone();

        let changes = vec![change(FileChangeType::Modified, "untouched.rs", None)];
        rollback(&container, &editor_dyn, &"container-1".to_string(), &changes).await.unwrap();

        assert_eq!(*editor.calls.lock().unwrap(), vec!["clear".to_string()]);
    }

    #[tokio::test]
    async fn clear_phase_failure_is_surfaced_as_rollback_failed() {
        let container: Arc<dyn ContainerClient> = Arc::new(FakeContainer { existing: vec![] });
        let editor: Arc<dyn FileEditor> = Arc::new(FailsOnClearEditor);

        let changes = vec![change(FileChangeType::Modified, "untouched.rs", Some("old"))];
        let result = rollback(&container, &editor, &"container-1".to_string(), &changes).await;

        assert!(matches!(result, Err(CoreError::RollbackFailed(_))));
    }
}
