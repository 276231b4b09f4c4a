//! Storage directory states and the classification table.

use std::fmt;

/// State of a storage directory as found at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageState {
    NonExistent,
    NotFormatted,
    CompleteUpgrade,
    RecoverUpgrade,
    CompleteFinalize,
    CompleteRollback,
    RecoverRollback,
    CompleteCheckpoint,
    RecoverCheckpoint,
    Normal,
}

impl StorageState {
    /// States left behind by an interrupted transition, handled by `do_recover`.
    pub fn needs_recovery(&self) -> bool {
        !matches!(
            self,
            StorageState::NonExistent | StorageState::NotFormatted | StorageState::Normal
        )
    }
}

impl fmt::Display for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageState::NonExistent => "NON_EXISTENT",
            StorageState::NotFormatted => "NOT_FORMATTED",
            StorageState::CompleteUpgrade => "COMPLETE_UPGRADE",
            StorageState::RecoverUpgrade => "RECOVER_UPGRADE",
            StorageState::CompleteFinalize => "COMPLETE_FINALIZE",
            StorageState::CompleteRollback => "COMPLETE_ROLLBACK",
            StorageState::RecoverRollback => "RECOVER_ROLLBACK",
            StorageState::CompleteCheckpoint => "COMPLETE_CHECKPOINT",
            StorageState::RecoverCheckpoint => "RECOVER_CHECKPOINT",
            StorageState::Normal => "NORMAL",
        };
        f.write_str(name)
    }
}

/// Which of the well-known children exist in a locked, writable directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryFacts {
    /// `current/VERSION` exists
    pub has_current: bool,
    pub has_previous: bool,
    pub has_previous_tmp: bool,
    pub has_removed_tmp: bool,
    pub has_finalized_tmp: bool,
    pub has_checkpoint_tmp: bool,
}

impl DirectoryFacts {
    fn tmp_count(&self) -> usize {
        [
            self.has_previous_tmp,
            self.has_removed_tmp,
            self.has_finalized_tmp,
            self.has_checkpoint_tmp,
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Classify a directory from its facts. `Err` carries the inconsistency description.
pub fn classify(facts: &DirectoryFacts) -> Result<StorageState, String> {
    let f = facts;
    match f.tmp_count() {
        0 => {
            return match (f.has_current, f.has_previous) {
                (true, _) => Ok(StorageState::Normal),
                (false, true) => Err("version file in current directory is missing.".to_string()),
                (false, false) => Ok(StorageState::NotFormatted),
            }
        }
        1 => {}
        _ => return Err("too many temporary directories.".to_string()),
    }

    if f.has_checkpoint_tmp {
        return Ok(if f.has_current {
            StorageState::CompleteCheckpoint
        } else {
            StorageState::RecoverCheckpoint
        });
    }

    if f.has_finalized_tmp {
        return if f.has_previous {
            Err("previous and finalized.tmp cannot exist together.".to_string())
        } else {
            Ok(StorageState::CompleteFinalize)
        };
    }

    if f.has_previous_tmp {
        return match (f.has_previous, f.has_current) {
            (true, _) => Err("previous and previous.tmp cannot exist together.".to_string()),
            (false, true) => Ok(StorageState::CompleteUpgrade),
            (false, false) => Ok(StorageState::RecoverUpgrade),
        };
    }

    // removed.tmp is the only marker left
    match (f.has_current, f.has_previous) {
        (true, false) => Ok(StorageState::CompleteRollback),
        (false, true) => Ok(StorageState::RecoverRollback),
        _ => Err(
            "one and only one directory current or previous must be present when removed.tmp exists."
                .to_string(),
        ),
    }
}
