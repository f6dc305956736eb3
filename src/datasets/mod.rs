//! Read-only access to the on-disk proposal datasets
//!
//! Each protocol has one JSON array file maintained by the external
//! refresh command. The core only ever reads these files; a missing
//! file simply means "no proposals known yet" for that protocol.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::StoreError;
use crate::models::{ProposalNumbers, ProposalRecord};

/// Dataset file name for a protocol
///
/// The four launch protocols keep their historical file names; any other
/// protocol maps to `<protocol>.json`.
pub fn dataset_file_name(protocol: &str) -> String {
    match protocol {
        "ethereum" => "eips.json".to_string(),
        "tron" => "tips.json".to_string(),
        "bitcoin" => "bips.json".to_string(),
        "binance_smart_chain" => "beps.json".to_string(),
        other => format!("{other}.json"),
    }
}

#[derive(Debug, Clone)]
pub struct DatasetReader {
    data_dir: PathBuf,
}

impl DatasetReader {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, protocol: &str) -> PathBuf {
        self.data_dir.join(dataset_file_name(protocol))
    }

    fn load_records(&self, protocol: &str) -> Result<Vec<ProposalRecord>, StoreError> {
        let path = self.path_for(protocol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Set of proposal numbers currently present for a protocol
    ///
    /// Unreadable or malformed files are treated as empty with a warning,
    /// so a single broken dataset never blocks a run.
    pub fn known_numbers(&self, protocol: &str) -> ProposalNumbers {
        match self.load_records(protocol) {
            Ok(records) => records.iter().map(|r| r.number).collect(),
            Err(e) => {
                warn!("Failed to read dataset for {protocol}: {e}");
                ProposalNumbers::new()
            }
        }
    }

    /// Full records for the given proposal numbers, for notification display
    pub fn records_for(&self, protocol: &str, numbers: &ProposalNumbers) -> Vec<ProposalRecord> {
        match self.load_records(protocol) {
            Ok(records) => records
                .into_iter()
                .filter(|r| numbers.contains(&r.number))
                .collect(),
            Err(e) => {
                warn!("Failed to read dataset for {protocol}: {e}");
                Vec::new()
            }
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
