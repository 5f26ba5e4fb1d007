// crates/pr_cli/src/state.rs
//
// The state file: the scenario the run started from plus the full event log.
// Written canonically so identical histories give identical bytes.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pr_io::canonical_json::write_canonical_file;
use pr_io::loader::Scenario;
use pr_io::{read_json, IoResult};
use pr_pipeline::service::KnownTransactions;
use pr_pipeline::{EventEnvelope, InMemoryEventStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    pub scenario: Scenario,
    pub events: Vec<EventEnvelope>,
}

impl StateFile {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario, events: Vec::new() }
    }

    pub fn load(path: &Path) -> IoResult<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> IoResult<()> {
        write_canonical_file(path, self)
    }

    /// Store seeded with the persisted log; rejects logs with sequence gaps.
    pub fn store(&self) -> Result<InMemoryEventStore, StoreError> {
        InMemoryEventStore::from_log(self.events.clone())
    }

    pub fn verifier(&self) -> KnownTransactions {
        let sf = &self.scenario.second_factor;
        KnownTransactions {
            verified: sf.verified.iter().cloned().collect::<BTreeSet<_>>(),
            data_changed: sf.data_changed.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }
}
