use std::collections::HashMap;

use crate::message::Entry;

/// The state machine the cluster replicates: a mapping from key to the
/// latest committed value. Mutated solely by applying committed log
/// entries, in log order, exactly once per entry per replica.
#[derive(Debug, Default)]
pub struct StateMachine {
    table: HashMap<String, String>,
}

impl StateMachine {
    pub fn new() -> StateMachine {
        StateMachine {
            table: HashMap::new(),
        }
    }

    pub fn apply(&mut self, entry: &Entry) {
        self.table.insert(entry.key.clone(), entry.value.clone());
    }

    pub fn lookup(&self, key: &str) -> String {
        self.table.get(key).cloned().unwrap_or_default()
    }
}
