use serde::{Deserialize, Serialize};

use crate::{object::ObjectStats, pruning::ZoneMap, transaction::TxnId};

/// Log record describing one workspace change of a committing transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnCommand {
    /// Buffered rows appended to the table.
    Append {
        /// Table name.
        table: String,
        /// Whether the rows target the tombstone object list.
        tombstone: bool,
        /// Number of appended rows.
        rows: u32,
        /// Primary-key bounds of the appended rows.
        zone_map: ZoneMap,
    },
    /// Bulk-loaded objects registered with the table.
    AddObjects {
        /// Table name.
        table: String,
        /// Whether the objects target the tombstone object list.
        tombstone: bool,
        /// Descriptors of the registered objects.
        objects: Vec<ObjectStats>,
    },
}

/// Collects the commands a transaction hands to the write-ahead log.
#[derive(Debug)]
pub struct CommandManager {
    txn: TxnId,
    commands: Vec<TxnCommand>,
}

impl CommandManager {
    /// Empty collector for `txn`.
    pub fn new(txn: TxnId) -> Self {
        Self {
            txn,
            commands: Vec::new(),
        }
    }

    /// Transaction the commands belong to.
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Record a command.
    pub fn add(&mut self, command: TxnCommand) {
        self.commands.push(command);
    }

    /// Commands collected so far, in collection order.
    pub fn commands(&self) -> &[TxnCommand] {
        &self.commands
    }

    /// Number of collected commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// `true` when nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take the collected commands.
    pub fn into_commands(self) -> Vec<TxnCommand> {
        self.commands
    }
}
