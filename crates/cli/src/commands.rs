//! Store subcommands.

use std::time::Duration;

use clap::Subcommand;
use corelib::MapDataStore;

/// Operations the CLI can run against a store.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the value stored under a key.
    Get {
        /// Key to look up.
        key: String,
    },
    /// Store a value under a key.
    Put {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// Remove a key, printing the prior value if any.
    Remove {
        /// Key to remove.
        key: String,
    },
    /// Check whether a key is present.
    Contains {
        /// Key to check.
        key: String,
    },
    /// Print per-partition entry counts as JSON.
    Sizes,
    /// Run the elastic scale-out check once.
    Check,
}

impl Command {
    /// Executes the command against an available store.
    pub fn execute(
        self,
        store: &MapDataStore<String, String>,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        match self {
            Command::Get { key } => match store.get(&key, timeout)? {
                Some(value) => println!("{value}"),
                None => println!("(none)"),
            },
            Command::Put { key, value } => {
                store.put(&key, &value, timeout)?;
            }
            Command::Remove { key } => match store.remove(&key, timeout)? {
                Some(value) => println!("{value}"),
                None => println!("(none)"),
            },
            Command::Contains { key } => {
                println!("{}", store.contains_key(&key, timeout)?);
            }
            Command::Sizes => {
                println!("{}", serde_json::to_string_pretty(&store.sizes()?)?);
            }
            Command::Check => {
                let created = store.run_check()?;
                println!("created {created} partition(s)");
            }
        }
        Ok(())
    }
}
