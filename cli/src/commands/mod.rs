//! CLI subcommands

pub mod balance;
pub mod deposits;
pub mod dev_artifacts;
pub mod identity;
pub mod import;
pub mod info;
pub mod status;
pub mod withdraw;

use anyhow::{bail, Context, Result};

use crate::config;
use crate::secure_storage::{vault_password, DepositVault};
use crate::store::{DepositRecord, DepositRecordStore};

/// Open the deposit vault at its default location
pub fn open_vault() -> Result<DepositVault> {
    let path = config::vault_file()?;
    let password = vault_password(&path)?;
    DepositVault::open(path, password).context("Failed to open deposit vault. Wrong password?")
}

/// The record named by `id`, or the only record not yet withdrawn
pub fn select_record(store: &dyn DepositRecordStore, id: Option<&str>) -> Result<DepositRecord> {
    if let Some(id) = id {
        return store.get(id).map_err(Into::into);
    }

    let pending: Vec<DepositRecord> = store
        .records()?
        .into_iter()
        .filter(|r| !r.is_withdrawn())
        .collect();

    match pending.len() {
        0 => bail!("No pending deposits. Run 'mixer identity' or 'mixer import' first."),
        1 => Ok(pending.into_iter().next().context("pending deposit vanished")?),
        n => bail!(
            "{} pending deposits; choose one with --deposit <id>: {}",
            n,
            pending.iter().map(DepositRecord::id).collect::<Vec<_>>().join(", ")
        ),
    }
}
