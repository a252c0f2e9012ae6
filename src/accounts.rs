use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::library::client_root;
use crate::vdf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Accounts with profile data under any configured library's client install.
pub fn discover_accounts(library_paths: &[PathBuf]) -> Vec<Account> {
    let mut accounts = BTreeMap::new();
    for library in library_paths {
        let Some(root) = client_root(library) else {
            continue;
        };
        for account in accounts_in(&root.join("userdata")) {
            accounts.entry(account.id.clone()).or_insert(account);
        }
    }
    accounts.into_values().collect()
}

fn accounts_in(userdata: &Path) -> Vec<Account> {
    let Ok(entries) = fs::read_dir(userdata) else {
        debug!("No userdata folder at {}", userdata.display());
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let id = entry.file_name().to_str()?.to_string();
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let localconfig = entry.path().join("config").join("localconfig.vdf");
            if !localconfig.exists() {
                return None;
            }
            let name = match fs::read_to_string(&localconfig) {
                Ok(content) => persona_name(&content),
                Err(err) => {
                    warn!("Failed to read {}: {err}", localconfig.display());
                    None
                }
            }
            .unwrap_or_else(|| format!("User {id}"));
            Some(Account { id, name })
        })
        .collect()
}

/// Display name stored in a `localconfig.vdf` document.
pub fn persona_name(localconfig: &str) -> Option<String> {
    let root = vdf::parse(localconfig).ok()?;
    root.str_at(&["UserLocalConfigStore", "friends", "PersonaName"])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub fn account_name(accounts: &[Account], id: &str) -> Option<String> {
    accounts
        .iter()
        .find(|account| account.id == id)
        .map(|account| account.name.clone())
}
