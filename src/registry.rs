//! Where the client records its install location and the logged-in account.

use std::path::PathBuf;

#[cfg(windows)]
use tracing::debug;
#[cfg(windows)]
use winreg::RegKey;
#[cfg(windows)]
use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};

#[cfg(windows)]
const STEAM_KEY: &str = r"Software\Valve\Steam";
#[cfg(windows)]
const ACTIVE_PROCESS_KEY: &str = r"Software\Valve\Steam\ActiveProcess";

/// Account id currently logged into the client, if any.
#[cfg(windows)]
pub fn active_account_id() -> Option<String> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = match hkcu.open_subkey_with_flags(ACTIVE_PROCESS_KEY, KEY_READ) {
        Ok(key) => key,
        Err(err) => {
            debug!("Failed to open HKCU ActiveProcess registry key: {err}");
            return None;
        }
    };
    match key.get_value::<u32, _>("ActiveUser") {
        Ok(0) => None,
        Ok(id) => Some(id.to_string()),
        Err(err) => {
            debug!("Failed to read ActiveUser: {err}");
            None
        }
    }
}

#[cfg(windows)]
pub fn client_install_dir() -> Option<PathBuf> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = hkcu.open_subkey_with_flags(STEAM_KEY, KEY_READ).ok()?;
    let path: String = key.get_value("SteamPath").ok()?;
    let path = PathBuf::from(path.replace('/', r"\"));
    path.is_dir().then_some(path)
}

#[cfg(not(windows))]
pub fn active_account_id() -> Option<String> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    let content = std::fs::read_to_string(home.join(".steam/registry.vdf")).ok()?;
    active_account_from_registry_vdf(&content)
}

#[cfg(not(windows))]
pub fn client_install_dir() -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    let path = home.join(".steam/steam");
    path.is_dir().then_some(path)
}

/// Reads `ActiveUser` out of the client's `registry.vdf` mirror of the Windows registry.
#[cfg_attr(windows, allow(dead_code))]
pub fn active_account_from_registry_vdf(content: &str) -> Option<String> {
    let root = crate::vdf::parse(content).ok()?;
    let id = root
        .str_at(&[
            "Registry",
            "HKCU",
            "Software",
            "Valve",
            "Steam",
            "ActiveProcess",
            "ActiveUser",
        ])?
        .trim();
    (!id.is_empty() && id != "0").then(|| id.to_string())
}
