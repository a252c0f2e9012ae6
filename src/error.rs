//! Error types surfaced to the menu layer.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Reasons a title could not be launched. No session is created for any of these.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// No client executable exists in any known location
    #[error("Could not find the Steam executable. Please make sure Steam is installed.")]
    ClientNotFound,

    /// The configured account has no profile data in any library
    #[error("Could not find user information for account {0}. Please select a user again.")]
    UnknownAccount(String),

    /// The client needs a fresh login but no username was given for the account
    #[error("No Steam account username is configured for the selected user")]
    MissingUsername,

    #[error("Failed to start {exe}")]
    Spawn {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reasons a user-supplied library directory was rejected.
#[derive(Error, Debug)]
pub enum LibraryPathError {
    #[error("No path entered")]
    Empty,

    #[error("Path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Directory is not readable: {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory does not contain Steam game files (.acf files): {0}")]
    NoManifests(PathBuf),

    #[error("Path already exists in the list: {0}")]
    AlreadyConfigured(PathBuf),
}
