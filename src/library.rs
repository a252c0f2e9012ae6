use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::all_consuming,
    sequence::delimited,
};
use tracing::{debug, error, trace, warn};

use crate::error::LibraryPathError;
use crate::registry;
use crate::vdf;

/// A title discovered from an app manifest in one of the library folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTitle {
    pub name: String,
    pub app_id: String,
    pub install_dir: String,
}

/// Used for checking if a file name matches the structure for an app manifest file
fn parse_manifest_filename(filename: &str) -> IResult<&str, &str> {
    all_consuming(delimited(tag("appmanifest_"), digit1, tag(".acf"))).parse(filename)
}

pub fn is_manifest_filename(filename: &str) -> bool {
    parse_manifest_filename(filename).is_ok()
}

/// Reads the title out of an `appmanifest_*.acf` document. Manifests without an app id are skipped.
pub fn parse_manifest(content: &str) -> Option<InstalledTitle> {
    let root = vdf::parse(content).ok()?;
    let state = root.get("AppState")?;
    let app_id = state.str_at(&["appid"])?.trim().to_string();
    if app_id.is_empty() {
        return None;
    }
    Some(InstalledTitle {
        name: state
            .str_at(&["name"])
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown Game")
            .to_string(),
        app_id,
        install_dir: state.str_at(&["installdir"]).unwrap_or_default().to_string(),
    })
}

fn manifest_paths(library: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(library) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Could not read library {}: {err}", library.display());
            return Vec::new();
        }
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let filename_os_str = entry.file_name();
            let Some(filename) = filename_os_str.to_str() else {
                debug!("Could not convert OS string to str: {filename_os_str:?}");
                return None;
            };
            if !is_manifest_filename(filename) {
                trace!("Skipped {filename} as it is not an app manifest");
                return None;
            }
            Some(entry.path())
        })
        .collect()
}

/// Every installed title across the given library folders, sorted by name.
pub fn scan_libraries(library_paths: &[PathBuf]) -> Vec<InstalledTitle> {
    let mut titles = Vec::new();
    for library in library_paths {
        debug!("Scanning library: {}", library.display());
        for path in manifest_paths(library) {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    error!("Error reading {}: {err}", path.display());
                    continue;
                }
            };
            match parse_manifest(&content) {
                Some(title) => titles.push(title),
                None => warn!("Skipped unusable manifest {}", path.display()),
            }
        }
    }
    titles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.app_id.cmp(&b.app_id)));
    titles
}

pub fn title_name(titles: &[InstalledTitle], app_id: &str) -> String {
    titles
        .iter()
        .find(|title| title.app_id == app_id)
        .map(|title| title.name.clone())
        .unwrap_or_else(|| format!("Game {app_id}"))
}

/// The client installation directory a `steamapps` library belongs to.
pub fn client_root(library: &Path) -> Option<&Path> {
    library.parent()
}

/// Client installation directories probed when auto-detecting libraries.
pub fn candidate_client_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = registry::client_install_dir().into_iter().collect();

    #[cfg(windows)]
    {
        for drive in 'A'..='Z' {
            for dir in [
                "Steam",
                r"Program Files (x86)\Steam",
                r"Program Files\Steam",
                "SteamLibrary",
                "Steam Library",
            ] {
                roots.push(PathBuf::from(format!(r"{drive}:\{dir}")));
            }
        }
    }

    #[cfg(not(windows))]
    {
        if let Some(dirs) = directories::BaseDirs::new() {
            let home = dirs.home_dir();
            roots.push(home.join(".steam/steam"));
            roots.push(dirs.data_local_dir().join("Steam"));
            roots.push(home.join(".var/app/com.valvesoftware.Steam/data/Steam"));
        }
    }

    roots
}

/// Existing `steamapps` folders under the given roots, plus any extra
/// libraries listed in each root's `libraryfolders.vdf`.
pub fn detect_libraries_in(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut push = |path: PathBuf, found: &mut Vec<PathBuf>| {
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            found.push(path);
        }
    };

    for root in roots {
        if !root.exists() {
            continue;
        }
        let steamapps = root.join("steamapps");
        trace!("Checking client folder {}", root.display());
        if !steamapps.is_dir() {
            debug!(
                "Client folder exists but has no steamapps folder: {}",
                root.display()
            );
            continue;
        }
        push(steamapps.clone(), &mut found);

        let listing = steamapps.join("libraryfolders.vdf");
        if let Ok(content) = fs::read_to_string(&listing) {
            for extra in library_folders_from_vdf(&content) {
                let extra_steamapps = extra.join("steamapps");
                if extra_steamapps.is_dir() {
                    push(extra_steamapps, &mut found);
                }
            }
        }
    }
    found
}

pub fn detect_libraries() -> Vec<PathBuf> {
    let found = detect_libraries_in(&candidate_client_roots());
    if found.is_empty() {
        warn!("No Steam libraries found in common locations");
    }
    found
}

/// Library roots listed in a `libraryfolders.vdf` document.
pub fn library_folders_from_vdf(content: &str) -> Vec<PathBuf> {
    let Ok(root) = vdf::parse(content) else {
        return Vec::new();
    };
    let Some(folders) = root.get("libraryfolders") else {
        return Vec::new();
    };
    folders
        .entries()
        .iter()
        .filter(|(key, _)| key.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|(_, folder)| match folder {
            vdf::Node::Section(_) => folder.str_at(&["path"]),
            // Older layout maps the index straight to the path
            vdf::Node::Value(path) => Some(path.as_str()),
        })
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Normalizes user input and checks that it points at a readable folder of app manifests.
pub fn validate_library_dir(input: &str) -> Result<PathBuf, LibraryPathError> {
    let trimmed = input.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return Err(LibraryPathError::Empty);
    }
    let path = PathBuf::from(trimmed);
    let resolved = fs::canonicalize(&path).map_err(|_| LibraryPathError::NotFound(path.clone()))?;
    if !resolved.is_dir() {
        return Err(LibraryPathError::NotADirectory(resolved));
    }
    let entries = fs::read_dir(&resolved).map_err(|source| LibraryPathError::Unreadable {
        path: resolved.clone(),
        source,
    })?;
    let has_manifest = entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(".acf"))
            .unwrap_or(false)
    });
    if !has_manifest {
        return Err(LibraryPathError::NoManifests(resolved));
    }
    Ok(simplify_path(resolved))
}

/// Drops the `\\?\` prefix Windows canonicalization adds.
fn simplify_path(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix(r"\\?\")) {
        Some(stripped) if !stripped.starts_with("UNC") => PathBuf::from(stripped),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn write_manifest(dir: &Path, app_id: &str, name: &str) {
        fs::write(
            dir.join(format!("appmanifest_{app_id}.acf")),
            format!(
                "\"AppState\"\n{{\n\t\"appid\"\t\t\"{app_id}\"\n\t\"name\"\t\t\"{name}\"\n\t\"installdir\"\t\t\"{name}\"\n}}\n"
            ),
        )
        .unwrap();
    }

    #[test_case("appmanifest_440.acf", true)]
    #[test_case("appmanifest_228980.acf", true)]
    #[test_case("appmanifest_.acf", false)]
    #[test_case("appmanifest_440.acf.bak", false)]
    #[test_case("libraryfolders.vdf", false)]
    fn recognizes_manifest_filenames(filename: &str, expected: bool) {
        assert_eq!(is_manifest_filename(filename), expected);
    }

    #[test]
    fn manifest_defaults_missing_name() {
        let title = parse_manifest("\"AppState\" { \"appid\" \"70\" }").unwrap();
        assert_eq!(title.name, "Unknown Game");
        assert_eq!(title.install_dir, "");
        assert!(parse_manifest("\"AppState\" { \"name\" \"x\" }").is_none());
    }

    #[test]
    fn scans_and_sorts_titles_across_libraries() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_manifest(first.path(), "620", "Portal 2");
        write_manifest(first.path(), "10", "Counter-Strike");
        write_manifest(second.path(), "70", "Half-Life");
        fs::write(first.path().join("appmanifest_5.acf"), "garbage {").unwrap();
        fs::write(first.path().join("notes.txt"), "ignored").unwrap();

        let titles = scan_libraries(&[
            first.path().to_path_buf(),
            second.path().to_path_buf(),
            first.path().join("missing"),
        ]);
        let names: Vec<&str> = titles.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Counter-Strike", "Half-Life", "Portal 2"]);
        assert_eq!(title_name(&titles, "620"), "Portal 2");
        assert_eq!(title_name(&titles, "1"), "Game 1");
    }

    #[test]
    fn reads_both_library_folder_layouts() {
        let modern = "\"libraryfolders\"\n{\n\t\"0\"\n\t{\n\t\t\"path\"\t\t\"C:\\\\Program Files (x86)\\\\Steam\"\n\t}\n\t\"1\"\n\t{\n\t\t\"path\"\t\t\"D:\\\\SteamLibrary\"\n\t}\n}";
        assert_eq!(
            library_folders_from_vdf(modern),
            vec![
                PathBuf::from(r"C:\Program Files (x86)\Steam"),
                PathBuf::from(r"D:\SteamLibrary")
            ]
        );

        let legacy = "\"LibraryFolders\" { \"TimeNextStatsReport\" \"1589000000\" \"1\" \"E:\\\\Games\" }";
        assert_eq!(library_folders_from_vdf(legacy), vec![PathBuf::from(r"E:\Games")]);
        assert!(library_folders_from_vdf("not a vdf {").is_empty());
    }

    #[test]
    fn detects_libraries_and_follows_listing() {
        let root = tempfile::tempdir().unwrap();
        let client = root.path().join("Steam");
        let extra = root.path().join("SteamLibrary");
        fs::create_dir_all(client.join("steamapps")).unwrap();
        fs::create_dir_all(extra.join("steamapps")).unwrap();
        fs::create_dir_all(root.path().join("Empty")).unwrap();
        let listing = format!(
            "\"libraryfolders\" {{ \"0\" {{ \"path\" \"{}\" }} \"1\" {{ \"path\" \"{}\" }} }}",
            client.display().to_string().replace('\\', "\\\\"),
            extra.display().to_string().replace('\\', "\\\\"),
        );
        fs::write(client.join("steamapps/libraryfolders.vdf"), listing).unwrap();

        let found = detect_libraries_in(&[
            client.clone(),
            root.path().join("Empty"),
            root.path().join("Nowhere"),
            client.clone(),
        ]);
        assert_eq!(found, vec![client.join("steamapps"), extra.join("steamapps")]);
    }

    #[test]
    fn validates_library_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(validate_library_dir("  "), Err(LibraryPathError::Empty)));
        assert!(matches!(
            validate_library_dir(&dir.path().join("missing").display().to_string()),
            Err(LibraryPathError::NotFound(_))
        ));
        assert!(matches!(
            validate_library_dir(&dir.path().display().to_string()),
            Err(LibraryPathError::NoManifests(_))
        ));

        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            validate_library_dir(&file.display().to_string()),
            Err(LibraryPathError::NotADirectory(_))
        ));

        write_manifest(dir.path(), "440", "Team Fortress 2");
        let quoted = format!("\"{}\"", dir.path().display());
        let resolved = validate_library_dir(&quoted).unwrap();
        assert!(resolved.is_dir());
    }
}
