// View-set discovery.
//
// Expected layout:
//
//   <data_dir>/<dataset>/<subdir>/<session>-View<view>-Part<part>.mp4
//
// e.g. `multisensor_home1/01/00-View3-Part1.mp4`. A view set is one
// (session, part) pair for which every view 1..=view_count exists on disk;
// anything less is dropped without error.

use crate::config::Config;
use crate::error::DiscoveryError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// One recording segment: the per-camera videos of a session part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSet {
    pub dataset: String,
    pub subdirectory: String,
    /// Kept exactly as spelled in the file names (`"00"`, not `"0"`).
    pub session_id: String,
    pub part_number: u32,
    /// One path per view, View1 first.
    pub views: Vec<PathBuf>,
}

impl ViewSet {
    /// `{dataset}_{subdirectory}-{session_id}-Part{part_number}`
    pub fn task_name(&self) -> String {
        task_name(
            &self.dataset,
            &self.subdirectory,
            &self.session_id,
            self.part_number,
        )
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }
}

/// Task name for a view set; see [`ViewSet::task_name`].
pub fn task_name(dataset: &str, subdirectory: &str, session_id: &str, part_number: u32) -> String {
    format!("{dataset}_{subdirectory}-{session_id}-Part{part_number}")
}

/// Fields pulled out of a matching video file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFileName {
    pub session_id: String,
    pub view_index: u32,
    pub part_number: u32,
}

fn view_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)-View(\d+)-Part(\d+)\.mp4$").expect("view file pattern is valid")
    })
}

/// Parse `<session>-View<view>-Part<part>.mp4` (case-insensitive).
///
/// Returns `None` for names that do not follow the scheme, including ones
/// whose numbers do not fit in a `u32`.
pub fn parse_view_file_name(name: &str) -> Option<ViewFileName> {
    let caps = view_file_pattern().captures(name)?;
    Some(ViewFileName {
        session_id: caps[1].to_string(),
        view_index: caps[2].parse().ok()?,
        part_number: caps[3].parse().ok()?,
    })
}

/// Why a dataset or subdirectory contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    DatasetNotFound(PathBuf),
    NoSubdirs(PathBuf),
    SubdirNotFound(PathBuf),
    NoVideos(PathBuf),
    /// Exists but could not be listed (permissions, I/O error).
    Unreadable(PathBuf),
}

/// Number of complete view sets found in one subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdirCount {
    pub dataset: String,
    pub subdirectory: String,
    pub sets: usize,
}

/// Result of a discovery run: the ordered view sets plus what was skipped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub view_sets: Vec<ViewSet>,
    pub counts: Vec<SubdirCount>,
    pub skipped: Vec<Skip>,
}

/// Immediate child directories of `dataset_dir` whose names are all digits,
/// sorted by name. A missing directory yields an empty list.
pub fn discover_subdirs(dataset_dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    if !dataset_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut subdirs = Vec::new();
    for entry in list_dir(dataset_dir)? {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                subdirs.push(name.to_string());
            }
        }
    }
    Ok(subdirs)
}

/// Find every complete view set under `config.data_dir`.
///
/// Output order is dataset (as configured), then subdirectory (as configured,
/// or ascending when auto-detected), then session id (lexicographic) and
/// part number (numeric).
pub fn discover_view_sets(config: &Config) -> Result<Discovery, DiscoveryError> {
    if !config.data_dir.is_dir() {
        return Err(DiscoveryError::DataDirNotFound(config.data_dir.clone()));
    }

    let mut discovery = Discovery::default();

    for dataset in &config.datasets {
        let dataset_dir = config.data_dir.join(dataset);
        if !dataset_dir.is_dir() {
            warn!("[SKIP] Dataset not found: {}", dataset_dir.display());
            discovery.skipped.push(Skip::DatasetNotFound(dataset_dir));
            continue;
        }

        let subdirs = match &config.subdirs {
            Some(explicit) if !explicit.is_empty() => explicit.clone(),
            _ => match discover_subdirs(&dataset_dir) {
                Ok(found) => found,
                Err(e) => {
                    warn!("[SKIP] {e}");
                    discovery.skipped.push(Skip::Unreadable(dataset_dir));
                    continue;
                }
            },
        };
        if subdirs.is_empty() {
            warn!("[SKIP] No subdirs found in: {}", dataset_dir.display());
            discovery.skipped.push(Skip::NoSubdirs(dataset_dir));
            continue;
        }

        info!("Dataset: {dataset}");
        info!("Subdirs: {}", subdirs.join(", "));

        for subdir in &subdirs {
            let subdir_path = dataset_dir.join(subdir);
            if !subdir_path.is_dir() {
                warn!("[SKIP] Subdir not found: {}", subdir_path.display());
                discovery.skipped.push(Skip::SubdirNotFound(subdir_path));
                continue;
            }

            let sets = match scan_subdir(&subdir_path, dataset, subdir, config) {
                Ok(Some(sets)) => sets,
                Ok(None) => {
                    warn!("[SKIP] No mp4 files in: {}", subdir_path.display());
                    discovery.skipped.push(Skip::NoVideos(subdir_path));
                    continue;
                }
                Err(e) => {
                    warn!("[SKIP] {e}");
                    discovery.skipped.push(Skip::Unreadable(subdir_path));
                    continue;
                }
            };

            info!("  {subdir}: {} sets found", sets.len());
            discovery.counts.push(SubdirCount {
                dataset: dataset.clone(),
                subdirectory: subdir.clone(),
                sets: sets.len(),
            });
            discovery.view_sets.extend(sets);
        }
    }

    Ok(discovery)
}

/// Complete view sets of one subdirectory, or `None` if it holds no mp4 at all.
fn scan_subdir(
    dir: &Path,
    dataset: &str,
    subdir: &str,
    config: &Config,
) -> Result<Option<Vec<ViewSet>>, DiscoveryError> {
    // (session, part) -> view index -> path
    let mut groups: BTreeMap<(String, u32), BTreeMap<u32, PathBuf>> = BTreeMap::new();
    let mut saw_video = false;

    for entry in list_dir(dir)? {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
        {
            saw_video = true;
        }
        let Some(parsed) = entry.file_name().to_str().and_then(parse_view_file_name) else {
            continue;
        };
        groups
            .entry((parsed.session_id, parsed.part_number))
            .or_default()
            .entry(parsed.view_index)
            .or_insert_with(|| path.to_path_buf());
    }

    if !saw_video {
        return Ok(None);
    }

    let sets = groups
        .into_iter()
        .filter(|((session_id, _), _)| session_selected(config.sessions.as_ref(), session_id))
        .filter_map(|((session_id, part_number), views)| {
            let ordered: Option<Vec<PathBuf>> = (1..=config.view_count)
                .map(|view| views.get(&view).cloned())
                .collect();
            match ordered {
                Some(views) => Some(ViewSet {
                    dataset: dataset.to_string(),
                    subdirectory: subdir.to_string(),
                    session_id,
                    part_number,
                    views,
                }),
                None => {
                    debug!(
                        "Incomplete view set {} (have views {:?})",
                        task_name(dataset, subdir, &session_id, part_number),
                        views.keys().collect::<Vec<_>>()
                    );
                    None
                }
            }
        })
        .collect();

    Ok(Some(sets))
}

fn session_selected(filter: Option<&BTreeSet<String>>, session_id: &str) -> bool {
    filter.map_or(true, |sessions| sessions.contains(session_id))
}

/// Direct children of `dir`, sorted by name. Failing to open `dir` itself is
/// an error; a bad individual entry (e.g. dangling symlink) is logged and
/// skipped.
fn list_dir(dir: &Path) -> Result<Vec<DirEntry>, DiscoveryError> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(source) if source.depth() == 0 => {
                return Err(DiscoveryError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(e) => warn!("Error accessing entry in {}: {}", dir.display(), e),
        }
    }
    Ok(entries)
}
