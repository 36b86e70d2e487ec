use std::path::Path;
use walkdir::WalkDir;

use crate::library::catalog::{MediaLayout, Track};

/// Scanner for finding stem folders under the media root
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Return every directory below the layout root that holds all four stems.
    /// The folder name becomes the track id; results are sorted by id.
    pub fn scan(layout: &MediaLayout) -> Result<Vec<Track>, anyhow::Error> {
        let root: &Path = &layout.root;
        if !root.is_dir() {
            anyhow::bail!("Media root {:?} is not a directory", root);
        }

        let mut tracks = Vec::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            // Skip plain files
            if !path.is_dir() {
                continue;
            }

            if !layout.is_complete(path) {
                log::debug!("[Library] Skipping incomplete stem folder {:?}", path);
                continue;
            }

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                tracks.push(Track::new(name));
            }
        }

        tracks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::stem::Stem;
    use std::fs;

    fn write_stems(dir: &Path, stems: &[Stem]) {
        fs::create_dir_all(dir).unwrap();
        for stem in stems {
            fs::write(dir.join(format!("{}.m4a", stem.name())), b"").unwrap();
        }
    }

    #[test]
    fn test_scan_finds_complete_folders_only() {
        let tmp = tempfile::tempdir().unwrap();
        write_stems(&tmp.path().join("Zebra_Song"), &Stem::ALL);
        write_stems(&tmp.path().join("Belief"), &Stem::ALL);
        write_stems(&tmp.path().join("Half_Done"), &[Stem::Vocals, Stem::Bass]);
        fs::write(tmp.path().join("click.m4a"), b"").unwrap();

        let layout = MediaLayout::new(tmp.path(), "m4a");
        let tracks = DirectoryScanner::scan(&layout).unwrap();
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["Belief", "Zebra_Song"]);
        assert_eq!(tracks[1].title, "Zebra Song");
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = MediaLayout::new(tmp.path().join("nope"), "m4a");
        assert!(DirectoryScanner::scan(&layout).is_err());
    }
}
