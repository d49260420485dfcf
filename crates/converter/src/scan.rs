use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::batch::InputFile;

/// Whether `path` has one of `extensions` (without dot, compared case-insensitively)
pub fn is_video_file<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|known| known.as_ref().eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Expand user-supplied paths into the ordered list handed to the batch.
///
/// Files pass through in the order given. Directories contribute their files
/// sorted by name, one level deep unless `recursive`. No extension filtering
/// happens here; the batch decides what counts as video.
pub fn collect_inputs(paths: &[PathBuf], recursive: bool) -> Vec<InputFile> {
    let mut inputs = Vec::new();

    for path in paths {
        if !path.is_dir() {
            inputs.push(InputFile::new(path.clone()));
            continue;
        }

        info!("Scanning directory: {}", path.display());
        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(path)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name();

        let mut found = 0;
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            debug!("Found file: {}", entry.path().display());
            inputs.push(InputFile::new(entry.into_path()));
            found += 1;
        }

        info!("Finished scanning {}: {} files", path.display(), found);
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let exts = ["mp4", "mkv", "mpeg"];
        assert!(is_video_file(Path::new("/a/movie.mp4"), &exts));
        assert!(is_video_file(Path::new("/a/MOVIE.MKV"), &exts));
        assert!(is_video_file(Path::new("clip.Mpeg"), &exts));
        assert!(!is_video_file(Path::new("notes.txt"), &exts));
        assert!(!is_video_file(Path::new("mp4"), &exts));
        assert!(!is_video_file(Path::new("archive.mp4.gz"), &exts));
    }

    #[test]
    fn test_collect_keeps_file_order_and_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("season");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.mkv"), b"").unwrap();
        fs::write(sub.join("a.mp4"), b"").unwrap();
        let nested = sub.join("extras");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.avi"), b"").unwrap();

        let single = dir.path().join("z.mov");
        let inputs = collect_inputs(&[single.clone(), sub.clone()], false);
        let names: Vec<_> = inputs.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["z.mov", "a.mp4", "b.mkv"]);
        assert_eq!(inputs[0].path, single);

        let recursive = collect_inputs(&[sub], true);
        let names: Vec<_> = recursive.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mkv", "c.avi"]);
    }
}
