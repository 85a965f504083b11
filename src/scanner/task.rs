// src/scanner/task.rs
//
// Library scan
//
// RULES:
// - Hashing and probing happen outside transactions
// - Every file is written in its own transaction
// - A failing file is logged and counted; the scan goes on
// - A record is only moved when its old path no longer exists

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::db::connection::ConnectionPool;
use crate::db::transaction::{with_read_txn, with_txn};
use crate::domain::{Gallery, GalleryPartial, Image, ImagePartial, Scene, ScenePartial};
use crate::error::{AppError, AppResult};
use crate::repositories::{
    EntityQueryBuilder, GalleryQueryBuilder, ImageQueryBuilder, SceneQueryBuilder,
};
use crate::scanner::hashing::{oshash, sha256};
use crate::scanner::prober::MetadataProber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Image,
    Gallery,
}

/// What scanning one file did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Created,
    /// Known path with a refreshed modification time or hash
    Updated,
    /// Known content found at a new path
    Moved,
    /// Known content whose recorded file still exists
    Duplicate,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub duplicates: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Galleries linked to a scene of the same base name
    pub associated: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: ScanOutcome) {
        self.scanned += 1;
        match outcome {
            ScanOutcome::Created => self.created += 1,
            ScanOutcome::Updated => self.updated += 1,
            ScanOutcome::Moved => self.moved += 1,
            ScanOutcome::Duplicate => self.duplicates += 1,
            ScanOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Filesystem facts about one file
struct FileInfo {
    path: String,
    size: u64,
    /// Whole seconds
    mod_time: DateTime<Utc>,
}

impl FileInfo {
    fn read(path: &Path) -> AppResult<Self> {
        let metadata = std::fs::metadata(path)?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let mod_time = DateTime::from_timestamp(modified.timestamp(), 0).unwrap_or(modified);

        let path = path
            .to_str()
            .ok_or_else(|| AppError::Other(format!("Path is not UTF-8: {}", path.display())))?
            .to_string();

        Ok(Self {
            path,
            size: metadata.len(),
            mod_time,
        })
    }
}

pub struct ScanTask<'a> {
    config: &'a LibraryConfig,
    excludes: Vec<Regex>,
    prober: &'a dyn MetadataProber,
}

impl<'a> ScanTask<'a> {
    /// Exclusion patterns that fail to compile are logged and ignored
    pub fn new(config: &'a LibraryConfig, prober: &'a dyn MetadataProber) -> Self {
        let excludes = config
            .excludes
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            config,
            excludes,
            prober,
        }
    }

    pub fn classify(&self, path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let matches = |exts: &[String]| exts.iter().any(|e| e.eq_ignore_ascii_case(&ext));

        if matches(&self.config.gallery_extensions) {
            Some(FileKind::Gallery)
        } else if matches(&self.config.video_extensions) {
            Some(FileKind::Video)
        } else if matches(&self.config.image_extensions) {
            Some(FileKind::Image)
        } else {
            None
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.excludes.iter().any(|re| re.is_match(&path))
    }

    /// Every scannable file under the configured roots
    pub fn files(&self) -> Vec<(PathBuf, FileKind)> {
        let mut files = Vec::new();

        for root in &self.config.roots {
            if !root.is_dir() {
                log::warn!("Library root {} is not a directory", root.display());
                continue;
            }

            for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() || self.is_excluded(entry.path()) {
                    continue;
                }
                if let Some(kind) = self.classify(entry.path()) {
                    files.push((entry.into_path(), kind));
                }
            }
        }

        files
    }

    /// Scan every root, then link galleries to their scenes
    pub fn run(&self, pool: &ConnectionPool) -> AppResult<ScanSummary> {
        let files = self.files();
        log::info!("Scanning {} files", files.len());

        let mut summary = ScanSummary::default();
        let mut galleries = Vec::new();

        for (path, kind) in &files {
            match self.scan_file(pool, path, *kind) {
                Ok(outcome) => {
                    log::debug!("{}: {:?}", path.display(), outcome);
                    summary.record(outcome);
                }
                Err(e) => {
                    log::error!("Failed to scan {}: {}", path.display(), e);
                    summary.scanned += 1;
                    summary.failed += 1;
                }
            }
            if *kind == FileKind::Gallery {
                galleries.push(path.as_path());
            }
        }

        for path in galleries {
            match self.associate_gallery(pool, path) {
                Ok(true) => summary.associated += 1,
                Ok(false) => {}
                Err(e) => log::error!("Failed to associate gallery {}: {}", path.display(), e),
            }
        }

        log::info!("Scan finished: {:?}", summary);
        Ok(summary)
    }

    pub fn scan_file(&self, pool: &ConnectionPool, path: &Path, kind: FileKind) -> AppResult<ScanOutcome> {
        let info = FileInfo::read(path)?;
        match kind {
            FileKind::Video => self.scan_scene(pool, path, &info),
            FileKind::Image => self.scan_image(pool, path, &info),
            FileKind::Gallery => self.scan_gallery(pool, path, &info),
        }
    }

    // ========================================================================
    // SCENES
    // ========================================================================

    fn scan_scene(&self, pool: &ConnectionPool, path: &Path, info: &FileInfo) -> AppResult<ScanOutcome> {
        let existing = with_read_txn(pool, |conn| SceneQueryBuilder::new(conn).find_by_path(&info.path))?;
        if let Some(scene) = existing {
            return self.refresh_scene(pool, path, info, scene);
        }

        log::info!("{} not found. Calculating hashes...", info.path);
        let oshash = oshash(path)?;
        let checksum = sha256(path)?;

        let known = with_read_txn(pool, |conn| {
            let qb = SceneQueryBuilder::new(conn);
            match qb.find_by_checksum(&checksum)? {
                Some(scene) => Ok(Some(scene)),
                None => qb.find_by_oshash(&oshash),
            }
        })?;

        if let Some(scene) = known {
            if is_duplicate(&scene.path, &info.path) {
                return Ok(ScanOutcome::Duplicate);
            }
            with_txn(pool, |conn| {
                SceneQueryBuilder::new(conn).update(&ScenePartial {
                    id: scene.id,
                    path: Some(info.path.clone()),
                    file_mod_time: Some(Some(info.mod_time)),
                    ..Default::default()
                })
            })?;
            return Ok(ScanOutcome::Moved);
        }

        let mut scene = Scene::new(info.path.clone());
        scene.checksum = Some(checksum);
        scene.oshash = Some(oshash);
        scene.title = path.file_name().and_then(|n| n.to_str()).map(str::to_string);
        scene.size = Some(info.size.to_string());
        scene.file_mod_time = Some(info.mod_time);

        match self.prober.probe(path) {
            Ok(metadata) => metadata.apply_to(&mut scene),
            Err(e) => log::error!("Probing {} failed, recording without metadata: {}", info.path, e),
        }

        with_txn(pool, |conn| SceneQueryBuilder::new(conn).create(&scene))?;
        log::info!("Created scene for {}", info.path);
        Ok(ScanOutcome::Created)
    }

    /// Refresh the modification time and fill a missing oshash
    fn refresh_scene(
        &self,
        pool: &ConnectionPool,
        path: &Path,
        info: &FileInfo,
        scene: Scene,
    ) -> AppResult<ScanOutcome> {
        let mod_time_changed = scene.file_mod_time != Some(info.mod_time);

        let mut fill_oshash = None;
        if scene.oshash.is_none() {
            log::info!("Calculating oshash for existing file {}", info.path);
            let hash = oshash(path)?;
            let dupe = with_read_txn(pool, |conn| SceneQueryBuilder::new(conn).find_by_oshash(&hash))?;
            match dupe {
                Some(other) => log::error!(
                    "OSHash for file {} is the same as that of {}",
                    info.path,
                    other.path
                ),
                None => fill_oshash = Some(hash),
            }
        }

        if !mod_time_changed && fill_oshash.is_none() {
            return Ok(ScanOutcome::Unchanged);
        }

        with_txn(pool, |conn| {
            let qb = SceneQueryBuilder::new(conn);
            if mod_time_changed {
                qb.update_file_mod_time(scene.id, info.mod_time)?;
            }
            if let Some(hash) = &fill_oshash {
                qb.update(&ScenePartial {
                    id: scene.id,
                    oshash: Some(Some(hash.clone())),
                    ..Default::default()
                })?;
            }
            Ok(())
        })?;

        Ok(ScanOutcome::Updated)
    }

    // ========================================================================
    // IMAGES
    // ========================================================================

    fn scan_image(&self, pool: &ConnectionPool, path: &Path, info: &FileInfo) -> AppResult<ScanOutcome> {
        let existing = with_read_txn(pool, |conn| ImageQueryBuilder::new(conn).find_by_path(&info.path))?;
        if let Some(image) = existing {
            if image.file_mod_time == Some(info.mod_time) {
                return Ok(ScanOutcome::Unchanged);
            }
            with_txn(pool, |conn| {
                ImageQueryBuilder::new(conn).update_file_mod_time(image.id, info.mod_time)
            })?;
            return Ok(ScanOutcome::Updated);
        }

        log::info!("{} not found. Calculating checksum...", info.path);
        let checksum = sha256(path)?;

        with_txn(pool, |conn| {
            let qb = ImageQueryBuilder::new(conn);
            if let Some(image) = qb.find_by_checksum(&checksum)? {
                if is_duplicate(&image.path, &info.path) {
                    return Ok(ScanOutcome::Duplicate);
                }
                qb.update(&ImagePartial {
                    id: image.id,
                    path: Some(info.path.clone()),
                    file_mod_time: Some(Some(info.mod_time)),
                    ..Default::default()
                })?;
                return Ok(ScanOutcome::Moved);
            }

            let mut image = Image::new(info.path.clone(), checksum.clone());
            image.size = i64::try_from(info.size).ok();
            image.file_mod_time = Some(info.mod_time);
            qb.create(&image)?;
            Ok(ScanOutcome::Created)
        })
    }

    // ========================================================================
    // GALLERIES
    // ========================================================================

    fn scan_gallery(&self, pool: &ConnectionPool, path: &Path, info: &FileInfo) -> AppResult<ScanOutcome> {
        let existing =
            with_read_txn(pool, |conn| GalleryQueryBuilder::new(conn).find_by_path(&info.path))?;
        if let Some(gallery) = existing {
            if gallery.file_mod_time == Some(info.mod_time) {
                return Ok(ScanOutcome::Unchanged);
            }
            with_txn(pool, |conn| {
                GalleryQueryBuilder::new(conn).update_file_mod_time(gallery.id, info.mod_time)
            })?;
            return Ok(ScanOutcome::Updated);
        }

        log::info!("{} not found. Calculating checksum...", info.path);
        let checksum = sha256(path)?;

        with_txn(pool, |conn| {
            let qb = GalleryQueryBuilder::new(conn);
            if let Some(gallery) = qb.find_by_checksum(&checksum)? {
                let recorded = gallery.path.as_deref().unwrap_or_default();
                if !recorded.is_empty() && is_duplicate(recorded, &info.path) {
                    return Ok(ScanOutcome::Duplicate);
                }
                qb.update(&GalleryPartial {
                    id: gallery.id,
                    path: Some(Some(info.path.clone())),
                    zip: Some(true),
                    file_mod_time: Some(Some(info.mod_time)),
                    ..Default::default()
                })?;
                return Ok(ScanOutcome::Moved);
            }

            let mut gallery = Gallery::from_archive(info.path.clone(), checksum.clone());
            gallery.file_mod_time = Some(info.mod_time);
            qb.create(&gallery)?;
            Ok(ScanOutcome::Created)
        })
    }

    /// Link a gallery without scenes to the first video sharing its base name
    ///
    /// Returns whether a link was made.
    fn associate_gallery(&self, pool: &ConnectionPool, path: &Path) -> AppResult<bool> {
        let Some(base) = base_name(path) else {
            return Ok(false);
        };

        with_txn(pool, |conn| {
            let galleries = GalleryQueryBuilder::new(conn);
            let Some(gallery) = galleries.find_by_path(&path.to_string_lossy())? else {
                log::warn!("Gallery {} not found after scan", path.display());
                return Ok(false);
            };
            if !galleries.scene_ids(gallery.id)?.is_empty() {
                return Ok(false);
            }

            let scenes = SceneQueryBuilder::new(conn);
            for ext in &self.config.video_extensions {
                let candidate = format!("{}.{}", base, ext);
                if let Some(scene) = scenes.find_by_path(&candidate)? {
                    log::info!("Gallery {} is related to scene {}", path.display(), scene.id);
                    galleries.update_scenes(gallery.id, &[scene.id])?;
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

/// Known content at `recorded`; a live file there makes `found` a duplicate
fn is_duplicate(recorded: &str, found: &str) -> bool {
    if Path::new(recorded).exists() {
        log::info!("{} already exists. Duplicate of {}", found, recorded);
        true
    } else {
        log::info!("{} already exists. Updating path...", found);
        false
    }
}

/// Path without its final extension
fn base_name(path: &Path) -> Option<String> {
    let full = path.to_str()?;
    let ext = path.extension()?.to_str()?;
    Some(full[..full.len() - ext.len() - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::connection::{create_connection_pool, get_connection};
    use crate::db::migrations::initialize_database;
    use crate::scanner::prober::{MockMetadataProber, NullProber, VideoMetadata};
    use std::fs;

    struct Library {
        dir: tempfile::TempDir,
        pool: ConnectionPool,
        config: LibraryConfig,
    }

    fn library() -> Library {
        let dir = tempfile::tempdir().unwrap();
        let pool =
            create_connection_pool(&dir.path().join("scan.db"), &DatabaseConfig::default()).unwrap();
        initialize_database(&get_connection(&pool).unwrap()).unwrap();

        let root = dir.path().join("media");
        fs::create_dir_all(&root).unwrap();
        let config = LibraryConfig {
            roots: vec![root],
            ..Default::default()
        };
        Library { dir, pool, config }
    }

    impl Library {
        fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.path().join("media").join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, contents).unwrap();
            path
        }

        fn scenes(&self) -> Vec<Scene> {
            with_read_txn(&self.pool, |conn| SceneQueryBuilder::new(conn).all()).unwrap()
        }
    }

    fn probing(times: usize) -> MockMetadataProber {
        let mut prober = MockMetadataProber::new();
        prober.expect_probe().times(times).returning(|_| {
            Ok(VideoMetadata {
                duration: Some(12.5),
                width: Some(1920),
                height: Some(1080),
                ..Default::default()
            })
        });
        prober
    }

    #[test]
    fn test_classify_and_exclude() {
        let config = LibraryConfig {
            excludes: vec!["/tmp/".to_string(), "([".to_string()],
            ..Default::default()
        };
        let task = ScanTask::new(&config, &NullProber);

        assert_eq!(task.classify(Path::new("/a/b.MKV")), Some(FileKind::Video));
        assert_eq!(task.classify(Path::new("/a/b.jpg")), Some(FileKind::Image));
        assert_eq!(task.classify(Path::new("/a/b.zip")), Some(FileKind::Gallery));
        assert_eq!(task.classify(Path::new("/a/b.txt")), None);
        assert_eq!(task.classify(Path::new("/a/noext")), None);

        assert_eq!(task.excludes.len(), 1);
        assert!(task.is_excluded(Path::new("/tmp/x.mp4")));
    }

    #[test]
    fn test_scan_creates_records() {
        let lib = library();
        lib.write("clip.mp4", b"video bytes");
        lib.write("pics/a.jpg", b"image bytes");
        lib.write("set.zip", b"zip bytes");
        lib.write("notes.txt", b"ignored");

        let prober = probing(1);
        let summary = ScanTask::new(&lib.config, &prober).run(&lib.pool).unwrap();

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.created, 3);

        let scenes = lib.scenes();
        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        assert_eq!(scene.title.as_deref(), Some("clip.mp4"));
        assert_eq!(scene.duration, Some(12.5));
        assert_eq!(scene.height, Some(1080));
        assert_eq!(scene.size.as_deref(), Some("11"));
        assert_eq!(scene.oshash.as_ref().map(String::len), Some(16));
        assert!(scene.file_mod_time.is_some());
    }

    #[test]
    fn test_rescan_is_unchanged() {
        let lib = library();
        lib.write("clip.mp4", b"video bytes");
        lib.write("a.jpg", b"image bytes");

        let prober = probing(1);
        let task = ScanTask::new(&lib.config, &prober);
        task.run(&lib.pool).unwrap();
        let summary = task.run(&lib.pool).unwrap();

        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.created, 0);
    }

    #[test]
    fn test_moved_file_keeps_record() {
        let lib = library();
        let old = lib.write("old.mp4", b"same content");

        let prober = probing(1);
        let task = ScanTask::new(&lib.config, &prober);
        task.run(&lib.pool).unwrap();
        let id = lib.scenes()[0].id;

        let new = old.with_file_name("new.mp4");
        fs::rename(&old, &new).unwrap();
        let summary = task.run(&lib.pool).unwrap();

        assert_eq!(summary.moved, 1);
        let scenes = lib.scenes();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, id);
        assert_eq!(scenes[0].path, new.to_str().unwrap());
    }

    #[test]
    fn test_copy_is_duplicate() {
        let lib = library();
        lib.write("a.mp4", b"same content");
        lib.write("b.mp4", b"same content");

        let prober = probing(1);
        let summary = ScanTask::new(&lib.config, &prober).run(&lib.pool).unwrap();

        assert_eq!((summary.created, summary.duplicates), (1, 1));
        assert_eq!(lib.scenes().len(), 1);
    }

    #[test]
    fn test_probe_failure_still_records() {
        let lib = library();
        lib.write("broken.mp4", b"not really video");

        let mut prober = MockMetadataProber::new();
        prober
            .expect_probe()
            .returning(|_| Err(AppError::Other("no video stream".to_string())));
        let summary = ScanTask::new(&lib.config, &prober).run(&lib.pool).unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(lib.scenes()[0].duration, None);
    }

    #[test]
    fn test_failed_file_does_not_stop_scan() {
        let lib = library();
        lib.write("a_empty.mp4", b"");
        lib.write("b_good.mp4", b"content");

        let prober = probing(1);
        let summary = ScanTask::new(&lib.config, &prober).run(&lib.pool).unwrap();

        assert_eq!((summary.scanned, summary.failed, summary.created), (2, 1, 1));
    }

    #[test]
    fn test_gallery_associated_by_base_name() {
        let lib = library();
        let video = lib.write("set.one.mp4", b"video");
        let zip = lib.write("set.one.zip", b"zip");
        lib.write("other.zip", b"other zip");

        let summary = ScanTask::new(&lib.config, &NullProber).run(&lib.pool).unwrap();
        assert_eq!(summary.associated, 1);

        let (scene_ids, scene) = with_read_txn(&lib.pool, |conn| {
            let gallery = GalleryQueryBuilder::new(conn)
                .find_by_path(zip.to_str().unwrap())?
                .unwrap();
            let scene = SceneQueryBuilder::new(conn)
                .find_by_path(video.to_str().unwrap())?
                .unwrap();
            Ok((GalleryQueryBuilder::new(conn).scene_ids(gallery.id)?, scene))
        })
        .unwrap();
        assert_eq!(scene_ids, vec![scene.id]);

        // already linked galleries are left alone
        let again = ScanTask::new(&lib.config, &NullProber).run(&lib.pool).unwrap();
        assert_eq!(again.associated, 0);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/a/set.one.zip")).as_deref(), Some("/a/set.one"));
        assert_eq!(base_name(Path::new("/a/noext")), None);
    }
}
