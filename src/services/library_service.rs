// src/services/library_service.rs
//
// Transactional API over the entity query builders
//
// RULES:
// - One transaction per public call
// - Reads use read transactions, writes use IMMEDIATE transactions
// - Composite writes share a single transaction
// - The service owns the pool; builders only ever see a borrowed connection

use rusqlite::Connection;

use crate::config::{AppConfig, LibraryConfig};
use crate::db::connection::{create_connection_pool, get_connection, ConnectionPool};
use crate::db::join_repository::{
    JoinRepository, JoinTable, GALLERIES_IMAGES, GALLERIES_TAGS, IMAGES_TAGS, MOVIES_SCENES,
    PERFORMERS_GALLERIES, PERFORMERS_IMAGES, PERFORMERS_SCENES, SCENES_GALLERIES, SCENES_TAGS,
};
use crate::db::migrations::{get_database_stats, initialize_database, DatabaseStats};
use crate::db::repository::Repository;
use crate::db::stash_id_repository::StashId;
use crate::db::transaction::{with_read_txn, with_txn};
use crate::domain::{
    Gallery, GalleryPartial, Image, ImagePartial, Movie, MoviePartial, MoviesScenes, Performer,
    PerformerPartial, Scene, SceneMarker, SceneMarkerPartial, ScenePartial, Studio, StudioPartial,
    Tag, TagPartial,
};
use crate::error::{AppError, AppResult};
use crate::query::find_filter::FindFilter;
use crate::scanner::{MetadataProber, ScanSummary, ScanTask};
use crate::repositories::{
    EntityQueryBuilder, GalleryFilter, GalleryQueryBuilder, ImageFilter, ImageQueryBuilder,
    MovieFilter, MovieQueryBuilder, PerformerFilter, PerformerQueryBuilder,
    SceneMarkerQueryBuilder, SceneFilter, SceneQueryBuilder, StudioFilter, StudioQueryBuilder,
    TagFilter, TagQueryBuilder,
};

// ============================================================================
// ASSOCIATIONS
// ============================================================================

/// A many-to-many relationship, named from the owner's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    ScenePerformers,
    SceneTags,
    SceneGalleries,
    /// Scene index is dropped on read and left unset on replace
    SceneMovies,
    ImagePerformers,
    ImageTags,
    ImageGalleries,
    GalleryPerformers,
    GalleryTags,
    GalleryImages,
    GalleryScenes,
}

impl AssociationKind {
    fn join_table(self) -> JoinTable {
        match self {
            AssociationKind::ScenePerformers => PERFORMERS_SCENES,
            AssociationKind::SceneTags => SCENES_TAGS,
            AssociationKind::SceneGalleries => SCENES_GALLERIES,
            AssociationKind::SceneMovies => MOVIES_SCENES,
            AssociationKind::ImagePerformers => PERFORMERS_IMAGES,
            AssociationKind::ImageTags => IMAGES_TAGS,
            AssociationKind::ImageGalleries => GALLERIES_IMAGES,
            AssociationKind::GalleryPerformers => PERFORMERS_GALLERIES,
            AssociationKind::GalleryTags => GALLERIES_TAGS,
            AssociationKind::GalleryImages => GALLERIES_IMAGES.reversed(),
            AssociationKind::GalleryScenes => SCENES_GALLERIES.reversed(),
        }
    }

    /// Table holding the owning rows
    fn owner_table(self) -> &'static str {
        match self {
            AssociationKind::ScenePerformers
            | AssociationKind::SceneTags
            | AssociationKind::SceneGalleries
            | AssociationKind::SceneMovies => "scenes",
            AssociationKind::ImagePerformers
            | AssociationKind::ImageTags
            | AssociationKind::ImageGalleries => "images",
            AssociationKind::GalleryPerformers
            | AssociationKind::GalleryTags
            | AssociationKind::GalleryImages
            | AssociationKind::GalleryScenes => "galleries",
        }
    }
}

/// Association sets to replace alongside a scene update
///
/// `None` leaves an association untouched; `Some(vec![])` clears it.
#[derive(Debug, Clone, Default)]
pub struct SceneAssociations {
    pub performer_ids: Option<Vec<i64>>,
    pub tag_ids: Option<Vec<i64>>,
    pub gallery_ids: Option<Vec<i64>>,
    pub movies: Option<Vec<MoviesScenes>>,
    pub stash_ids: Option<Vec<StashId>>,
    /// `Some(None)` removes the cover
    pub cover: Option<Option<Vec<u8>>>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct LibraryService {
    pool: ConnectionPool,
}

impl LibraryService {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open the configured database and bring its schema up to date
    pub fn open(config: &AppConfig) -> AppResult<Self> {
        let path = config.database_path()?;
        log::info!("Opening library database at {}", path.display());

        let pool = create_connection_pool(&path, &config.database)?;
        initialize_database(&*get_connection(&pool)?)?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn stats(&self) -> AppResult<DatabaseStats> {
        get_database_stats(&*get_connection(&self.pool)?)
    }

    /// Bring the store in step with the files under `library.roots`
    pub fn scan(&self, library: &LibraryConfig, prober: &dyn MetadataProber) -> AppResult<ScanSummary> {
        ScanTask::new(library, prober).run(&self.pool)
    }

    fn read<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        with_read_txn(&self.pool, f)
    }

    fn write<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        with_txn(&self.pool, f)
    }

    // ========================================================================
    // SCENES
    // ========================================================================

    pub fn find_scene(&self, id: i64) -> AppResult<Option<Scene>> {
        self.read(|conn| SceneQueryBuilder::new(conn).find(id))
    }

    pub fn find_scenes(&self, ids: &[i64]) -> AppResult<Vec<Scene>> {
        self.read(|conn| SceneQueryBuilder::new(conn).find_many(ids))
    }

    pub fn query_scenes(
        &self,
        filter: &SceneFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Scene>, i64)> {
        self.read(|conn| SceneQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_scene(&self, scene: &Scene) -> AppResult<Scene> {
        self.write(|conn| SceneQueryBuilder::new(conn).create(scene))
    }

    pub fn update_scene(&self, partial: &ScenePartial) -> AppResult<Scene> {
        self.write(|conn| SceneQueryBuilder::new(conn).update(partial))
    }

    pub fn update_scene_full(&self, scene: &Scene) -> AppResult<Scene> {
        self.write(|conn| SceneQueryBuilder::new(conn).update_full(scene))
    }

    pub fn destroy_scene(&self, id: i64) -> AppResult<()> {
        self.write(|conn| SceneQueryBuilder::new(conn).destroy(id))
    }

    /// Update a scene and replace the given association sets atomically
    ///
    /// Any failure leaves the scene and every association as they were.
    pub fn update_scene_with_associations(
        &self,
        partial: &ScenePartial,
        associations: &SceneAssociations,
    ) -> AppResult<Scene> {
        self.write(|conn| {
            let qb = SceneQueryBuilder::new(conn);
            let scene = qb.update(partial)?;

            if let Some(ids) = &associations.performer_ids {
                qb.update_performers(scene.id, ids)?;
            }
            if let Some(ids) = &associations.tag_ids {
                qb.update_tags(scene.id, ids)?;
            }
            if let Some(ids) = &associations.gallery_ids {
                qb.update_galleries(scene.id, ids)?;
            }
            if let Some(movies) = &associations.movies {
                qb.update_movies(scene.id, movies)?;
            }
            if let Some(stash_ids) = &associations.stash_ids {
                qb.update_stash_ids(scene.id, stash_ids)?;
            }
            match &associations.cover {
                Some(Some(image)) => qb.update_cover(scene.id, image)?,
                Some(None) => qb.destroy_cover(scene.id)?,
                None => {}
            }

            Ok(scene)
        })
    }

    pub fn increment_scene_o_counter(&self, id: i64) -> AppResult<i64> {
        self.write(|conn| SceneQueryBuilder::new(conn).increment_o_counter(id))
    }

    pub fn decrement_scene_o_counter(&self, id: i64) -> AppResult<i64> {
        self.write(|conn| SceneQueryBuilder::new(conn).decrement_o_counter(id))
    }

    pub fn reset_scene_o_counter(&self, id: i64) -> AppResult<i64> {
        self.write(|conn| SceneQueryBuilder::new(conn).reset_o_counter(id))
    }

    pub fn scene_wall(&self, q: Option<&str>) -> AppResult<Vec<Scene>> {
        self.read(|conn| SceneQueryBuilder::new(conn).wall(q))
    }

    // ========================================================================
    // SCENE MARKERS
    // ========================================================================

    pub fn find_scene_markers(&self, scene_id: i64) -> AppResult<Vec<SceneMarker>> {
        self.read(|conn| SceneMarkerQueryBuilder::new(conn).find_by_scene(scene_id))
    }

    pub fn create_scene_marker(&self, marker: &SceneMarker) -> AppResult<SceneMarker> {
        self.write(|conn| SceneMarkerQueryBuilder::new(conn).create(marker))
    }

    pub fn update_scene_marker(&self, partial: &SceneMarkerPartial) -> AppResult<SceneMarker> {
        self.write(|conn| SceneMarkerQueryBuilder::new(conn).update(partial))
    }

    pub fn destroy_scene_marker(&self, id: i64) -> AppResult<()> {
        self.write(|conn| SceneMarkerQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // IMAGES
    // ========================================================================

    pub fn find_image(&self, id: i64) -> AppResult<Option<Image>> {
        self.read(|conn| ImageQueryBuilder::new(conn).find(id))
    }

    pub fn query_images(
        &self,
        filter: &ImageFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Image>, i64)> {
        self.read(|conn| ImageQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_image(&self, image: &Image) -> AppResult<Image> {
        self.write(|conn| ImageQueryBuilder::new(conn).create(image))
    }

    pub fn update_image(&self, partial: &ImagePartial) -> AppResult<Image> {
        self.write(|conn| ImageQueryBuilder::new(conn).update(partial))
    }

    pub fn update_image_full(&self, image: &Image) -> AppResult<Image> {
        self.write(|conn| ImageQueryBuilder::new(conn).update_full(image))
    }

    pub fn destroy_image(&self, id: i64) -> AppResult<()> {
        self.write(|conn| ImageQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // GALLERIES
    // ========================================================================

    pub fn find_gallery(&self, id: i64) -> AppResult<Option<Gallery>> {
        self.read(|conn| GalleryQueryBuilder::new(conn).find(id))
    }

    pub fn query_galleries(
        &self,
        filter: &GalleryFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Gallery>, i64)> {
        self.read(|conn| GalleryQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_gallery(&self, gallery: &Gallery) -> AppResult<Gallery> {
        self.write(|conn| GalleryQueryBuilder::new(conn).create(gallery))
    }

    pub fn update_gallery(&self, partial: &GalleryPartial) -> AppResult<Gallery> {
        self.write(|conn| GalleryQueryBuilder::new(conn).update(partial))
    }

    pub fn update_gallery_full(&self, gallery: &Gallery) -> AppResult<Gallery> {
        self.write(|conn| GalleryQueryBuilder::new(conn).update_full(gallery))
    }

    pub fn destroy_gallery(&self, id: i64) -> AppResult<()> {
        self.write(|conn| GalleryQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // PERFORMERS
    // ========================================================================

    pub fn find_performer(&self, id: i64) -> AppResult<Option<Performer>> {
        self.read(|conn| PerformerQueryBuilder::new(conn).find(id))
    }

    pub fn query_performers(
        &self,
        filter: &PerformerFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Performer>, i64)> {
        self.read(|conn| PerformerQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_performer(&self, performer: &Performer) -> AppResult<Performer> {
        self.write(|conn| PerformerQueryBuilder::new(conn).create(performer))
    }

    pub fn update_performer(&self, partial: &PerformerPartial) -> AppResult<Performer> {
        self.write(|conn| PerformerQueryBuilder::new(conn).update(partial))
    }

    pub fn update_performer_full(&self, performer: &Performer) -> AppResult<Performer> {
        self.write(|conn| PerformerQueryBuilder::new(conn).update_full(performer))
    }

    pub fn destroy_performer(&self, id: i64) -> AppResult<()> {
        self.write(|conn| PerformerQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // STUDIOS
    // ========================================================================

    pub fn find_studio(&self, id: i64) -> AppResult<Option<Studio>> {
        self.read(|conn| StudioQueryBuilder::new(conn).find(id))
    }

    pub fn query_studios(
        &self,
        filter: &StudioFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Studio>, i64)> {
        self.read(|conn| StudioQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_studio(&self, studio: &Studio) -> AppResult<Studio> {
        self.write(|conn| StudioQueryBuilder::new(conn).create(studio))
    }

    pub fn update_studio(&self, partial: &StudioPartial) -> AppResult<Studio> {
        self.write(|conn| StudioQueryBuilder::new(conn).update(partial))
    }

    pub fn update_studio_full(&self, studio: &Studio) -> AppResult<Studio> {
        self.write(|conn| StudioQueryBuilder::new(conn).update_full(studio))
    }

    pub fn destroy_studio(&self, id: i64) -> AppResult<()> {
        self.write(|conn| StudioQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // TAGS
    // ========================================================================

    pub fn find_tag(&self, id: i64) -> AppResult<Option<Tag>> {
        self.read(|conn| TagQueryBuilder::new(conn).find(id))
    }

    pub fn query_tags(&self, filter: &TagFilter, find_filter: &FindFilter) -> AppResult<(Vec<Tag>, i64)> {
        self.read(|conn| TagQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_tag(&self, tag: &Tag) -> AppResult<Tag> {
        self.write(|conn| TagQueryBuilder::new(conn).create(tag))
    }

    pub fn update_tag(&self, partial: &TagPartial) -> AppResult<Tag> {
        self.write(|conn| TagQueryBuilder::new(conn).update(partial))
    }

    pub fn update_tag_full(&self, tag: &Tag) -> AppResult<Tag> {
        self.write(|conn| TagQueryBuilder::new(conn).update_full(tag))
    }

    pub fn destroy_tag(&self, id: i64) -> AppResult<()> {
        self.write(|conn| TagQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // MOVIES
    // ========================================================================

    pub fn find_movie(&self, id: i64) -> AppResult<Option<Movie>> {
        self.read(|conn| MovieQueryBuilder::new(conn).find(id))
    }

    pub fn query_movies(
        &self,
        filter: &MovieFilter,
        find_filter: &FindFilter,
    ) -> AppResult<(Vec<Movie>, i64)> {
        self.read(|conn| MovieQueryBuilder::new(conn).query(filter, find_filter))
    }

    pub fn create_movie(&self, movie: &Movie) -> AppResult<Movie> {
        self.write(|conn| MovieQueryBuilder::new(conn).create(movie))
    }

    pub fn update_movie(&self, partial: &MoviePartial) -> AppResult<Movie> {
        self.write(|conn| MovieQueryBuilder::new(conn).update(partial))
    }

    pub fn update_movie_full(&self, movie: &Movie) -> AppResult<Movie> {
        self.write(|conn| MovieQueryBuilder::new(conn).update_full(movie))
    }

    pub fn destroy_movie(&self, id: i64) -> AppResult<()> {
        self.write(|conn| MovieQueryBuilder::new(conn).destroy(id))
    }

    // ========================================================================
    // GENERIC ASSOCIATIONS
    // ========================================================================

    /// Ids associated with `owner_id`, in store order
    pub fn associated_ids(&self, owner_id: i64, kind: AssociationKind) -> AppResult<Vec<i64>> {
        self.read(|conn| {
            ensure_owner(conn, kind, owner_id)?;
            JoinRepository::new(conn, kind.join_table()).get_ids(owner_id)
        })
    }

    /// Make `ids` the exact association set of `owner_id`
    ///
    /// Duplicates in `ids` are stored as given.
    pub fn replace_associated_ids(
        &self,
        owner_id: i64,
        kind: AssociationKind,
        ids: &[i64],
    ) -> AppResult<()> {
        self.write(|conn| {
            ensure_owner(conn, kind, owner_id)?;
            log::debug!("Replacing {:?} of {} with {} ids", kind, owner_id, ids.len());
            JoinRepository::new(conn, kind.join_table()).replace(owner_id, ids)
        })
    }
}

fn ensure_owner(conn: &Connection, kind: AssociationKind, owner_id: i64) -> AppResult<()> {
    let table = kind.owner_table();
    if !Repository::new(conn, table, "id").exists(owner_id)? {
        return Err(AppError::not_found(table, "id", owner_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn hashed(path: &str) -> Scene {
        let mut scene = Scene::new(path);
        scene.oshash = Some(format!("os-{}", path));
        scene
    }

    fn service() -> (tempfile::TempDir, LibraryService) {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database: DatabaseConfig {
                path: Some(dir.path().join("library.db")),
                ..Default::default()
            },
            ..Default::default()
        };
        let service = LibraryService::open(&config).unwrap();
        (dir, service)
    }

    #[test]
    fn test_open_initializes_schema() {
        let (_dir, service) = service();
        let stats = service.stats().unwrap();
        assert_eq!(stats.row_count("scenes"), Some(0));
    }

    #[test]
    fn test_crud_round_trip() {
        let (_dir, service) = service();

        let tag = service.create_tag(&Tag::new("outdoor")).unwrap();
        let renamed = service
            .update_tag(&TagPartial {
                id: tag.id,
                name: Some("outside".to_string()),
            })
            .unwrap();
        assert_eq!(renamed.name, "outside");
        assert!(renamed.updated_at >= tag.updated_at);

        service.destroy_tag(tag.id).unwrap();
        assert_eq!(service.find_tag(tag.id).unwrap(), None);
        assert!(matches!(
            service.destroy_tag(tag.id),
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn test_replace_keeps_duplicates() {
        let (_dir, service) = service();
        let scene = service.create_scene(&hashed("/v/a.mp4")).unwrap();
        let t5 = service.create_tag(&Tag::new("five")).unwrap().id;
        let t7 = service.create_tag(&Tag::new("seven")).unwrap().id;

        service
            .replace_associated_ids(scene.id, AssociationKind::SceneTags, &[t5, t7, t5])
            .unwrap();
        let mut ids = service
            .associated_ids(scene.id, AssociationKind::SceneTags)
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec![t5, t5, t7]);

        service
            .replace_associated_ids(scene.id, AssociationKind::SceneTags, &[])
            .unwrap();
        assert!(service
            .associated_ids(scene.id, AssociationKind::SceneTags)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_associations_of_missing_owner() {
        let (_dir, service) = service();
        assert!(matches!(
            service.associated_ids(99, AssociationKind::GalleryImages),
            Err(AppError::NotFound { table: "galleries", .. })
        ));
    }

    #[test]
    fn test_composite_update_rolls_back_as_a_whole() {
        let (_dir, service) = service();
        let scene = service.create_scene(&hashed("/v/a.mp4")).unwrap();
        let tag = service.create_tag(&Tag::new("kept")).unwrap().id;
        service
            .replace_associated_ids(scene.id, AssociationKind::SceneTags, &[tag])
            .unwrap();

        // the title update succeeds, the performer id violates its foreign key
        let result = service.update_scene_with_associations(
            &ScenePartial {
                id: scene.id,
                title: Some(Some("New".to_string())),
                ..Default::default()
            },
            &SceneAssociations {
                tag_ids: Some(vec![]),
                performer_ids: Some(vec![12345]),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(AppError::ConstraintViolation(_))));
        assert_eq!(service.find_scene(scene.id).unwrap().unwrap().title, None);
        assert_eq!(
            service
                .associated_ids(scene.id, AssociationKind::SceneTags)
                .unwrap(),
            vec![tag]
        );
    }

    #[test]
    fn test_composite_update_commits() {
        let (_dir, service) = service();
        let scene = service.create_scene(&hashed("/v/a.mp4")).unwrap();
        let performer = service.create_performer(&Performer::new("P")).unwrap().id;

        let updated = service
            .update_scene_with_associations(
                &ScenePartial {
                    id: scene.id,
                    organized: Some(true),
                    ..Default::default()
                },
                &SceneAssociations {
                    performer_ids: Some(vec![performer]),
                    cover: Some(Some(vec![1, 2, 3])),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(updated.organized);
        assert_eq!(
            service
                .associated_ids(scene.id, AssociationKind::ScenePerformers)
                .unwrap(),
            vec![performer]
        );
    }

    #[test]
    fn test_scan_then_query() {
        let (dir, service) = service();
        let root = dir.path().join("media");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("beach.mp4"), b"waves").unwrap();

        let library = LibraryConfig {
            roots: vec![root],
            ..Default::default()
        };
        let summary = service
            .scan(&library, &crate::scanner::NullProber)
            .unwrap();
        assert_eq!(summary.created, 1);

        let find_filter = FindFilter {
            q: Some("beach".to_string()),
            ..Default::default()
        };
        let (scenes, count) = service
            .query_scenes(&SceneFilter::default(), &find_filter)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(scenes[0].title.as_deref(), Some("beach.mp4"));
    }
}
