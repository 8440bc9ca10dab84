use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rollcall_core::detector::DetectorError;
use rollcall_core::preprocess::load_image;
use rollcall_core::recognizer::RecognizerError;
use rollcall_core::{
    Detector, Embedding, Enrollment, EuclideanMatcher, ExtractError, FaceExtractor, FaceNetRecognizer,
    FaceOutcome, Recognition, Recognizer, YoloFaceDetector,
};
use rollcall_store::{
    AttendanceRow, EnrollmentError, EnrollmentStore, Ledger, LedgerError, LedgerSnapshot,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face pipeline error: {0}")]
    Extract(#[from] ExtractError),
    #[error("enrollment store error: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("cannot read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid student identity: {0}")]
    InvalidIdentity(String),
    #[error("student already enrolled: {0}")]
    DuplicateIdentity(String),
    #[error("enrollment needs exactly {expected} images, got {got}")]
    WrongImageCount { expected: usize, got: usize },
    #[error("no face detected in enrollment image {index} ({})", path.display())]
    NoFaceDetected { index: usize, path: PathBuf },
    #[error("no faces detected in this photo")]
    NoFacesDetected,
    #[error("no students enrolled")]
    NoStudentsEnrolled,
}

impl EngineError {
    /// The ledger is held open elsewhere; the caller should ask the user to close it and retry.
    pub fn is_storage_busy(&self) -> bool {
        matches!(self, EngineError::Ledger(e) if e.is_busy())
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of a successful enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentReport {
    pub identity: String,
    pub images: usize,
    /// Where the enrollment photos were copied.
    pub dataset_dir: PathBuf,
    /// False if the student's ledger column could not be added yet. The column
    /// is then added by the next recorded attendance, present or not.
    pub ledger_updated: bool,
}

/// Result of marking attendance from one photo.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub date: NaiveDate,
    pub section: String,
    pub face_count: usize,
    pub faces: Vec<FaceOutcome>,
    pub present: BTreeSet<String>,
    /// The row written to the ledger.
    pub row: AttendanceRow,
}

type Loader<D, R> = Box<dyn Fn() -> Result<FaceExtractor<D, R>, EngineError> + Send + Sync>;

/// Build the identity key `"Name (ID)"` from its parts.
pub fn identity_key(name: &str, id: &str) -> Result<String, EngineError> {
    let (name, id) = (name.trim(), id.trim());
    if name.is_empty() || id.is_empty() {
        return Err(EngineError::InvalidIdentity("name and ID are both required".into()));
    }
    let identity = format!("{name} ({id})");
    if identity.chars().any(|c| matches!(c, '/' | '\\') || c.is_control()) {
        return Err(EngineError::InvalidIdentity(identity));
    }
    Ok(identity)
}

/// The attendance service.
///
/// One face pipeline serves both enrollment and recognition. It is loaded
/// on first use and kept for the life of the engine.
pub struct Engine<D, R> {
    config: Config,
    extractor: Mutex<Option<FaceExtractor<D, R>>>,
    loader: Loader<D, R>,
    store: Mutex<EnrollmentStore>,
    ledger: Mutex<Ledger>,
    matcher: EuclideanMatcher,
}

impl Engine<YoloFaceDetector, FaceNetRecognizer> {
    /// Engine over the YOLO detector and FaceNet embedder named in `config`.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let detector_path = config.detector_model_path();
        let embedder_path = config.embedder_model_path();
        Self::open(config, move || {
            let detector = YoloFaceDetector::load(&detector_path)?;
            let recognizer = FaceNetRecognizer::load(&embedder_path)?;
            Ok(FaceExtractor::new(detector, recognizer))
        })
    }
}

impl<D: Detector, R: Recognizer> Engine<D, R> {
    /// Open the stores named in `config`. `loader` builds the face pipeline
    /// the first time it is needed.
    pub fn open(
        config: Config,
        loader: impl Fn() -> Result<FaceExtractor<D, R>, EngineError> + Send + Sync + 'static,
    ) -> Result<Self, EngineError> {
        if let Some(parent) = config.enrollment_db.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        let store = EnrollmentStore::open(&config.enrollment_db)?;
        let ledger = Ledger::open(&config.ledger_path).with_policy(config.record_policy);

        tracing::info!(
            enrollment_db = %config.enrollment_db.display(),
            ledger = %config.ledger_path.display(),
            threshold = config.match_threshold,
            policy = ?config.record_policy,
            "engine ready"
        );

        Ok(Self {
            config,
            extractor: Mutex::new(None),
            loader: Box::new(loader),
            store: Mutex::new(store),
            ledger: Mutex::new(ledger),
            matcher: EuclideanMatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the face pipeline has been loaded yet.
    pub fn models_loaded(&self) -> bool {
        lock(&self.extractor).is_some()
    }

    /// Run `f` against the face pipeline, loading it first if needed.
    fn with_extractor<T>(
        &self,
        f: impl FnOnce(&mut FaceExtractor<D, R>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut slot = lock(&self.extractor);
        let extractor = match &mut *slot {
            Some(extractor) => extractor,
            empty @ None => {
                let started = Instant::now();
                let loaded = (self.loader)()?;
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "face models loaded");
                empty.insert(loaded)
            }
        };
        f(extractor)
    }

    /// Enrolled identities, in enrollment order.
    pub fn enrolled(&self) -> Result<Vec<String>, EngineError> {
        Ok(lock(&self.store).identities()?)
    }

    /// Current ledger contents for the query layer.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, EngineError> {
        Ok(lock(&self.ledger).read_all()?)
    }

    /// Enroll a student from exactly `config.enrollment_images` photos.
    ///
    /// Duplicates are rejected before any image is read. Each photo must
    /// contain a face; the first photo without one aborts the enrollment and
    /// leaves nothing behind. The stored reference is the mean of the
    /// per-photo embeddings.
    pub fn enroll(&self, name: &str, id: &str, images: &[PathBuf]) -> Result<EnrollmentReport, EngineError> {
        let identity = identity_key(name, id)?;
        let dataset_dir = self.config.dataset_dir.join(&identity);

        let mut store = lock(&self.store);
        if store.contains(&identity)? || dataset_dir.exists() {
            tracing::warn!(identity = %identity, "enrollment rejected: already enrolled");
            return Err(EngineError::DuplicateIdentity(identity));
        }

        let expected = self.config.enrollment_images;
        if images.len() != expected {
            return Err(EngineError::WrongImageCount {
                expected,
                got: images.len(),
            });
        }

        tracing::info!(identity = %identity, images = images.len(), "enrolling");

        let embeddings = self.with_extractor(|extractor| {
            let mut embeddings = Vec::with_capacity(images.len());
            for (i, path) in images.iter().enumerate() {
                let index = i + 1;
                let image = read_image(path)?;
                match extractor.extract_primary(&image)? {
                    Some(embedding) => {
                        tracing::debug!(identity = %identity, image = index, "enrollment image embedded");
                        embeddings.push(embedding);
                    }
                    None => {
                        tracing::warn!(identity = %identity, image = index, path = %path.display(), "no face in enrollment image");
                        return Err(EngineError::NoFaceDetected {
                            index,
                            path: path.clone(),
                        });
                    }
                }
            }
            Ok(embeddings)
        })?;

        let reference = Embedding::mean(&embeddings).ok_or(EngineError::WrongImageCount {
            expected,
            got: embeddings.len(),
        })?;

        copy_photos(&dataset_dir, images)?;

        let enrollment = Enrollment {
            identity: identity.clone(),
            references: vec![reference],
            created_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = store.insert(&enrollment) {
            remove_dir(&dataset_dir);
            return Err(e.into());
        }
        drop(store);

        let ledger_updated = match lock(&self.ledger).ensure_schema(&identity) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "enrolled, but ledger column not added");
                false
            }
        };

        tracing::info!(identity = %identity, "enrollment complete");
        Ok(EnrollmentReport {
            identity,
            images: images.len(),
            dataset_dir,
            ledger_updated,
        })
    }

    /// Detect and match every face in the photo at `image_path`.
    pub fn recognize(&self, image_path: &Path) -> Result<Recognition, EngineError> {
        let gallery = self.gallery()?;
        if gallery.is_empty() {
            return Err(EngineError::NoStudentsEnrolled);
        }

        let image = read_image(image_path)?;
        let threshold = self.config.match_threshold;
        let recognition = self.with_extractor(|extractor| {
            Ok(extractor.recognize(&image, &gallery, &self.matcher, threshold)?)
        })?;

        if recognition.face_count() == 0 {
            tracing::info!(path = %image_path.display(), "no faces detected");
            return Err(EngineError::NoFacesDetected);
        }
        Ok(recognition)
    }

    /// Write one attendance row marking exactly `present` as present.
    ///
    /// Every enrolled student gets a ledger column first, so a student whose
    /// column could not be added at enrollment is still counted absent.
    pub fn record(
        &self,
        date: NaiveDate,
        section: &str,
        present: &BTreeSet<String>,
    ) -> Result<AttendanceRow, EngineError> {
        let roster = self.enrolled()?;
        Ok(lock(&self.ledger).record_with_roster(date, section, &roster, present)?)
    }

    /// Recognize the faces in a class photo and record who was there.
    ///
    /// Nothing is written when the photo has no faces.
    pub fn mark_attendance(
        &self,
        image_path: &Path,
        section: &str,
        date: NaiveDate,
    ) -> Result<AttendanceReport, EngineError> {
        let recognition = self.recognize(image_path)?;
        let present = recognition.present();
        let row = self.record(date, section, &present)?;

        tracing::info!(
            faces = recognition.face_count(),
            present = present.len(),
            section = %row.section,
            date = %date,
            "attendance marked"
        );

        Ok(AttendanceReport {
            date,
            section: row.section.clone(),
            face_count: recognition.face_count(),
            faces: recognition.faces,
            present,
            row,
        })
    }

    /// Enrollments to match against. A malformed store counts as empty.
    fn gallery(&self) -> Result<Vec<Enrollment>, EngineError> {
        match lock(&self.store).load() {
            Ok(gallery) => Ok(gallery),
            Err(e @ EnrollmentError::MalformedRecord { .. }) => {
                tracing::warn!(error = %e, "enrollment store unusable; treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_image(path: &Path) -> Result<image::RgbImage, EngineError> {
    load_image(path).map_err(|source| EngineError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy enrollment photos into `dir` as `1.<ext>`, `2.<ext>`, ...
/// On failure the directory is removed again.
fn copy_photos(dir: &Path, images: &[PathBuf]) -> Result<(), EngineError> {
    fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
    for (i, src) in images.iter().enumerate() {
        let ext = src.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
        let dest = dir.join(format!("{}.{ext}", i + 1));
        if let Err(e) = fs::copy(src, &dest) {
            remove_dir(dir);
            return Err(EngineError::io(src, e));
        }
    }
    Ok(())
}

fn remove_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to roll back enrollment photos");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rollcall_core::preprocess::ChannelOrder;
    use rollcall_core::{BoundingBox, FaceStatus};
    use rollcall_store::query;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// One face per 40-pixel-wide column that is not black.
    struct StripeDetector;

    impl Detector for StripeDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            let mut faces = Vec::new();
            for x in (0..image.width()).step_by(40) {
                if image.get_pixel(x + 20, 20).0 != [0, 0, 0] {
                    faces.push(BoundingBox {
                        x: x as f32 + 5.0,
                        y: 5.0,
                        width: 30.0,
                        height: 30.0,
                        confidence: 0.9,
                    });
                }
            }
            Ok(faces)
        }
    }

    /// Embeds a crop as its mean RGB color scaled to [0, 1].
    struct ColorRecognizer;

    impl Recognizer for ColorRecognizer {
        fn channel_order(&self) -> ChannelOrder {
            ChannelOrder::Rgb
        }

        fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError> {
            let n = (face.width() * face.height()) as f32;
            let mut sum = [0.0f32; 3];
            for p in face.pixels() {
                for c in 0..3 {
                    sum[c] += p.0[c] as f32;
                }
            }
            Ok(Embedding::new(sum.iter().map(|s| s / n / 255.0).collect()))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        engine: Engine<StripeDetector, ColorRecognizer>,
        loads: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::in_dir(dir.path().join("data"));
        config.enrollment_images = 3;
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let engine = Engine::open(config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(FaceExtractor::new(StripeDetector, ColorRecognizer))
        })
        .unwrap();
        Fixture { dir, engine, loads }
    }

    /// A 40-pixel-wide stripe per color; black stripes hold no face.
    fn write_photo(dir: &Path, name: &str, stripes: &[[u8; 3]]) -> PathBuf {
        let image = RgbImage::from_fn(40 * stripes.len() as u32, 40, |x, _| Rgb(stripes[(x / 40) as usize]));
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];
    const BLUE: [u8; 3] = [0, 0, 255];
    const BLACK: [u8; 3] = [0, 0, 0];

    fn photos(f: &Fixture, prefix: &str, colors: &[[u8; 3]]) -> Vec<PathBuf> {
        colors
            .iter()
            .enumerate()
            .map(|(i, c)| write_photo(f.dir.path(), &format!("{prefix}-{i}.png"), &[*c]))
            .collect()
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key("  Ada Lovelace ", " 100 ").unwrap(), "Ada Lovelace (100)");
        assert!(matches!(identity_key("", "1"), Err(EngineError::InvalidIdentity(_))));
        assert!(matches!(identity_key("Ada", "  "), Err(EngineError::InvalidIdentity(_))));
        assert!(matches!(identity_key("../etc", "1"), Err(EngineError::InvalidIdentity(_))));
    }

    #[test]
    fn test_enroll_stores_mean_embedding() {
        let f = fixture();
        let images = photos(&f, "ada", &[[255, 0, 0], [255, 0, 0], [0, 0, 255]]);
        let report = f.engine.enroll("Ada", "1", &images).unwrap();
        assert_eq!(report.identity, "Ada (1)");
        assert!(report.ledger_updated);

        let gallery = lock(&f.engine.store).load().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].identity, "Ada (1)");
        assert_eq!(gallery[0].references.len(), 1);
        let values = &gallery[0].references[0].values;
        let expected = [2.0 / 3.0, 0.0, 1.0 / 3.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-4, "{values:?}");
        }

        let copied: Vec<_> = fs::read_dir(&report.dataset_dir).unwrap().collect();
        assert_eq!(copied.len(), 3);
        assert!(report.dataset_dir.join("1.png").exists());

        let snapshot = f.engine.snapshot().unwrap();
        assert_eq!(snapshot.students(), &["Ada (1)".to_string()]);
    }

    #[test]
    fn test_enroll_no_face_rolls_back() {
        let f = fixture();
        let images = photos(&f, "bob", &[GREEN, GREEN, BLACK]);
        let err = f.engine.enroll("Bob", "2", &images).unwrap_err();
        assert!(matches!(err, EngineError::NoFaceDetected { index: 3, .. }), "{err:?}");

        assert!(f.engine.enrolled().unwrap().is_empty());
        assert!(!f.engine.config().dataset_dir.join("Bob (2)").exists());
        assert!(!f.engine.config().ledger_path.exists());
    }

    #[test]
    fn test_enroll_duplicate_rejected_before_processing() {
        let f = fixture();
        f.engine.enroll("Ada", "1", &photos(&f, "a", &[RED, RED, RED])).unwrap();

        // Wrong count would fail too; the duplicate check comes first.
        let err = f.engine.enroll("Ada", "1", &[]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIdentity(ref id) if id == "Ada (1)"), "{err:?}");
        assert_eq!(f.engine.enrolled().unwrap().len(), 1);
    }

    #[test]
    fn test_enroll_duplicate_dataset_dir() {
        let f = fixture();
        fs::create_dir_all(f.engine.config().dataset_dir.join("Cy (3)")).unwrap();
        let err = f.engine.enroll("Cy", "3", &photos(&f, "c", &[RED, RED, RED])).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIdentity(_)));
    }

    #[test]
    fn test_enroll_wrong_image_count() {
        let f = fixture();
        let err = f.engine.enroll("Dee", "4", &photos(&f, "d", &[RED, RED])).unwrap_err();
        assert!(matches!(err, EngineError::WrongImageCount { expected: 3, got: 2 }));
        assert_eq!(f.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mark_attendance() {
        let f = fixture();
        f.engine.enroll("Red", "1", &photos(&f, "r", &[RED, RED, RED])).unwrap();
        f.engine.enroll("Green", "2", &photos(&f, "g", &[GREEN, GREEN, GREEN])).unwrap();
        f.engine.enroll("Blue", "3", &photos(&f, "b", &[BLUE, BLUE, BLUE])).unwrap();

        let class = write_photo(f.dir.path(), "class.png", &[RED, BLACK, [128, 128, 128], BLUE]);
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let report = f.engine.mark_attendance(&class, "BSCS 5A", day).unwrap();

        assert_eq!(report.face_count, 3);
        assert_eq!(report.present.iter().collect::<Vec<_>>(), vec!["Blue (3)", "Red (1)"]);
        assert!(matches!(report.faces[1].status, FaceStatus::Unknown { .. }));

        let snapshot = f.engine.snapshot().unwrap();
        assert_eq!(snapshot.table(), vec![vec!["2024-01-10", "BSCS 5A", "P", "A", "P"]]);
        assert!((query::rate(&snapshot, "Red (1)") - 100.0).abs() < 1e-9);
        assert_eq!(query::rate(&snapshot, "Green (2)"), 0.0);

        // Models are loaded once and shared across enrollment and recognition.
        assert_eq!(f.loads.load(Ordering::SeqCst), 1);
        assert!(f.engine.models_loaded());
    }

    #[test]
    fn test_student_without_column_still_counted_absent() {
        let f = fixture();
        let ledger_path = f.engine.config().ledger_path.clone();
        let moved = f.dir.path().join("moved.csv");
        f.engine.enroll("Red", "1", &photos(&f, "r", &[RED, RED, RED])).unwrap();

        // A directory in the ledger's place makes the column update fail.
        fs::rename(&ledger_path, &moved).unwrap();
        fs::create_dir(&ledger_path).unwrap();
        let report = f.engine.enroll("Green", "2", &photos(&f, "g", &[GREEN, GREEN, GREEN])).unwrap();
        assert!(!report.ledger_updated);
        fs::remove_dir(&ledger_path).unwrap();
        fs::rename(&moved, &ledger_path).unwrap();

        f.engine.enroll("Blue", "3", &photos(&f, "b", &[BLUE, BLUE, BLUE])).unwrap();
        assert!(!f.engine.snapshot().unwrap().contains_student("Green (2)"));

        let class = write_photo(f.dir.path(), "class.png", &[RED]);
        for day in 10..=12 {
            let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
            f.engine.mark_attendance(&class, "X", date).unwrap();
        }

        let snapshot = f.engine.snapshot().unwrap();
        assert!(snapshot.contains_student("Green (2)"));
        assert_eq!(query::rate(&snapshot, "Green (2)"), 0.0);
        let low: Vec<_> = query::low_rate(&snapshot, 75.0).into_iter().map(|r| r.identity).collect();
        assert_eq!(low, vec!["Blue (3)", "Green (2)"]);
    }

    #[test]
    fn test_mark_attendance_no_faces_writes_nothing() {
        let f = fixture();
        f.engine.enroll("Red", "1", &photos(&f, "r", &[RED, RED, RED])).unwrap();
        let before = fs::read_to_string(&f.engine.config().ledger_path).unwrap();

        let empty = write_photo(f.dir.path(), "empty.png", &[BLACK, BLACK]);
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let err = f.engine.mark_attendance(&empty, "X", day).unwrap_err();
        assert!(matches!(err, EngineError::NoFacesDetected));
        assert_eq!(fs::read_to_string(&f.engine.config().ledger_path).unwrap(), before);
    }

    #[test]
    fn test_mark_attendance_without_students() {
        let f = fixture();
        let class = write_photo(f.dir.path(), "class.png", &[RED]);
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let err = f.engine.mark_attendance(&class, "X", day).unwrap_err();
        assert!(matches!(err, EngineError::NoStudentsEnrolled));
        assert_eq!(f.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_store_counts_as_empty() {
        let f = fixture();
        let images = photos(&f, "r", &[RED, RED, RED]);
        f.engine.enroll("Red", "1", &images).unwrap();
        // Corrupt the stored vector so it no longer decodes.
        {
            let conn = rusqlite_conn(&f);
            conn.execute("UPDATE reference_embeddings SET vector = x'00'", []).unwrap();
        }
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let err = f.engine.mark_attendance(&images[0], "X", day).unwrap_err();
        assert!(matches!(err, EngineError::NoStudentsEnrolled), "{err:?}");
    }

    fn rusqlite_conn(f: &Fixture) -> rusqlite::Connection {
        rusqlite::Connection::open(&f.engine.config().enrollment_db).unwrap()
    }

    #[test]
    fn test_storage_busy_classification() {
        let busy = EngineError::Ledger(LedgerError::StorageBusy {
            path: "a.csv".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert!(busy.is_storage_busy());
        assert!(!EngineError::NoStudentsEnrolled.is_storage_busy());
    }
}
