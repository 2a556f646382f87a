//! Build / load / query / free integration tests.
//!
//! Failure paths run against a counting backend that wraps the exact backend,
//! tracks live spaces and indexes, and can fail at any lifecycle step.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use knn_index::backend::ExactBackend;
use knn_index::{
    AnyParams, Backend, BackendKind, BuildParameters, Dataset, EncodedVector, ErrorKind,
    IndexManifest, KnnEngine, KnnError, KnnQuery, MetricSpace, NativeIndex, QueryParameters,
    SpaceType, TopKQueue,
};

// ===== Counting backend =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Nothing,
    CreateSpace,
    CreateIndex,
    Construct,
    Save,
    Load,
    QueryParams,
    /// Index reports one vector fewer than it was given
    ShortCount,
}

#[derive(Default)]
struct Counters {
    spaces_created: AtomicUsize,
    live_spaces: AtomicUsize,
    live_indexes: AtomicUsize,
    /// Indexes dropped after every space was already gone
    order_violations: AtomicUsize,
}

impl Counters {
    fn live(&self) -> (usize, usize) {
        (
            self.live_spaces.load(Ordering::SeqCst),
            self.live_indexes.load(Ordering::SeqCst),
        )
    }
}

struct CountingBackend {
    inner: ExactBackend,
    fail_at: FailAt,
    counters: Arc<Counters>,
}

impl CountingBackend {
    fn new(fail_at: FailAt) -> (Arc<Self>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let backend = Arc::new(Self {
            inner: ExactBackend,
            fail_at,
            counters: counters.clone(),
        });
        (backend, counters)
    }
}

fn injected(step: &str) -> KnnError {
    KnnError::Backend(format!("injected failure at {}", step))
}

impl Backend for CountingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn create_space(&self, space_type: SpaceType) -> Result<Box<dyn MetricSpace>, KnnError> {
        if self.fail_at == FailAt::CreateSpace {
            return Err(injected("create_space"));
        }
        let inner = self.inner.create_space(space_type)?;
        self.counters.spaces_created.fetch_add(1, Ordering::SeqCst);
        self.counters.live_spaces.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedSpace {
            inner,
            counters: self.counters.clone(),
        }))
    }

    fn create_index(&self, space: &dyn MetricSpace) -> Result<Box<dyn NativeIndex>, KnnError> {
        if self.fail_at == FailAt::CreateIndex {
            return Err(injected("create_index"));
        }
        let inner = self.inner.create_index(space)?;
        self.counters.live_indexes.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedIndex {
            inner,
            fail_at: self.fail_at,
            counters: self.counters.clone(),
        }))
    }
}

struct CountedSpace {
    inner: Box<dyn MetricSpace>,
    counters: Arc<Counters>,
}

impl MetricSpace for CountedSpace {
    fn space_type(&self) -> SpaceType {
        self.inner.space_type()
    }

    fn distance(&self, a: &EncodedVector, b: &EncodedVector) -> f32 {
        self.inner.distance(a, b)
    }
}

impl Drop for CountedSpace {
    fn drop(&mut self) {
        self.counters.live_spaces.fetch_sub(1, Ordering::SeqCst);
    }
}

struct CountedIndex {
    inner: Box<dyn NativeIndex>,
    fail_at: FailAt,
    counters: Arc<Counters>,
}

impl NativeIndex for CountedIndex {
    fn create_index(
        &mut self,
        space: &dyn MetricSpace,
        dataset: &Dataset,
        params: &AnyParams,
    ) -> Result<(), KnnError> {
        if self.fail_at == FailAt::Construct {
            return Err(injected("construct"));
        }
        self.inner.create_index(space, dataset, params)
    }

    fn save_index(&self, path: &Path) -> Result<(), KnnError> {
        if self.fail_at == FailAt::Save {
            return Err(injected("save"));
        }
        self.inner.save_index(path)
    }

    fn load_index(
        &mut self,
        space: &dyn MetricSpace,
        path: &Path,
        manifest: &IndexManifest,
    ) -> Result<(), KnnError> {
        if self.fail_at == FailAt::Load {
            return Err(injected("load"));
        }
        self.inner.load_index(space, path, manifest)
    }

    fn set_query_time_params(&mut self, params: &AnyParams) -> Result<(), KnnError> {
        if self.fail_at == FailAt::QueryParams {
            return Err(injected("set_query_time_params"));
        }
        self.inner.set_query_time_params(params)
    }

    fn search(
        &self,
        space: &dyn MetricSpace,
        query: &KnnQuery<'_>,
    ) -> Result<TopKQueue, KnnError> {
        self.inner.search(space, query)
    }

    fn len(&self) -> usize {
        if self.fail_at == FailAt::ShortCount {
            return self.inner.len().saturating_sub(1);
        }
        self.inner.len()
    }
}

impl Drop for CountedIndex {
    fn drop(&mut self) {
        if self.counters.live_spaces.load(Ordering::SeqCst) == 0 {
            self.counters.order_violations.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.live_indexes.fetch_sub(1, Ordering::SeqCst);
    }
}

// ===== Helpers =====

fn scenario() -> (Vec<i64>, Vec<Vec<f32>>) {
    (
        vec![1, 2, 3],
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
    )
}

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

fn build_scenario(temp: &TempDir) -> std::path::PathBuf {
    let path = temp.path().join("counted.idx");
    let (ids, vectors) = scenario();
    KnnEngine::with_kind(BackendKind::Exact)
        .build(&ids, &vectors, SpaceType::L2, &BuildParameters::new(), &path)
        .unwrap();
    path
}

// ===== Query results =====

#[test]
fn test_scenario_l2_top_two() {
    for kind in [BackendKind::Exact, BackendKind::Hnsw, BackendKind::Usearch] {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scenario.idx");
        let (ids, vectors) = scenario();

        let engine = KnnEngine::with_kind(kind);
        engine
            .build(&ids, &vectors, SpaceType::L2, &BuildParameters::new(), &path)
            .unwrap();
        let handle = engine
            .load(&path, SpaceType::L2, &QueryParameters::new())
            .unwrap();

        let results = handle.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2, "backend {}", kind);
        assert_eq!(results[0].id, 1, "backend {}", kind);
        assert!(results[0].distance.abs() < 1e-5, "backend {}", kind);
        assert_eq!(results[1].id, 3, "backend {}", kind);
        assert!((results[1].distance - 1.0).abs() < 1e-5, "backend {}", kind);
    }
}

#[test]
fn test_extreme_ids_k_and_ef_search_on_every_backend() {
    for kind in [BackendKind::Exact, BackendKind::Hnsw, BackendKind::Usearch] {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extreme.idx");
        let ids = vec![i64::MIN, -1, 7];
        let (_, vectors) = scenario();

        let engine = KnnEngine::with_kind(kind);
        let manifest = engine
            .build(&ids, &vectors, SpaceType::L2, &BuildParameters::new(), &path)
            .unwrap();
        assert_eq!(manifest.vector_count, 3, "backend {}", kind);

        let params = QueryParameters::new().with_ef_search(i32::MAX as usize);
        let handle = engine.load(&path, SpaceType::L2, &params).unwrap();
        assert_eq!(handle.len(), 3, "backend {}", kind);

        let results = handle.query(&[1.0, 0.0], i32::MAX as usize).unwrap();
        let got: Vec<i64> = results.iter().map(|r| r.id).collect();
        assert_eq!(got, vec![i64::MIN, 7, -1], "backend {}", kind);
        assert!((results[2].distance - 2f32.sqrt()).abs() < 1e-5, "backend {}", kind);
    }
}

#[test]
fn test_k_larger_than_index_returns_everything() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("small.idx");
    let (ids, vectors) = scenario();

    let engine = KnnEngine::with_kind(BackendKind::Hnsw);
    engine
        .build(&ids, &vectors, SpaceType::LInf, &BuildParameters::new(), &path)
        .unwrap();
    let handle = engine
        .load(&path, SpaceType::LInf, &QueryParameters::new())
        .unwrap();

    let results = handle.query(&[0.5, 0.5], 10).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_self_query_returns_own_id_first() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("random.idx");
    let vectors = random_vectors(300, 16, 7);
    let ids: Vec<i64> = (0..300).map(|i| 1000 + i as i64).collect();

    let engine = KnnEngine::with_kind(BackendKind::Hnsw);
    engine
        .build(
            &ids,
            &vectors,
            SpaceType::L2,
            &BuildParameters::new().with_m(12).with_ef_construction(100),
            &path,
        )
        .unwrap();
    let handle = engine
        .load(&path, SpaceType::L2, &QueryParameters::new().with_ef_search(64))
        .unwrap();

    for i in [0usize, 57, 150, 299] {
        let results = handle.query(&vectors[i], 5).unwrap();
        assert_eq!(results[0].id, ids[i]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results.len(), 5);
    }
}

#[test]
fn test_bitset_index_uses_first_d_bits() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bits.idx");
    // 33 bits spans two data words.
    let mut a = vec![0.0; 33];
    a[0] = 1.0;
    a[32] = 1.0;
    let mut b = vec![0.0; 33];
    b[0] = 1.0;
    let c = vec![1.0; 33];

    let engine = KnnEngine::with_kind(BackendKind::Exact);
    engine
        .build(
            &[1, 2, 3],
            &[a.clone(), b, c],
            SpaceType::PackedBitset,
            &BuildParameters::new(),
            &path,
        )
        .unwrap();
    let handle = engine
        .load(&path, SpaceType::PackedBitset, &QueryParameters::new())
        .unwrap();

    let results = handle.query(&a, 3).unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(results[0].distance, 0.0);
    assert!((results[1].distance - 0.5).abs() < 1e-6);
    assert!((results[2].distance - (1.0 - 2.0 / 33.0)).abs() < 1e-6);
}

// ===== Build / load errors =====

#[test]
fn test_count_mismatch_is_dimension_mismatch() {
    let temp = TempDir::new().unwrap();
    let err = KnnEngine::with_kind(BackendKind::Exact)
        .build(
            &[1, 2],
            &[vec![1.0]],
            SpaceType::L2,
            &BuildParameters::new(),
            &temp.path().join("x.idx"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn test_bitset_dimension_below_two_rejected() {
    let temp = TempDir::new().unwrap();
    for dim in [0usize, 1] {
        let err = KnnEngine::with_kind(BackendKind::Exact)
            .build(
                &[1],
                &[vec![1.0; dim]],
                SpaceType::PackedBitset,
                &BuildParameters::new(),
                &temp.path().join("bits.idx"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodingConstraintViolation);
    }
}

#[test]
fn test_load_with_different_space_fails() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("l2.idx");
    let (ids, vectors) = scenario();

    let engine = KnnEngine::with_kind(BackendKind::Hnsw);
    engine
        .build(&ids, &vectors, SpaceType::L2, &BuildParameters::new(), &path)
        .unwrap();
    let err = engine
        .load(&path, SpaceType::CosineSimilarity, &QueryParameters::new())
        .unwrap_err();
    assert!(matches!(
        err,
        KnnError::SpaceTypeMismatch {
            built: SpaceType::L2,
            requested: SpaceType::CosineSimilarity
        }
    ));
}

#[test]
fn test_load_missing_index_is_io_error() {
    let temp = TempDir::new().unwrap();
    let err = KnnEngine::with_kind(BackendKind::Exact)
        .load(
            &temp.path().join("absent.idx"),
            SpaceType::L2,
            &QueryParameters::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

// ===== Resource accounting =====

#[test]
fn test_invalid_input_allocates_nothing() {
    let temp = TempDir::new().unwrap();
    let (backend, counters) = CountingBackend::new(FailAt::Nothing);
    let engine = KnnEngine::new(backend);

    let err = engine
        .build(
            &[1, 2],
            &[vec![1.0, 2.0], vec![1.0]],
            SpaceType::L2,
            &BuildParameters::new(),
            &temp.path().join("x.idx"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert_eq!(counters.spaces_created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_build_failures_release_everything() {
    for fail_at in [
        FailAt::CreateSpace,
        FailAt::CreateIndex,
        FailAt::Construct,
        FailAt::ShortCount,
        FailAt::Save,
    ] {
        let temp = TempDir::new().unwrap();
        let (ids, vectors) = scenario();
        let (backend, counters) = CountingBackend::new(fail_at);

        let err = KnnEngine::new(backend)
            .build(
                &ids,
                &vectors,
                SpaceType::L2,
                &BuildParameters::new(),
                &temp.path().join("x.idx"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NativeBackendFailure, "{:?}", fail_at);
        assert_eq!(counters.live(), (0, 0), "{:?}", fail_at);
        assert_eq!(counters.order_violations.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_load_failures_release_everything() {
    for fail_at in [
        FailAt::CreateSpace,
        FailAt::CreateIndex,
        FailAt::Load,
        FailAt::QueryParams,
    ] {
        let temp = TempDir::new().unwrap();
        let path = build_scenario(&temp);
        let (backend, counters) = CountingBackend::new(fail_at);

        let err = KnnEngine::new(backend)
            .load(&path, SpaceType::L2, &QueryParameters::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NativeBackendFailure, "{:?}", fail_at);
        assert_eq!(counters.live(), (0, 0), "{:?}", fail_at);
        assert_eq!(counters.order_violations.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_space_mismatch_allocates_nothing() {
    let temp = TempDir::new().unwrap();
    let path = build_scenario(&temp);
    let (backend, counters) = CountingBackend::new(FailAt::Nothing);

    let err = KnnEngine::new(backend)
        .load(&path, SpaceType::L1, &QueryParameters::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpaceTypeMismatch);
    assert_eq!(counters.spaces_created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_successful_build_releases_backend_objects() {
    let temp = TempDir::new().unwrap();
    let (ids, vectors) = scenario();
    let (backend, counters) = CountingBackend::new(FailAt::Nothing);

    KnnEngine::new(backend)
        .build(
            &ids,
            &vectors,
            SpaceType::L2,
            &BuildParameters::new(),
            &temp.path().join("ok.idx"),
        )
        .unwrap();
    assert_eq!(counters.spaces_created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.live(), (0, 0));
    assert_eq!(counters.order_violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_handle_owns_index_and_space_until_free() {
    let temp = TempDir::new().unwrap();
    let path = build_scenario(&temp);
    let (backend, counters) = CountingBackend::new(FailAt::Nothing);

    let handle = KnnEngine::new(backend)
        .load(&path, SpaceType::L2, &QueryParameters::new())
        .unwrap();
    assert_eq!(counters.live(), (1, 1));

    let results = handle.query(&[0.0, 1.0], 1).unwrap();
    assert_eq!(results[0].id, 2);

    handle.free();
    assert_eq!(counters.live(), (0, 0));
    assert_eq!(counters.order_violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_handle_moves_across_threads() {
    let temp = TempDir::new().unwrap();
    let path = build_scenario(&temp);
    let (backend, counters) = CountingBackend::new(FailAt::Nothing);

    let handle = Arc::new(
        KnnEngine::new(backend)
            .load(&path, SpaceType::L2, &QueryParameters::new())
            .unwrap(),
    );
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            std::thread::spawn(move || handle.query(&[1.0, 1.0], 1).unwrap()[0].id)
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 3);
    }

    drop(handle);
    assert_eq!(counters.live(), (0, 0));
}
