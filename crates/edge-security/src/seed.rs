//! Rotating secret seed.
//!
//! The seed binds every hashed context cookie. Rotating it makes all
//! previously issued cookies unverifiable, which is how downstream cache
//! entries keyed on the old values are retired.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Seed length in bytes.
pub const SEED_LENGTH: usize = 32;

/// Seed store errors.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// Backend failed to read or write the seed.
    #[error("seed persistence failed: {0}")]
    Persistence(String),

    /// Stored seed could not be used.
    #[error("stored seed is corrupt: {0}")]
    Corrupt(String),
}

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current Unix timestamp.
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        current_timestamp()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Create a clock fixed at `now`.
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    /// Set the current time.
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// The active secret and when it was last replaced.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    value: String,
    last_changed: u64,
}

impl Seed {
    /// Generate a fresh random seed stamped with `last_changed`.
    pub fn generate(last_changed: u64) -> Self {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let value = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SEED_LENGTH)
            .map(char::from)
            .collect();

        Self {
            value,
            last_changed,
        }
    }

    /// Build a seed from stored parts.
    pub fn from_parts(value: impl Into<String>, last_changed: u64) -> Self {
        Self {
            value: value.into(),
            last_changed,
        }
    }

    /// Secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }

    /// Unix timestamp of the last rotation.
    pub fn last_changed(&self) -> u64 {
        self.last_changed
    }

    /// Whether the seed has outlived `interval` at `now`.
    pub fn is_due(&self, now: u64, interval: u64) -> bool {
        now.saturating_sub(self.last_changed) >= interval
    }

    fn check(&self) -> Result<(), SeedError> {
        if self.value.len() != SEED_LENGTH {
            return Err(SeedError::Corrupt(format!(
                "expected {} bytes, found {}",
                SEED_LENGTH,
                self.value.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seed")
            .field("value", &"<redacted>")
            .field("last_changed", &self.last_changed)
            .finish()
    }
}

/// Persistence for the seed.
pub trait SeedBackend: Send + Sync {
    /// Load the stored seed, if any.
    fn load(&self) -> Result<Option<Seed>, SeedError>;

    /// Replace the stored seed.
    fn store(&self, seed: &Seed) -> Result<(), SeedError>;
}

/// In-process seed storage.
#[derive(Debug, Default)]
pub struct InMemorySeedBackend {
    seed: Mutex<Option<Seed>>,
}

impl InMemorySeedBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `seed`.
    pub fn with_seed(seed: Seed) -> Self {
        Self {
            seed: Mutex::new(Some(seed)),
        }
    }
}

impl SeedBackend for InMemorySeedBackend {
    fn load(&self) -> Result<Option<Seed>, SeedError> {
        Ok(self.seed.lock().clone())
    }

    fn store(&self, seed: &Seed) -> Result<(), SeedError> {
        *self.seed.lock() = Some(seed.clone());
        Ok(())
    }
}

/// Seed storage in a JSON file, shared by processes on one host.
#[derive(Debug, Clone)]
pub struct JsonFileSeedBackend {
    path: PathBuf,
}

impl JsonFileSeedBackend {
    /// Store the seed at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeedBackend for JsonFileSeedBackend {
    fn load(&self) -> Result<Option<Seed>, SeedError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SeedError::Persistence(e.to_string())),
        };

        let seed: Seed =
            serde_json::from_str(&content).map_err(|e| SeedError::Corrupt(e.to_string()))?;
        seed.check()?;
        Ok(Some(seed))
    }

    fn store(&self, seed: &Seed) -> Result<(), SeedError> {
        let json =
            serde_json::to_vec(seed).map_err(|e| SeedError::Persistence(e.to_string()))?;

        // Write aside and rename so readers never observe a partial file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| SeedError::Persistence(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SeedError::Persistence(e.to_string()))
    }
}

/// Owner of the active seed.
///
/// Reads take a shared lock on the cached seed. A due rotation re-checks under
/// the exclusive lock, so concurrent callers in one process rotate once.
pub struct SeedStore {
    backend: Arc<dyn SeedBackend>,
    clock: Arc<dyn Clock>,
    rotation_interval: u64,
    current: RwLock<Option<Seed>>,
}

impl SeedStore {
    /// Create a store over `backend` using the wall clock.
    pub fn new(backend: Arc<dyn SeedBackend>, rotation_interval: u64) -> Self {
        Self::with_clock(backend, rotation_interval, Arc::new(SystemClock))
    }

    /// Create a store with an explicit clock.
    pub fn with_clock(
        backend: Arc<dyn SeedBackend>,
        rotation_interval: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            clock,
            rotation_interval,
            current: RwLock::new(None),
        }
    }

    /// Rotation interval in seconds.
    pub fn rotation_interval(&self) -> u64 {
        self.rotation_interval
    }

    /// Clock used for rotation decisions.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Current seed, rotating first if it is absent or due.
    pub fn get_seed(&self) -> Result<Seed, SeedError> {
        let now = self.clock.now();

        if let Some(seed) = self.current.read().as_ref() {
            if !seed.is_due(now, self.rotation_interval) {
                return Ok(seed.clone());
            }
        }

        let mut current = self.current.write();
        self.refresh_locked(&mut current, now).map(|(seed, _)| seed)
    }

    /// Replace the seed unconditionally.
    pub fn rotate_seed(&self) -> Result<Seed, SeedError> {
        let now = self.clock.now();
        let mut current = self.current.write();
        self.adopt_stored(&mut current)?;
        self.rotate_locked(&mut current, now)
    }

    /// Rotate only if the seed is absent or due. Entry point for the
    /// scheduled maintenance task.
    ///
    /// Returns false when the stored seed is fresh, including when another
    /// process sharing the backend rotated it first.
    pub fn rotate_if_due(&self) -> Result<bool, SeedError> {
        let now = self.clock.now();
        let mut current = self.current.write();
        self.refresh_locked(&mut current, now).map(|(_, rotated)| rotated)
    }

    /// Stored seed without rotating.
    pub fn peek(&self) -> Result<Option<Seed>, SeedError> {
        if let Some(seed) = self.current.read().as_ref() {
            return Ok(Some(seed.clone()));
        }
        self.backend.load()
    }

    /// Re-read the backend and keep the cached seed in step with it. Other
    /// processes sharing the backend may have rotated since the last load.
    fn adopt_stored(&self, current: &mut Option<Seed>) -> Result<(), SeedError> {
        if let Some(stored) = self.backend.load()? {
            let newer = current
                .as_ref()
                .map_or(true, |cached| stored.last_changed() >= cached.last_changed());
            if newer {
                *current = Some(stored);
            }
        }
        Ok(())
    }

    fn refresh_locked(
        &self,
        current: &mut Option<Seed>,
        now: u64,
    ) -> Result<(Seed, bool), SeedError> {
        self.adopt_stored(current)?;
        if let Some(seed) = current.as_ref() {
            if !seed.is_due(now, self.rotation_interval) {
                return Ok((seed.clone(), false));
            }
        }
        self.rotate_locked(current, now).map(|seed| (seed, true))
    }

    fn rotate_locked(&self, current: &mut Option<Seed>, now: u64) -> Result<Seed, SeedError> {
        // Strictly increasing even for two rotations within one second.
        let stamp = match current.as_ref() {
            Some(previous) => now.max(previous.last_changed().saturating_add(1)),
            None => now,
        };
        let seed = Seed::generate(stamp);

        if let Err(e) = self.backend.store(&seed) {
            tracing::error!(error = %e, "failed to persist rotated seed, keeping previous seed");
            return Err(e);
        }

        tracing::info!(last_changed = stamp, "rotated context seed");
        *current = Some(seed.clone());
        Ok(seed)
    }
}

impl std::fmt::Debug for SeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedStore")
            .field("rotation_interval", &self.rotation_interval)
            .field("current", &*self.current.read())
            .finish()
    }
}

/// Get current Unix timestamp.
pub(crate) fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
