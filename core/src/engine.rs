//! Keeps one user's bundle in sync between the local cache and the gateway.
//!
//! Reads are served from memory. Writes are applied locally first and then
//! persisted; a rejected write is rolled back. A background poller picks up
//! changes made elsewhere.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::error::{Result, SyncError};
use crate::gateway::Gateway;
use crate::models::{Bundle, Meal, SyncKey, SyncValue, validate_meal, validate_value};
use crate::rules::{self, MealLogOutcome};
use crate::store::{Action, Store, Transition};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Gateway calls still pending after this fail as [`SyncError::Network`].
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Result of a full fetch. Keys listed in `errors` fell back to their cached
/// value, or the default when nothing was cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub bundle: Bundle,
    pub errors: Vec<(SyncKey, SyncError)>,
}

pub struct SyncEngine {
    user_id: String,
    gateway: Arc<dyn Gateway>,
    cache: Mutex<LocalCache>,
    store: Mutex<Store>,
    config: EngineConfig,
    disposed: AtomicBool,
    updates: watch::Sender<Bundle>,
}

impl SyncEngine {
    /// Create an engine for `user_id`, seeded from the local cache. No network
    /// calls are made until [`load`](Self::load).
    pub fn open(
        user_id: &str,
        gateway: Arc<dyn Gateway>,
        cache: LocalCache,
        config: EngineConfig,
    ) -> Self {
        let cached = cache.load_bundle(user_id);
        let (updates, _) = watch::channel(cached.clone());
        Self {
            user_id: user_id.to_string(),
            gateway,
            cache: Mutex::new(cache),
            store: Mutex::new(Store::new(cached)),
            config,
            disposed: AtomicBool::new(false),
            updates,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The current bundle, including writes still in flight.
    pub fn bundle(&self) -> Bundle {
        self.store().visible().clone()
    }

    /// Receive the bundle every time its visible contents change.
    pub fn subscribe(&self) -> watch::Receiver<Bundle> {
        self.updates.subscribe()
    }

    /// Stop reacting to gateway results. The poller exits on its next tick.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Fetch all keys and replace the bundle with the result.
    ///
    /// A failing key does not fail the load; it is reported in
    /// [`LoadReport::errors`]. Only [`SyncError::Unauthorized`] aborts.
    pub async fn load(&self) -> Result<LoadReport> {
        let (bundle, errors) = self.fetch_all().await?;
        if self.is_disposed() {
            return Ok(LoadReport {
                bundle: self.bundle(),
                errors,
            });
        }
        let snapshot = serde_json::to_string(&bundle)?;
        let transition = self.dispatch(Action::Loaded { bundle, snapshot });
        self.persist(&SyncKey::ALL);
        self.publish(&transition);
        info!(
            "loaded {} ({} key(s) failed)",
            self.user_id,
            errors.len()
        );
        Ok(LoadReport {
            bundle: self.bundle(),
            errors,
        })
    }

    /// Fetch all keys and replace the bundle only if anything changed since the
    /// last applied fetch. Returns whether the bundle was replaced.
    pub async fn poll(&self) -> Result<bool> {
        if self.is_disposed() {
            return Ok(false);
        }
        let (bundle, errors) = self.fetch_all().await?;
        if self.is_disposed() {
            return Ok(false);
        }
        for (key, err) in &errors {
            debug!("poll fell back for {key}: {err}");
        }
        let snapshot = serde_json::to_string(&bundle)?;
        let transition = self.dispatch(Action::Polled { bundle, snapshot });
        if transition.replaced {
            self.persist(&SyncKey::ALL);
            self.publish(&transition);
            debug!("poll replaced bundle for {}", self.user_id);
        }
        Ok(transition.replaced)
    }

    /// Apply `value` locally, then persist it. If the gateway rejects the
    /// write, the key is restored to what it held before and the error is
    /// returned.
    pub async fn update(&self, value: SyncValue) -> Result<()> {
        if self.is_disposed() {
            return Err(SyncError::Unknown("engine disposed".to_string()));
        }
        validate_value(&value).map_err(|e| SyncError::BadRequest(e.to_string()))?;

        let key = value.key();
        let json = value.to_json()?;
        let (seq, transition) = {
            let mut store = self.store();
            let seq = store.next_seq();
            (seq, store.apply(Action::Begin { seq, value }))
        };
        self.persist(&transition.changed);
        self.publish(&transition);

        let result = self
            .with_timeout(self.gateway.upsert(&self.user_id, key, json))
            .await;

        if self.is_disposed() {
            return result;
        }

        match result {
            Ok(()) => {
                self.dispatch(Action::Confirm { key, seq });
                debug!("persisted {key} for {}", self.user_id);
                Ok(())
            }
            Err(err) => {
                warn!("write of {key} for {} failed, rolling back: {err}", self.user_id);
                let transition = self.dispatch(Action::Reject { key, seq });
                self.persist(&transition.changed);
                self.publish(&transition);
                Err(err)
            }
        }
    }

    /// Log a meal as of now in the local time zone.
    pub async fn log_meal(&self, meal: Meal) -> Result<MealLogOutcome> {
        self.log_meal_at(meal, &Local::now()).await
    }

    /// Append `meal`, advance the streak, and persist every key that changed.
    /// Keys are written concurrently. If any write fails, the keys that did
    /// land are written back to their prior values so the log applies either
    /// fully or not at all, and the first failure is returned.
    pub async fn log_meal_at<Tz: TimeZone>(
        &self,
        meal: Meal,
        now: &DateTime<Tz>,
    ) -> Result<MealLogOutcome> {
        validate_meal(&meal).map_err(|e| SyncError::BadRequest(e.to_string()))?;

        let before = self.bundle();
        let outcome = rules::apply_meal_log(before.clone(), meal, now);
        let writes = outcome
            .changed
            .iter()
            .map(|key| self.update(outcome.bundle.get(*key)));
        let results = join_all(writes).await;

        if let Some(err) = results.iter().find_map(|r| r.as_ref().err()).cloned() {
            let landed = outcome
                .changed
                .iter()
                .zip(&results)
                .filter(|(_, result)| result.is_ok())
                .map(|(key, _)| *key);
            for key in landed {
                if let Err(e) = self.update(before.get(key)).await {
                    warn!("could not restore {key} for {}: {e}", self.user_id);
                }
            }
            return Err(err);
        }

        if outcome.goal_achieved {
            info!(
                "{} reached a {}-day streak",
                self.user_id, outcome.bundle.streak.current_streak
            );
        }
        Ok(outcome)
    }

    /// Poll every `poll_interval` until the engine is disposed or the gateway
    /// stops accepting our identity.
    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                if engine.is_disposed() {
                    break;
                }
                match engine.poll().await {
                    Ok(true) => info!("picked up remote changes for {}", engine.user_id),
                    Ok(false) => {}
                    Err(SyncError::Unauthorized) => {
                        warn!("poller for {} stopped: unauthorized", engine.user_id);
                        break;
                    }
                    Err(e) => warn!("poll failed for {}: {e}", engine.user_id),
                }
            }
            debug!("poller for {} exited", engine.user_id);
        })
    }

    // --- internals ---

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, action: Action) -> Transition {
        self.store().apply(action)
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Network(format!(
                "request timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }

    async fn fetch_all(&self) -> Result<(Bundle, Vec<(SyncKey, SyncError)>)> {
        let fetches = SyncKey::ALL.map(|key| {
            self.with_timeout(self.gateway.fetch(&self.user_id, key))
        });
        let results = join_all(fetches).await;

        let mut bundle = Bundle::default();
        let mut errors = Vec::new();
        for (key, result) in SyncKey::ALL.into_iter().zip(results) {
            let value = match result {
                Ok(Some(json)) => SyncValue::from_json(key, json).map_err(SyncError::from),
                Ok(None) | Err(SyncError::NotFound) => Ok(SyncValue::default_for(key)),
                Err(SyncError::Unauthorized) => return Err(SyncError::Unauthorized),
                Err(e) => Err(e),
            };
            match value {
                Ok(value) => bundle.set(value),
                Err(err) => {
                    warn!("fetch of {key} for {} failed: {err}", self.user_id);
                    bundle.set(self.fallback(key));
                    errors.push((key, err));
                }
            }
        }
        Ok((bundle, errors))
    }

    fn fallback(&self, key: SyncKey) -> SyncValue {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.read(&self.user_id, key) {
            Ok(Some(value)) => value,
            Ok(None) => SyncValue::default_for(key),
            Err(e) => {
                warn!("cached {key} unreadable: {e:#}");
                SyncValue::default_for(key)
            }
        }
    }

    /// Mirror the visible values of `keys` into the local cache. Cache
    /// failures are logged and otherwise ignored.
    fn persist(&self, keys: &[SyncKey]) {
        if keys.is_empty() {
            return;
        }
        let values: Vec<SyncValue> = {
            let store = self.store();
            keys.iter().map(|k| store.visible().get(*k)).collect()
        };
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        for value in &values {
            if let Err(e) = cache.write(&self.user_id, value) {
                warn!("failed to cache {}: {e:#}", value.key());
            }
        }
    }

    fn publish(&self, transition: &Transition) {
        if !transition.changed.is_empty() {
            self.updates.send_replace(self.bundle());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::models::{Settings, Streak};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    const USER: &str = "user_1";

    fn engine_with(gw: &Arc<MemoryGateway>, cache: LocalCache) -> SyncEngine {
        SyncEngine::open(USER, gw.clone(), cache, EngineConfig::default())
    }

    fn engine(gw: &Arc<MemoryGateway>) -> SyncEngine {
        engine_with(gw, LocalCache::open_in_memory().unwrap())
    }

    fn settings(nickname: &str, calories: u32) -> Settings {
        Settings {
            nickname: nickname.to_string(),
            daily_calorie_goal: calories,
            streak_goal: 3,
        }
    }

    #[tokio::test]
    async fn test_open_paints_from_cache_without_network() {
        let gw = Arc::new(MemoryGateway::new());
        let cache = LocalCache::open_in_memory().unwrap();
        cache.write(USER, &SyncValue::GoalsAchieved(5)).unwrap();

        let engine = engine_with(&gw, cache);
        assert_eq!(engine.bundle().goals_achieved, 5);
        assert_eq!(gw.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_load_defaults_for_missing_keys() {
        let gw = Arc::new(MemoryGateway::new());
        gw.fail_fetch(SyncKey::Meals, SyncError::NotFound);
        let engine = engine(&gw);

        let report = engine.load().await.unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(report.bundle, Bundle::default());
        assert_eq!(gw.fetch_count(), 4);
    }

    #[tokio::test]
    async fn test_load_partial_failure_keeps_other_keys() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(USER, SyncKey::Settings, json!(settings("Sam", 1800)));
        gw.insert(USER, SyncKey::GoalsAchieved, json!(2));
        gw.fail_fetch(SyncKey::Streak, SyncError::Backend("db down".to_string()));
        let engine = engine(&gw);

        let report = engine.load().await.unwrap();
        assert_eq!(report.bundle.settings.nickname, "Sam");
        assert_eq!(report.bundle.goals_achieved, 2);
        assert_eq!(report.bundle.streak, Streak::default());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, SyncKey::Streak);
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_cached_value() {
        let gw = Arc::new(MemoryGateway::new());
        gw.fail_fetch(SyncKey::GoalsAchieved, SyncError::Network("offline".to_string()));
        let cache = LocalCache::open_in_memory().unwrap();
        cache.write(USER, &SyncValue::GoalsAchieved(9)).unwrap();
        let engine = engine_with(&gw, cache);

        let report = engine.load().await.unwrap();
        assert_eq!(report.bundle.goals_achieved, 9);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_load_undecodable_value_is_reported() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(USER, SyncKey::GoalsAchieved, json!("lots"));
        let engine = engine(&gw);

        let report = engine.load().await.unwrap();
        assert_eq!(report.bundle.goals_achieved, 0);
        assert!(matches!(report.errors[0], (SyncKey::GoalsAchieved, SyncError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_load_unauthorized_aborts() {
        let gw = Arc::new(MemoryGateway::new());
        gw.fail_fetch(SyncKey::Settings, SyncError::Unauthorized);
        let engine = engine(&gw);

        let err = engine.load().await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(USER, SyncKey::Settings, json!(settings("Sam", 1800)));
        let engine = engine(&gw);

        let first = engine.load().await.unwrap();
        let second = engine.load().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_then_reload_returns_value() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = engine(&gw);
        engine.load().await.unwrap();

        let value = SyncValue::Settings(settings("Alex", 2200));
        engine.update(value.clone()).await.unwrap();
        assert_eq!(engine.bundle().get(SyncKey::Settings), value);

        let fresh = SyncEngine::open(
            USER,
            gw.clone(),
            LocalCache::open_in_memory().unwrap(),
            EngineConfig::default(),
        );
        let report = fresh.load().await.unwrap();
        assert_eq!(report.bundle.get(SyncKey::Settings), value);
    }

    #[tokio::test]
    async fn test_update_is_cached_before_gateway_answers() {
        let gw = Arc::new(MemoryGateway::new());
        gw.hold_writes();
        let cache_path = tempfile::tempdir().unwrap();
        let path = cache_path.path().join("cache.db");
        let engine = engine_with(&gw, LocalCache::open(&path).unwrap());

        let write = engine.update(SyncValue::GoalsAchieved(3));
        let check = async {
            tokio::task::yield_now().await;
            let other = LocalCache::open(&path).unwrap();
            assert_eq!(
                other.read(USER, SyncKey::GoalsAchieved).unwrap(),
                Some(SyncValue::GoalsAchieved(3))
            );
            assert_eq!(gw.write_count(), 0);
            gw.release_writes(1);
        };
        let (res, ()) = tokio::join!(write, check);
        res.unwrap();
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back_exactly() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(USER, SyncKey::Settings, json!(settings("Prior", 1700)));
        let engine = engine(&gw);
        engine.load().await.unwrap();

        gw.fail_writes(Some(SyncError::Backend("500".to_string())));
        let err = engine
            .update(SyncValue::Settings(settings("Next", 2500)))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Backend("500".to_string()));
        assert_eq!(engine.bundle().settings, settings("Prior", 1700));

        let cached = engine
            .cache
            .lock()
            .unwrap()
            .read(USER, SyncKey::Settings)
            .unwrap();
        assert_eq!(cached, Some(SyncValue::Settings(settings("Prior", 1700))));
    }

    #[tokio::test]
    async fn test_concurrent_failed_updates_restore_prior_value() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(USER, SyncKey::Settings, json!(settings("Prior", 1700)));
        let engine = engine(&gw);
        engine.load().await.unwrap();

        gw.hold_writes();
        gw.fail_writes(Some(SyncError::Backend("down".to_string())));

        let a = engine.update(SyncValue::Settings(settings("A", 2000)));
        let b = engine.update(SyncValue::Settings(settings("B", 2100)));
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(engine.bundle().settings.nickname, "B");
            gw.release_writes(2);
        };
        let (ra, rb, ()) = tokio::join!(a, b, release);
        assert!(ra.is_err());
        assert!(rb.is_err());
        assert_eq!(engine.bundle().settings, settings("Prior", 1700));
    }

    #[tokio::test]
    async fn test_invalid_value_is_rejected_before_apply() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = engine(&gw);
        let err = engine
            .update(SyncValue::Settings(settings("Zero", 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest(_)));
        assert_eq!(engine.bundle().settings, Settings::default());
        assert_eq!(gw.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_write_times_out_and_rolls_back() {
        let gw = Arc::new(MemoryGateway::new());
        gw.hold_writes();
        let engine = engine(&gw);

        let err = engine
            .update(SyncValue::GoalsAchieved(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(engine.bundle().goals_achieved, 0);
    }

    #[tokio::test]
    async fn test_poll_replaces_only_on_change() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = engine(&gw);
        engine.load().await.unwrap();
        let mut rx = engine.subscribe();

        assert!(!engine.poll().await.unwrap());
        assert!(!rx.has_changed().unwrap());

        gw.insert(USER, SyncKey::GoalsAchieved, json!(4));
        assert!(engine.poll().await.unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().goals_achieved, 4);

        assert!(!engine.poll().await.unwrap());
    }

    #[tokio::test]
    async fn test_poll_picks_up_revert_of_own_write() {
        let gw = Arc::new(MemoryGateway::new());
        let a = engine(&gw);
        let b = engine(&gw);
        a.load().await.unwrap();
        b.load().await.unwrap();

        a.update(SyncValue::Settings(settings("A", 2000))).await.unwrap();
        b.update(SyncValue::Settings(Settings::default())).await.unwrap();

        assert!(a.poll().await.unwrap());
        assert_eq!(a.bundle().settings.nickname, "");
    }

    #[tokio::test]
    async fn test_disposed_engine_ignores_late_results() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = engine(&gw);
        engine.load().await.unwrap();

        gw.hold_writes();
        gw.fail_writes(Some(SyncError::Backend("late".to_string())));
        let write = engine.update(SyncValue::GoalsAchieved(2));
        let teardown = async {
            tokio::task::yield_now().await;
            engine.dispose();
            gw.release_writes(1);
        };
        let (res, ()) = tokio::join!(write, teardown);
        assert!(res.is_err());
        // No rollback was applied after teardown.
        assert_eq!(engine.bundle().goals_achieved, 2);

        let fetches = gw.fetch_count();
        assert!(!engine.poll().await.unwrap());
        assert_eq!(gw.fetch_count(), fetches);
    }

    #[tokio::test]
    async fn test_log_meal_persists_changed_keys() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(
            USER,
            SyncKey::Settings,
            json!({ "nickname": "Sam", "dailyCalorieGoal": 2000, "streakGoal": 1 }),
        );
        let engine = engine(&gw);
        engine.load().await.unwrap();

        let now = Utc::now();
        let outcome = engine
            .log_meal_at(Meal::new("Pasta", 2100, "dinner", now), &now)
            .await
            .unwrap();
        assert!(outcome.daily_goal_met);
        assert!(outcome.goal_achieved);
        assert_eq!(gw.write_count(), 3);

        let streak: Streak =
            serde_json::from_value(gw.get(USER, SyncKey::Streak).unwrap()).unwrap();
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.last_log_date, Some(now.date_naive()));
        assert_eq!(gw.get(USER, SyncKey::GoalsAchieved), Some(json!(1)));
        assert_eq!(engine.bundle().meals.len(), 1);
    }

    #[tokio::test]
    async fn test_log_meal_failure_rolls_back_everything() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = engine(&gw);
        engine.load().await.unwrap();
        gw.fail_writes(Some(SyncError::Backend("down".to_string())));

        let now = Utc::now() - ChronoDuration::hours(1);
        let err = engine
            .log_meal_at(Meal::new("Pizza", 2500, "dinner", now), &now)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Backend(_)));
        assert_eq!(engine.bundle(), Bundle::default());
    }

    #[tokio::test]
    async fn test_log_meal_partial_failure_restores_landed_keys() {
        let gw = Arc::new(MemoryGateway::new());
        gw.insert(
            USER,
            SyncKey::Settings,
            json!({ "nickname": "Sam", "dailyCalorieGoal": 2000, "streakGoal": 1 }),
        );
        let engine = engine(&gw);
        engine.load().await.unwrap();
        gw.fail_write(SyncKey::GoalsAchieved, SyncError::Backend("down".to_string()));

        let now = Utc::now() - ChronoDuration::hours(1);
        let err = engine
            .log_meal_at(Meal::new("Pasta", 2100, "dinner", now), &now)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Backend(_)));
        let bundle = engine.bundle();
        assert!(bundle.meals.is_empty());
        assert_eq!(bundle.streak, Streak::default());
        assert_eq!(bundle.goals_achieved, 0);
        assert_eq!(gw.get(USER, SyncKey::Meals), Some(json!([])));

        // Retrying the same day still earns the goal.
        gw.clear_write_failures();
        let outcome = engine
            .log_meal_at(Meal::new("Pasta", 2100, "dinner", now), &now)
            .await
            .unwrap();
        assert!(outcome.goal_achieved);
        assert_eq!(engine.bundle().goals_achieved, 1);
        assert_eq!(gw.get(USER, SyncKey::GoalsAchieved), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_picks_up_remote_changes() {
        let gw = Arc::new(MemoryGateway::new());
        let engine = Arc::new(engine(&gw));
        engine.load().await.unwrap();
        let mut rx = engine.subscribe();

        let handle = engine.spawn_poller();
        gw.insert(USER, SyncKey::GoalsAchieved, json!(6));

        tokio::time::timeout(Duration::from_secs(60), rx.changed())
            .await
            .expect("poller should notice the change")
            .unwrap();
        assert_eq!(engine.bundle().goals_achieved, 6);

        engine.dispose();
        handle.await.unwrap();
    }
}
