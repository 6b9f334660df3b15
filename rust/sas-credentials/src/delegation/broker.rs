use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt;
use futures_util::future::Shared;
use parking_lot::Mutex;
use sas_common::{Clock, ConditionalSend, SystemClock, spawn_detached};
use tracing::{debug, info, warn};

use crate::{
    AccountIdentity, AuthorityError, DelegationAuthority, DelegationKey, ResourceScope, SasError,
    ScopeError, SignedToken, TimeWindow, max_delegated_window,
};

/// Lifetime of fetched keys unless configured otherwise.
pub const DEFAULT_KEY_LIFETIME_SECONDS: i64 = 5 * 60;

type Outcome = Result<Arc<DelegationKey>, AuthorityError>;

#[cfg(not(target_arch = "wasm32"))]
type FetchFuture = futures_util::future::BoxFuture<'static, Outcome>;

#[cfg(target_arch = "wasm32")]
type FetchFuture = futures_util::future::LocalBoxFuture<'static, Outcome>;

type Fetch = Shared<FetchFuture>;

type Entries = HashMap<String, Entry>;

fn boxed(future: impl Future<Output = Outcome> + ConditionalSend + 'static) -> FetchFuture {
    Box::pin(future)
}

/// Where an account's cached key stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Nothing cached and nothing in flight.
    Empty,
    /// A request to the authority is in flight.
    Fetching,
    /// A usable key is cached.
    Valid,
    /// The cached key has reached its expiry; the next request refetches.
    Expired,
}

enum Entry {
    Fetching {
        generation: u64,
        window: TimeWindow,
        fetch: Fetch,
    },
    Valid(Arc<DelegationKey>),
}

/// Supplies currently valid delegation keys, one per account.
///
/// Keys are cached until their signed expiry. When a key is missing or
/// expired the next caller starts a single request to the authority and
/// every concurrent caller for the same account awaits that same request,
/// observing the same key or the same failure. A failed request leaves the
/// account empty; nothing is retried automatically.
///
/// A started request is handed to the ambient executor (see
/// [`spawn_detached`]) and records its own outcome in the cache, so it
/// completes even when every caller stops waiting. Without an executor it
/// only progresses while awaited; a request whose window has elapsed by the
/// time someone asks again is abandoned and a fresh one started. A key that
/// is already expired on arrival is never cached or returned.
pub struct DelegationKeyBroker {
    authority: Arc<dyn DelegationAuthority>,
    clock: Arc<dyn Clock>,
    key_lifetime: TimeDelta,
    entries: Arc<Mutex<Entries>>,
    generation: AtomicU64,
}

impl DelegationKeyBroker {
    /// A broker requesting five minute keys from `authority`.
    pub fn new(authority: Arc<dyn DelegationAuthority>) -> Self {
        Self {
            authority,
            clock: Arc::new(SystemClock),
            key_lifetime: TimeDelta::seconds(DEFAULT_KEY_LIFETIME_SECONDS),
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Request keys valid for `lifetime`, which must be positive and at most
    /// seven days.
    pub fn with_key_lifetime(mut self, lifetime: TimeDelta) -> Result<Self, ScopeError> {
        if lifetime <= TimeDelta::zero() {
            return Err(ScopeError::NonPositiveLifetime(lifetime));
        }
        let maximum = max_delegated_window();
        if lifetime > maximum {
            return Err(ScopeError::WindowTooLong {
                actual: lifetime,
                maximum,
            });
        }
        self.key_lifetime = lifetime;
        Ok(self)
    }

    /// Lifetime of requested keys.
    pub fn key_lifetime(&self) -> TimeDelta {
        self.key_lifetime
    }

    /// A key for `account` that has not expired, fetching one if needed.
    ///
    /// If the key that comes back has already expired, one fresh request is
    /// made. Should that key be expired as well the authority is reported
    /// as unavailable.
    pub async fn delegation_key(&self, account: &str) -> Result<Arc<DelegationKey>, SasError> {
        let key = self.acquire(account).await?;
        if !key.is_expired_at(self.clock.now()) {
            return Ok(key);
        }

        debug!(account, expiry = %key.signed_expiry(), "Delegation key arrived expired");
        let key = self.acquire(account).await?;
        if key.is_expired_at(self.clock.now()) {
            return Err(AuthorityError::Unavailable(format!(
                "delegation key for '{account}' expired at {} before it could be used",
                key.signed_expiry()
            ))
            .into());
        }
        Ok(key)
    }

    /// Where the cached key for `account` stands right now.
    pub fn status(&self, account: &str) -> KeyStatus {
        let now = self.clock.now();
        match self.entries.lock().get(account) {
            None => KeyStatus::Empty,
            Some(Entry::Fetching { .. }) => KeyStatus::Fetching,
            Some(Entry::Valid(key)) if key.is_expired_at(now) => KeyStatus::Expired,
            Some(Entry::Valid(_)) => KeyStatus::Valid,
        }
    }

    /// Forget everything cached for `account`.
    ///
    /// Callers already awaiting an in-flight request still receive its
    /// outcome, but it is no longer cached.
    pub fn evict(&self, account: &str) {
        if self.entries.lock().remove(account).is_some() {
            debug!(account, "Evicted delegation key");
        }
    }

    /// Sign `scope` on behalf of `account` with a cached or freshly fetched
    /// delegation key.
    pub async fn sign(
        &self,
        account: &AccountIdentity,
        scope: &ResourceScope,
    ) -> Result<SignedToken, SasError> {
        let key = self.delegation_key(account.name()).await?;
        scope.sign_with_delegation_key(account, &key)
    }

    /// The cached key, the request in flight, or a newly started request.
    async fn acquire(&self, account: &str) -> Result<Arc<DelegationKey>, SasError> {
        let (fetch, started) = {
            let mut entries = self.entries.lock();
            let now = self.clock.now();

            let in_flight = match entries.get(account) {
                Some(Entry::Valid(key)) if !key.is_expired_at(now) => {
                    debug!(
                        account,
                        expiry = %key.signed_expiry(),
                        "Reusing cached delegation key"
                    );
                    return Ok(key.clone());
                }
                // A request whose window has passed could only bring an expired key
                Some(Entry::Fetching { window, fetch, .. }) if window.expiry() > now => {
                    Some(fetch.clone())
                }
                _ => None,
            };

            match in_flight {
                Some(fetch) => (fetch, false),
                None => (self.start(&mut entries, account, now)?, true),
            }
        };

        if started {
            let driver = fetch.clone();
            let detached = spawn_detached(async move {
                let _ = driver.await;
            });
            if !detached {
                debug!(account, "No executor; delegation key request runs while awaited");
            }
        }

        Ok(fetch.await?)
    }

    /// Replace whatever is cached for `account` with a new request.
    fn start(
        &self,
        entries: &mut Entries,
        account: &str,
        now: DateTime<Utc>,
    ) -> Result<Fetch, ScopeError> {
        let window = TimeWindow::starting_at(now, self.key_lifetime)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let authority = self.authority.clone();
        let clock = self.clock.clone();
        let cache = Arc::downgrade(&self.entries);
        let name = account.to_string();

        let fetch = boxed(async move {
            info!(
                account = %name,
                start = %window.start(),
                expiry = %window.expiry(),
                "Requesting delegation key"
            );
            let outcome = match authority.request_delegation_key(&name, &window).await {
                Ok(key) => Ok(Arc::new(key)),
                Err(error) => {
                    warn!(account = %name, %error, "Delegation key request failed");
                    Err(error)
                }
            };
            settle(&cache, &name, generation, &outcome, clock.now());
            outcome
        })
        .shared();

        entries.insert(
            account.to_string(),
            Entry::Fetching {
                generation,
                window,
                fetch: fetch.clone(),
            },
        );
        Ok(fetch)
    }
}

/// Record the outcome of a request unless the entry has moved on since.
fn settle(
    cache: &Weak<Mutex<Entries>>,
    account: &str,
    generation: u64,
    outcome: &Outcome,
    now: DateTime<Utc>,
) {
    let Some(cache) = cache.upgrade() else {
        return;
    };
    let mut entries = cache.lock();
    let current = matches!(
        entries.get(account),
        Some(Entry::Fetching { generation: current, .. }) if *current == generation
    );
    if !current {
        return;
    }

    match outcome {
        Ok(key) if !key.is_expired_at(now) => {
            entries.insert(account.to_string(), Entry::Valid(key.clone()));
        }
        Ok(key) => {
            warn!(account, expiry = %key.signed_expiry(), "Discarding expired delegation key");
            entries.remove(account);
        }
        Err(_) => {
            entries.remove(account);
        }
    }
}

impl std::fmt::Debug for DelegationKeyBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationKeyBroker")
            .field("key_lifetime", &self.key_lifetime)
            .field("accounts", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlobPermission, SigningError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use futures_util::future::join_all;
    use sas_common::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use testresult::TestResult;
    use tokio::sync::Notify;

    struct TestAuthority {
        calls: AtomicUsize,
        gate: Option<Notify>,
        failure: Option<AuthorityError>,
        expired_responses: AtomicUsize,
    }

    impl TestAuthority {
        fn immediate() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                failure: None,
                expired_responses: AtomicUsize::new(0),
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::immediate()
            }
        }

        fn failing(self, failure: AuthorityError) -> Self {
            Self {
                failure: Some(failure),
                ..self
            }
        }

        /// Answer the next `count` requests with keys that expired an hour
        /// before the requested start.
        fn expired_for(self, count: usize) -> Self {
            Self {
                expired_responses: AtomicUsize::new(count),
                ..self
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }
    }

    #[async_trait]
    impl DelegationAuthority for TestAuthority {
        async fn request_delegation_key(
            &self,
            _account: &str,
            window: &TimeWindow,
        ) -> Result<DelegationKey, AuthorityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }

            let expired = self
                .expired_responses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            let window = if expired {
                TimeWindow::new(
                    window.start() - TimeDelta::hours(2),
                    window.start() - TimeDelta::hours(1),
                )
                .map_err(|error| AuthorityError::Unavailable(error.to_string()))?
            } else {
                *window
            };

            Ok(DelegationKey::new(window, b"delegated".to_vec())
                .with_object_id("oid")
                .with_tenant_id("tid"))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 7, 5, 48, 59).unwrap()
    }

    fn broker(authority: &Arc<TestAuthority>) -> DelegationKeyBroker {
        DelegationKeyBroker::new(authority.clone()).with_clock(ManualClock::new(start()))
    }

    async fn release_after_call(authority: &TestAuthority, call: usize) {
        while authority.calls() < call {
            tokio::task::yield_now().await;
        }
        authority.release();
    }

    #[tokio::test]
    async fn it_shares_one_fetch_between_concurrent_callers() -> TestResult {
        let authority = Arc::new(TestAuthority::gated());
        let broker = broker(&authority);

        let requests = join_all((0..10).map(|_| broker.delegation_key("acct")));
        let (results, _) = tokio::join!(requests, release_after_call(&authority, 1));

        assert_eq!(authority.calls(), 1);
        let keys = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        assert!(keys.iter().all(|key| Arc::ptr_eq(key, &keys[0])));
        assert_eq!(broker.status("acct"), KeyStatus::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn it_shares_one_failure_between_concurrent_callers() {
        let authority = Arc::new(
            TestAuthority::gated().failing(AuthorityError::Unavailable("timed out".into())),
        );
        let broker = broker(&authority);

        let requests = join_all((0..10).map(|_| broker.delegation_key("acct")));
        let (results, _) = tokio::join!(requests, release_after_call(&authority, 1));

        assert_eq!(authority.calls(), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                SasError::Authority(AuthorityError::Unavailable("timed out".into()))
            );
        }
        assert_eq!(broker.status("acct"), KeyStatus::Empty);
    }

    #[tokio::test]
    async fn it_fetches_again_after_a_failure() {
        let authority = Arc::new(
            TestAuthority::immediate().failing(AuthorityError::Denied("forbidden".into())),
        );
        let broker = broker(&authority);

        let first = broker.delegation_key("acct").await.unwrap_err();
        assert!(!first.is_retryable());
        assert!(broker.delegation_key("acct").await.is_err());

        assert_eq!(authority.calls(), 2);
    }

    #[tokio::test]
    async fn it_reuses_keys_until_they_expire() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate());
        let clock = ManualClock::new(start());
        let broker = DelegationKeyBroker::new(authority.clone()).with_clock(clock.clone());

        assert_eq!(broker.status("acct"), KeyStatus::Empty);
        let first = broker.delegation_key("acct").await?;
        assert_eq!(first.signed_start(), start());
        assert_eq!(first.signed_expiry(), start() + TimeDelta::minutes(5));

        clock.advance(TimeDelta::minutes(4));
        let reused = broker.delegation_key("acct").await?;
        assert!(Arc::ptr_eq(&first, &reused));
        assert_eq!(authority.calls(), 1);

        clock.advance(TimeDelta::minutes(1));
        assert_eq!(broker.status("acct"), KeyStatus::Expired);

        let refreshed = broker.delegation_key("acct").await?;
        assert_eq!(authority.calls(), 2);
        assert_eq!(refreshed.signed_start(), start() + TimeDelta::minutes(5));
        assert_eq!(broker.status("acct"), KeyStatus::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn it_caches_per_account() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate());
        let broker = broker(&authority);

        broker.delegation_key("first").await?;
        broker.delegation_key("second").await?;
        broker.delegation_key("first").await?;

        assert_eq!(authority.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn it_evicts_accounts() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate());
        let broker = broker(&authority);

        broker.delegation_key("acct").await?;
        broker.evict("acct");
        assert_eq!(broker.status("acct"), KeyStatus::Empty);

        broker.delegation_key("acct").await?;
        assert_eq!(authority.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn it_does_not_cache_fetches_evicted_in_flight() -> TestResult {
        let authority = Arc::new(TestAuthority::gated());
        let broker = broker(&authority);

        let evict_then_release = async {
            while authority.calls() == 0 {
                tokio::task::yield_now().await;
            }
            assert_eq!(broker.status("acct"), KeyStatus::Fetching);
            broker.evict("acct");
            authority.release();
        };
        let (key, _) = tokio::join!(broker.delegation_key("acct"), evict_then_release);

        key?;
        assert_eq!(broker.status("acct"), KeyStatus::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn it_completes_requests_after_every_caller_gives_up() -> TestResult {
        let authority = Arc::new(TestAuthority::gated());
        let broker = broker(&authority);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), broker.delegation_key("acct")).await;
        assert!(abandoned.is_err());
        assert_eq!(broker.status("acct"), KeyStatus::Fetching);

        authority.release();
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.status("acct") != KeyStatus::Valid {
                tokio::task::yield_now().await;
            }
        })
        .await?;

        let key = broker.delegation_key("acct").await?;
        assert_eq!(key.signed_start(), start());
        assert_eq!(authority.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_replaces_requests_whose_window_has_passed() -> TestResult {
        let authority = Arc::new(TestAuthority::gated());
        let clock = ManualClock::new(start());
        let broker = DelegationKeyBroker::new(authority.clone()).with_clock(clock.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), broker.delegation_key("acct")).await;
        assert!(abandoned.is_err());

        // The first request finishes only after its key has expired
        clock.advance(TimeDelta::minutes(10));
        authority.release();

        let (key, _) = tokio::join!(
            broker.delegation_key("acct"),
            release_after_call(&authority, 2)
        );
        let key = key?;

        assert!(!key.is_expired_at(clock.now()));
        assert_eq!(key.signed_start(), start() + TimeDelta::minutes(10));
        assert_eq!(authority.calls(), 2);
        assert_eq!(broker.status("acct"), KeyStatus::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn it_refetches_keys_that_arrive_expired() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate().expired_for(1));
        let broker = broker(&authority);

        let key = broker.delegation_key("acct").await?;

        assert_eq!(authority.calls(), 2);
        assert_eq!(key.signed_start(), start());
        assert!(!key.is_expired_at(start()));
        assert_eq!(broker.status("acct"), KeyStatus::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_authorities_that_only_issue_expired_keys() {
        let authority = Arc::new(TestAuthority::immediate().expired_for(usize::MAX));
        let broker = broker(&authority);

        let error = broker.delegation_key("acct").await.unwrap_err();

        assert!(matches!(
            error,
            SasError::Authority(AuthorityError::Unavailable(_))
        ));
        assert!(error.is_retryable());
        assert_eq!(authority.calls(), 2);
        assert_eq!(broker.status("acct"), KeyStatus::Empty);
    }

    #[tokio::test]
    async fn it_rejects_key_lifetimes_that_are_not_positive() {
        for lifetime in [TimeDelta::zero(), TimeDelta::minutes(-5)] {
            let broker = DelegationKeyBroker::new(Arc::new(TestAuthority::immediate()));
            assert_eq!(
                broker.with_key_lifetime(lifetime).unwrap_err(),
                ScopeError::NonPositiveLifetime(lifetime)
            );
        }
    }

    #[tokio::test]
    async fn it_rejects_key_lifetimes_over_a_week() {
        let broker = DelegationKeyBroker::new(Arc::new(TestAuthority::immediate()));

        assert!(matches!(
            broker.with_key_lifetime(TimeDelta::days(8)),
            Err(ScopeError::WindowTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn it_signs_scopes_inside_the_key_window() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate());
        let broker = DelegationKeyBroker::new(authority.clone())
            .with_clock(ManualClock::new(start()))
            .with_key_lifetime(TimeDelta::hours(6))?;
        let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5".parse()?;
        let scope = ResourceScope::blob("demo", "myfile.txt")
            .with_permission(BlobPermission::Read)
            .build(TimeWindow::starting_at(start(), TimeDelta::hours(5))?)?;

        let token = broker.sign(&account, &scope).await?;

        assert_eq!(token.get("skoid"), Some("oid"));
        assert_eq!(token.get("sktid"), Some("tid"));
        assert_eq!(token.get("sr"), Some("b"));
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_scopes_outliving_the_key() -> TestResult {
        let authority = Arc::new(TestAuthority::immediate());
        let broker = broker(&authority);
        let account: AccountIdentity = "AccountName=acct;AccountKey=a2V5".parse()?;
        let scope = ResourceScope::blob("demo", "myfile.txt")
            .with_permission(BlobPermission::Read)
            .build(TimeWindow::starting_at(start(), TimeDelta::hours(5))?)?;

        let error = broker.sign(&account, &scope).await.unwrap_err();

        assert!(matches!(
            error,
            SasError::Signing(SigningError::WindowNotCovered { .. })
        ));
        assert_eq!(authority.calls(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn it_shares_fetches_across_threads() -> TestResult {
        let authority = Arc::new(TestAuthority::gated());
        let broker = Arc::new(
            DelegationKeyBroker::new(authority.clone()).with_clock(ManualClock::new(start())),
        );

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let broker = broker.clone();
                tokio::spawn(async move { broker.delegation_key("acct").await })
            })
            .collect();

        release_after_call(&authority, 1).await;

        for task in tasks {
            task.await??;
        }
        assert_eq!(authority.calls(), 1);
        Ok(())
    }
}
