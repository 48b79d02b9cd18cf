//! Fault injection for stores and connectors.
//!
//! A [`FaultPlan`] is shared between the test and every store it governs,
//! so faults can be armed for stores the orchestrator opens internally.
//! Injected failures surface as [`StoreError::Injected`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let plan = FaultPlan::new();
//! plan.fail_statement(FaultRule::new("INSERT INTO profiles").with_param(SqlValue::text("p3")));
//! let connector = FaultyConnector::new(SqliteConnector::new(), pair.remote.clone(), plan.clone());
//! let report = SyncOrchestrator::new(pair.config(), connector).run_cycle();
//! ```

use parking_lot::Mutex;
use profilesync_store::{Connector, Endpoint, Row, SqlValue, Store, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Matches statements that should fail.
#[derive(Debug, Clone)]
pub struct FaultRule {
    sql_fragment: String,
    param: Option<SqlValue>,
    skip: usize,
    times: usize,
}

impl FaultRule {
    /// Fails every statement whose SQL contains `sql_fragment`.
    pub fn new(sql_fragment: impl Into<String>) -> Self {
        Self {
            sql_fragment: sql_fragment.into(),
            param: None,
            skip: 0,
            times: usize::MAX,
        }
    }

    /// Only match statements bound with `param`.
    pub fn with_param(mut self, param: SqlValue) -> Self {
        self.param = Some(param);
        self
    }

    /// Let the first `n` matching statements through.
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Fail at most `n` times, then stop matching.
    pub fn times(mut self, n: usize) -> Self {
        self.times = n;
        self
    }

    fn matches(&self, sql: &str, params: &[SqlValue]) -> bool {
        sql.contains(&self.sql_fragment)
            && self.param.as_ref().map_or(true, |p| params.contains(p))
    }
}

/// Faults armed for a set of stores.
#[derive(Debug, Default)]
pub struct FaultPlan {
    rules: Mutex<Vec<FaultRule>>,
    fail_commit: AtomicBool,
    fail_connect: AtomicBool,
    injected: AtomicUsize,
}

impl FaultPlan {
    /// Creates an empty plan.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arms a statement fault.
    pub fn fail_statement(&self, rule: FaultRule) {
        self.rules.lock().push(rule);
    }

    /// Makes every commit fail.
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Makes every connection attempt fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Disarms everything.
    pub fn reset(&self) {
        self.rules.lock().clear();
        self.fail_commit.store(false, Ordering::SeqCst);
        self.fail_connect.store(false, Ordering::SeqCst);
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check_statement(&self, sql: &str, params: &[SqlValue]) -> StoreResult<()> {
        let mut rules = self.rules.lock();
        for rule in rules.iter_mut() {
            if rule.times == 0 || !rule.matches(sql, params) {
                continue;
            }
            if rule.skip > 0 {
                rule.skip -= 1;
                continue;
            }
            rule.times -= 1;
            return Err(self.inject(format!("statement matching '{}'", rule.sql_fragment)));
        }
        Ok(())
    }

    fn check_flag(&self, flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(self.inject(what.to_string()));
        }
        Ok(())
    }

    fn inject(&self, what: String) -> StoreError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        StoreError::Injected(what)
    }
}

/// A store wrapper that fails according to a [`FaultPlan`].
pub struct FaultyStore<S> {
    inner: S,
    plan: Arc<FaultPlan>,
}

impl<S: Store> FaultyStore<S> {
    /// Wraps a store.
    pub fn new(inner: S, plan: Arc<FaultPlan>) -> Self {
        Self { inner, plan }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Store> Store for FaultyStore<S> {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<usize> {
        self.plan.check_statement(sql, params)?;
        self.inner.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<Vec<Row>> {
        self.plan.check_statement(sql, params)?;
        self.inner.query(sql, params)
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.plan.check_flag(&self.plan.fail_commit, "commit")?;
        self.inner.commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn close(self) -> StoreResult<()> {
        self.inner.close()
    }
}

/// A connector whose stores for one endpoint follow a [`FaultPlan`].
///
/// Stores for any other endpoint get an empty plan and behave normally.
pub struct FaultyConnector<C> {
    inner: C,
    target: Endpoint,
    plan: Arc<FaultPlan>,
}

impl<C: Connector> FaultyConnector<C> {
    /// Wraps `inner`, injecting faults into stores opened for `target`.
    pub fn new(inner: C, target: Endpoint, plan: Arc<FaultPlan>) -> Self {
        Self {
            inner,
            target,
            plan,
        }
    }
}

impl<C: Connector> Connector for FaultyConnector<C> {
    type Store = FaultyStore<C::Store>;

    fn connect(&self, endpoint: &Endpoint) -> StoreResult<Self::Store> {
        if *endpoint != self.target {
            return Ok(FaultyStore::new(self.inner.connect(endpoint)?, FaultPlan::new()));
        }
        self.plan.check_flag(&self.plan.fail_connect, "connect")?;
        Ok(FaultyStore::new(self.inner.connect(endpoint)?, Arc::clone(&self.plan)))
    }
}
