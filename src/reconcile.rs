use std::fmt::Display;
use std::time::Instant;

use crate::api::{AaaaRecord, DEFAULT_TTL, DnsRecord, RecordStore};
use crate::error::{Error, Failure};
use crate::resolver::AddressResolver;

/// What a run ended up doing to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The record already pointed at the current address.
    Unchanged,
    Created,
    Updated,
    /// A write was needed but skipped because this is a dry run.
    DryRun(Change),
}

/// A write the reconciler decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Create,
    Update,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Unchanged => f.write_str("record already up to date"),
            Outcome::Created => f.write_str("record created"),
            Outcome::Updated => f.write_str("record updated"),
            Outcome::DryRun(Change::Create) => f.write_str("record would have been created (dry run)"),
            Outcome::DryRun(Change::Update) => f.write_str("record would have been updated (dry run)"),
        }
    }
}

/// The decision made by comparing the listed records against the desired address.
#[derive(Debug, PartialEq, Eq)]
enum Plan<'r> {
    Create,
    Update(&'r DnsRecord),
    Keep(&'r DnsRecord),
}

/// Finds the AAAA record for `hostname` and decides what, if anything, needs to be written.
///
/// Only the first matching record is considered. There should never be more than one, but if there are, the extras
/// are reported and otherwise left alone.
fn plan<'r>(records: &'r [DnsRecord], hostname: &str, desired: &str) -> Plan<'r> {
    let mut matches = records.iter().filter(|rec| rec.is_aaaa_for(hostname));

    let Some(current) = matches.next() else {
        return Plan::Create;
    };

    let extra = matches.count();
    if extra > 0 {
        log::warn!(
            hostname = hostname, duplicates = extra;
            "Found {extra} more AAAA record(s) for {hostname}; only the first (id {}) will be managed",
            current.id.as_deref().unwrap_or("unknown"),
        );
    }

    // Plain text comparison: "2001:db8::1" and "2001:0db8::1" count as different and cause an update.
    if current.address.as_deref() == Some(desired) {
        Plan::Keep(current)
    } else {
        Plan::Update(current)
    }
}

/// Runs one network call, logging when it starts and how it went. No retries: the result is handed straight back.
async fn attempt<T>(what: &str, op: impl Future<Output = Result<T, Failure>>) -> Result<T, Failure> {
    log::debug!("Attempting to {what}...");
    let started = Instant::now();
    let res = op.await;

    match &res {
        Ok(_) => log::trace!("Finished {what} in {:.2?}", started.elapsed()),
        Err(err) => log::debug!("Could not {what} after {:.2?}: {err}", started.elapsed()),
    }

    res
}

/// Keeps a single AAAA record in line with this machine's public address.
pub struct Reconciler<R, S> {
    resolver: R,
    store: S,
    domain: String,
    ttl: u32,
    dry_run: bool,
}

impl<R: AddressResolver, S: RecordStore> Reconciler<R, S> {
    pub fn new(resolver: R, store: S, domain: &str) -> Self {
        Self {
            resolver,
            store,
            domain: domain.to_string(),
            ttl: DEFAULT_TTL,
            dry_run: false,
        }
    }

    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Makes sure the AAAA record for `hostname` points at the current public IPv6 address.
    ///
    /// Resolves the address, lists the domain's records, and writes at most once. Any failure stops the run right
    /// there; since the write is the last step, a failed run never leaves a partial change behind.
    pub async fn reconcile(&self, hostname: &str) -> Result<Outcome, Error> {
        let desired = attempt("resolve public IPv6 address", self.resolver.resolve_public_ipv6())
            .await
            .map_err(Error::Resolution)?;
        log::info!(address = desired.as_str(); "Got IPv6 address: {desired}");

        let domain = &self.domain[..];
        let records = attempt("list DNS records", self.store.list_records(domain))
            .await
            .map_err(|source| Error::List {
                domain: domain.to_string(),
                source,
            })?;
        log::debug!("Got {} existing record(s) for {domain}", records.len());

        let (change, existing_id) = match plan(&records, hostname, &desired) {
            Plan::Keep(current) => {
                log::info!(
                    hostname = hostname, record_id = current.id.as_deref().unwrap_or("");
                    "AAAA record for {hostname} already points at {desired}, nothing to do",
                );
                if let Some(ttl) = current.ttl.filter(|&ttl| ttl != self.ttl) {
                    log::debug!("Record TTL is {ttl}s instead of {}s; left alone since the address matches", self.ttl);
                }
                return Ok(Outcome::Unchanged);
            },
            Plan::Update(current) => {
                let id = current.id.as_deref().unwrap_or("unknown");
                let old = current.address.as_deref().unwrap_or("<none>");
                log::info!(
                    hostname = hostname, record_id = id;
                    "Found existing AAAA record {id} for {hostname} with address {old}; will update to {desired}",
                );
                if current.id.is_none() {
                    log::warn!("Existing record for {hostname} has no id; Spaceship will have to match it by name");
                }
                (Change::Update, current.id.clone())
            },
            Plan::Create => {
                log::info!(hostname = hostname; "No AAAA record found for {hostname}; will create one");
                (Change::Create, None)
            },
        };

        let record = AaaaRecord::new(hostname, &desired, self.ttl).with_id(existing_id);

        if self.dry_run {
            log::info!("(DRY RUN) Skipped writing {record:?}");
            return Ok(Outcome::DryRun(change));
        }

        attempt("write AAAA record", self.store.upsert_aaaa_record(domain, &record))
            .await
            .map_err(|source| Error::Upsert {
                name: hostname.to_string(),
                source,
            })?;

        let outcome = match change {
            Change::Create => Outcome::Created,
            Change::Update => Outcome::Updated,
        };
        log::info!(hostname = hostname, address = desired.as_str(); "AAAA record for {hostname}: {outcome}");
        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use std::cell::{Cell, RefCell};

    use reqwest::StatusCode;

    use super::*;

    const DOMAIN: &str = "example.com";

    fn server_error() -> Failure {
        Failure::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        }
    }

    fn record(typ: &str, name: &str, address: &str, id: &str) -> DnsRecord {
        DnsRecord {
            id: Some(id.to_string()),
            typ: typ.to_string(),
            name: name.to_string(),
            address: Some(address.to_string()),
            ttl: Some(1800),
        }
    }

    /// Hands out a fixed address (or fails), counting how often it was asked.
    struct FakeResolver {
        address: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl FakeResolver {
        fn returning(address: &'static str) -> Self {
            Self {
                address: Some(address),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                address: None,
                calls: Cell::new(0),
            }
        }
    }

    impl AddressResolver for &FakeResolver {
        async fn resolve_public_ipv6(&self) -> Result<String, Failure> {
            self.calls.set(self.calls.get() + 1);
            self.address.map(str::to_string).ok_or_else(server_error)
        }
    }

    /// An in-memory record store that applies writes the way Spaceship does: replace by id, otherwise append.
    #[derive(Default)]
    struct FakeStore {
        records: RefCell<Vec<DnsRecord>>,
        writes: RefCell<Vec<AaaaRecord>>,
        list_calls: Cell<usize>,
        fail_list: bool,
        fail_upsert: bool,
    }

    impl FakeStore {
        fn with(records: Vec<DnsRecord>) -> Self {
            Self {
                records: RefCell::new(records),
                ..Default::default()
            }
        }
    }

    impl RecordStore for &FakeStore {
        async fn list_records(&self, domain: &str) -> Result<Vec<DnsRecord>, Failure> {
            assert_eq!(domain, DOMAIN);
            self.list_calls.set(self.list_calls.get() + 1);
            if self.fail_list {
                return Err(server_error());
            }
            Ok(self.records.borrow().clone())
        }

        async fn upsert_aaaa_record(&self, domain: &str, record: &AaaaRecord) -> Result<(), Failure> {
            assert_eq!(domain, DOMAIN);
            self.writes.borrow_mut().push(record.clone());
            if self.fail_upsert {
                return Err(server_error());
            }

            let mut records = self.records.borrow_mut();
            let written = DnsRecord {
                id: record.id.clone().or_else(|| Some(format!("new{}", records.len()))),
                typ: record.typ.to_string(),
                name: record.name.clone(),
                address: Some(record.address.clone()),
                ttl: Some(record.ttl),
            };
            match records.iter_mut().find(|rec| rec.id == written.id) {
                Some(existing) => *existing = written,
                None => records.push(written),
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_record_is_created_without_id() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![]);

        let outcome = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(*store.writes.borrow(), vec![AaaaRecord::new("node1", "2001:db8::1", DEFAULT_TTL)]);
    }

    #[tokio::test]
    async fn changed_address_updates_in_place() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![record("AAAA", "node1", "2001:db8::0", "rec1")]);

        let outcome = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap();

        assert_eq!(outcome, Outcome::Updated);
        let writes = store.writes.borrow();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].id.as_deref(), Some("rec1"));
        assert_eq!(writes[0].address, "2001:db8::1");
        assert_eq!(writes[0].name, "node1");
        assert_eq!(writes[0].typ, "AAAA");
    }

    #[tokio::test]
    async fn matching_address_writes_nothing() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let mut existing = record("AAAA", "node1", "2001:db8::1", "rec1");
        existing.ttl = None;
        let store = FakeStore::with(vec![existing]);

        let outcome = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(store.writes.borrow().is_empty());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![record("A", "node1", "192.0.2.1", "rec0")]);
        let reconciler = Reconciler::new(&resolver, &store, DOMAIN);

        assert_eq!(reconciler.reconcile("node1").await.unwrap(), Outcome::Created);
        assert_eq!(reconciler.reconcile("node1").await.unwrap(), Outcome::Unchanged);
        assert_eq!(store.writes.borrow().len(), 1);
        assert_eq!(store.records.borrow().len(), 2, "no duplicate record should have been added");
    }

    #[tokio::test]
    async fn resolution_failure_stops_before_listing() {
        let resolver = FakeResolver::failing();
        let store = FakeStore::with(vec![]);

        let err = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap_err();

        assert!(matches!(err, Error::Resolution(_)), "got {err:?}");
        assert_eq!(resolver.calls.get(), 1);
        assert_eq!(store.list_calls.get(), 0);
        assert!(store.writes.borrow().is_empty());
    }

    #[tokio::test]
    async fn list_failure_writes_nothing() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore {
            fail_list: true,
            ..Default::default()
        };

        let err = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap_err();

        assert!(matches!(err, Error::List { ref domain, .. } if domain == DOMAIN), "got {err:?}");
        assert!(store.writes.borrow().is_empty());
    }

    #[tokio::test]
    async fn upsert_failure_is_reported_once() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore {
            fail_upsert: true,
            ..Default::default()
        };

        let err = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap_err();

        assert!(matches!(err, Error::Upsert { ref name, .. } if name == "node1"), "got {err:?}");
        assert_eq!(store.writes.borrow().len(), 1, "the write is attempted exactly once");
    }

    #[tokio::test]
    async fn unrelated_records_are_ignored() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![
            record("A", "node1", "192.0.2.1", "rec1"),
            record("AAAA", "node2", "2001:db8::1", "rec2"),
            record("AAAA", "Node1", "2001:db8::1", "rec3"),
        ]);

        let outcome = Reconciler::new(&resolver, &store, DOMAIN).reconcile("node1").await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(store.writes.borrow()[0].id, None);
    }

    #[tokio::test]
    async fn configured_ttl_is_written() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![]);

        Reconciler::new(&resolver, &store, DOMAIN)
            .ttl(300)
            .reconcile("node1")
            .await
            .unwrap();

        assert_eq!(store.writes.borrow()[0].ttl, 300);
    }

    #[tokio::test]
    async fn dry_run_reports_change_without_writing() {
        let resolver = FakeResolver::returning("2001:db8::1");
        let store = FakeStore::with(vec![record("AAAA", "node1", "2001:db8::0", "rec1")]);

        let outcome = Reconciler::new(&resolver, &store, DOMAIN)
            .dry_run(true)
            .reconcile("node1")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::DryRun(Change::Update));
        assert!(store.writes.borrow().is_empty());
    }

    #[test]
    fn first_duplicate_wins() {
        let records = vec![
            record("AAAA", "node1", "2001:db8::5", "first"),
            record("AAAA", "node1", "2001:db8::1", "second"),
        ];

        assert_eq!(plan(&records, "node1", "2001:db8::1"), Plan::Update(&records[0]));
        assert_eq!(plan(&records, "node1", "2001:db8::5"), Plan::Keep(&records[0]));
    }

    #[test]
    fn addresses_compare_as_text() {
        let records = vec![record("AAAA", "node1", "2001:0db8::1", "rec1")];
        assert_eq!(plan(&records, "node1", "2001:db8::1"), Plan::Update(&records[0]));
    }

    #[test]
    fn record_without_address_is_updated() {
        let mut existing = record("AAAA", "node1", "", "rec1");
        existing.address = None;
        let records = vec![existing];
        assert_eq!(plan(&records, "node1", "2001:db8::1"), Plan::Update(&records[0]));
    }
}
