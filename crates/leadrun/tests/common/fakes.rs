//! Scripted collaborators.
//!
//! Faults are keyed by position and fire once, so a resumed run sees a
//! healthy provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use leadrun::checkpoint::{Checkpoint, CheckpointStore, SqliteCheckpointStore};
use leadrun::db::{lead_repo, Database, DatabaseError};
use leadrun::job::{JobParams, Language};
use leadrun::lead::{Lead, OutreachDraft};
use leadrun::providers::{CandidateSource, CandidateStream, Enricher, OutreachDrafter};
use leadrun::{Candidate, Enrichment, Progress, ProgressReporter, ProviderError, Stage};
use leadrun::{StopReason, StopSignal};

/// What happens when a scripted position is reached.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The provider rejects the request with a rate limit.
    Transient,
    /// The provider rejects the credentials.
    Permanent,
    /// The process dies mid-item.
    Panic,
    /// A stop is requested while the item is handed out.
    Stop(StopReason),
}

/// Blocks providers until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

/// Candidate source replaying a fixed, stable sequence.
pub struct ScriptedSource {
    items: Vec<Result<Candidate, ProviderError>>,
    faults: Mutex<HashMap<usize, Fault>>,
    signal: Mutex<Option<Arc<StopSignal>>>,
    gate: Mutex<Option<Arc<Gate>>>,
    fetches: Mutex<Vec<usize>>,
    pulled: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(items: Vec<Result<Candidate, ProviderError>>) -> Self {
        Self {
            items,
            faults: Mutex::new(HashMap::new()),
            signal: Mutex::new(None),
            gate: Mutex::new(None),
            fetches: Mutex::new(Vec::new()),
            pulled: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn fault_at(&self, index: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(index, fault);
    }

    /// Signal that `Fault::Stop` requests on.
    pub fn attach_signal(&self, signal: Arc<StopSignal>) {
        *self.signal.lock().unwrap() = Some(signal);
    }

    /// Every pull waits for `gate`.
    pub fn hold_on(&self, gate: Arc<Gate>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    /// Start indexes of every fetch so far.
    pub fn fetches(&self) -> Vec<usize> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

impl CandidateSource for ScriptedSource {
    fn fetch(
        &self,
        _query: &str,
        _params: &JobParams,
        start_index: usize,
    ) -> Result<CandidateStream<'_>, ProviderError> {
        self.fetches.lock().unwrap().push(start_index);
        Ok(Box::new(ScriptedStream {
            source: self,
            index: start_index,
        }))
    }
}

struct ScriptedStream<'a> {
    source: &'a ScriptedSource,
    index: usize,
}

impl Iterator for ScriptedStream<'_> {
    type Item = Result<Candidate, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        let item = self.source.items.get(index)?.clone();

        let gate = self.source.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait();
        }

        let fault = self.source.faults.lock().unwrap().remove(&index);
        match fault {
            Some(Fault::Transient) => {
                return Some(Err(ProviderError::rate_limited("quota exhausted")));
            }
            Some(Fault::Permanent) => {
                return Some(Err(ProviderError::permanent("invalid api key")));
            }
            Some(Fault::Panic) => panic!("provider connection lost at candidate {}", index),
            Some(Fault::Stop(reason)) => {
                let signal = self.source.signal.lock().unwrap().clone();
                if let Some(signal) = signal {
                    signal.request(reason);
                }
            }
            None => {}
        }

        self.index += 1;
        self.source.pulled.fetch_add(1, Ordering::SeqCst);
        Some(item)
    }
}

/// Enricher deriving contact details from the lead name.
#[derive(Default)]
pub struct FakeEnricher {
    faults: Mutex<HashMap<usize, Fault>>,
    calls: AtomicUsize,
    per_lead: Mutex<HashMap<String, usize>>,
    malformed_for: Mutex<Vec<String>>,
}

impl FakeEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault on the `call`-th enrich call of this enricher, counted from 0.
    pub fn fault_at_call(&self, call: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(call, fault);
    }

    /// Answers garbage for the lead named `name`.
    pub fn malformed_for(&self, name: &str) {
        self.malformed_for.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls made for a single lead.
    pub fn max_calls_per_lead(&self) -> usize {
        self.per_lead
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl Enricher for FakeEnricher {
    fn enrich(&self, lead: &Lead) -> Result<Enrichment, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults.lock().unwrap().remove(&call);
        match fault {
            Some(Fault::Transient) => return Err(ProviderError::transient("enrichment timed out")),
            Some(Fault::Permanent) => return Err(ProviderError::permanent("account suspended")),
            Some(Fault::Panic) => panic!("enricher crashed on call {}", call),
            Some(Fault::Stop(_)) | None => {}
        }

        *self
            .per_lead
            .lock()
            .unwrap()
            .entry(lead.id.clone())
            .or_default() += 1;

        if self.malformed_for.lock().unwrap().contains(&lead.name) {
            return Err(ProviderError::malformed("unparseable profile page"));
        }

        let slug: String = lead
            .name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        Ok(Enrichment {
            email: Some(format!("hello@{}.example", slug)),
            owner_name: Some(format!("Owner of {}", lead.name)),
            instagram: Some(format!("https://instagram.com/{}", slug)),
            website_reachable: Some(true),
            ..Default::default()
        })
    }
}

/// Drafter echoing the job context.
#[derive(Default)]
pub struct FakeDrafter {
    faults: Mutex<HashMap<usize, Fault>>,
    calls: AtomicUsize,
    per_lead: Mutex<HashMap<String, usize>>,
}

impl FakeDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault on the `call`-th draft call of this drafter, counted from 0.
    pub fn fault_at_call(&self, call: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(call, fault);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most answered calls for a single lead.
    pub fn max_calls_per_lead(&self) -> usize {
        self.per_lead
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl OutreachDrafter for FakeDrafter {
    fn draft(
        &self,
        lead: &Lead,
        context: Option<&str>,
        language: Language,
    ) -> Result<OutreachDraft, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults.lock().unwrap().remove(&call);
        match fault {
            Some(Fault::Transient) => return Err(ProviderError::rate_limited("model overloaded")),
            Some(Fault::Permanent) => return Err(ProviderError::permanent("model access revoked")),
            Some(Fault::Panic) => panic!("drafter crashed on call {}", call),
            Some(Fault::Stop(_)) | None => {}
        }

        *self
            .per_lead
            .lock()
            .unwrap()
            .entry(lead.id.clone())
            .or_default() += 1;

        let greeting = match language {
            Language::En => "Hi",
            Language::Id => "Halo",
        };
        Ok(OutreachDraft {
            channel: "whatsapp".to_string(),
            subject: None,
            message: format!("{} {}! {}", greeting, lead.name, context.unwrap_or_default()),
        })
    }
}

/// Reporter keeping every update.
#[derive(Default)]
pub struct RecordingReporter {
    updates: Mutex<Vec<Progress>>,
}

impl RecordingReporter {
    pub fn updates(&self) -> Vec<Progress> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, progress: &Progress) {
        self.updates.lock().unwrap().push(progress.clone());
    }
}

/// Checkpoint store that verifies, on every save, that each claimed item's
/// effect is already persisted.
pub struct ClaimCheckingStore {
    inner: SqliteCheckpointStore,
    db: Database,
    user_id: Mutex<String>,
    violations: Mutex<Vec<String>>,
    saves: AtomicUsize,
}

impl ClaimCheckingStore {
    pub fn new(db: Database) -> Self {
        Self {
            inner: SqliteCheckpointStore::new(db.clone()),
            db,
            user_id: Mutex::new("user-1".to_string()),
            violations: Mutex::new(Vec::new()),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn set_user(&self, user_id: &str) {
        *self.user_id.lock().unwrap() = user_id.to_string();
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self, job_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
        let user_id = self.user_id.lock().unwrap().clone();
        let leads = lead_repo::list_for_job(&self.db, job_id)?;
        let mut violations = Vec::new();

        if checkpoint.stage == Stage::Discover {
            for id in &checkpoint.processed_ids {
                let stored = if let Some(place_id) = id.strip_prefix("place:") {
                    lead_repo::has_place_id(&self.db, &user_id, place_id)?
                } else if let Some(phone) = id.strip_prefix("phone:") {
                    lead_repo::has_phone(&self.db, &user_id, phone)?
                } else if let Some(index) = id.strip_prefix("index:") {
                    match index.parse::<usize>() {
                        Ok(index) => lead_repo::exists_at(&self.db, job_id, index)?,
                        Err(_) => false,
                    }
                } else {
                    true
                };
                if !stored {
                    violations.push(format!("{} claimed before its lead was stored", id));
                }
            }
        }
        if checkpoint.stage == Stage::Score {
            for lead in &leads {
                let claimed = checkpoint.contains(&format!("lead:{}", lead.id));
                if claimed && lead.score.is_none() {
                    violations.push(format!("lead {} claimed before it was scored", lead.name));
                }
            }
        }
        if checkpoint.stage == Stage::Outreach {
            for lead in leads.iter().filter(|l| l.qualified) {
                let claimed = checkpoint.contains(&format!("lead:{}", lead.id));
                if claimed && lead.outreach.is_none() {
                    violations.push(format!("lead {} claimed before its draft was stored", lead.name));
                }
            }
        }

        self.violations.lock().unwrap().extend(violations);
        Ok(())
    }
}

impl CheckpointStore for ClaimCheckingStore {
    fn load(&self, job_id: &str) -> Result<Option<Checkpoint>, DatabaseError> {
        self.inner.load(job_id)
    }

    fn save(&self, job_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
        self.check(job_id, checkpoint)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(job_id, checkpoint)
    }

    fn clear(&self, job_id: &str) -> Result<(), DatabaseError> {
        self.inner.clear(job_id)
    }
}
