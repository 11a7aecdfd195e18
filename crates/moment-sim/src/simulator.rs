//! Randomised simulation of the optimistic controllers
//!
//! Drives batches of inserts and toggles against the in-memory store with
//! random failure injection, lets every batch settle, then checks that the
//! local view agrees with the store:
//! - no id appears twice in a thread
//! - no temporary id survives settlement (rolled-back entries are gone)
//! - every thread lists exactly the stored rows, and its counter matches
//! - every toggle equals the store's relation rows
//! - refusals happen exactly for blank or oversized bodies and signed-out users

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use moment_core::thread::validate_body;
use moment_core::{
    EntityId, Identity, InMemoryRemote, MomentConfig, MutationAction, MutationController,
    MutationError, Relation, RemoteError, Session, Submission, ThreadRef, ToggleState, UserId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

const WORDS: &[&str] = &[
    "sunset", "nice", "shot", "love", "this", "wow", "colors", "light", "city", "again",
];

const OTHER_USERS: &[&str] = &["u2", "u3", "u4", "u5"];

const MAX_BATCH: u64 = 8;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulatorConfig {
    /// Random seed for reproducibility
    pub(crate) seed: u64,
    /// Total user actions to drive
    pub(crate) actions: u64,
    /// Probability that a remote call is failed on purpose
    pub(crate) failure_rate: f64,
    /// Number of comment threads
    pub(crate) threads: usize,
    /// Number of toggleable relations
    pub(crate) relations: usize,
    /// Stop after the first batch that produced a violation
    pub(crate) stop_on_first_violation: bool,
    /// Controller and store settings
    pub(crate) moment: MomentConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            actions: 1000,
            failure_rate: 0.2,
            threads: 4,
            relations: 6,
            stop_on_first_violation: false,
            moment: MomentConfig::default(),
        }
    }
}

/// A violation detected after a batch settled
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Violation {
    /// The same id is listed twice
    DuplicateId { thread: ThreadRef, id: EntityId },
    /// A temporary id is still listed after its write settled
    UnresolvedEntry { thread: ThreadRef, id: EntityId },
    /// An entry whose insert failed is still listed
    RolledBackEntryVisible { thread: ThreadRef, id: EntityId },
    /// Local ids differ from the stored rows
    ListDiverged {
        thread: ThreadRef,
        local: usize,
        stored: usize,
    },
    /// Comment counter differs from the stored row count
    CommentCountMismatch {
        thread: ThreadRef,
        local: u64,
        stored: u64,
    },
    /// Toggle state differs from the stored relation rows
    ToggleDiverged {
        relation: Relation,
        local: ToggleState,
        stored: ToggleState,
    },
    /// A valid action was refused
    UnexpectedRefusal {
        action: MutationAction,
        error: String,
    },
    /// An action that should have been refused was accepted
    UnexpectedAcceptance { action: MutationAction },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct SimulatorStats {
    pub(crate) batches: u64,
    pub(crate) inserts_submitted: u64,
    pub(crate) inserts_confirmed: u64,
    pub(crate) inserts_rolled_back: u64,
    pub(crate) inserts_refused: u64,
    pub(crate) toggles_submitted: u64,
    pub(crate) toggles_ignored: u64,
    pub(crate) toggles_confirmed: u64,
    pub(crate) toggles_reverted: u64,
    pub(crate) auth_probes: u64,
    pub(crate) remounts: u64,
    pub(crate) injected_failures: u64,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulatorReport {
    pub(crate) config: SimulatorConfig,
    pub(crate) stats: SimulatorStats,
    pub(crate) violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    pub(crate) fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    pub(crate) fn generate_text(&self) -> String {
        let s = &self.stats;
        let mut report = String::new();

        report.push_str("=== moment Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Failure Rate: {}\n", self.config.failure_rate));
        report.push_str(&format!("Batches: {}\n", s.batches));
        report.push_str(&format!("Inserts Submitted: {}\n", s.inserts_submitted));
        report.push_str(&format!("Inserts Confirmed: {}\n", s.inserts_confirmed));
        report.push_str(&format!("Inserts Rolled Back: {}\n", s.inserts_rolled_back));
        report.push_str(&format!("Inserts Refused: {}\n", s.inserts_refused));
        report.push_str(&format!("Toggles Submitted: {}\n", s.toggles_submitted));
        report.push_str(&format!("Toggles Ignored (in flight): {}\n", s.toggles_ignored));
        report.push_str(&format!("Toggles Confirmed: {}\n", s.toggles_confirmed));
        report.push_str(&format!("Toggles Reverted: {}\n", s.toggles_reverted));
        report.push_str(&format!("Auth Probes: {}\n", s.auth_probes));
        report.push_str(&format!("Remounts: {}\n", s.remounts));
        report.push_str(&format!("Injected Failures: {}\n", s.injected_failures));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

enum Settled {
    Insert {
        temp_id: EntityId,
        result: Result<EntityId, MutationError>,
    },
    Toggle(Result<ToggleState, MutationError>),
}

struct World {
    me: Identity,
    remote: Arc<InMemoryRemote>,
    controller: MutationController,
    threads: Vec<ThreadRef>,
    relations: Vec<Relation>,
    rolled_back: HashSet<EntityId>,
    stats: SimulatorStats,
    violations: Vec<Violation>,
}

/// Run the simulator
pub(crate) async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let failure_rate = if (0.0..=1.0).contains(&config.failure_rate) {
        config.failure_rate
    } else {
        0.0
    };

    let mut world = World::new(&config, &mut rng);
    tracing::info!(
        seed = config.seed,
        actions = config.actions,
        threads = world.threads.len(),
        relations = world.relations.len(),
        "starting simulation"
    );

    let mut remaining = config.actions;
    while remaining > 0 {
        let batch = rng.gen_range(1..=MAX_BATCH).min(remaining);
        remaining -= batch;
        world.stats.batches += 1;

        let mut in_flight: Vec<BoxFuture<'static, Settled>> = Vec::new();
        let mut unmounted: Vec<ThreadRef> = Vec::new();

        for _ in 0..batch {
            if rng.gen_bool(failure_rate) {
                world.remote.fail_next(random_error(&mut rng));
                world.stats.injected_failures += 1;
            }
            match rng.gen_range(0..100) {
                0..=2 => world.auth_probe(&mut rng, &mut in_flight),
                3..=5 => {
                    if let Some(thread) = world.threads.choose(&mut rng).cloned() {
                        world.controller.unmount(&thread);
                        unmounted.push(thread);
                    }
                }
                roll => {
                    if let Some(action) = world.random_action(&mut rng, roll < 50) {
                        world.submit(action, &mut in_flight);
                    }
                }
            }
        }

        for settled in join_all(in_flight).await {
            world.record(settled);
        }
        for thread in unmounted {
            world
                .controller
                .mount(thread.clone(), world.remote.comments(&thread));
            world.stats.remounts += 1;
        }

        let before = world.violations.len();
        world.check();
        if world.violations.len() > before {
            tracing::warn!(
                batch = world.stats.batches,
                new = world.violations.len() - before,
                "invariant violated"
            );
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    tracing::info!(
        batches = world.stats.batches,
        violations = world.violations.len(),
        "simulation finished"
    );

    SimulatorReport {
        config,
        stats: world.stats,
        violations: world.violations,
    }
}

impl World {
    fn new(config: &SimulatorConfig, rng: &mut StdRng) -> Self {
        let me = Identity::new("sim-user").with_username("sim");
        let remote = Arc::new(InMemoryRemote::from_config(
            Session::signed_in(me.clone()),
            &config.moment.memory,
        ));
        remote.set_profile(&me);
        let controller = MutationController::with_config(remote.clone(), config.moment.clone());

        let threads: Vec<ThreadRef> = (0..config.threads)
            .map(|i| {
                if i % 2 == 0 {
                    ThreadRef::photo(format!("p{i}"))
                } else {
                    ThreadRef::community_post(format!("cp{i}"))
                }
            })
            .collect();
        for thread in &threads {
            for _ in 0..rng.gen_range(0..3) {
                let author = UserId::new(*OTHER_USERS.choose(rng).unwrap_or(&"u2"));
                remote.seed_comment(thread, &author, &random_body(rng));
            }
            controller.mount(thread.clone(), remote.comments(thread));
        }

        let relations: Vec<Relation> = (0..config.relations)
            .map(|i| match i % 4 {
                0 => Relation::photo_like(format!("p{i}")),
                1 => Relation::post_like(format!("cp{i}")),
                2 => Relation::follow(format!("u{}", i + 10)),
                _ => Relation::membership(format!("c{i}")),
            })
            .collect();
        for relation in &relations {
            for other in OTHER_USERS {
                if rng.gen_bool(0.5) {
                    remote.seed_relation(relation, &UserId::new(*other));
                }
            }
            controller
                .toggles()
                .seed(relation.clone(), false, remote.relation_count(relation));
        }

        Self {
            me,
            remote,
            controller,
            threads,
            relations,
            rolled_back: HashSet::new(),
            stats: SimulatorStats::default(),
            violations: Vec::new(),
        }
    }

    fn random_action(&self, rng: &mut StdRng, insert: bool) -> Option<MutationAction> {
        if insert {
            if let Some(thread) = self.threads.choose(rng) {
                return Some(MutationAction::comment(thread.clone(), random_body(rng)));
            }
        }
        self.relations
            .choose(rng)
            .map(|relation| MutationAction::toggle(relation.clone()))
    }

    fn submit(&mut self, action: MutationAction, in_flight: &mut Vec<BoxFuture<'static, Settled>>) {
        let expect_refusal = match &action {
            MutationAction::Insert { body, .. } => {
                validate_body(body, self.controller.config().max_body_chars).is_err()
            }
            MutationAction::Toggle { .. } => false,
        };

        match self.controller.submit(action.clone()) {
            Ok(submission) => {
                if expect_refusal {
                    self.violations
                        .push(Violation::UnexpectedAcceptance { action });
                }
                self.track(submission, in_flight);
            }
            Err(err) if expect_refusal && err.is_local() => {
                self.stats.inserts_refused += 1;
            }
            Err(err) => self.violations.push(Violation::UnexpectedRefusal {
                action,
                error: err.to_string(),
            }),
        }
    }

    /// Submit while signed out; only the refusal is acceptable
    fn auth_probe(&mut self, rng: &mut StdRng, in_flight: &mut Vec<BoxFuture<'static, Settled>>) {
        let Some(relation) = self.relations.choose(rng).cloned() else {
            return;
        };
        self.stats.auth_probes += 1;
        let session = self.remote.session().clone();
        session.sign_out();

        let action = MutationAction::toggle(relation);
        match self.controller.submit(action.clone()) {
            Err(MutationError::Unauthenticated) => {}
            // A relation with a write in flight is ignored before auth is checked
            Ok(Submission::Toggle(outcome)) if outcome.is_ignored() => {
                self.stats.toggles_ignored += 1;
            }
            Err(err) => self.violations.push(Violation::UnexpectedRefusal {
                action,
                error: err.to_string(),
            }),
            Ok(submission) => {
                self.violations
                    .push(Violation::UnexpectedAcceptance { action });
                self.track(submission, in_flight);
            }
        }

        session.sign_in(self.me.clone());
    }

    fn track(&mut self, submission: Submission, in_flight: &mut Vec<BoxFuture<'static, Settled>>) {
        match submission {
            Submission::Insert { pending, .. } => {
                self.stats.inserts_submitted += 1;
                let temp_id = pending.temp_id().clone();
                in_flight.push(
                    async move {
                        let result = pending.settle().await;
                        Settled::Insert { temp_id, result }
                    }
                    .boxed(),
                );
            }
            Submission::Toggle(outcome) => {
                self.stats.toggles_submitted += 1;
                match outcome.into_pending() {
                    Some(pending) => {
                        in_flight.push(async move { Settled::Toggle(pending.settle().await) }.boxed());
                    }
                    None => self.stats.toggles_ignored += 1,
                }
            }
        }
    }

    fn record(&mut self, settled: Settled) {
        match settled {
            Settled::Insert { result: Ok(_), .. } => self.stats.inserts_confirmed += 1,
            Settled::Insert {
                temp_id,
                result: Err(err),
            } => {
                tracing::debug!(%temp_id, error = %err, "insert rolled back");
                self.rolled_back.insert(temp_id);
                self.stats.inserts_rolled_back += 1;
            }
            Settled::Toggle(Ok(_)) => self.stats.toggles_confirmed += 1,
            Settled::Toggle(Err(err)) => {
                tracing::debug!(error = %err, "toggle reverted");
                self.stats.toggles_reverted += 1;
            }
        }
    }

    fn check(&mut self) {
        for thread in &self.threads {
            let list = self.controller.thread(thread);
            let ids = list.ids();

            let mut seen = HashSet::new();
            for id in &ids {
                if !seen.insert(id.clone()) {
                    self.violations.push(Violation::DuplicateId {
                        thread: thread.clone(),
                        id: id.clone(),
                    });
                }
                if id.is_temporary() {
                    let violation = if self.rolled_back.contains(id) {
                        Violation::RolledBackEntryVisible {
                            thread: thread.clone(),
                            id: id.clone(),
                        }
                    } else {
                        Violation::UnresolvedEntry {
                            thread: thread.clone(),
                            id: id.clone(),
                        }
                    };
                    self.violations.push(violation);
                }
            }

            let stored: HashSet<EntityId> = self
                .remote
                .comments(thread)
                .into_iter()
                .map(|row| EntityId::canonical(row.id))
                .collect();
            if seen != stored {
                self.violations.push(Violation::ListDiverged {
                    thread: thread.clone(),
                    local: ids.len(),
                    stored: stored.len(),
                });
            }
            if list.comment_count() != stored.len() as u64 {
                self.violations.push(Violation::CommentCountMismatch {
                    thread: thread.clone(),
                    local: list.comment_count(),
                    stored: stored.len() as u64,
                });
            }
        }

        for relation in &self.relations {
            let local = self.controller.toggles().state(relation);
            let stored = ToggleState::new(
                self.remote.has_relation(relation, &self.me.id),
                self.remote.relation_count(relation),
            );
            if local != stored {
                self.violations.push(Violation::ToggleDiverged {
                    relation: relation.clone(),
                    local,
                    stored,
                });
            }
        }
    }
}

fn random_body(rng: &mut StdRng) -> String {
    match rng.gen_range(0..100) {
        0..=4 => " ".repeat(rng.gen_range(0..4)),
        5..=6 => WORDS.repeat(40).join(" "),
        _ => {
            let len = rng.gen_range(1..=6);
            (0..len)
                .filter_map(|_| WORDS.choose(rng).copied())
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

fn random_error(rng: &mut StdRng) -> RemoteError {
    match rng.gen_range(0..3) {
        0 => RemoteError::new("network request failed"),
        1 => RemoteError::new("new row violates row-level security policy").with_code("42501"),
        _ => RemoteError::new("canceling statement due to statement timeout").with_code("57014"),
    }
}
