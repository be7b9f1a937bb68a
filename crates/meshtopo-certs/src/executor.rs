//! Memoized execution of certificate graphs.
//!
//! Every generator is evaluated at most once per [`Executor`], no matter how
//! many callers request it or how concurrently they do so. The CA generator
//! completes before any node generator leaves `Pending`; node generators
//! then run in parallel. A failed CA fails every node without running it,
//! while a failed node only affects itself.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_common::types::{GeneratorState, InstanceName};
use serde::Serialize;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinSet;

use crate::generator::{self, GeneratorId, GeneratorSpec};
use crate::graph::CertGraph;
use crate::runner::{GeneratedFiles, GeneratorInputs, GeneratorRunner};
use crate::state::StateIndex;
use crate::store::VarStore;

/// Options controlling one executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Ignore recorded fingerprints and run every generator.
    pub regenerate: bool,
    /// Where the fingerprint index is persisted; in memory only when `None`.
    pub state_path: Option<PathBuf>,
    /// Becomes `true` when execution should be aborted.
    pub cancel: Option<watch::Receiver<bool>>,
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Generator that changed state.
    pub generator: GeneratorId,
    /// Previous state.
    pub from: GeneratorState,
    /// New state.
    pub to: GeneratorState,
}

/// Final state of one generator after an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorReport {
    /// Terminal state, or `pending` if the generator was never reached.
    pub state: GeneratorState,
    /// Whether the runner was invoked, as opposed to reusing stored outputs.
    pub ran: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of executing one instance's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    /// Owning instance.
    pub instance: InstanceName,
    /// Per-generator outcome.
    pub generators: BTreeMap<GeneratorId, GeneratorReport>,
}

impl GraphReport {
    /// Returns `true` if every generator is done.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.generators
            .values()
            .all(|g| g.state == GeneratorState::Done)
    }

    /// Generators that failed.
    pub fn failures(&self) -> impl Iterator<Item = (&GeneratorId, &GeneratorReport)> {
        self.generators
            .iter()
            .filter(|(_, g)| g.state == GeneratorState::Failed)
    }
}

#[derive(Debug)]
struct Completed {
    /// Digest of the public outputs; dependents fingerprint against it.
    digest: String,
    files: Arc<GeneratedFiles>,
    ran: bool,
}

type Outcome = std::result::Result<Arc<Completed>, Arc<MeshtopoError>>;

#[derive(Debug, Default)]
struct Tracker {
    states: HashMap<GeneratorId, GeneratorState>,
    transitions: Vec<Transition>,
}

impl Tracker {
    fn register(&mut self, id: &GeneratorId) {
        let _ = self
            .states
            .entry(id.clone())
            .or_insert(GeneratorState::Pending);
    }

    fn advance(&mut self, id: &GeneratorId, to: GeneratorState) {
        let from = *self
            .states
            .entry(id.clone())
            .or_insert(GeneratorState::Pending);
        if from.is_terminal() {
            tracing::warn!(generator = %id, %from, %to, "ignoring transition out of terminal state");
            return;
        }
        let _ = self.states.insert(id.clone(), to);
        self.transitions.push(Transition {
            generator: id.clone(),
            from,
            to,
        });
    }
}

struct Inner<R> {
    runner: R,
    store: Arc<dyn VarStore>,
    regenerate: bool,
    state_path: Option<PathBuf>,
    cancel: Option<watch::Receiver<bool>>,
    index: Mutex<StateIndex>,
    tracker: Mutex<Tracker>,
    cells: Mutex<HashMap<GeneratorId, Arc<OnceCell<Outcome>>>>,
}

/// Runs certificate graphs against a runner and a var store.
pub struct Executor<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Executor<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for Executor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("regenerate", &self.inner.regenerate)
            .field("state_path", &self.inner.state_path)
            .finish_non_exhaustive()
    }
}

/// Resolves once `rx` reports cancellation; never resolves if the sender is gone.
async fn cancelled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|cancel| *cancel).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl<R: GeneratorRunner> Executor<R> {
    /// Creates an executor, loading the fingerprint index if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing index cannot be read.
    pub fn new(runner: R, store: Arc<dyn VarStore>, options: ExecutorOptions) -> Result<Self> {
        let index = match &options.state_path {
            Some(path) => StateIndex::load(path)?,
            None => StateIndex::default(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                runner,
                store,
                regenerate: options.regenerate,
                state_path: options.state_path,
                cancel: options.cancel,
                index: Mutex::new(index),
                tracker: Mutex::new(Tracker::default()),
                cells: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Executes an instance's graph and reports every generator's outcome.
    ///
    /// Generator failures are reported, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is malformed or the fingerprint index
    /// cannot be saved.
    pub async fn execute(&self, graph: &CertGraph) -> Result<GraphReport> {
        graph.verify()?;
        {
            let mut tracker = self.tracker();
            for spec in graph.specs() {
                tracker.register(&spec.id);
            }
        }
        tracing::info!(instance = %graph.instance(), generators = graph.len(), "executing certificate graph");

        let ca_spec = graph.ca();
        match self.ensure(ca_spec, GeneratorInputs::new(), Vec::new()).await {
            Ok(ca) => {
                let mut tasks = JoinSet::new();
                for spec in graph.nodes() {
                    let executor = self.clone();
                    let spec = spec.clone();
                    let mut inputs = GeneratorInputs::new();
                    let _ = inputs.insert(ca_spec.id.name.clone(), Arc::clone(&ca.files));
                    let dependency_fingerprints = vec![ca.digest.clone()];
                    let _ = tasks.spawn(async move {
                        let _ = executor
                            .ensure(&spec, inputs, dependency_fingerprints)
                            .await;
                    });
                }
                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "generator task aborted");
                    }
                }
            }
            Err(e) => {
                tracing::error!(generator = %ca_spec.id, error = %e, "CA failed, skipping node certificates");
                for spec in graph.nodes() {
                    self.block(spec, &ca_spec.id).await;
                }
            }
        }

        self.save_state()?;
        let report = self.report(graph);
        tracing::info!(
            instance = %graph.instance(),
            success = report.is_success(),
            "certificate graph finished"
        );
        Ok(report)
    }

    /// Current state of a generator, if it has been seen.
    #[must_use]
    pub fn state_of(&self, id: &GeneratorId) -> Option<GeneratorState> {
        self.tracker().states.get(id).copied()
    }

    /// Every state change so far, in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<Transition> {
        self.tracker().transitions.clone()
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, Tracker> {
        self.inner
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, id: &GeneratorId, to: GeneratorState) {
        self.tracker().advance(id, to);
    }

    fn cell(&self, id: &GeneratorId) -> Arc<OnceCell<Outcome>> {
        let mut cells = self
            .inner
            .cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(id.clone()).or_default())
    }

    fn is_cancelled(&self) -> bool {
        self.inner
            .cancel
            .as_ref()
            .is_some_and(|rx| *rx.borrow())
    }

    async fn ensure(
        &self,
        spec: &GeneratorSpec,
        inputs: GeneratorInputs,
        dependency_fingerprints: Vec<String>,
    ) -> Outcome {
        self.cell(&spec.id)
            .get_or_init(|| self.produce(spec, inputs, dependency_fingerprints))
            .await
            .clone()
    }

    /// Marks a generator failed because a dependency failed.
    async fn block(&self, spec: &GeneratorSpec, dependency: &GeneratorId) {
        let _ = self
            .cell(&spec.id)
            .get_or_init(|| async {
                self.advance(&spec.id, GeneratorState::Failed);
                Err(Arc::new(MeshtopoError::Generator {
                    generator: spec.id.to_string(),
                    message: format!("dependency {dependency} failed"),
                }))
            })
            .await;
    }

    async fn produce(
        &self,
        spec: &GeneratorSpec,
        inputs: GeneratorInputs,
        dependency_fingerprints: Vec<String>,
    ) -> Outcome {
        let fingerprint = generator::fingerprint(spec, &dependency_fingerprints);
        match self.produce_inner(spec, &inputs, fingerprint).await {
            Ok(done) => {
                self.advance(&spec.id, GeneratorState::Done);
                tracing::info!(generator = %spec.id, ran = done.ran, "generator done");
                Ok(Arc::new(done))
            }
            Err(e) => {
                self.advance(&spec.id, GeneratorState::Failed);
                tracing::error!(generator = %spec.id, error = %e, "generator failed");
                Err(Arc::new(e))
            }
        }
    }

    async fn produce_inner(
        &self,
        spec: &GeneratorSpec,
        inputs: &GeneratorInputs,
        fingerprint: String,
    ) -> Result<Completed> {
        let cancelled_err = || MeshtopoError::Cancelled {
            generator: spec.id.to_string(),
        };
        if self.is_cancelled() {
            return Err(cancelled_err());
        }

        if !self.inner.regenerate {
            if let Some(files) = self.load_stored(spec, &fingerprint)? {
                tracing::debug!(generator = %spec.id, "outputs up to date");
                return Ok(Completed {
                    digest: generator::content_digest(spec, &files),
                    files: Arc::new(files),
                    ran: false,
                });
            }
        }

        self.advance(&spec.id, GeneratorState::Running);
        tracing::info!(generator = %spec.id, tool = %spec.runtime_tool, "running generator");
        let run = self.inner.runner.run(spec, inputs);
        let files = match self.inner.cancel.clone() {
            Some(rx) => tokio::select! {
                result = run => result?,
                () = cancelled(rx) => return Err(cancelled_err()),
            },
            None => run.await?,
        };

        if self.is_cancelled() {
            return Err(cancelled_err());
        }
        self.persist(spec, &files)?;
        self.inner
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&spec.id, fingerprint);

        Ok(Completed {
            digest: generator::content_digest(spec, &files),
            files: Arc::new(files),
            ran: true,
        })
    }

    /// Stored outputs, if they were produced under `fingerprint` and are all present.
    fn load_stored(&self, spec: &GeneratorSpec, fingerprint: &str) -> Result<Option<GeneratedFiles>> {
        let recorded = self
            .inner
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fingerprint(&spec.id)
            .map(str::to_owned);
        if recorded.as_deref() != Some(fingerprint) {
            return Ok(None);
        }
        let store = &self.inner.store;
        if !spec
            .outputs
            .iter()
            .all(|o| store.exists(&spec.id, &o.name, o.secret))
        {
            return Ok(None);
        }
        let mut files = GeneratedFiles::new();
        for output in &spec.outputs {
            match self.inner.store.get(&spec.id, &output.name, output.secret)? {
                Some(content) => {
                    let _ = files.insert(output.name.clone(), content);
                }
                None => return Ok(None),
            }
        }
        Ok(Some(files))
    }

    fn persist(&self, spec: &GeneratorSpec, files: &GeneratedFiles) -> Result<()> {
        for output in &spec.outputs {
            let content = files.get(&output.name).ok_or_else(|| MeshtopoError::Generator {
                generator: spec.id.to_string(),
                message: format!("runner did not produce {}", output.name),
            })?;
            self.inner
                .store
                .set(&spec.id, &output.name, output.secret, content)?;
        }
        Ok(())
    }

    fn save_state(&self) -> Result<()> {
        let Some(path) = &self.inner.state_path else {
            return Ok(());
        };
        self.inner
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save(path)
    }

    fn report(&self, graph: &CertGraph) -> GraphReport {
        let generators = graph
            .specs()
            .map(|spec| {
                let state = self.state_of(&spec.id).unwrap_or(GeneratorState::Pending);
                let cell = self.cell(&spec.id);
                let (ran, error) = match cell.get() {
                    Some(Ok(done)) => (done.ran, None),
                    Some(Err(e)) => (false, Some(e.to_string())),
                    None => (false, None),
                };
                (spec.id.clone(), GeneratorReport { state, ran, error })
            })
            .collect();
        GraphReport {
            instance: graph.instance().clone(),
            generators,
        }
    }
}
