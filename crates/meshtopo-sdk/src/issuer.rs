//! Certificate issuance for resolved instances.
//!
//! Every instance gets its own certificate graph; all graphs share
//! one [`Executor`], one var store, and one state index, and run
//! concurrently.

use std::sync::Arc;

use meshtopo_certs::executor::{Executor, ExecutorOptions, GraphReport};
use meshtopo_certs::graph::CertGraph;
use meshtopo_certs::runner::GeneratorRunner;
use meshtopo_certs::store::FsVarStore;
use meshtopo_common::config::MeshtopoConfig;
use meshtopo_common::error::{MeshtopoError, Result};
use meshtopo_topology::resolver::ResolvedInstance;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Name of the fingerprint index inside the store directory.
pub const STATE_FILE: &str = "state.json";

/// Issues certificates for resolved instances.
#[derive(Debug)]
pub struct Issuer<R> {
    executor: Executor<R>,
    tool: String,
}

impl<R: GeneratorRunner> Issuer<R> {
    /// Creates an issuer storing vars under `config.store_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing state index cannot be read.
    pub fn new(
        runner: R,
        config: &MeshtopoConfig,
        regenerate: bool,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<Self> {
        let store = Arc::new(FsVarStore::new(&config.store_dir));
        let options = ExecutorOptions {
            regenerate,
            state_path: Some(config.store_dir.join(STATE_FILE)),
            cancel,
        };
        Ok(Self {
            executor: Executor::new(runner, store, options)?,
            tool: config.cert_tool.clone(),
        })
    }

    /// The underlying executor.
    #[must_use]
    pub const fn executor(&self) -> &Executor<R> {
        &self.executor
    }

    /// Executes the certificate graph of every given instance.
    ///
    /// Reports come back in instance order.
    ///
    /// # Errors
    ///
    /// Returns the first error that stopped a graph from executing at all.
    /// Generator failures are part of the reports instead.
    pub async fn issue<'a>(
        &self,
        instances: impl IntoIterator<Item = &'a ResolvedInstance>,
    ) -> Result<Vec<GraphReport>> {
        let mut tasks = JoinSet::new();
        for instance in instances {
            let graph = CertGraph::for_instance(instance, &self.tool);
            let executor = self.executor.clone();
            let _ = tasks.spawn(async move { executor.execute(&graph).await });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let report = joined.map_err(|e| MeshtopoError::Generator {
                generator: "certificate graph".into(),
                message: e.to_string(),
            })??;
            reports.push(report);
        }
        reports.sort_by(|a, b| a.instance.cmp(&b.instance));
        Ok(reports)
    }
}
