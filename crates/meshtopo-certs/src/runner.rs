//! Generator runners.
//!
//! A runner turns a [`GeneratorSpec`] plus its dependencies' outputs into the
//! spec's declared output files. [`CommandRunner`] does this by running the
//! spec's script against the external certificate tool in a scratch
//! directory.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use meshtopo_common::error::{MeshtopoError, Result};

use crate::generator::GeneratorSpec;

/// Output files of one generator, keyed by file name.
pub type GeneratedFiles = BTreeMap<String, Vec<u8>>;

/// Outputs of a generator's dependencies, keyed by dependency generator name.
pub type GeneratorInputs = BTreeMap<String, Arc<GeneratedFiles>>;

/// Produces the outputs of a generator.
pub trait GeneratorRunner: Send + Sync + 'static {
    /// Runs the generator and returns every declared output.
    ///
    /// # Errors
    ///
    /// Returns [`MeshtopoError::Generator`] if the outputs cannot be produced.
    fn run(
        &self,
        spec: &GeneratorSpec,
        inputs: &GeneratorInputs,
    ) -> impl Future<Output = Result<GeneratedFiles>> + Send;
}

/// Runs generator scripts with `sh`, exposing `$in` and `$out` directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl CommandRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn failure(spec: &GeneratorSpec, message: impl Into<String>) -> MeshtopoError {
    MeshtopoError::Generator {
        generator: spec.id.to_string(),
        message: message.into(),
    }
}

async fn write_inputs(spec: &GeneratorSpec, dir: &Path, inputs: &GeneratorInputs) -> Result<()> {
    for (dependency, files) in inputs {
        let dep_dir = dir.join(dependency);
        tokio::fs::create_dir_all(&dep_dir)
            .await
            .map_err(|e| failure(spec, format!("cannot prepare inputs: {e}")))?;
        for (name, content) in files.iter() {
            tokio::fs::write(dep_dir.join(name), content)
                .await
                .map_err(|e| failure(spec, format!("cannot write input {dependency}/{name}: {e}")))?;
        }
    }
    Ok(())
}

impl GeneratorRunner for CommandRunner {
    async fn run(&self, spec: &GeneratorSpec, inputs: &GeneratorInputs) -> Result<GeneratedFiles> {
        let tool = which::which(&spec.runtime_tool).map_err(|e| {
            failure(spec, format!("runtime tool {} not available: {e}", spec.runtime_tool))
        })?;
        tracing::debug!(generator = %spec.id, tool = %tool.display(), "running generator script");

        let scratch =
            tempfile::tempdir().map_err(|e| failure(spec, format!("cannot create scratch dir: {e}")))?;
        let in_dir = scratch.path().join("in");
        let out_dir = scratch.path().join("out");
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| failure(spec, format!("cannot prepare outputs: {e}")))?;
        write_inputs(spec, &in_dir, inputs).await?;

        let output = tokio::process::Command::new("sh")
            .args(["-eu", "-c", &spec.script])
            .env("in", &in_dir)
            .env("out", &out_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| failure(spec, format!("cannot spawn shell: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(
                spec,
                format!("script exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let mut files = GeneratedFiles::new();
        for declared in &spec.outputs {
            let content = tokio::fs::read(out_dir.join(&declared.name))
                .await
                .map_err(|e| failure(spec, format!("missing output {}: {e}", declared.name)))?;
            let _ = files.insert(declared.name.clone(), content);
        }
        Ok(files)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use meshtopo_common::types::InstanceName;

    use super::*;
    use crate::generator;

    fn scripted(script: &str) -> GeneratorSpec {
        let mut spec = generator::ca_generator(&InstanceName::new("mesh"), "sh");
        spec.script = script.to_string();
        spec
    }

    #[tokio::test]
    async fn collects_declared_outputs() {
        let spec = scripted(r#"printf CERT > "$out/ca.crt"; printf KEY > "$out/ca.key""#);
        let files = CommandRunner::new()
            .run(&spec, &GeneratorInputs::new())
            .await
            .expect("run");
        assert_eq!(files["ca.crt"], b"CERT");
        assert_eq!(files["ca.key"], b"KEY");
    }

    #[tokio::test]
    async fn exposes_dependency_outputs_under_in() {
        let spec = scripted(r#"cp "$in/dep/ca.crt" "$out/ca.crt"; printf KEY > "$out/ca.key""#);
        let mut dep = GeneratedFiles::new();
        let _ = dep.insert("ca.crt".into(), b"FROM-DEP".to_vec());
        let mut inputs = GeneratorInputs::new();
        let _ = inputs.insert("dep".into(), Arc::new(dep));

        let files = CommandRunner::new().run(&spec, &inputs).await.expect("run");
        assert_eq!(files["ca.crt"], b"FROM-DEP");
    }

    #[tokio::test]
    async fn missing_output_is_a_failure() {
        let spec = scripted(r#"printf CERT > "$out/ca.crt""#);
        let err = CommandRunner::new()
            .run(&spec, &GeneratorInputs::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing output ca.key"), "got: {err}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let spec = scripted("echo boom >&2; exit 3");
        let err = CommandRunner::new()
            .run(&spec, &GeneratorInputs::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"), "got: {err}");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure() {
        let mut spec = scripted("true");
        spec.runtime_tool = "meshtopo-no-such-tool".into();
        let err = CommandRunner::new()
            .run(&spec, &GeneratorInputs::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not available"), "got: {err}");
    }
}
