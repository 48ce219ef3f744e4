use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ProcessingError, SeparatedTracks, Separator};
use crate::config::SeparatorConfig;

const STDERR_TAIL_BYTES: usize = 2048;

/// Runs Demucs (or a CLI-compatible tool) as a child process
///
/// Invocation: `<program> <args..> --out <out_dir> --mp3 -n <model> <input>`.
/// Output lands in `<out_dir>/<model>/<input stem>/<track>.mp3`. The child
/// is killed if the future is dropped, which is how the worker's processing
/// timeout stops a runaway separation.
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    program: String,
    args: Vec<String>,
    model: String,
    tracks: Vec<String>,
}

impl DemucsSeparator {
    pub fn new(config: &SeparatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
            tracks: config.tracks.clone(),
        }
    }
}

#[async_trait]
impl Separator for DemucsSeparator {
    fn tracks(&self) -> &[String] {
        &self.tracks
    }

    async fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<SeparatedTracks, ProcessingError> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ProcessingError::InvalidInput(input.display().to_string()))?;

        info!(program = %self.program, model = %self.model, input = %input.display(), "Running separator");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--out")
            .arg(out_dir)
            .arg("--mp3")
            .arg("-n")
            .arg(&self.model)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProcessingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            warn!(status = %output.status, %stderr, "Separator failed");
            return Err(ProcessingError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let track_dir = out_dir.join(&self.model).join(stem);
        debug!(dir = %track_dir.display(), "Separator finished");

        Ok(self
            .tracks
            .iter()
            .map(|track| (track.clone(), track_dir.join(format!("{track}.mp3"))))
            .collect())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(program: &str, args: &[&str]) -> SeparatorConfig {
        SeparatorConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    // Positional args seen by the script: $2 = out dir, $5 = model, $6 = input
    const FAKE_DEMUCS: &str = r#"
dir="$2/$5/$(basename "$6" .mp3)"
mkdir -p "$dir"
for t in vocals drums bass other; do printf '%s' "$t" > "$dir/$t.mp3"; done
"#;

    #[tokio::test]
    async fn test_output_layout() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("abc123.mp3");
        std::fs::write(&input, b"mp3").unwrap();
        let out_dir = temp_dir.path().join("out");

        let separator = DemucsSeparator::new(&config("sh", &["-c", FAKE_DEMUCS, "sh"]));
        let tracks = separator.separate(&input, &out_dir).await.unwrap();

        assert_eq!(tracks.len(), 4);
        let vocals = &tracks["vocals"];
        assert_eq!(*vocals, out_dir.join("mdx_extra_q/abc123/vocals.mp3"));
        assert_eq!(std::fs::read(vocals).unwrap(), b"vocals");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("abc123.mp3");

        let separator =
            DemucsSeparator::new(&config("sh", &["-c", "echo model missing >&2; exit 3", "sh"]));
        let err = separator.separate(&input, temp_dir.path()).await.unwrap_err();

        match err {
            ProcessingError::Failed { stderr, .. } => assert_eq!(stderr, "model missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("abc123.mp3");

        let separator = DemucsSeparator::new(&config("/nonexistent/demucs", &[]));
        let err = separator.separate(&input, temp_dir.path()).await.unwrap_err();

        assert!(matches!(err, ProcessingError::Spawn { .. }));
        assert_eq!(err.kind(), "ProcessingFailure");
    }
}
