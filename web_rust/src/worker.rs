use serde_json::value::RawValue;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Secret;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("worker launch failed: {0}")]
    Launch(#[source] std::io::Error),

    #[error(
        "worker failed with code {}: {}",
        .code.map_or_else(|| "none".to_string(), |c| c.to_string()),
        .stderr.trim()
    )]
    Failed { code: Option<i32>, stderr: String },

    #[error("malformed worker output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

/// How to launch the OCR worker: `<program> <args...> <image> <key_a> <key_b>`
#[derive(Debug, Clone)]
pub struct Worker {
    program: String,
    args: Vec<String>,
}

impl Worker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the worker on `image_path` and return its stdout JSON exactly as printed
    pub async fn dispatch(
        &self,
        image_path: &Path,
        key_a: &Secret,
        key_b: &Secret,
    ) -> Result<Box<RawValue>, DispatchError> {
        tracing::debug!(
            program = %self.program,
            image = %image_path.display(),
            "Launching OCR worker"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .arg(key_a.expose())
            .arg(key_b.expose())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(DispatchError::Launch)?;

        if !output.status.success() {
            return Err(DispatchError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Worker {
        Worker::new("sh", vec!["-c".into(), script.into(), "worker".into()])
    }

    fn keys() -> (Secret, Secret) {
        (Secret::new("key-a"), Secret::new("key-b"))
    }

    #[tokio::test]
    async fn parses_stdout_on_success() {
        let (a, b) = keys();
        let raw = sh(r#"printf '{"text":"hello"}'"#)
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap();

        assert_eq!(raw.get(), r#"{"text":"hello"}"#);
    }

    #[tokio::test]
    async fn passes_path_and_keys_positionally() {
        let (a, b) = keys();
        let raw = sh(r#"printf '["%s","%s","%s"]' "$1" "$2" "$3""#)
            .dispatch(Path::new("/tmp/x.jpg"), &a, &b)
            .await
            .unwrap();

        assert_eq!(raw.get(), r#"["/tmp/x.jpg","key-a","key-b"]"#);
    }

    #[tokio::test]
    async fn stderr_is_ignored_on_success() {
        let (a, b) = keys();
        let raw = sh(r#"echo 'deprecation warning' >&2; printf '{"ok":true}'"#)
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap();

        assert_eq!(raw.get(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn output_text_is_kept_as_written() {
        let (a, b) = keys();
        let raw = sh(r#"echo '{"question":"Q","answer":"A","big":12345678901234567890123}'"#)
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap();

        assert_eq!(
            raw.get(),
            r#"{"question":"Q","answer":"A","big":12345678901234567890123}"#
        );
    }

    #[tokio::test]
    async fn nonzero_exit_reports_code_and_stderr() {
        let (a, b) = keys();
        let err = sh("echo 'auth failed' >&2; exit 1")
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap_err();

        match &err {
            DispatchError::Failed { code, stderr } => {
                assert_eq!(*code, Some(1));
                assert_eq!(stderr.trim(), "auth failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "worker failed with code 1: auth failed");
    }

    #[tokio::test]
    async fn invalid_json_is_malformed_output() {
        let (a, b) = keys();
        let err = sh("echo 'Error: Max retries reached'")
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MalformedOutput(_)));
        assert!(err.to_string().starts_with("malformed worker output: "));
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let (a, b) = keys();
        let err = Worker::new("/nonexistent/ocr-worker", Vec::new())
            .dispatch(Path::new("img.png"), &a, &b)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Launch(_)));
        assert!(err.to_string().starts_with("worker launch failed: "));
    }
}
