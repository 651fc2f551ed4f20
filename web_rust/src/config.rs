use clap::Parser;
use std::fmt;
use std::path::PathBuf;

/// An opaque credential passed through to the OCR worker
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for the worker invocation only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "ocr-upload-server", version, about = "Upload an image, get OCR JSON back")]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3002)]
    pub port: u16,

    /// Directory for transient upload files
    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Directory holding `index.html` and other static assets
    #[arg(long, env = "STATIC_DIR", default_value = ".")]
    pub static_dir: PathBuf,

    /// Executable that runs the OCR worker
    #[arg(long, env = "OCR_WORKER_PROGRAM", default_value = "python")]
    pub worker_program: String,

    /// Arguments placed before the image path, e.g. the script name
    #[arg(
        long = "worker-arg",
        env = "OCR_WORKER_ARGS",
        value_delimiter = ' ',
        default_value = "OCR.py"
    )]
    pub worker_args: Vec<String>,

    /// OCR provider key, handed to the worker as its second argument
    #[arg(long, env = "HYPERBOLIC_API_KEY", hide_env_values = true)]
    pub hyperbolic_api_key: Secret,

    /// Model routing provider key, handed to the worker as its third argument
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Secret,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted_in_debug_and_display() {
        let secret = Secret::new("sk-live-abcdef");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "sk-live-abcdef");
    }

    #[test]
    fn parses_flags_with_defaults() {
        let config = Config::try_parse_from([
            "ocr-upload-server",
            "--hyperbolic-api-key",
            "hyp",
            "--openrouter-api-key",
            "ork",
        ])
        .unwrap();

        assert_eq!(config.port, 3002);
        assert_eq!(config.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(config.worker_program, "python");
        assert_eq!(config.worker_args, vec!["OCR.py".to_string()]);
        assert_eq!(config.hyperbolic_api_key.expose(), "hyp");
        assert_eq!(config.openrouter_api_key.expose(), "ork");
        assert_eq!(config.bind_addr(), "0.0.0.0:3002");
    }

    #[test]
    fn repeated_worker_args_keep_order() {
        let config = Config::try_parse_from([
            "ocr-upload-server",
            "--worker-program",
            "uv",
            "--worker-arg",
            "run",
            "--worker-arg",
            "OCR.py",
            "--hyperbolic-api-key",
            "a",
            "--openrouter-api-key",
            "b",
        ])
        .unwrap();

        assert_eq!(config.worker_program, "uv");
        assert_eq!(config.worker_args, vec!["run".to_string(), "OCR.py".to_string()]);
    }

    #[test]
    fn debug_output_hides_keys() {
        let config = Config::try_parse_from([
            "ocr-upload-server",
            "--hyperbolic-api-key",
            "very-secret-1",
            "--openrouter-api-key",
            "very-secret-2",
        ])
        .unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret-1"));
        assert!(!rendered.contains("very-secret-2"));
    }
}
