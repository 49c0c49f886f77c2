//! CLI argument parsing for the GPU allocation exporter

use std::path::PathBuf;

use clap::Parser;

/// GPU Allocation Exporter - per-container GPU allocation metrics for Prometheus
#[derive(Debug, Parser)]
#[command(name = "gpu-alloc-exporter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/gpu-alloc-exporter/config.yaml")]
    pub config: PathBuf,

    /// Metrics port (overrides config)
    #[arg(long, env = "EXPORTER_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "GPU_ALLOC_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "GPU_ALLOC_LOG_JSON")]
    pub log_json: bool,

    /// Run a single collection cycle, print the allocation table and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["gpu-alloc-exporter"]).unwrap();
        assert_eq!(
            cli.config.to_str().unwrap(),
            "/etc/gpu-alloc-exporter/config.yaml"
        );
        assert_eq!(cli.log_level, "info");
        assert!(!cli.log_json);
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_custom_config() {
        let cli = Cli::try_parse_from(["gpu-alloc-exporter", "-c", "/custom/config.yaml"]).unwrap();
        assert_eq!(cli.config.to_str().unwrap(), "/custom/config.yaml");
    }

    #[test]
    fn test_cli_port() {
        let cli = Cli::try_parse_from(["gpu-alloc-exporter", "--port", "9100"]).unwrap();
        assert_eq!(cli.port, Some(9100));

        assert!(Cli::try_parse_from(["gpu-alloc-exporter", "--port", "not-a-port"]).is_err());
    }

    #[test]
    fn test_cli_port_reads_exporter_port_env() {
        let command = Cli::command();
        let port = command
            .get_arguments()
            .find(|arg| arg.get_id() == "port")
            .unwrap();
        assert_eq!(port.get_env(), Some(OsStr::new("EXPORTER_PORT")));
    }

    #[test]
    fn test_cli_once() {
        let cli = Cli::try_parse_from(["gpu-alloc-exporter", "--once"]).unwrap();
        assert!(cli.once);
    }
}
