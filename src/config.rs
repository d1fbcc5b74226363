use crate::error::OsaError;
use crate::osa::{ConnectionConfig, DecodePolicy, OsaClientBuilder};
use crate::session::SessionConfig;
use crate::types::{Sensitivity, SweepMode, SweepRequest, SweepSpeed};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub instrument: InstrumentConfig,
    pub protocol: ProtocolConfig,
    pub sweep: SweepConfig,
    pub acquisition: AcquisitionConfig,
    pub output: OutputConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Silence that ends a response
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProtocolConfig {
    pub settle_delay_ms: u64,
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub decode_policy: DecodePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SweepConfig {
    pub start_nm: f64,
    pub stop_nm: f64,
    pub resolution_nm: Option<f64>,
    pub sensitivity: Sensitivity,
    pub speed: SweepSpeed,
    pub mode: SweepMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub required_iterations: usize,
    pub inter_iteration_delay_ms: u64,
    pub max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub folder: String,
    pub file_suffix: String,
    pub plot: bool,
    /// Write a JSON record of every iteration next to the traces
    pub acquisition_log: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "168.176.118.23".to_string(),
            port: 10001,
            connect_timeout_secs: 20,
            read_timeout_secs: 20,
            write_timeout_secs: 5,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 200,
            chunk_size: 4096,
            chunk_delay_ms: 0,
            decode_policy: DecodePolicy::Ignore,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_nm: 600.0,
            stop_nm: 1100.0,
            resolution_nm: None,
            sensitivity: Sensitivity::default(),
            speed: SweepSpeed::default(),
            mode: SweepMode::default(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            required_iterations: 50,
            inter_iteration_delay_ms: 100,
            max_consecutive_failures: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder: "./data".to_string(),
            file_suffix: String::new(),
            plot: false,
            acquisition_log: true,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<(), OsaError> {
        let invalid = |msg: String| Err(OsaError::InvalidRequest(msg));

        if self.instrument.host.trim().is_empty() {
            return invalid("instrument.host must not be empty".to_string());
        }
        if self.instrument.port == 0 {
            return invalid("instrument.port must be non-zero".to_string());
        }
        if self.instrument.connect_timeout_secs == 0
            || self.instrument.read_timeout_secs == 0
            || self.instrument.write_timeout_secs == 0
        {
            return invalid("instrument timeouts must be at least one second".to_string());
        }
        if self.protocol.chunk_size == 0 {
            return invalid("protocol.chunk_size must be positive".to_string());
        }
        if self.acquisition.required_iterations == 0 {
            return invalid("acquisition.required_iterations must be positive".to_string());
        }
        if self.acquisition.max_consecutive_failures == Some(0) {
            return invalid("acquisition.max_consecutive_failures must be positive".to_string());
        }
        self.sweep_request().validate()
    }

    pub fn sweep_request(&self) -> SweepRequest {
        let request = SweepRequest::new(self.sweep.start_nm, self.sweep.stop_nm)
            .with_sensitivity(self.sweep.sensitivity)
            .with_speed(self.sweep.speed)
            .with_mode(self.sweep.mode);
        match self.sweep.resolution_nm {
            Some(resolution) => request.with_resolution(resolution),
            None => request,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_secs(self.instrument.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.instrument.read_timeout_secs),
            write_timeout: Duration::from_secs(self.instrument.write_timeout_secs),
        }
    }

    /// Client builder carrying the instrument and protocol sections
    pub fn client_builder(&self) -> OsaClientBuilder {
        OsaClientBuilder::default()
            .address(&self.instrument.host)
            .port(self.instrument.port)
            .config(self.connection_config())
            .settle_delay(Duration::from_millis(self.protocol.settle_delay_ms))
            .chunk_size(self.protocol.chunk_size)
            .chunk_delay(Duration::from_millis(self.protocol.chunk_delay_ms))
            .decode_policy(self.protocol.decode_policy)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            required_iterations: self.acquisition.required_iterations,
            inter_iteration_delay: Duration::from_millis(self.acquisition.inter_iteration_delay_ms),
            max_consecutive_failures: self.acquisition.max_consecutive_failures,
        }
    }

    pub fn output_folder(&self) -> PathBuf {
        PathBuf::from(&self.output.folder)
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    } else if let Some(path) = ["osa.toml", "config.toml"]
        .iter()
        .find(|path| Path::new(path).exists())
    {
        builder = builder.add_source(File::with_name(path));
    }

    // RUSTY_OSA_SWEEP__START_NM=700 overrides sweep.start_nm
    builder = builder.add_source(
        Environment::with_prefix("RUSTY_OSA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize::<AppConfig>()
}

/// Load configuration, falling back to defaults when it cannot be read
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}
