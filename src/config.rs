use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{JudgeError, Result};

#[derive(Parser)]
#[command(name = "psjudge", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Address the local server binds to, overrides the configuration file
    #[arg(long = "bind")]
    pub bind_address: Option<String>,

    /// Port the local server listens on, overrides the configuration file
    #[arg(long = "port", short = 'p')]
    pub bind_port: Option<u16>,

    /// Whether to flush the stored settings and session
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file, or defaults when none is given
    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)?
            }
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.bind_port {
            config.server.bind_port = Some(port);
        }

        Ok(config)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub toolchains: ToolchainConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct JudgeConfig {
    /// Wall-clock limit for every run stage
    pub time_limit: MilliSecond,
    /// Wall-clock limit for the compile stage
    pub compile_time_limit: MilliSecond,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            time_limit: MilliSecond(5_000),
            compile_time_limit: MilliSecond(10_000),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

/// Languages a submission can be written in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Cpp, Language::Python, Language::Java];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" | "cc" => Ok(Self::Cpp),
            "python" | "python3" | "py" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            _ => Err(JudgeError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Path of the compiler or interpreter used for each language
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cpp: String,
    pub python: String,
    pub java: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cpp: "g++".to_string(),
            python: "python3".to_string(),
            java: "javac".to_string(),
        }
    }
}

impl ToolchainConfig {
    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::Cpp => &self.cpp,
            Language::Python => &self.python,
            Language::Java => &self.java,
        }
    }

    pub fn set(&mut self, language: Language, path: impl Into<String>) {
        let slot = match language {
            Language::Cpp => &mut self.cpp,
            Language::Python => &mut self.python,
            Language::Java => &mut self.java,
        };
        *slot = path.into();
    }

    /// Returns the configured path, failing when it is blank
    pub fn path_for(&self, language: Language) -> Result<&str> {
        let path = self.get(language).trim();
        if path.is_empty() {
            return Err(JudgeError::MissingToolchain(language));
        }
        Ok(path)
    }

    /// Checks that every language has a usable path
    pub fn validate(&self) -> Result<()> {
        Language::ALL
            .iter()
            .try_for_each(|&language| self.path_for(language).map(|_| ()))
    }
}

/// Settings shared between the server and the judge worker
///
/// Each judging run takes its own copy of the toolchains when it starts.
pub struct Settings {
    toolchains: RwLock<ToolchainConfig>,
    pub judge: JudgeConfig,
}

impl Settings {
    pub fn new(toolchains: ToolchainConfig, judge: JudgeConfig) -> Self {
        Self {
            toolchains: RwLock::new(toolchains),
            judge,
        }
    }

    pub fn toolchains(&self) -> ToolchainConfig {
        self.toolchains.read().clone()
    }

    pub fn set_toolchains(&self, toolchains: ToolchainConfig) {
        *self.toolchains.write() = toolchains;
    }
}
