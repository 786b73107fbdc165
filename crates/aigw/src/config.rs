//! Named translator routes, loaded from YAML.
//!
//! ```yaml
//! routes:
//! - name: claude
//!   client: anthropic
//!   backend:
//!     awsAnthropic:
//!       region: us-west-2
//!       model: anthropic.claude-3-opus-20240229-v1:0
//! ```

use serde::{Deserialize, Serialize};

use crate::Strng;
use crate::llm::{self, AIError, AIProvider, Exchange, InputFormat, Recorder, Translator};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("invalid config: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("duplicate route {0}")]
	DuplicateRoute(Strng),
	#[error("unknown route {0}")]
	UnknownRoute(Strng),
	#[error("route {0}: {1}")]
	Translator(Strng, AIError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Route {
	pub name: Strng,
	/// The protocol clients of this route speak.
	pub client: InputFormat,
	pub backend: AIProvider,
}

impl Route {
	pub fn translator(&self) -> Result<Box<dyn Translator>, ConfigError> {
		llm::new_translator(self.client, &self.backend)
			.map_err(|e| ConfigError::Translator(self.name.clone(), e))
	}

	pub fn exchange(&self, recorder: Box<dyn Recorder>) -> Result<Exchange, ConfigError> {
		Ok(Exchange::new(self.client, self.translator()?, recorder))
	}
}

impl Config {
	/// Parse and validate. Every route must have a unique name and a supported pairing.
	pub fn from_yaml(s: &str) -> Result<Config, ConfigError> {
		let config: Config = serde_yaml::from_str(s)?;
		for (i, route) in config.routes.iter().enumerate() {
			if config.routes[..i].iter().any(|r| r.name == route.name) {
				return Err(ConfigError::DuplicateRoute(route.name.clone()));
			}
			route.translator()?;
		}
		Ok(config)
	}

	pub fn route(&self, name: &str) -> Result<&Route, ConfigError> {
		self
			.routes
			.iter()
			.find(|r| r.name.as_str() == name)
			.ok_or_else(|| ConfigError::UnknownRoute(crate::strng::new(name)))
	}

	pub fn translator(&self, name: &str) -> Result<Box<dyn Translator>, ConfigError> {
		self.route(name)?.translator()
	}
}
