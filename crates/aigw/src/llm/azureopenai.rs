use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};

use crate::{Strng, strng};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Provider {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<Strng>, // this is the Azure OpenAI model deployment name
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<Strng>,
	pub api_version: Strng, // required
}

impl super::Provider for Provider {
	const NAME: Strng = strng::literal!("azure.openai");
}

impl Provider {
	pub fn get_path_for_model(&self, model: &str) -> Strng {
		if self.api_version == "v1" {
			strng::format!("/openai/v1/chat/completions")
		} else if self.api_version == "preview" {
			// v1 preview API
			strng::format!("/openai/v1/chat/completions?api-version=preview")
		} else {
			let model = self.model.as_deref().unwrap_or(model);
			let model = utf8_percent_encode(model, crate::http::PATH_SEGMENT);
			strng::format!(
				"/openai/deployments/{}/chat/completions?api-version={}",
				model,
				self.api_version
			)
		}
	}

	pub fn get_host(&self) -> Option<Strng> {
		self.host.clone()
	}
}
