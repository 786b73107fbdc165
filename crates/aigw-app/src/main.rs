//! Replays a recorded request and backend response through a configured route, and prints
//! what the gateway would send upstream and back to the client.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aigw::Strng;
use aigw::config::Config;
use aigw::llm::recorder::LogRecorder;
use aigw::llm::{HeaderMutation, LLMResponse};
use aigw_core::telemetry::{self, LogFormat};
use bytes::Bytes;
use clap::Parser;
use futures::TryStreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
	/// Route configuration (YAML)
	#[arg(short, long, value_name = "file")]
	config: PathBuf,

	/// Name of the route to replay through
	#[arg(short, long)]
	route: String,

	/// Client request body
	#[arg(long, value_name = "file")]
	request: PathBuf,

	/// Backend response body. Without it only the request is translated.
	#[arg(long, value_name = "file")]
	response: Option<PathBuf>,

	/// Backend response status
	#[arg(long, default_value_t = 200)]
	status: u16,

	/// Backend response content type
	#[arg(long)]
	content_type: Option<String>,

	/// Split a streamed response into chunks of this many bytes
	#[arg(long, default_value_t = 4096)]
	chunk_size: usize,

	/// Always emit a request body, even when nothing changed
	#[arg(long)]
	force_body: bool,

	#[arg(long)]
	json_logs: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
	#[serde(skip_serializing_if = "Option::is_none")]
	upstream_host: Option<Strng>,
	request: Rewrite,
	#[serde(skip_serializing_if = "Option::is_none")]
	response: Option<Rewrite>,
	/// Response headers as the client would see them.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	client_headers: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<LLMResponse>,
}

#[derive(Debug, Serialize)]
struct Rewrite {
	headers: Vec<HeaderMutation>,
	/// `None` when the client's original request body is forwarded.
	body: Option<String>,
}

impl Rewrite {
	fn new(headers: Vec<HeaderMutation>, body: Option<&Bytes>) -> Self {
		Rewrite {
			headers,
			body: body.map(|b| String::from_utf8_lossy(b).into_owned()),
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	telemetry::setup_logging(if args.json_logs {
		LogFormat::Json
	} else {
		LogFormat::Plain
	})?;

	let config = Config::from_yaml(&fs_err::tokio::read_to_string(&args.config).await?)?;
	let route = config.route(&args.route)?;
	info!(route = %route.name, provider = %route.backend.provider(), "replaying");
	let mut exchange = route.exchange(Box::new(LogRecorder::default()))?;

	let body = Bytes::from(fs_err::tokio::read(&args.request).await?);
	let mutation = exchange.request(HeaderMap::new(), body, args.force_body)?;
	let mut report = Report {
		upstream_host: route.backend.host(),
		request: Rewrite::new(mutation.headers, mutation.body.as_ref()),
		response: None,
		client_headers: BTreeMap::new(),
		result: None,
	};

	if let Some(path) = &args.response {
		let status = StatusCode::from_u16(args.status)?;
		let mut headers = HeaderMap::new();
		if let Some(ct) = &args.content_type {
			headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct)?);
		}
		let body = Bytes::from(fs_err::tokio::read(path).await?);

		let response = if !status.is_success() {
			let out = exchange.response_error(status, &headers, &body)?;
			Rewrite::new(out.headers, out.body.as_ref().or(Some(&body)))
		} else if exchange.is_streaming() {
			let mutations = exchange.response_headers(&headers);
			let chunks = body
				.chunks(args.chunk_size.max(1))
				.map(|c| Ok::<_, std::io::Error>(Bytes::copy_from_slice(c)))
				.collect::<Vec<_>>();
			let out: Vec<Bytes> = exchange
				.response_stream(futures::stream::iter(chunks))
				.try_collect()
				.await?;
			Rewrite::new(mutations, Some(&Bytes::from(out.concat())))
		} else {
			let mut mutations = exchange.response_headers(&headers);
			let out = exchange
				.read_response_body(
					&headers,
					http_body_util::Full::new(body.clone()),
					aigw::http::DEFAULT_BUFFER_LIMIT,
				)
				.await?;
			mutations.extend(out.headers);
			Rewrite::new(mutations, out.body.as_ref().or(Some(&body)))
		};
		aigw::http::apply(&mut headers, &response.headers);
		report.client_headers = headers
			.iter()
			.map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
			.collect();
		report.response = Some(response);
		report.result = Some(exchange.finish());
	}

	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}
