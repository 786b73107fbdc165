use std::sync::{Arc, Mutex};

use aigw::llm::{
	AIError, AIProvider, Content, Exchange, InputFormat, LLMRequest, LLMResponse, Recorder,
	StreamChunk, anthropic, new_translator,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use proptest::prelude::*;
use serde_json::{Value, json};

/// Shares what it sees with the test after the exchange has taken ownership of it.
#[derive(Debug, Clone, Default)]
struct Shared(Arc<Mutex<Seen>>);

#[derive(Debug, Default)]
struct Seen {
	requests: usize,
	chunks: Vec<&'static str>,
	responses: Vec<LLMResponse>,
	errors: Vec<StatusCode>,
}

impl Shared {
	fn seen<T>(&self, f: impl FnOnce(&Seen) -> T) -> T {
		f(&self.0.lock().unwrap())
	}
}

impl Recorder for Shared {
	fn record_request(&mut self, _: &LLMRequest, _: &[u8]) {
		self.0.lock().unwrap().requests += 1;
	}
	fn record_response_chunk(&mut self, chunk: StreamChunk<'_>) {
		self.0.lock().unwrap().chunks.push(chunk.kind());
	}
	fn record_response(&mut self, resp: &LLMResponse) {
		self.0.lock().unwrap().responses.push(resp.clone());
	}
	fn record_response_on_error(&mut self, status: StatusCode, _: &[u8]) {
		self.0.lock().unwrap().errors.push(status);
	}
}

fn anthropic(model: Option<&str>) -> AIProvider {
	AIProvider::Anthropic(anthropic::Provider {
		model: model.map(aigw::strng::new),
	})
}

fn exchange(model: Option<&str>) -> (Exchange, Shared) {
	let recorder = Shared::default();
	let translator = new_translator(InputFormat::Messages, &anthropic(model)).unwrap();
	(
		Exchange::new(InputFormat::Messages, translator, Box::new(recorder.clone())),
		recorder,
	)
}

const STREAM: &str = concat!(
	"event: message_start\n",
	"data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-opus-20240229\",\"content\":[],\"usage\":{\"input_tokens\":10,\"output_tokens\":0}}}\n\n",
	"event: content_block_delta\n",
	"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
	"event: content_block_delta\n",
	"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
	"event: message_delta\n",
	"data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":5}}\n\n",
	"event: message_stop\n",
	"data: {\"type\":\"message_stop\"}\n\n",
);

fn streaming_request() -> Bytes {
	Bytes::from_static(br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}],"stream":true}"#)
}

#[test]
fn model_override_rewrites_body() {
	let (mut ex, recorder) = exchange(Some("claude-3-opus"));
	let body = Bytes::from_static(
		br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}],"stream":false}"#,
	);
	let m = ex.request(HeaderMap::new(), body, false).unwrap();
	let new_body = m.body.unwrap();
	assert_eq!(
		serde_json::from_slice::<Value>(&new_body).unwrap(),
		json!({"model":"claude-3-opus","messages":[{"role":"user","content":"hi"}],"stream":false})
	);
	let headers: Vec<(&str, &str)> = m
		.headers
		.iter()
		.map(|h| (h.name.as_str(), h.value.as_str()))
		.collect();
	assert_eq!(headers, vec![
		(":path", "/v1/messages"),
		("content-length", new_body.len().to_string().as_str()),
	]);
	assert!(!ex.is_streaming());
	assert_eq!(recorder.seen(|s| s.requests), 1);
}

#[test]
fn streamed_response_is_accounted() {
	let (mut ex, recorder) = exchange(None);
	ex.request(HeaderMap::new(), streaming_request(), false).unwrap();
	assert!(ex.is_streaming());

	let mut translator = new_translator(InputFormat::Messages, &anthropic(None)).unwrap();
	let req = ex.llm_request().unwrap().clone();
	translator.request(&req, false).unwrap();
	let out = translator
		.response_chunk(STREAM.as_bytes(), &mut Shared::default())
		.unwrap();
	assert_eq!(out.body, None);
	assert_eq!(out.usage.input(), Some(10));
	assert_eq!(out.usage.output(), Some(5));
	assert_eq!(out.usage.total(), Some(15));

	let resp = drive(ex, STREAM.as_bytes(), 9);
	assert_eq!(resp.content, vec![Content::Text {
		text: "Hello".to_string()
	}]);
	assert_eq!(resp.usage.total(), Some(15));
	assert_eq!(resp.response_model.as_str(), "claude-3-opus-20240229");
	recorder.seen(|s| {
		assert_eq!(s.chunks, vec![
			"message_start",
			"content_block_delta",
			"content_block_delta",
			"message_delta",
			"message_stop",
		]);
		assert_eq!(s.responses.last(), Some(&resp));
	});
}

/// Feed `body` through the exchange's stream adapter in `size` byte chunks.
fn drive(mut ex: Exchange, body: &[u8], size: usize) -> LLMResponse {
	let chunks: Vec<Result<Bytes, std::io::Error>> = body
		.chunks(size)
		.map(|c| Ok(Bytes::copy_from_slice(c)))
		.collect();
	let forwarded: Vec<Bytes> = futures::executor::block_on(
		ex.response_stream(stream::iter(chunks)).try_collect(),
	)
	.unwrap();
	assert_eq!(forwarded.concat(), body);
	ex.finish()
}

#[test]
fn plain_text_error_is_wrapped() {
	let (mut ex, recorder) = exchange(None);
	ex.request(HeaderMap::new(), streaming_request(), false).unwrap();
	let mut headers = HeaderMap::new();
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
	let out = ex
		.response_error(StatusCode::TOO_MANY_REQUESTS, &headers, b"slow down")
		.unwrap();
	let body = out.body.unwrap();
	assert_eq!(
		serde_json::from_slice::<Value>(&body).unwrap(),
		json!({"type":"error","error":{"type":"rate_limit_error","message":"slow down"}})
	);
	let headers: Vec<(&str, &str)> = out
		.headers
		.iter()
		.map(|h| (h.name.as_str(), h.value.as_str()))
		.collect();
	assert!(headers.contains(&("content-type", "application/json")));
	assert!(headers.contains(&("content-length", body.len().to_string().as_str())));
	assert_eq!(recorder.seen(|s| s.errors.clone()), vec![StatusCode::TOO_MANY_REQUESTS]);
}

#[test]
fn malformed_line_does_not_stop_the_stream() {
	let (mut ex, recorder) = exchange(None);
	ex.request(HeaderMap::new(), streaming_request(), false).unwrap();
	let (head, tail) = STREAM.split_at(STREAM.find("event: message_delta").unwrap());
	let body = format!("{head}event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\n\n{tail}");
	let resp = drive(ex, body.as_bytes(), 64);
	assert_eq!(resp.usage.total(), Some(15));
	assert_eq!(recorder.seen(|s| s.chunks.len()), 5);
}

#[tokio::test]
async fn stream_errors_are_propagated() {
	let (mut ex, _) = exchange(None);
	ex.request(HeaderMap::new(), streaming_request(), false).unwrap();
	let (head, _) = STREAM.split_at(STREAM.find("event: message_delta").unwrap());
	let body = stream::iter(vec![
		Ok(Bytes::copy_from_slice(head.as_bytes())),
		Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
	]);
	let items: Vec<_> = ex.response_stream(body).collect().await;
	assert_eq!(items.len(), 2);
	assert!(items[0].is_ok());
	assert_eq!(
		items[1].as_ref().unwrap_err().kind(),
		std::io::ErrorKind::ConnectionReset
	);

	// What arrived before the failure is still accounted.
	let resp = ex.finish();
	assert_eq!(resp.usage.input(), Some(10));
	assert_eq!(resp.usage.total(), Some(10));
	assert_eq!(resp.stop_reason, None);
}

#[tokio::test]
async fn oversized_stream_line_fails() {
	let (mut ex, _) = exchange(None);
	ex.request(HeaderMap::new(), streaming_request(), false).unwrap();
	let line = vec![b'x'; aigw::parse::DEFAULT_MAX_EVENT_BYTES + 1];
	let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(line))]);
	let items: Vec<_> = ex.response_stream(body).collect().await;
	let err = items[0].as_ref().unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::Other);
	assert!(err.to_string().contains("too large"));
}

#[tokio::test]
async fn buffered_body_limit() {
	let (mut ex, _) = exchange(None);
	ex.request(
		HeaderMap::new(),
		Bytes::from_static(br#"{"model":"claude-3","messages":[]}"#),
		false,
	)
	.unwrap();
	let body = || http_body_util::Full::new(Bytes::from_static(br#"{"id":"msg_1","model":"claude-3-opus"}"#));
	let err = ex
		.read_response_body(&HeaderMap::new(), body(), 8)
		.await
		.unwrap_err();
	assert!(matches!(err, AIError::ResponseTooLarge));

	let out = ex
		.read_response_body(&HeaderMap::new(), body(), 1024)
		.await
		.unwrap();
	assert_eq!(out.response_model.as_str(), "claude-3-opus");
}

proptest! {
	#[test]
	fn chunk_boundaries_do_not_matter(mut cuts in prop::collection::vec(0..STREAM.len(), 0..12)) {
		cuts.sort_unstable();
		cuts.dedup();
		let mut translator = new_translator(InputFormat::Messages, &anthropic(None)).unwrap();
		let req = LLMRequest::parse(InputFormat::Messages, HeaderMap::new(), streaming_request()).unwrap();
		translator.request(&req, false).unwrap();
		let mut recorder = Shared::default();
		let mut start = 0;
		for cut in cuts.into_iter().chain([STREAM.len()]) {
			translator.response_chunk(&STREAM.as_bytes()[start..cut], &mut recorder).unwrap();
			start = cut;
		}
		let resp = translator.snapshot();
		prop_assert_eq!(resp.content, vec![Content::Text { text: "Hello".to_string() }]);
		prop_assert_eq!(resp.usage.total(), Some(15));
		prop_assert_eq!(recorder.seen(|s| s.chunks.len()), 5);
	}
}
