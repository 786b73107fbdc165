use ::http::header::CONTENT_TYPE;
use ::http::{HeaderMap, HeaderValue, StatusCode};
use assert_matches::assert_matches;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::llm::tests::{TestRecorder, header, request};
use crate::llm::{AIProvider, InputFormat, Translator as _, new_translator};

const STREAM: &str = concat!(
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"Think\"}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}},{\"index\":1,\"delta\":{\"content\":\"ignored\"}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\"}}]}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]}}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
	"data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o-2024-08-06\",\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":9,\"total_tokens\":21,\"prompt_tokens_details\":{\"cached_tokens\":4}}}\n\n",
	"data: [DONE]\n\n",
);

fn translator(model: Option<&str>) -> Translator {
	Translator::new(Provider {
		model: model.map(strng::new),
	})
}

#[test]
fn override_rewrites_model() {
	let req = request(
		InputFormat::Completions,
		r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
	);
	let mut t = translator(Some("gpt-4o-mini"));
	let m = t.request(&req, false).unwrap();
	let body = m.body.clone().unwrap();
	assert_eq!(
		serde_json::from_slice::<Value>(&body).unwrap(),
		json!({"model":"gpt-4o-mini","messages":[{"role":"user","content":"hi"}]})
	);
	assert_eq!(header(&m.headers, ":path"), Some(DEFAULT_PATH));
	assert_eq!(
		header(&m.headers, "content-length"),
		Some(body.len().to_string().as_str())
	);
	assert_eq!(t.snapshot().response_model.as_str(), "gpt-4o-mini");
}

#[test]
fn plain_request_is_untouched() {
	let req = request(InputFormat::Completions, r#"{"model":"gpt-4o","messages":[]}"#);
	let mut t = translator(None);
	let m = t.request(&req, false).unwrap();
	assert_eq!(m.body, None);
	assert_eq!(m.headers, vec![HeaderMutation::new(":path", DEFAULT_PATH)]);
}

#[rstest]
#[case(r#"{"model":"m","stream":true}"#, Some(json!({"include_usage":true})))]
#[case(
	r#"{"model":"m","stream":true,"stream_options":{"include_usage":false}}"#,
	Some(json!({"include_usage":true}))
)]
#[case(
	r#"{"model":"m","stream":true,"stream_options":{"foo":1}}"#,
	Some(json!({"foo":1,"include_usage":true}))
)]
#[case(r#"{"model":"m","stream":true,"stream_options":{"include_usage":true}}"#, None)]
fn streaming_requests_ask_for_usage(#[case] body: &str, #[case] expected: Option<Value>) {
	let req = request(InputFormat::Completions, body);
	let mut t = translator(None);
	let m = t.request(&req, false).unwrap();
	let options = m
		.body
		.map(|b| serde_json::from_slice::<Value>(&b).unwrap()["stream_options"].clone());
	assert_eq!(options, expected);
}

#[test]
fn override_and_usage_together() {
	let req = request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#);
	let mut t = translator(Some("gpt-4.1"));
	let m = t.request(&req, false).unwrap();
	assert_eq!(
		serde_json::from_slice::<Value>(&m.body.unwrap()).unwrap(),
		json!({"model":"gpt-4.1","stream":true,"stream_options":{"include_usage":true}})
	);
}

#[test]
fn streaming_accumulates_first_choice() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#), false)
		.unwrap();
	let mut rec = TestRecorder::default();
	let mut last = ResponseBody::default();
	for c in STREAM.as_bytes().chunks(17) {
		last = t.response_chunk(c, &mut rec).unwrap();
		assert_eq!(last.body, None);
	}
	assert_eq!(rec.chunks.len(), 10);
	assert_eq!(rec.chunks.last(), Some(&"done"));
	assert_eq!(last.response_model.as_str(), "gpt-4o-2024-08-06");
	assert_eq!(last.usage.input(), Some(12));
	assert_eq!(last.usage.output(), Some(9));
	assert_eq!(last.usage.cached_input(), Some(4));
	assert_eq!(last.usage.total(), Some(21));

	let resp = t.snapshot();
	assert_eq!(resp.stop_reason.as_deref(), Some("tool_calls"));
	assert_eq!(resp.content, vec![
		Content::Thinking {
			thinking: "Think".to_string(),
			signature: String::new(),
		},
		Content::Text {
			text: "Hello".to_string()
		},
		Content::ToolCall {
			id: "call_1".to_string(),
			name: "get_weather".to_string(),
			input: json!({"city": "Paris"}),
		},
	]);
}

#[test]
fn usage_is_unknown_until_reported() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#), false)
		.unwrap();
	let first = STREAM.split_inclusive("\n\n").take(3).collect::<String>();
	let out = t.response_chunk(first.as_bytes(), &mut TestRecorder::default()).unwrap();
	assert!(out.usage.is_empty());
	assert_eq!(out.usage.total(), None);
}

#[test]
fn missing_usage_counters_stay_unknown() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#), false)
		.unwrap();
	let body = "data: {\"id\":\"chatcmpl-1\",\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":12}}\n\n";
	let out = t.response_chunk(body.as_bytes(), &mut TestRecorder::default()).unwrap();
	assert_eq!(out.usage.input(), Some(12));
	assert_eq!(out.usage.output(), None);
	assert_eq!(out.usage.total(), None);
}

#[test]
fn partial_tool_arguments_are_kept_as_text() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#), false)
		.unwrap();
	let partial = STREAM.split_inclusive("\n\n").take(6).collect::<String>();
	t.response_chunk(partial.as_bytes(), &mut TestRecorder::default())
		.unwrap();
	assert_matches!(
		t.snapshot().content.last(),
		Some(Content::ToolCall { input: Value::String(s), .. }) if s == "{\"city\":"
	);
}

#[test]
fn malformed_lines_are_skipped() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o","stream":true}"#), false)
		.unwrap();
	let body = format!(": keep-alive\n\ndata: {{not json\n\n{STREAM}");
	let mut rec = TestRecorder::default();
	let out = t.response_chunk(body.as_bytes(), &mut rec).unwrap();
	assert_eq!(rec.chunks.len(), 10);
	assert_eq!(out.usage.total(), Some(21));
}

#[test]
fn whole_body() {
	let mut t = translator(None);
	t.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o"}"#), false)
		.unwrap();
	let body = json!({
		"id": "chatcmpl-2",
		"object": "chat.completion",
		"created": 1_726_000_000,
		"model": "gpt-4o-2024-08-06",
		"choices": [{
			"index": 0,
			"message": {"role": "assistant", "content": "Hi there", "tool_calls": [
				{"id": "call_9", "type": "function", "function": {"name": "lookup", "arguments": ""}}
			]},
			"finish_reason": "stop"
		}],
		"usage": {"prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23,
			"prompt_tokens_details": {"cached_tokens": 16}}
	});
	let mut rec = TestRecorder::default();
	let out = t
		.response_body(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap(), &mut rec)
		.unwrap();
	assert_eq!(out.body, None);
	assert_eq!(out.usage.total(), Some(23));
	assert_eq!(out.usage.cached_input(), Some(16));
	assert_eq!(out.response_model.as_str(), "gpt-4o-2024-08-06");
	assert_eq!(rec.responses.len(), 1);
	assert_eq!(rec.responses[0].content, vec![
		Content::Text {
			text: "Hi there".to_string()
		},
		Content::ToolCall {
			id: "call_9".to_string(),
			name: "lookup".to_string(),
			input: json!({}),
		},
	]);
	assert_eq!(rec.responses[0].stop_reason.as_deref(), Some("stop"));
}

#[test]
fn malformed_body_is_an_error() {
	let mut t = translator(None);
	assert_matches!(
		t.response_body(&HeaderMap::new(), b"{\"choices\":", &mut TestRecorder::default()),
		Err(AIError::ResponseParsing(_))
	);
}

#[test]
fn azure_uses_deployment_path() {
	let provider = AIProvider::AzureOpenAI(azureopenai::Provider {
		model: None,
		host: Some(strng::literal!("my-resource.openai.azure.com")),
		api_version: strng::literal!("2024-10-21"),
	});
	let mut t = new_translator(InputFormat::Completions, &provider).unwrap();
	let m = t
		.request(&request(InputFormat::Completions, r#"{"model":"gpt-4o"}"#), false)
		.unwrap();
	assert_eq!(m.body, None);
	assert_eq!(
		header(&m.headers, ":path"),
		Some("/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21")
	);
}

#[test]
fn errors_are_wrapped_unless_json() {
	let mut t = translator(None);
	let mut headers = HeaderMap::new();
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	let out = t
		.response_error(
			StatusCode::UNAUTHORIZED,
			&headers,
			br#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
		)
		.unwrap();
	assert_eq!(out, ErrorResponse::passthrough());

	let out = t
		.response_error(StatusCode::BAD_GATEWAY, &HeaderMap::new(), b"<html>Bad Gateway</html>\n")
		.unwrap();
	let body = out.body.unwrap();
	assert_eq!(
		serde_json::from_slice::<Value>(&body).unwrap(),
		json!({"type":"error","error":{"type":"server_error","message":"<html>Bad Gateway</html>","code":"502"}})
	);
	assert_eq!(header(&out.headers, "content-type"), Some("application/json"));
	assert_eq!(
		header(&out.headers, "content-length"),
		Some(body.len().to_string().as_str())
	);
}
