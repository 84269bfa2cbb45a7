//! Test doubles shared by the unit tests.

use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::{collections::VecDeque, sync::Mutex};

#[derive(Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

struct Route {
    fragment: String,
    queue: VecDeque<Scripted>,
}

/// `HttpClient` that answers from scripted responses keyed by URL fragment
/// and records every request. The last queued answer of a route repeats.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, fragment: &str, answer: Scripted) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.fragment == fragment) {
                Some(route) => route.queue.push_back(answer),
                None => routes.push(Route {
                    fragment: fragment.to_string(),
                    queue: VecDeque::from([answer]),
                }),
            }
        }
        self
    }

    pub fn on_json(self, fragment: &str, status: u16, body: &Value) -> Self {
        self.push(
            fragment,
            Scripted::Respond(HttpResponse {
                status,
                content_type: Some("application/json".into()),
                body: serde_json::to_vec(body).unwrap(),
            }),
        )
    }

    pub fn on_bytes(self, fragment: &str, status: u16, content_type: &str, body: &[u8]) -> Self {
        self.push(
            fragment,
            Scripted::Respond(HttpResponse {
                status,
                content_type: Some(content_type.to_string()),
                body: body.to_vec(),
            }),
        )
    }

    pub fn fail(self, fragment: &str, message: &str) -> Self {
        self.push(fragment, Scripted::Fail(message.to_string()))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let answer = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .iter_mut()
                .find(|r| url.contains(&r.fragment))
                .and_then(|route| {
                    if route.queue.len() > 1 {
                        route.queue.pop_front()
                    } else {
                        route.queue.front().cloned()
                    }
                })
        };
        match answer {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(HttpError::Transport(message)),
            None => Err(HttpError::Transport(format!("no scripted response for {url}"))),
        }
    }
}

/// `{"products": [...]}` with `count` valid records named `Product 1..=count`.
pub fn products_json(count: usize) -> Value {
    let products: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "name": format!("Product {i}"),
                "sku": format!("SKU-{i:03}"),
                "price": "19.99",
                "stock_quantity": 10,
                "short_description": format!("Short description {i}"),
                "long_description": format!("Long description {i}"),
                "features": ["durable"],
                "tags": ["demo"]
            })
        })
        .collect();
    json!({ "products": products })
}

/// Chat-completion response whose message content is `document` serialized.
pub fn chat_response(document: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": document.to_string()}
        }]
    })
}

pub fn image_response(url: &str) -> Value {
    json!({ "created": 0, "data": [{ "url": url }] })
}
