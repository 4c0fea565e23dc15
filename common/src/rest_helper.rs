//! Helper for REST handlers

use crate::messages::{Message, RESTResponse};
use anyhow::Result;
use caryatid_sdk::Context;
use futures::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Handle a REST request on `topic`, passing the handler any path elements
/// after the first (the resource name).
/// Handler errors become a 500 response.
pub fn handle_rest<F, Fut>(
    context: Arc<Context<Message>>,
    topic: &str,
    handler: F,
) -> JoinHandle<()>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<RESTResponse>> + Send + 'static,
{
    context.handle(topic, move |message: Arc<Message>| {
        let handler = handler.clone();
        async move {
            let response = match message.as_ref() {
                Message::RESTRequest(request) => {
                    debug!("REST received {} {}", request.method, request.path);
                    let params = request.path_elements.iter().skip(1).cloned().collect();
                    handler(params).await.unwrap_or_else(|error| {
                        RESTResponse::with_text(500, &format!("{error:?}"))
                    })
                }
                _ => {
                    error!("Unexpected message type {:?}", message);
                    RESTResponse::with_text(500, "Unexpected message in REST request")
                }
            };

            Arc::new(Message::RESTResponse(response))
        }
    })
}
