//! Aggregation of streamed response fragments into one logical response.

use std::future::Future;

use futures::TryStreamExt;

use crate::advisor::chain::ResponseStream;
use crate::advisor::envelope::AdvisedResponse;
use crate::models::message::MessageContent;

/// Merge a fragment into the running aggregate: content blocks are appended
/// (adjacent text blocks coalesce by concatenation), usage counts are summed,
/// and later advise-context entries win.
pub fn merge_fragment(mut aggregate: AdvisedResponse, fragment: &AdvisedResponse) -> AdvisedResponse {
    for block in &fragment.response.message.content {
        let coalesced = match (aggregate.response.message.content.last_mut(), block) {
            (Some(MessageContent::Text(last)), MessageContent::Text(next)) => {
                match (last.as_text().map(str::to_string), next.as_text()) {
                    (Some(last_text), Some(next_text)) => {
                        *last = crate::models::content::Content::text(format!(
                            "{last_text}{next_text}"
                        ));
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        if !coalesced {
            aggregate.response.message.content.push(block.clone());
        }
    }
    aggregate.response.usage = aggregate.response.usage.merge(&fragment.response.usage);
    aggregate
        .advise_context
        .extend(fragment.advise_context.clone());
    aggregate
}

/// Pass a fragment stream through unchanged while accumulating the merged
/// response, and run `on_complete` with the aggregate exactly once, after the
/// last fragment. If the consumer abandons the stream before exhaustion the
/// hook never runs; that is a legitimate, silent outcome.
///
/// An error from `on_complete` surfaces as a trailing error item, aborting
/// the turn for consumers that drain to completion.
pub fn aggregate_with<F, Fut>(stream: ResponseStream, on_complete: F) -> ResponseStream
where
    F: FnOnce(AdvisedResponse) -> Fut + Send + 'static,
    Fut: Future<Output = crate::errors::Result<()>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut stream = stream;
        let mut aggregate: Option<AdvisedResponse> = None;
        while let Some(fragment) = stream.try_next().await? {
            aggregate = Some(match aggregate.take() {
                None => fragment.clone(),
                Some(current) => merge_fragment(current, &fragment),
            });
            yield fragment;
        }
        if let Some(merged) = aggregate {
            on_complete(merged).await?;
        }
    })
}
