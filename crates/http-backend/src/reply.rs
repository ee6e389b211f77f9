use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use streamchat_model::{ErrorKind, ReplyStream};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{Frame, FrameError, parse_frame};

struct PartialState {
    sse: Sse,
    fragment_count: usize,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFragment = Result<(Option<String>, PartialState), Error>;

pin_project! {
    /// A reply streamed over server-sent events.
    pub struct HttpReply {
        next_fragment_fut: Option<PinnedFuture<NextFragment>>,
    }
}

impl HttpReply {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            fragment_count: 0,
        };
        let next_fragment_fut =
            async move { next_fragment(partial_state).await };
        Self {
            next_fragment_fut: Some(Box::pin(next_fragment_fut)),
        }
    }
}

impl ReplyStream for HttpReply {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.project();
        let Some(next_fragment_fut) = this.next_fragment_fut else {
            // The reply has terminated already.
            return Poll::Ready(Ok(None));
        };
        let (fragment, partial_state) =
            match ready!(next_fragment_fut.as_mut().poll(cx)) {
                Ok((Some(fragment), partial_state)) => {
                    (fragment, partial_state)
                }
                Ok((None, partial_state)) => {
                    debug!(
                        "reply finished after {} fragments",
                        partial_state.fragment_count
                    );
                    *this.next_fragment_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_fragment_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future
        // for the next fragment.
        let next_fragment_fut =
            async move { next_fragment(partial_state).await };
        *this.next_fragment_fut = Some(Box::pin(next_fragment_fut));

        Poll::Ready(Ok(Some(fragment)))
    }
}

async fn next_fragment(
    mut partial_state: PartialState,
) -> Result<(Option<String>, PartialState), Error> {
    loop {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Not every backend sends the sentinel, closing the stream
                // ends the reply as well.
                return Ok((None, partial_state));
            }
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(err.0, ErrorKind::Network));
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid server-sent event",
                    ErrorKind::StreamParse,
                ));
            }
        };
        trace!("got sse event: {sse_event}");

        match parse_frame(&sse_event) {
            Ok(Frame::Content(content)) if content.is_empty() => {
                trace!("skipping an empty fragment");
            }
            Ok(Frame::Content(content)) => {
                partial_state.fragment_count += 1;
                return Ok((Some(content), partial_state));
            }
            Ok(Frame::Done) => return Ok((None, partial_state)),
            Err(FrameError::InvalidJson(reason)) => {
                return Err(Error::new(
                    format!("invalid frame: {reason}"),
                    ErrorKind::StreamParse,
                ));
            }
            Err(FrameError::UnexpectedShape(data)) => {
                return Err(Error::new(
                    format!("unexpected frame: {data}"),
                    ErrorKind::StreamParse,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use streamchat_model::BackendError;

    use super::*;
    use crate::io::Chunks;

    async fn collect(chunks: &[&'static str]) -> (Vec<String>, Option<Error>) {
        let chunks = Chunks::from_vec_deque(
            chunks
                .iter()
                .map(|chunk| Bytes::from_static(chunk.as_bytes()))
                .collect(),
        );
        let mut reply = pin!(HttpReply::from_sse(Sse::new(chunks)));
        let mut fragments = vec![];
        loop {
            match poll_fn(|cx| reply.as_mut().poll_next_fragment(cx)).await {
                Ok(Some(fragment)) => fragments.push(fragment),
                Ok(None) => return (fragments, None),
                Err(err) => {
                    // Polling after a failure must not produce anything.
                    let after =
                        poll_fn(|cx| reply.as_mut().poll_next_fragment(cx))
                            .await;
                    assert!(matches!(after, Ok(None)));
                    return (fragments, Some(err));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fragments_until_sentinel() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hel\"}\n\n",
            "data: {\"content\":\"lo\"}\n\n",
            "data: [DONE]\n\n",
            "data: {\"content\":\"ignored\"}\n\n",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_fixture_response() {
        let (fragments, err) =
            collect(&[include_str!("../fixtures/test_response.txt")])
                .await;
        assert!(err.is_none());
        assert_eq!(fragments.concat(), "Hi there! How can I help you today?");
    }

    #[tokio::test]
    async fn test_transport_end_without_sentinel() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hi\"}\n\n",
            "data: {\"content\":\" there\"}\n\n",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hi", " there"]);
    }

    #[tokio::test]
    async fn test_stop_on_malformed_frame() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"a\"}\n\n",
            "data: {\"content\":\"b\"\n\n",
            "data: {\"content\":\"c\"}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(fragments, ["a"]);
        assert_eq!(err.unwrap().kind(), ErrorKind::StreamParse);
    }

    #[tokio::test]
    async fn test_unexpected_shape() {
        let (fragments, err) =
            collect(&["data: {\"delta\":\"a\"}\n\n"]).await;
        assert!(fragments.is_empty());
        assert_eq!(err.unwrap().kind(), ErrorKind::StreamParse);
    }

    #[tokio::test]
    async fn test_frame_per_chunk_without_blank_lines() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hi\"}",
            "data: {\"content\":\" there\"}",
            "data: [DONE]",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hi", " there"]);

        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hi\"}\n",
            "data: {\"content\":\" there\"}\n",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hi", " there"]);
    }

    #[tokio::test]
    async fn test_unterminated_last_frame() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hi\"}\n\n",
            "data: {\"content\":\" there\"}\n",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hi", " there"]);

        let (fragments, err) = collect(&[
            "data: {\"content\":\"Hi\"}\n\n",
            "data: {\"content\":\" th",
        ])
        .await;
        assert_eq!(fragments, ["Hi"]);
        assert_eq!(err.unwrap().kind(), ErrorKind::StreamParse);
    }

    #[tokio::test]
    async fn test_empty_fragments_skipped() {
        let (fragments, err) = collect(&[
            "data: {\"content\":\"\"}\n\n",
            "data: {\"content\":\"\"}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert!(err.is_none());
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let (fragments, err) = collect(&[
            "data: {\"cont",
            "ent\":\"Hi\"}\n",
            "\ndata: {\"content\":\" there\"}\n\ndata: [DO",
            "NE]\n\n",
        ])
        .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hi", " there"]);
    }
}
