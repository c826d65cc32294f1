//! Chat stream protocol
//!
//! The chat endpoint answers with newline-delimited `data: {json}` records.
//! Chunk boundaries never line up with records, so decoding goes through a
//! codec whose read buffer carries partial lines over to the next chunk.

mod decoder;
mod event;

#[cfg(test)]
mod proptests;

pub use decoder::{RecordDecoder, StreamError};
pub use event::ProtocolEvent;

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

/// Raw response body as delivered by the transport
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Lazy, finite sequence of protocol events read from one response body
pub type EventStream = FramedRead<StreamReader<ByteStream, Bytes>, RecordDecoder>;

/// Wrap a response body into a stream of protocol events.
pub fn event_stream(body: ByteStream) -> EventStream {
    FramedRead::new(StreamReader::new(body), RecordDecoder::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn body(chunks: Vec<&'static [u8]>) -> ByteStream {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c)))).boxed()
    }

    #[tokio::test]
    async fn events_arrive_in_record_order() {
        let mut events = event_stream(body(vec![
            b"data: {\"type\":\"conversation\",\"conversation_id\":7}\n\nda",
            b"ta: {\"type\":\"delta\",\"content\":\"Hel\"}\n\ndata: {\"type\":\"delta\",",
            b"\"content\":\"lo\"}\n\ndata: {\"type\":\"done\",\"conversation_id\":7}\n\n",
        ]));

        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event.unwrap());
        }

        assert_eq!(
            collected,
            vec![
                ProtocolEvent::Conversation { conversation_id: 7 },
                ProtocolEvent::Delta { content: "Hel".into() },
                ProtocolEvent::Delta { content: "lo".into() },
                ProtocolEvent::Done {
                    content: None,
                    conversation_id: Some(7),
                },
            ]
        );
    }

    #[tokio::test]
    async fn read_failure_surfaces_as_stream_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"delta\",\"content\":\"a\"}\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];
        let mut events = event_stream(futures::stream::iter(chunks).boxed());

        assert_eq!(
            events.next().await.unwrap().unwrap(),
            ProtocolEvent::Delta { content: "a".into() }
        );
        assert!(matches!(events.next().await, Some(Err(StreamError::Io(_)))));
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        let mut events = event_stream(body(vec![]));
        assert!(events.next().await.is_none());
    }
}
