//! Decodes the backend's newline-delimited `{"chunk": "..."}` body.

use std::collections::VecDeque;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use crate::error::TurnError;
use crate::types::StreamFragment;

/// Reassembles lines across transport segments and parses each one.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines dropped because they did not parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn push(&mut self, segment: &[u8]) -> Vec<StreamFragment> {
        self.buffer.extend_from_slice(segment);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(fragment) = self.parse_line(&line[..line.len() - 1]) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    /// Parses a final line that was not newline terminated.
    pub fn finish(&mut self) -> Option<StreamFragment> {
        let rest = std::mem::take(&mut self.buffer);
        self.parse_line(&rest)
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<StreamFragment> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!("skipping stream line that is not valid UTF-8: {}", e);
                self.skipped += 1;
                return None;
            }
        };
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamFragment>(line) {
            Ok(fragment) => Some(fragment),
            Err(e) => {
                tracing::warn!("skipping malformed stream line: {}, line=> {:?}", e, line);
                self.skipped += 1;
                None
            }
        }
    }
}

/// Pulls fragments out of a byte stream one at a time.
pub struct FragmentReader<S> {
    body: S,
    decoder: LineDecoder,
    ready: VecDeque<StreamFragment>,
    done: bool,
}

impl<S, E> FragmentReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Returns `Ok(None)` once the body has ended and every line has been handed out.
    pub async fn next_fragment(&mut self) -> Result<Option<StreamFragment>, TurnError> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Ok(Some(fragment));
            }
            if self.done {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(segment)) => {
                    let fragments = self.decoder.push(&segment);
                    self.ready.extend(fragments);
                }
                Some(Err(e)) => {
                    self.done = true;
                    self.ready.clear();
                    return Err(TurnError::Transport(e.to_string()));
                }
                None => {
                    self.done = true;
                    self.ready.extend(self.decoder.finish());
                    if self.decoder.skipped() > 0 {
                        tracing::debug!("stream ended, {} line(s) skipped", self.decoder.skipped());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(segments: Vec<Result<&'static str, &'static str>>) -> impl Stream<Item = Result<Bytes, String>> + Unpin {
        stream::iter(segments.into_iter().map(|segment| {
            segment
                .map(|text| Bytes::from_static(text.as_bytes()))
                .map_err(str::to_string)
        }))
    }

    async fn collect<S>(reader: &mut FragmentReader<S>) -> Result<Vec<String>, TurnError>
    where
        S: Stream<Item = Result<Bytes, String>> + Unpin,
    {
        let mut chunks = Vec::new();
        while let Some(fragment) = reader.next_fragment().await? {
            chunks.push(fragment.into_chunk());
        }
        Ok(chunks)
    }

    #[tokio::test]
    async fn test_reads_lines_in_order() {
        let mut reader = FragmentReader::new(body(vec![
            Ok("{\"chunk\": \"Hello\"}\n{\"chunk\": \" doctor\"}\n"),
            Ok("{\"chunk\": \".\"}\n"),
        ]));
        assert_eq!(collect(&mut reader).await.unwrap(), vec!["Hello", " doctor", "."]);
    }

    #[tokio::test]
    async fn test_reassembles_split_lines() {
        let mut reader = FragmentReader::new(body(vec![
            Ok("{\"chunk\": \"My wr"),
            Ok("ist\"}\n{\"chu"),
            Ok("nk\": \" hurts\"}"),
        ]));
        assert_eq!(collect(&mut reader).await.unwrap(), vec!["My wrist", " hurts"]);
    }

    #[tokio::test]
    async fn test_skips_malformed_and_blank_lines() {
        let mut reader = FragmentReader::new(body(vec![Ok(
            "{\"chunk\": \"one\"}\n\nnot json\n{\"other\": 1}\r\n{\"chunk\": \"two\"}\r\n",
        )]));
        assert_eq!(collect(&mut reader).await.unwrap(), vec!["one", "two"]);
        assert_eq!(reader.decoder.skipped(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let mut reader = FragmentReader::new(body(vec![
            Ok("{\"chunk\": \"partial\"}\n"),
            Err("connection reset"),
            Ok("{\"chunk\": \"never seen\"}\n"),
        ]));
        assert_eq!(reader.next_fragment().await.unwrap().unwrap().chunk(), "partial");
        let err = reader.next_fragment().await.unwrap_err();
        assert!(matches!(err, TurnError::Transport(msg) if msg == "connection reset"));
        assert!(reader.next_fragment().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_body_yields_no_fragments() {
        let mut reader = FragmentReader::new(body(vec![]));
        assert!(collect(&mut reader).await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&[0xff, 0xfe, b'\n']).is_empty());
        assert_eq!(decoder.skipped(), 1);
        let fragments = decoder.push("{\"chunk\": \"ok\"}\n".as_bytes());
        assert_eq!(fragments, vec![StreamFragment::new("ok")]);
    }
}
