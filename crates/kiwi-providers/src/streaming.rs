//! Shared helpers for adapters that produce streamed completions.

use crate::{CompletionChunk, ToolCall, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// UTF-8 Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Decode as much of `byte_buffer` as forms valid UTF-8, leaving an
/// incomplete trailing sequence in the buffer for the next read.
///
/// Bytes that can never become valid UTF-8 are replaced with U+FFFD so a
/// corrupt stream cannot stall the caller forever.
pub fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> Option<String> {
    match std::str::from_utf8(byte_buffer) {
        Ok(s) => {
            if s.is_empty() {
                return None;
            }
            let result = s.to_string();
            byte_buffer.clear();
            Some(result)
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            match e.error_len() {
                // Incomplete sequence at the tail: emit the valid prefix only.
                None => {
                    if valid_up_to == 0 {
                        return None;
                    }
                    let valid: Vec<u8> = byte_buffer.drain(..valid_up_to).collect();
                    Some(String::from_utf8_lossy(&valid).into_owned())
                }
                Some(bad_len) => {
                    let consumed: Vec<u8> = byte_buffer.drain(..valid_up_to + bad_len).collect();
                    let mut text = String::from_utf8_lossy(&consumed).into_owned();
                    if let Some(rest) = decode_utf8_streaming(byte_buffer) {
                        text.push_str(&rest);
                    }
                    Some(text)
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Chunk Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Create a final completion chunk with tool calls and usage.
pub fn make_final_chunk(tool_calls: Vec<ToolCall>, usage: Option<Usage>) -> CompletionChunk {
    CompletionChunk {
        content: String::new(),
        finished: true,
        usage,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        stop_reason: None,
    }
}

/// Create a text content chunk (not finished).
pub fn make_text_chunk(content: String) -> CompletionChunk {
    CompletionChunk {
        content,
        ..Default::default()
    }
}

/// Create a tool calls chunk (not finished).
pub fn make_tool_chunk(tool_calls: Vec<ToolCall>) -> CompletionChunk {
    CompletionChunk {
        tool_calls: Some(tool_calls),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_ascii() {
        let mut buf = b"hello".to_vec();
        assert_eq!(decode_utf8_streaming(&mut buf).as_deref(), Some("hello"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_keeps_split_multibyte_sequence() {
        // "é" is 0xC3 0xA9; deliver only the first byte after "caf".
        let mut buf = vec![b'c', b'a', b'f', 0xC3];
        assert_eq!(decode_utf8_streaming(&mut buf).as_deref(), Some("caf"));
        assert_eq!(buf, vec![0xC3]);

        buf.push(0xA9);
        assert_eq!(decode_utf8_streaming(&mut buf).as_deref(), Some("é"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_waits_on_lone_prefix() {
        let mut buf = vec![0xE2, 0x82];
        assert_eq!(decode_utf8_streaming(&mut buf), None);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut buf = vec![b'a', 0xFF, b'b'];
        assert_eq!(decode_utf8_streaming(&mut buf).as_deref(), Some("a\u{FFFD}b"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_final_chunk_without_tools() {
        let chunk = make_final_chunk(vec![], None);
        assert!(chunk.finished);
        assert!(chunk.tool_calls.is_none());
    }
}
