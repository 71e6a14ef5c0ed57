//! Server-sent-event parsing for the streaming completion endpoint.
//!
//! Responses arrive as arbitrary byte chunks; events are only complete at a
//! blank-line boundary. The caller owns a carry buffer and calls
//! [`take_event_payloads`] after every chunk; whatever trails the last
//! boundary stays in the buffer for the next call.

/// Pop every complete event off the front of `buf` and return their
/// `data:` payloads, oldest first.
pub(crate) fn take_event_payloads(buf: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    loop {
        let Some(boundary) = buf.find("\n\n") else {
            break;
        };
        // Take the whole event, delimiter included.
        let event: String = buf.drain(..boundary + 2).collect();

        for raw_line in event.lines() {
            let Some(rest) = raw_line.trim_start().strip_prefix("data:") else {
                // Field names like `event:`, `id:`, `retry:` carry nothing
                // the completion protocol uses.
                continue;
            };
            let payload = rest.trim();
            if !payload.is_empty() {
                payloads.push(payload.to_owned());
            }
        }
    }

    payloads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_complete_event_is_taken() {
        let mut buf = String::from("data: {\"content\":\"hi\"}\n\n");
        assert_eq!(take_event_payloads(&mut buf), vec!["{\"content\":\"hi\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_tail_waits_for_the_next_chunk() {
        let mut buf = String::from("data: done\n\ndata: not yet");
        assert_eq!(take_event_payloads(&mut buf), vec!["done"]);
        assert_eq!(buf, "data: not yet");
        buf.push_str(" whole\n\n");
        assert_eq!(take_event_payloads(&mut buf), vec!["not yet whole"]);
    }

    #[test]
    fn only_data_fields_are_kept() {
        let mut buf = String::from("event: tick\nid: 9\ndata: payload\nretry: 100\n\n");
        assert_eq!(take_event_payloads(&mut buf), vec!["payload"]);
    }

    #[test]
    fn blank_payloads_are_dropped() {
        let mut buf = String::from("data:\n\ndata:   \n\n");
        assert!(take_event_payloads(&mut buf).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn several_events_in_one_chunk_come_out_in_order() {
        let mut buf = String::from("data: a\n\ndata: b\n\ndata: c\n\n");
        assert_eq!(take_event_payloads(&mut buf), vec!["a", "b", "c"]);
    }
}
