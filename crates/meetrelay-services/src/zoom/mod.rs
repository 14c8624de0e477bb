//! Zoom API plumbing.

pub mod client;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters gets percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Encode a meeting instance UUID for use in an API path.
///
/// Zoom instance UUIDs can contain `/` and `=`. The recordings endpoint
/// requires those encoded twice: a single pass would leave `%2F` in the path,
/// which Zoom's router decodes back into a `/` and then 404s. So `/` must
/// arrive as `%252F`.
pub fn double_encode_meeting_uuid(uuid: &str) -> String {
    let once = utf8_percent_encode(uuid, PATH_SEGMENT).to_string();
    utf8_percent_encode(&once, PATH_SEGMENT).to_string()
}
