use enums::Version;

// Header values arrive as raw bytes; the parser strips leading whitespace
// but a client may still pad the value on the right.
fn trimmed(val: &[u8]) -> &[u8] {
    let lws = |c: &u8| matches!(*c, b' ' | b'\t' | b'\r' | b'\n');
    let start = match val.iter().position(|c| !lws(c)) {
        Some(start) => start,
        None => return b"",
    };
    let end = val.iter().rposition(|c| !lws(c))
        .map(|e| e + 1)
        .unwrap_or(val.len());
    &val[start..end]
}

fn is_close(val: &[u8]) -> bool {
    trimmed(val).eq_ignore_ascii_case(b"close")
}

/// Keep-alive auto-detection.
///
/// The connection closes when the client said `Connection: close`, or sent
/// no `Connection` header on anything older than HTTP/1.1. Every other
/// combination keeps the connection open, notably an explicit
/// `Connection: keep-alive` on HTTP/1.0.
pub fn should_keep_alive(version: Option<Version>, connection: Option<&[u8]>)
    -> bool
{
    match connection {
        Some(val) if !val.is_empty() => !is_close(val),
        _ => version == Some(Version::Http11),
    }
}
