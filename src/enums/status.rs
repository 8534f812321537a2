
/// Clamp an application-supplied status code into the valid range.
///
/// Anything outside 100..=599 maps to 500, matching what the response
/// builder promises.
pub fn normalize_status(code: u16) -> u16 {
    if code < 100 || code > 599 {
        500
    } else {
        code
    }
}

/// Reason phrase for a status code.
///
/// Codes within the valid range that have no common phrase get an empty
/// reason, which is legal on the wire.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        //  1xx status codes
        100 => "Continue",
        101 => "Switching Protocols",
        //  2xx status codes
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        //  3xx status codes
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        //  4xx status codes
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        //  5xx status codes
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}
