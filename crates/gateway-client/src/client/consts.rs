pub const GATEWAY_URL: &str = "GATEWAY_URL";
pub const GATEWAY_TOKEN: &str = "GATEWAY_TOKEN";

pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:8787/ws";
pub const DEFAULT_CAPACITY: usize = 128;

/// Query parameter carrying the bearer token at connection time.
pub const TOKEN_QUERY_PARAM: &str = "token";
