use std::net::{AddrParseError, SocketAddr};

use prost::Name;

/// Protobuf package of the example messages.
pub const PACKAGE: &str = "anyrpc.example.v1";

/// Type url of the raw echo route, which returns the payload untouched.
pub const RAW_ECHO_TYPE_URL: &str = "type.googleapis.com/anyrpc.example.v1.RawEcho";

#[derive(Clone, PartialEq, prost::Message)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub message: String,
    /// Echo requests handled by this server so far, this one included.
    #[prost(uint64, tag = "2")]
    pub handled: u64,
}

/// Ask the server to spend `millis` on a worker thread.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SleepRequest {
    #[prost(uint64, tag = "1")]
    pub millis: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SleepResponse {
    #[prost(uint64, tag = "1")]
    pub slept_millis: u64,
}

macro_rules! impl_name {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Name for $ty {
                const NAME: &'static str = stringify!($ty);
                const PACKAGE: &'static str = PACKAGE;

                fn type_url() -> String {
                    format!("type.googleapis.com/{}", Self::full_name())
                }
            }
        )*
    };
}

impl_name!(EchoRequest, EchoResponse, SleepRequest, SleepResponse);

/// Returns the server address from PORT env var, defaulting to 3000.
pub fn server_addr() -> Result<SocketAddr, AddrParseError> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    format!("0.0.0.0:{port}").parse()
}
