//! Wire types shared by the commit log and the gRPC service.
//!
//! A `Record` is what gets stored after the length prefix in every
//! `.store` file, so its protobuf field tags must never change.

/// A single entry of the commit log.
///
/// `offset` is assigned by the log on append; any value set by the
/// producer is overwritten.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceRequest {
    #[prost(message, optional, tag = "1")]
    pub record: Option<Record>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceResponse {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumeRequest {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumeResponse {
    #[prost(message, optional, tag = "2")]
    pub record: Option<Record>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metrics {
    #[prost(uint64, tag = "1")]
    pub records_produced: u64,
    #[prost(uint64, tag = "2")]
    pub records_consumed: u64,
    #[prost(uint64, tag = "3")]
    pub bytes_produced: u64,
    #[prost(uint64, tag = "4")]
    pub lowest_offset: u64,
    #[prost(uint64, tag = "5")]
    pub highest_offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsResponse {
    #[prost(message, optional, tag = "1")]
    pub metrics: Option<Metrics>,
}

impl Record {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Record {
            value: value.into(),
            offset: 0,
        }
    }
}

/// Generated `log.v1.Log` service: `log_server` and `log_client`.
#[allow(clippy::all)]
pub mod v1 {
    include!(concat!(env!("OUT_DIR"), "/log.v1.Log.rs"));
}
