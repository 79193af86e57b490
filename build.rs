fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Messages are prost types defined in src/api.rs, so no protoc is needed.
    let log_service = tonic_build::manual::Service::builder()
        .name("Log")
        .package("log.v1")
        .method(
            tonic_build::manual::Method::builder()
                .name("produce")
                .route_name("Produce")
                .input_type("crate::api::ProduceRequest")
                .output_type("crate::api::ProduceResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            tonic_build::manual::Method::builder()
                .name("consume")
                .route_name("Consume")
                .input_type("crate::api::ConsumeRequest")
                .output_type("crate::api::ConsumeResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            tonic_build::manual::Method::builder()
                .name("produce_stream")
                .route_name("ProduceStream")
                .input_type("crate::api::ProduceRequest")
                .output_type("crate::api::ProduceResponse")
                .codec_path("tonic::codec::ProstCodec")
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .method(
            tonic_build::manual::Method::builder()
                .name("consume_stream")
                .route_name("ConsumeStream")
                .input_type("crate::api::ConsumeRequest")
                .output_type("crate::api::ConsumeResponse")
                .codec_path("tonic::codec::ProstCodec")
                .server_streaming()
                .build(),
        )
        .method(
            tonic_build::manual::Method::builder()
                .name("metrics")
                .route_name("Metrics")
                .input_type("crate::api::MetricsRequest")
                .output_type("crate::api::MetricsResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[log_service]);
}
