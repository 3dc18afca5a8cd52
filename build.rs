fn main() {
    let proto_files = &["proto/mr.proto"];
    let include_dirs = &["."];

    // generated stubs are checked in next to the schema so that
    // `include!` in src/mr/rpc.rs can find them.
    tonic_build::configure()
        .out_dir("proto")
        .build_client(true)
        .build_server(true)
        .compile(proto_files, include_dirs)
        .unwrap_or_else(|e| panic!("protobuf compilation failed: {}", e));

    for file in proto_files {
        println!("cargo:rerun-if-changed={}", file);
    }
}
