use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use protoc-bin-vendored to avoid needing protoc installed
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    // Proto files are relative to workspace root
    let proto_dir = PathBuf::from("../../proto");

    let protos = [
        proto_dir.join("grpc_controller.proto"),
        proto_dir.join("health.proto"),
    ];

    // Check that proto files exist
    for proto in &protos {
        if !proto.exists() {
            panic!("Proto file not found: {}", proto.display());
        }
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &[&proto_dir])?;

    // Rerun if proto files change
    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
