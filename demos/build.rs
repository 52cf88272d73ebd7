fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let well_known = protoc_bin_vendored::include_path()?;

    prost_build::Config::new()
        .enable_type_names()
        .compile_protos(
            &[
                "proto/grpc_simple.proto",
                "proto/order.proto",
                "proto/price.proto",
            ],
            &[std::path::Path::new("proto"), well_known.as_path()],
        )?;

    println!("cargo:rerun-if-changed=proto");
    Ok(())
}
