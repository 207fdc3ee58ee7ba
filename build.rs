fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Supply a protoc binary from the vendored crate when one is not already
    // available on the system, so the build works in offline environments.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }
    tonic_build::compile_protos("proto/gridring.proto")?;
    Ok(())
}
